//! Vertical coordinate generation for stretched staggered grids.
//!
//! A stretching maps the unit interval onto the vertical domain, producing
//! cell edges that may cluster towards the walls. Edges must come out
//! strictly increasing with strictly positive spacings; anything else is a
//! fatal configuration error caught before the grid is built.
//!
//! # Available stretchings
//!
//! - [`UniformStretching`]: equal spacing
//! - [`TanhStretching`]: hyperbolic-tangent clustering towards both walls

use crate::config::{ConfigError, VerticalSpec};

/// Trait for vertical level distributions.
///
/// Implementations return the `ktot + 1` cell edges spanning `[0, zsize]`.
/// Edge 0 is the bottom wall and edge `ktot` the top wall.
pub trait VerticalStretching: Send + Sync {
    /// Compute cell edges for `ktot` cells over a domain of height `zsize`.
    fn edges(&self, ktot: usize, zsize: f64) -> Vec<f64>;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

/// Equal spacing from bottom to top wall.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformStretching;

impl VerticalStretching for UniformStretching {
    fn edges(&self, ktot: usize, zsize: f64) -> Vec<f64> {
        (0..=ktot).map(|k| zsize * k as f64 / ktot as f64).collect()
    }

    fn name(&self) -> &'static str {
        "uniform"
    }
}

/// Hyperbolic-tangent clustering towards both walls.
///
/// Larger `factor` packs more levels near the boundaries; `factor -> 0`
/// recovers uniform spacing. Typical values are 1-3 for boundary-layer
/// resolution.
#[derive(Clone, Copy, Debug)]
pub struct TanhStretching {
    pub factor: f64,
}

impl VerticalStretching for TanhStretching {
    fn edges(&self, ktot: usize, zsize: f64) -> Vec<f64> {
        let gamma = self.factor;
        let denom = gamma.tanh();
        (0..=ktot)
            .map(|k| {
                let s = k as f64 / ktot as f64;
                // Symmetric tanh map: s in [0,1] -> [0,1], clustered at 0 and 1.
                let mapped = 0.5 * (1.0 + (gamma * (2.0 * s - 1.0)).tanh() / denom);
                zsize * mapped
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "tanh"
    }
}

/// Build the edges for a configured [`VerticalSpec`] and validate them.
///
/// # Errors
///
/// [`ConfigError::NonMonotonicVertical`] if any spacing is not strictly
/// positive (degenerate stretching parameters, non-finite values).
pub fn build_edges(spec: VerticalSpec, ktot: usize, zsize: f64) -> Result<Vec<f64>, ConfigError> {
    let edges = match spec {
        VerticalSpec::Uniform => UniformStretching.edges(ktot, zsize),
        VerticalSpec::Tanh { factor } => TanhStretching { factor }.edges(ktot, zsize),
    };

    for k in 1..edges.len() {
        let spacing = edges[k] - edges[k - 1];
        if !(spacing > 0.0) {
            return Err(ConfigError::NonMonotonicVertical { level: k });
        }
    }

    Ok(edges)
}
