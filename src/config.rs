//! Engine configuration and up-front validation.
//!
//! The orchestrating entry point owns parsing (command line, files); this
//! module owns the validated parameter set the engine components consume.
//! Every structural constraint (divisibility of the grid by the process
//! counts, transform-friendly horizontal extents, sane time-step bounds)
//! is checked once by [`Config::validate`] before any simulation step runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for invalid or inconsistent configuration.
///
/// Always fatal, never retried: a configuration problem detected after the
/// first step would leave ranks disagreeing about control flow.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A global grid extent is zero.
    #[error("grid extent along {axis} must be positive, got {extent}")]
    InvalidExtent { axis: char, extent: usize },

    /// A global extent is not divisible by the process count on that axis.
    ///
    /// Exact divisibility is required by policy; remainders are not
    /// distributed best-effort.
    #[error("grid extent {extent} along {axis} is not divisible by {count} processes")]
    NotDivisible {
        axis: char,
        extent: usize,
        count: usize,
    },

    /// The vertical extent is not divisible by the total rank count, so the
    /// slab layout used by the pressure solve cannot be formed.
    #[error("vertical extent {ktot} is not divisible by {nprocs} ranks (slab layout)")]
    SlabNotDivisible { ktot: usize, nprocs: usize },

    /// A horizontal extent is not a power of two (radix-2 transform).
    #[error("horizontal extent {extent} along {axis} must be a power of two")]
    NotPowerOfTwo { axis: char, extent: usize },

    /// The process grid has a zero axis.
    #[error("process grid {npx}x{npy} must have positive extents")]
    InvalidProcessGrid { npx: usize, npy: usize },

    /// A physical domain size is not strictly positive.
    #[error("domain size along {axis} must be positive, got {size}")]
    InvalidDomainSize { axis: char, size: f64 },

    /// CFL limit outside (0, 1].
    #[error("cfl limit must be in (0, 1], got {0}")]
    InvalidCfl(f64),

    /// Inconsistent time-step clamping bounds.
    #[error("dt_min ({dt_min}) must not exceed dt_max ({dt_max})")]
    InvalidTimeStepBounds { dt_min: f64, dt_max: f64 },

    /// Runge-Kutta order other than the supported 3 or 4.
    #[error("unsupported Runge-Kutta order {0} (supported: 3, 4)")]
    UnsupportedRkOrder(usize),

    /// A viscosity or diffusivity is negative.
    #[error("{name} must be non-negative, got {value}")]
    NegativeDiffusivity { name: &'static str, value: f64 },

    /// Vertical cell edges failed the strict monotonicity requirement.
    #[error("vertical edges must be strictly increasing, violated at level {level}")]
    NonMonotonicVertical { level: usize },

    /// The same scalar name was configured twice.
    #[error("scalar '{0}' configured more than once")]
    DuplicateScalar(String),

    /// Buoyancy coupling requires at least one scalar field.
    #[error("buoyancy coupling enabled but no scalar fields configured")]
    BuoyancyWithoutScalar,

    /// A checkpoint header disagrees with the configured grid.
    #[error("checkpoint header does not match configuration: expected {expected}, found {found}")]
    CheckpointMismatch { expected: String, found: String },

    /// The communicator was built for a different process grid.
    #[error("communicator spans {actual} ranks but the configuration needs {expected}")]
    ProcessCountMismatch { expected: usize, actual: usize },
}

/// Vertical level distribution specification.
///
/// Converted into concrete cell edges by the grid; the result must be
/// strictly increasing with strictly positive spacings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum VerticalSpec {
    /// Equally spaced levels.
    Uniform,
    /// Hyperbolic-tangent clustering towards both walls.
    ///
    /// `factor` controls the strength; 0 < factor, with larger values
    /// packing more levels near the boundaries.
    Tanh { factor: f64 },
}

/// Boundary policy for the momentum components at a vertical domain face.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MomentumBc {
    /// Tangential velocity zero at the wall.
    NoSlip,
    /// Zero tangential stress at the wall.
    FreeSlip,
}

/// Boundary policy for a scalar at a vertical domain face.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScalarBc {
    /// Fixed value at the wall.
    Dirichlet(f64),
    /// Fixed gradient (flux) through the wall.
    Flux(f64),
}

/// Grid and decomposition parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridConfig {
    /// Global cell counts.
    pub itot: usize,
    pub jtot: usize,
    pub ktot: usize,
    /// Process counts along the two horizontal axes.
    pub npx: usize,
    pub npy: usize,
    /// Physical domain sizes.
    pub xsize: f64,
    pub ysize: f64,
    pub zsize: f64,
    /// Vertical level distribution.
    pub vertical: VerticalSpec,
}

/// Fluid and scalar transport parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Kinematic viscosity.
    pub visc: f64,
    /// Scalar diffusivity (shared by all scalars).
    pub svisc: f64,
    /// Scalar field names, in registration order.
    pub scalars: Vec<String>,
    /// Couple the first scalar into the vertical momentum as buoyancy.
    pub buoyancy: bool,
}

/// Time integration parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeConfig {
    /// CFL limit for the advective time-step restriction.
    pub cfl: f64,
    /// Maximum diffusion number for the viscous restriction.
    pub dnmax: f64,
    /// Clamping bounds for the chosen step.
    pub dt_min: f64,
    pub dt_max: f64,
    /// Runge-Kutta order: 3 (three substages) or 4 (five substages).
    pub rk_order: usize,
    /// Steps between checkpoints (0 disables periodic checkpointing).
    pub checkpoint_interval: u64,
    /// Directory receiving checkpoint files.
    pub checkpoint_dir: PathBuf,
}

/// Vertical boundary policies per field class.
///
/// The horizontal faces are always periodic: the pressure solver's spectral
/// transforms require it, so it is a structural property rather than a
/// configurable one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub momentum_bottom: MomentumBc,
    pub momentum_top: MomentumBc,
    pub scalar_bottom: ScalarBc,
    pub scalar_top: ScalarBc,
}

/// Initial-condition parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitConfig {
    /// Amplitude of the random velocity perturbation.
    pub rndamp: f64,
    /// Base RNG seed; each rank offsets it by its own rank index.
    pub seed: u64,
}

/// Complete engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub grid: GridConfig,
    pub physics: PhysicsConfig,
    pub time: TimeConfig,
    pub boundary: BoundaryConfig,
    pub init: InitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid: GridConfig {
                itot: 32,
                jtot: 32,
                ktot: 32,
                npx: 1,
                npy: 1,
                xsize: 1.0,
                ysize: 1.0,
                zsize: 1.0,
                vertical: VerticalSpec::Uniform,
            },
            physics: PhysicsConfig {
                visc: 1e-5,
                svisc: 1e-5,
                scalars: Vec::new(),
                buoyancy: false,
            },
            time: TimeConfig {
                cfl: 1.0,
                dnmax: 0.4,
                dt_min: 1e-9,
                dt_max: 1.0,
                rk_order: 3,
                checkpoint_interval: 0,
                checkpoint_dir: PathBuf::from("."),
            },
            boundary: BoundaryConfig {
                momentum_bottom: MomentumBc::NoSlip,
                momentum_top: MomentumBc::FreeSlip,
                scalar_bottom: ScalarBc::Flux(0.0),
                scalar_top: ScalarBc::Flux(0.0),
            },
            init: InitConfig {
                rndamp: 0.0,
                seed: 1,
            },
        }
    }
}

impl Config {
    /// Check every structural constraint.
    ///
    /// Invalid or inconsistent values produce a [`ConfigError`] before any
    /// component is constructed; a configuration that passes here cannot
    /// fail later for reasons of shape.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.grid;

        for (axis, extent) in [('x', g.itot), ('y', g.jtot), ('z', g.ktot)] {
            if extent == 0 {
                return Err(ConfigError::InvalidExtent { axis, extent });
            }
        }
        if g.npx == 0 || g.npy == 0 {
            return Err(ConfigError::InvalidProcessGrid {
                npx: g.npx,
                npy: g.npy,
            });
        }
        if g.itot % g.npx != 0 {
            return Err(ConfigError::NotDivisible {
                axis: 'x',
                extent: g.itot,
                count: g.npx,
            });
        }
        if g.jtot % g.npy != 0 {
            return Err(ConfigError::NotDivisible {
                axis: 'y',
                extent: g.jtot,
                count: g.npy,
            });
        }
        let nprocs = g.npx * g.npy;
        if g.ktot % nprocs != 0 {
            return Err(ConfigError::SlabNotDivisible {
                ktot: g.ktot,
                nprocs,
            });
        }
        if !g.itot.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                axis: 'x',
                extent: g.itot,
            });
        }
        if !g.jtot.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                axis: 'y',
                extent: g.jtot,
            });
        }
        for (axis, size) in [('x', g.xsize), ('y', g.ysize), ('z', g.zsize)] {
            if !(size > 0.0) {
                return Err(ConfigError::InvalidDomainSize { axis, size });
            }
        }

        if !(self.time.cfl > 0.0 && self.time.cfl <= 1.0) {
            return Err(ConfigError::InvalidCfl(self.time.cfl));
        }
        if self.time.dt_min > self.time.dt_max {
            return Err(ConfigError::InvalidTimeStepBounds {
                dt_min: self.time.dt_min,
                dt_max: self.time.dt_max,
            });
        }
        if self.time.rk_order != 3 && self.time.rk_order != 4 {
            return Err(ConfigError::UnsupportedRkOrder(self.time.rk_order));
        }

        if self.physics.visc < 0.0 {
            return Err(ConfigError::NegativeDiffusivity {
                name: "visc",
                value: self.physics.visc,
            });
        }
        if self.physics.svisc < 0.0 {
            return Err(ConfigError::NegativeDiffusivity {
                name: "svisc",
                value: self.physics.svisc,
            });
        }
        for (n, name) in self.physics.scalars.iter().enumerate() {
            if self.physics.scalars[..n].contains(name) {
                return Err(ConfigError::DuplicateScalar(name.clone()));
            }
        }
        if self.physics.buoyancy && self.physics.scalars.is_empty() {
            return Err(ConfigError::BuoyancyWithoutScalar);
        }

        Ok(())
    }

    /// Total number of ranks in the process grid.
    pub fn nprocs(&self) -> usize {
        self.grid.npx * self.grid.npy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_indivisible_decomposition() {
        let mut config = Config::default();
        config.grid.itot = 32;
        config.grid.npx = 3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotDivisible { axis: 'x', .. })
        ));
    }

    #[test]
    fn test_rejects_slab_indivisible_vertical() {
        let mut config = Config::default();
        config.grid.ktot = 30;
        config.grid.npx = 2;
        config.grid.npy = 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SlabNotDivisible { .. })
        ));
    }

    #[test]
    fn test_rejects_non_power_of_two_horizontal() {
        let mut config = Config::default();
        config.grid.itot = 24;
        config.grid.npx = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPowerOfTwo { axis: 'x', .. })
        ));
    }

    #[test]
    fn test_rejects_bad_cfl() {
        let mut config = Config::default();
        config.time.cfl = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCfl(_))));
        config.time.cfl = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCfl(_))));
    }

    #[test]
    fn test_rejects_inverted_dt_bounds() {
        let mut config = Config::default();
        config.time.dt_min = 1.0;
        config.time.dt_max = 0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeStepBounds { .. })
        ));
    }

    #[test]
    fn test_rejects_unsupported_rk_order() {
        let mut config = Config::default();
        config.time.rk_order = 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedRkOrder(2))
        ));
    }

    #[test]
    fn test_rejects_duplicate_scalar() {
        let mut config = Config::default();
        config.physics.scalars = vec!["th".to_string(), "th".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateScalar(_))
        ));
    }

    #[test]
    fn test_rejects_buoyancy_without_scalar() {
        let mut config = Config::default();
        config.physics.buoyancy = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BuoyancyWithoutScalar)
        ));
    }
}
