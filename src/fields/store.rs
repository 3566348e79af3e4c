//! Ownership of all prognostic arrays and the staggered-grid operators.
//!
//! The store allocates every field once at startup and mutates them each
//! substage. It also owns the discrete divergence and pressure-gradient
//! operators; both use the same staggered metric, which is what makes the
//! projection exact: the divergence removed by the correction is computed
//! with the identical stencil the solver inverted.

use indexmap::IndexMap;

use super::field::{FaceBc, Field, FieldKind};
use crate::config::{Config, MomentumBc, ScalarBc};
use crate::grid::Grid;

fn momentum_bc(bc: MomentumBc) -> FaceBc {
    match bc {
        MomentumBc::NoSlip => FaceBc::Dirichlet(0.0),
        MomentumBc::FreeSlip => FaceBc::Neumann(0.0),
    }
}

fn scalar_bc(bc: ScalarBc) -> FaceBc {
    match bc {
        ScalarBc::Dirichlet(value) => FaceBc::Dirichlet(value),
        ScalarBc::Flux(grad) => FaceBc::Neumann(grad),
    }
}

/// All field storage for one rank: momentum, pressure, scalars, and the
/// per-field tendency buffers consumed by the time integrator.
pub struct FieldStore {
    pub u: Field,
    pub v: Field,
    pub w: Field,
    pub p: Field,
    /// Scalars in registration order; iteration order is identical on
    /// every rank, which keeps collective calls and checkpoint layout in
    /// lock-step.
    pub scalars: IndexMap<String, Field>,

    pub ut: Vec<f64>,
    pub vt: Vec<f64>,
    pub wt: Vec<f64>,
    pub st: IndexMap<String, Vec<f64>>,
}

impl FieldStore {
    /// Allocate zeroed fields with the configured boundary policies.
    pub fn new(grid: &Grid, config: &Config) -> Self {
        let bc = &config.boundary;
        let ncells = grid.icells * grid.jcells * grid.kcells;

        let u = Field::new(
            "u",
            FieldKind::U,
            grid,
            momentum_bc(bc.momentum_bottom),
            momentum_bc(bc.momentum_top),
        );
        let v = Field::new(
            "v",
            FieldKind::V,
            grid,
            momentum_bc(bc.momentum_bottom),
            momentum_bc(bc.momentum_top),
        );
        let w = Field::new("w", FieldKind::W, grid, FaceBc::Wall, FaceBc::Wall);
        let p = Field::new(
            "p",
            FieldKind::Pressure,
            grid,
            FaceBc::Neumann(0.0),
            FaceBc::Neumann(0.0),
        );

        let mut scalars = IndexMap::new();
        let mut st = IndexMap::new();
        for name in &config.physics.scalars {
            scalars.insert(
                name.clone(),
                Field::new(
                    name.clone(),
                    FieldKind::Scalar,
                    grid,
                    scalar_bc(bc.scalar_bottom),
                    scalar_bc(bc.scalar_top),
                ),
            );
            st.insert(name.clone(), vec![0.0; ncells]);
        }

        Self {
            u,
            v,
            w,
            p,
            scalars,
            ut: vec![0.0; ncells],
            vt: vec![0.0; ncells],
            wt: vec![0.0; ncells],
            st,
        }
    }

    /// Names of the checkpointed fields, in on-disk order.
    pub fn field_names(&self) -> Vec<String> {
        let mut names = vec![
            "u".to_string(),
            "v".to_string(),
            "w".to_string(),
            "p".to_string(),
        ];
        names.extend(self.scalars.keys().cloned());
        names
    }

    /// Look up a checkpointed field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        match name {
            "u" => Some(&self.u),
            "v" => Some(&self.v),
            "w" => Some(&self.w),
            "p" => Some(&self.p),
            _ => self.scalars.get(name),
        }
    }

    /// Mutable lookup of a checkpointed field by name.
    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        match name {
            "u" => Some(&mut self.u),
            "v" => Some(&mut self.v),
            "w" => Some(&mut self.w),
            "p" => Some(&mut self.p),
            _ => self.scalars.get_mut(name),
        }
    }

    /// Write the vertical-wall ghost layers of every field.
    ///
    /// Applies only to the domain-boundary faces; horizontal ghosts belong
    /// to the halo exchange.
    pub fn apply_boundary_conditions(&mut self, grid: &Grid) {
        self.u.apply_vertical_bc(grid);
        self.v.apply_vertical_bc(grid);
        self.w.apply_vertical_bc(grid);
        self.p.apply_vertical_bc(grid);
        for field in self.scalars.values_mut() {
            field.apply_vertical_bc(grid);
        }
    }

    /// Scale every tendency buffer by `factor`.
    ///
    /// The low-storage Runge-Kutta scheme calls this at the start of each
    /// substage; the first substage uses factor 0, which is the reset.
    pub fn scale_tendencies(&mut self, factor: f64) {
        for t in self.ut.iter_mut() {
            *t *= factor;
        }
        for t in self.vt.iter_mut() {
            *t *= factor;
        }
        for t in self.wt.iter_mut() {
            *t *= factor;
        }
        for buf in self.st.values_mut() {
            for t in buf.iter_mut() {
                *t *= factor;
            }
        }
    }

    /// Advance every prognostic field by `coeff` times its tendency.
    ///
    /// Interior only; ghosts become stale and must be refreshed by
    /// boundary conditions plus halo exchange before the next stencil read.
    pub fn advance(&mut self, grid: &Grid, coeff: f64) {
        for k in grid.kstart..grid.kend {
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    let ijk = grid.ijk(i, j, k);
                    self.u.data[ijk] += coeff * self.ut[ijk];
                    self.v.data[ijk] += coeff * self.vt[ijk];
                    self.w.data[ijk] += coeff * self.wt[ijk];
                }
            }
        }
        for (name, field) in self.scalars.iter_mut() {
            let tend = &self.st[name];
            for k in grid.kstart..grid.kend {
                for j in grid.jstart..grid.jend {
                    for i in grid.istart..grid.iend {
                        let ijk = grid.ijk(i, j, k);
                        field.data[ijk] += coeff * tend[ijk];
                    }
                }
            }
        }
    }

    /// Discrete divergence of the velocity field into a packed interior
    /// buffer (i fastest, then j, then k): the right-hand side fed to the
    /// pressure solver.
    ///
    /// Requires fresh u, v, w halos.
    pub fn compute_divergence(&self, grid: &Grid, out: &mut Vec<f64>) {
        out.clear();
        out.reserve(grid.interior_len());
        let (u, v, w) = (&self.u.data, &self.v.data, &self.w.data);
        let ii = 1;
        let jj = grid.icells;
        let kk = grid.ijcells;
        for k in grid.kstart..grid.kend {
            let dzi = grid.dzi[k];
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    let ijk = grid.ijk(i, j, k);
                    out.push(
                        (u[ijk + ii] - u[ijk]) * grid.dxi
                            + (v[ijk + jj] - v[ijk]) * grid.dyi
                            + (w[ijk + kk] - w[ijk]) * dzi,
                    );
                }
            }
        }
    }

    /// Maximum absolute divergence over this rank's interior.
    pub fn local_divergence_max(&self, grid: &Grid) -> f64 {
        let (u, v, w) = (&self.u.data, &self.v.data, &self.w.data);
        let ii = 1;
        let jj = grid.icells;
        let kk = grid.ijcells;
        let mut div_max = 0.0_f64;
        for k in grid.kstart..grid.kend {
            let dzi = grid.dzi[k];
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    let ijk = grid.ijk(i, j, k);
                    let div = (u[ijk + ii] - u[ijk]) * grid.dxi
                        + (v[ijk + jj] - v[ijk]) * grid.dyi
                        + (w[ijk + kk] - w[ijk]) * dzi;
                    div_max = div_max.max(div.abs());
                }
            }
        }
        div_max
    }

    /// Subtract the discrete pressure gradient from the velocity field.
    ///
    /// Uses the same staggered metric as [`FieldStore::compute_divergence`];
    /// after this call the divergence of (u, v, w) is zero to round-off
    /// whenever `p` solves the discrete Poisson equation for the current
    /// divergence over `dt`. Requires fresh `p` halos. Wall faces of `w`
    /// are left untouched.
    pub fn project_velocity(&mut self, grid: &Grid, dt: f64) {
        let p = &self.p.data;
        let ii = 1;
        let jj = grid.icells;
        let kk = grid.ijcells;
        for k in grid.kstart..grid.kend {
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    let ijk = grid.ijk(i, j, k);
                    self.u.data[ijk] -= dt * (p[ijk] - p[ijk - ii]) * grid.dxi;
                    self.v.data[ijk] -= dt * (p[ijk] - p[ijk - jj]) * grid.dyi;
                }
            }
        }
        for k in grid.kstart + 1..grid.kend {
            let dzhi = grid.dzhi[k];
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    let ijk = grid.ijk(i, j, k);
                    self.w.data[ijk] -= dt * (p[ijk] - p[ijk - kk]) * dzhi;
                }
            }
        }
    }

    /// Local maximum of the advective stability sum |u|/dx + |v|/dy + |w|/dz,
    /// evaluated with velocities interpolated to cell centers.
    ///
    /// The integrator reduces this globally and converts it into the
    /// CFL-limited time step.
    pub fn local_cfl_velocity_max(&self, grid: &Grid) -> f64 {
        let (u, v, w) = (&self.u.data, &self.v.data, &self.w.data);
        let ii = 1;
        let jj = grid.icells;
        let kk = grid.ijcells;
        let mut vel_max = 0.0_f64;
        for k in grid.kstart..grid.kend {
            let dzi = grid.dzi[k];
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    let ijk = grid.ijk(i, j, k);
                    let uc = 0.5 * (u[ijk] + u[ijk + ii]).abs();
                    let vc = 0.5 * (v[ijk] + v[ijk + jj]).abs();
                    let wc = 0.5 * (w[ijk] + w[ijk + kk]).abs();
                    vel_max = vel_max.max(uc * grid.dxi + vc * grid.dyi + wc * dzi);
                }
            }
        }
        vel_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::Network;
    use crate::config::Config;

    fn setup(itot: usize, jtot: usize, ktot: usize) -> (Grid, FieldStore, Config) {
        let mut config = Config::default();
        config.grid.itot = itot;
        config.grid.jtot = jtot;
        config.grid.ktot = ktot;
        let grid = Grid::from_config(&config, 0).unwrap();
        let store = FieldStore::new(&grid, &config);
        (grid, store, config)
    }

    #[test]
    fn test_divergence_of_uniform_flow_is_zero() {
        let (grid, mut store, _) = setup(8, 8, 8);
        store.u.data.fill(1.0);
        store.v.data.fill(-2.0);
        // w stays zero (wall-bounded).
        let mut div = Vec::new();
        store.compute_divergence(&grid, &mut div);
        assert!(div.iter().all(|&d| d.abs() < 1e-14));
    }

    #[test]
    fn test_divergence_of_linear_shear() {
        // u = x (faces): du/dx = 1 everywhere.
        let (grid, mut store, _) = setup(8, 8, 8);
        let comm = Network::single();
        for k in 0..grid.kcells {
            for j in 0..grid.jcells {
                for i in grid.istart..grid.iend {
                    let x = (i - grid.istart) as f64 * grid.dx;
                    store.u.data[grid.ijk(i, j, k)] = x;
                }
            }
        }
        comm.exchange_halo(&mut store.u.data, &grid).unwrap();

        let mut div = Vec::new();
        store.compute_divergence(&grid, &mut div);
        // Interior cells away from the periodic wrap see du/dx = 1.
        let idx = 1 + grid.imax * (1 + grid.jmax); // cell (1,1,1)
        assert!((div[idx] - 1.0).abs() < 1e-12, "got {}", div[idx]);
    }

    #[test]
    fn test_tendency_scale_and_advance() {
        let (grid, mut store, _) = setup(8, 8, 8);
        store.ut.fill(2.0);
        store.scale_tendencies(0.5);
        assert_eq!(store.ut[grid.ijk(2, 2, 2)], 1.0);

        store.advance(&grid, 0.1);
        let ijk = grid.ijk(grid.istart, grid.jstart, grid.kstart);
        assert!((store.u.data[ijk] - 0.1).abs() < 1e-14);
        // Ghost cells are not advanced.
        assert_eq!(store.u.data[grid.ijk(0, 0, 0)], 0.0);
    }

    #[test]
    fn test_cfl_velocity_max_uniform() {
        let (grid, mut store, _) = setup(8, 8, 8);
        store.u.data.fill(2.0);
        let vel = store.local_cfl_velocity_max(&grid);
        assert!((vel - 2.0 * grid.dxi).abs() < 1e-12);
    }

    #[test]
    fn test_field_names_order_is_stable() {
        let mut config = Config::default();
        config.grid.itot = 8;
        config.grid.jtot = 8;
        config.grid.ktot = 8;
        config.physics.scalars = vec!["th".into(), "qt".into()];
        let grid = Grid::from_config(&config, 0).unwrap();
        let store = FieldStore::new(&grid, &config);
        assert_eq!(store.field_names(), vec!["u", "v", "w", "p", "th", "qt"]);
    }
}
