//! Multi-stage time integration of momentum and scalars.
//!
//! Low-storage Runge-Kutta in the two-register form: at substage s the
//! tendency buffer is scaled by cA[s] (zero on the first substage, i.e. a
//! reset) before the fresh right-hand side is accumulated, then the fields
//! advance by cB[s] * dt. Each substage ends with a pressure solve and
//! projection, so the velocity leaving every substage is divergence-free.
//!
//! The substage loop is driven entirely by configuration constants: the
//! same collective operations run in the same order on every rank no
//! matter what the local field values are. That property is what keeps
//! the SPMD job in lock-step and must be preserved by any change here.

pub mod rhs;

use log::{debug, warn};

use crate::comm::{Communicator, ReduceOp};
use crate::config::Config;
use crate::error::EngineError;
use crate::fields::FieldStore;
use crate::grid::Grid;
use crate::io::checkpoint;
use crate::pressure::PressureSolver;

/// Three-substage Williamson coefficients (third order).
const RK3_A: [f64; 3] = [0.0, -5.0 / 9.0, -153.0 / 128.0];
const RK3_B: [f64; 3] = [1.0 / 3.0, 15.0 / 16.0, 8.0 / 15.0];

/// Five-substage Carpenter-Kennedy coefficients (fourth order).
const RK4_A: [f64; 5] = [
    0.0,
    -567301805773.0 / 1357537059087.0,
    -2404267990393.0 / 2016746695238.0,
    -3550918686646.0 / 2091501179385.0,
    -1275806237668.0 / 842570457699.0,
];
const RK4_B: [f64; 5] = [
    1432997174477.0 / 9575080441755.0,
    5161836677717.0 / 13612068292357.0,
    1720146321549.0 / 2090206949498.0,
    3134564353537.0 / 4481467310338.0,
    2277821191437.0 / 14882151754819.0,
];

/// Integrator state for diagnostics and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ComputingTendencies,
    Projecting,
    Advancing,
    Checkpointing,
}

/// Outcome of one completed step.
#[derive(Clone, Copy, Debug)]
pub struct StepStatus {
    /// Step index after the advance.
    pub step: u64,
    /// Simulation time after the advance.
    pub time: f64,
    /// Step size that was used.
    pub dt: f64,
}

/// Drives the substage loop, the stable-step selection, and checkpointing.
pub struct TimeIntegrator {
    c_a: &'static [f64],
    c_b: &'static [f64],

    cfl: f64,
    dt_min: f64,
    dt_max: f64,
    /// Viscous step limit, fixed by grid and diffusivities.
    dt_diff: f64,

    visc: f64,
    svisc: f64,
    buoyancy_scalar: Option<String>,

    time: f64,
    step: u64,
    phase: Phase,
}

impl TimeIntegrator {
    /// Build the integrator from a validated configuration.
    pub fn new(config: &Config, grid: &Grid) -> Self {
        let (c_a, c_b): (&'static [f64], &'static [f64]) = match config.time.rk_order {
            3 => (&RK3_A, &RK3_B),
            4 => (&RK4_A, &RK4_B),
            other => unreachable!("validation admits rk_order 3 or 4, got {other}"),
        };

        // Diffusion-number limit: fixed once the grid and diffusivities
        // are known, identical on all ranks.
        let dzidzi_max = (grid.kstart..grid.kend)
            .map(|k| grid.dzi[k] * grid.dzi[k])
            .fold(0.0_f64, f64::max);
        let spatial = grid.dxi * grid.dxi + grid.dyi * grid.dyi + dzidzi_max;
        let visc_max = config.physics.visc.max(config.physics.svisc);
        let dt_diff = if visc_max > 0.0 {
            config.time.dnmax / (visc_max * spatial)
        } else {
            f64::INFINITY
        };

        let buoyancy_scalar = if config.physics.buoyancy {
            config.physics.scalars.first().cloned()
        } else {
            None
        };

        Self {
            c_a,
            c_b,
            cfl: config.time.cfl,
            dt_min: config.time.dt_min,
            dt_max: config.time.dt_max,
            dt_diff,
            visc: config.physics.visc,
            svisc: config.physics.svisc,
            buoyancy_scalar,
            time: 0.0,
            step: 0,
            phase: Phase::Idle,
        }
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn step_index(&self) -> u64 {
        self.step
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn n_substages(&self) -> usize {
        self.c_b.len()
    }

    /// Pick the stable step for the current velocity field.
    ///
    /// Involves one global reduction, so every rank must call this the
    /// same number of times; the result is bit-identical everywhere.
    pub fn compute_dt(
        &self,
        store: &FieldStore,
        grid: &Grid,
        comm: &Communicator,
    ) -> Result<f64, EngineError> {
        let local = store.local_cfl_velocity_max(grid);
        let global = comm.all_reduce(local, ReduceOp::Max)?;

        let dt_cfl = if global > 0.0 {
            self.cfl / global
        } else {
            f64::INFINITY
        };
        let dt = dt_cfl.min(self.dt_diff);

        let clamped = dt.clamp(self.dt_min, self.dt_max);
        if clamped < dt {
            debug!("dt limited by dt_max: stable {dt:.3e}, using {clamped:.3e}");
        } else if clamped > dt {
            warn!("dt clamped up to dt_min: stable {dt:.3e}, using {clamped:.3e}");
        }
        Ok(clamped)
    }

    /// Advance the solution by one full step.
    ///
    /// Per substage: scale tendencies, accumulate the right-hand side,
    /// advance, refresh ghosts, solve for the pressure correction, project,
    /// refresh ghosts again. A numerical failure in any substage aborts the
    /// step; nothing is retried.
    pub fn advance(
        &mut self,
        store: &mut FieldStore,
        grid: &Grid,
        comm: &Communicator,
        solver: &mut PressureSolver,
    ) -> Result<StepStatus, EngineError> {
        let dt = self.compute_dt(store, grid, comm)?;

        for substage in 0..self.n_substages() {
            self.phase = Phase::ComputingTendencies;
            store.scale_tendencies(self.c_a[substage]);
            rhs::momentum_tendencies(store, grid, self.visc);
            if !store.scalars.is_empty() {
                rhs::scalar_tendencies(store, grid, self.svisc);
            }
            if let Some(name) = self.buoyancy_scalar.clone() {
                rhs::buoyancy_tendency(store, grid, &name);
            }

            let dt_sub = self.c_b[substage] * dt;
            store.advance(grid, dt_sub);
            store.apply_boundary_conditions(grid);
            comm.exchange_halo(&mut store.u.data, grid)?;
            comm.exchange_halo(&mut store.v.data, grid)?;
            comm.exchange_halo(&mut store.w.data, grid)?;

            self.phase = Phase::Projecting;
            solver.solve(store, grid, comm, dt_sub)?;
            store.project_velocity(grid, dt_sub);

            store.apply_boundary_conditions(grid);
            comm.exchange_halo(&mut store.u.data, grid)?;
            comm.exchange_halo(&mut store.v.data, grid)?;
            comm.exchange_halo(&mut store.w.data, grid)?;
            let scalar_names: Vec<_> = store.scalars.keys().cloned().collect();
            for name in scalar_names {
                let field = store.scalars.get_mut(&name).expect("scalar exists");
                comm.exchange_halo(&mut field.data, grid)?;
            }
        }

        self.phase = Phase::Advancing;
        self.time += dt;
        self.step += 1;
        self.phase = Phase::Idle;

        debug!(
            "step {} complete: t = {:.6}, dt = {:.3e}",
            self.step, self.time, dt
        );

        Ok(StepStatus {
            step: self.step,
            time: self.time,
            dt,
        })
    }

    /// Write the full model state for `step` (callable at step 0 to record
    /// the initial condition).
    pub fn save(
        &mut self,
        store: &FieldStore,
        grid: &Grid,
        config: &Config,
        step: u64,
    ) -> Result<(), EngineError> {
        self.phase = Phase::Checkpointing;
        let result = checkpoint::save(&config.time.checkpoint_dir, step, grid, store, self.time);
        self.phase = Phase::Idle;
        result?;
        Ok(())
    }

    /// Restore the full model state for `step`.
    ///
    /// The caller must refresh ghost cells afterwards; only interiors are
    /// persisted. A header that disagrees with the configured grid is a
    /// fatal configuration error.
    pub fn load(
        &mut self,
        store: &mut FieldStore,
        grid: &Grid,
        config: &Config,
        step: u64,
    ) -> Result<(), EngineError> {
        self.phase = Phase::Checkpointing;
        let result = checkpoint::load(&config.time.checkpoint_dir, step, grid, store);
        self.phase = Phase::Idle;
        let (time, step) = result?;
        self.time = time;
        self.step = step;
        Ok(())
    }
}
