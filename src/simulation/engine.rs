//! Engine facade tying the components together.
//!
//! The orchestrating entry point constructs one [`Engine`] per rank from a
//! validated configuration and a communicator, then drives it through
//! `create_fields` / `save` / `step` / `load`. Any unrecovered error maps
//! to a non-zero exit status in the orchestrator; nothing here is retried.
//!
//! Each engine receives its context explicitly (no process-wide grid or
//! communicator state exists), so tests construct several independent
//! engines, including multi-rank ones, in a single process.

use log::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::comm::{Communicator, ReduceOp};
use crate::config::{Config, ConfigError};
use crate::error::EngineError;
use crate::fields::FieldStore;
use crate::grid::Grid;
use crate::pressure::PressureSolver;
use crate::time::{StepStatus, TimeIntegrator};

/// One rank's view of the simulation.
pub struct Engine {
    config: Config,
    grid: Grid,
    comm: Communicator,
    store: FieldStore,
    solver: PressureSolver,
    integrator: TimeIntegrator,
}

impl Engine {
    /// Validate the configuration and build every component for this rank.
    pub fn initialize(config: Config, comm: Communicator) -> Result<Self, EngineError> {
        config.validate()?;
        if comm.nprocs() != config.nprocs() {
            return Err(ConfigError::ProcessCountMismatch {
                expected: config.nprocs(),
                actual: comm.nprocs(),
            }
            .into());
        }

        let grid = Grid::from_config(&config, comm.rank())?;
        let store = FieldStore::new(&grid, &config);
        let solver = PressureSolver::new(&grid);
        let integrator = TimeIntegrator::new(&config, &grid);

        if comm.rank() == 0 {
            info!(
                "engine initialized: {}x{}x{} grid on {}x{} ranks, {} substages",
                grid.itot,
                grid.jtot,
                grid.ktot,
                grid.npx,
                grid.npy,
                integrator.n_substages()
            );
        }

        Ok(Self {
            config,
            grid,
            comm,
            store,
            solver,
            integrator,
        })
    }

    /// Set the initial condition: a seeded random perturbation on the
    /// horizontal momentum plus a linear vertical profile for every scalar,
    /// then a full ghost refresh.
    ///
    /// The seed is offset by the rank index so the perturbation is
    /// deterministic for a given configuration and decomposition.
    pub fn create_fields(&mut self) -> Result<(), EngineError> {
        let grid = &self.grid;
        let amp = self.config.init.rndamp;
        let mut rng =
            ChaCha8Rng::seed_from_u64(self.config.init.seed.wrapping_add(grid.rank as u64));

        if amp > 0.0 {
            for k in grid.kstart..grid.kend {
                for j in grid.jstart..grid.jend {
                    for i in grid.istart..grid.iend {
                        let ijk = grid.ijk(i, j, k);
                        self.store.u.data[ijk] = amp * rng.gen_range(-1.0..1.0);
                        self.store.v.data[ijk] = amp * rng.gen_range(-1.0..1.0);
                    }
                }
            }
        }

        for field in self.store.scalars.values_mut() {
            for k in grid.kstart..grid.kend {
                let profile = grid.z[k] / grid.zsize;
                for j in grid.jstart..grid.jend {
                    for i in grid.istart..grid.iend {
                        field.data[grid.ijk(i, j, k)] = profile;
                    }
                }
            }
        }

        self.refresh_ghosts()
    }

    /// Boundary conditions plus halo exchange for every field.
    pub fn refresh_ghosts(&mut self) -> Result<(), EngineError> {
        self.store.apply_boundary_conditions(&self.grid);
        self.comm.exchange_halo(&mut self.store.u.data, &self.grid)?;
        self.comm.exchange_halo(&mut self.store.v.data, &self.grid)?;
        self.comm.exchange_halo(&mut self.store.w.data, &self.grid)?;
        self.comm.exchange_halo(&mut self.store.p.data, &self.grid)?;
        let names: Vec<_> = self.store.scalars.keys().cloned().collect();
        for name in names {
            let field = self.store.scalars.get_mut(&name).expect("scalar exists");
            self.comm.exchange_halo(&mut field.data, &self.grid)?;
        }
        Ok(())
    }

    /// Advance one step; writes a periodic checkpoint when configured.
    pub fn step(&mut self) -> Result<StepStatus, EngineError> {
        let status =
            self.integrator
                .advance(&mut self.store, &self.grid, &self.comm, &mut self.solver)?;

        let interval = self.config.time.checkpoint_interval;
        if interval > 0 && status.step % interval == 0 {
            self.save(status.step)?;
        }
        Ok(status)
    }

    /// Write the full state for `step` (including step 0, before any
    /// stepping, to record the initial condition).
    pub fn save(&mut self, step: u64) -> Result<(), EngineError> {
        self.integrator
            .save(&self.store, &self.grid, &self.config, step)
    }

    /// Restore the full state for `step` and refresh every ghost layer.
    pub fn load(&mut self, step: u64) -> Result<(), EngineError> {
        self.integrator
            .load(&mut self.store, &self.grid, &self.config, step)?;
        self.refresh_ghosts()
    }

    /// Solve for the pressure correction of the current velocity field
    /// over `dt`, leaving it in the pressure field.
    ///
    /// Collective; normally driven by the substage loop, exposed for
    /// diagnostics and tests.
    pub fn solve_pressure(&mut self, dt: f64) -> Result<(), EngineError> {
        self.solver
            .solve(&mut self.store, &self.grid, &self.comm, dt)
    }

    /// One projection: pressure solve, gradient subtraction, ghost refresh.
    pub fn project(&mut self, dt: f64) -> Result<(), EngineError> {
        self.solve_pressure(dt)?;
        self.store.project_velocity(&self.grid, dt);
        self.refresh_ghosts()
    }

    /// Global maximum of |div(u)|, the residual the projection is meant
    /// to keep at round-off. Collective: every rank must call it together.
    pub fn max_divergence(&self) -> Result<f64, EngineError> {
        let local = self.store.local_divergence_max(&self.grid);
        Ok(self.comm.all_reduce(local, ReduceOp::Max)?)
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.integrator.time()
    }

    #[inline]
    pub fn step_index(&self) -> u64 {
        self.integrator.step_index()
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[inline]
    pub fn fields(&self) -> &FieldStore {
        &self.store
    }

    #[inline]
    pub fn fields_mut(&mut self) -> &mut FieldStore {
        &mut self.store
    }

    #[inline]
    pub fn communicator(&self) -> &Communicator {
        &self.comm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::Network;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.grid.itot = 8;
        config.grid.jtot = 8;
        config.grid.ktot = 8;
        config.init.rndamp = 1e-2;
        config.init.seed = 7;
        config.time.dt_max = 0.05;
        config
    }

    #[test]
    fn test_initialize_rejects_rank_count_mismatch() {
        let mut config = test_config();
        config.grid.npx = 2;
        config.grid.npy = 2;
        let comm = Network::single();
        let result = Engine::initialize(config, comm);
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::ProcessCountMismatch { .. }))
        ));
    }

    #[test]
    fn test_create_fields_is_deterministic() {
        let comm_a = Network::single();
        let comm_b = Network::single();
        let mut a = Engine::initialize(test_config(), comm_a).unwrap();
        let mut b = Engine::initialize(test_config(), comm_b).unwrap();
        a.create_fields().unwrap();
        b.create_fields().unwrap();
        assert_eq!(a.fields().u.data, b.fields().u.data);
        assert_eq!(a.fields().v.data, b.fields().v.data);
    }

    #[test]
    fn test_step_advances_time_and_counts() {
        let comm = Network::single();
        let mut engine = Engine::initialize(test_config(), comm).unwrap();
        engine.create_fields().unwrap();

        let s1 = engine.step().unwrap();
        let s2 = engine.step().unwrap();
        assert_eq!(s1.step, 1);
        assert_eq!(s2.step, 2);
        assert!(s2.time > s1.time);
        assert_eq!(engine.step_index(), 2);
    }

    #[test]
    fn test_step_leaves_divergence_at_roundoff() {
        let comm = Network::single();
        let mut engine = Engine::initialize(test_config(), comm).unwrap();
        engine.create_fields().unwrap();
        engine.step().unwrap();
        let div = engine.max_divergence().unwrap();
        assert!(div < 1e-11, "divergence {div:e}");
    }
}
