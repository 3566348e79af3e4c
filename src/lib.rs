//! # les-rs
//!
//! A pressure-projection engine for parallel incompressible-flow
//! simulation on structured staggered grids.
//!
//! This crate provides the core building blocks of an atmospheric
//! LES/DNS-style solver:
//! - Domain decomposition and halo/transpose communication
//! - Grid geometry with non-uniform vertical coordinates
//! - Field storage with per-face boundary policies
//! - A spectral-tridiagonal Poisson solver for the pressure correction
//! - Low-storage Runge-Kutta time integration with checkpointing
//!
//! Ranks execute the same program in lock-step (SPMD) and communicate only
//! through [`comm::Communicator`]; every component takes its context
//! explicitly, so multiple independent engines (including multi-rank ones)
//! can coexist in one process.
//!
//! # Example
//!
//! ```
//! use les_rs::{Config, Engine, Network};
//!
//! let mut config = Config::default();
//! config.grid.itot = 16;
//! config.grid.jtot = 16;
//! config.grid.ktot = 16;
//! config.init.rndamp = 1e-3;
//!
//! let mut engine = Engine::initialize(config, Network::single()).unwrap();
//! engine.create_fields().unwrap();
//! let status = engine.step().unwrap();
//! assert_eq!(status.step, 1);
//! ```

pub mod comm;
pub mod config;
pub mod error;
pub mod fields;
pub mod grid;
pub mod io;
pub mod pressure;
pub mod simulation;
pub mod time;

// Re-export the main types for convenience.
pub use comm::{CommError, Communicator, Network, Orientation, ReduceOp, TransposePlan};
pub use config::{Config, ConfigError, MomentumBc, ScalarBc, VerticalSpec};
pub use error::EngineError;
pub use fields::{FaceBc, Field, FieldKind, FieldStore};
pub use grid::{Grid, GHOST_CELLS};
pub use io::CheckpointError;
pub use pressure::{NumericsError, PressureSolver};
pub use simulation::Engine;
pub use time::{Phase, StepStatus, TimeIntegrator};
