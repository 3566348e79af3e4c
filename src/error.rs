//! Engine-level error taxonomy.
//!
//! Three kinds of failure exist in the core, all of them terminal:
//! configuration errors (detected once, before any step runs),
//! communication errors (the distributed state cannot be resumed
//! mid-collective), and numerical divergence (continuing past a divergent
//! solve would produce physically meaningless results). The checkpoint
//! layer adds an I/O error kind for the ambient file handling.
//!
//! None of these are caught and retried internally; the design favors
//! fail-fast over masking instability.

use thiserror::Error;

use crate::comm::CommError;
use crate::config::ConfigError;
use crate::io::CheckpointError;
use crate::pressure::NumericsError;

/// Top-level error for the simulation engine.
///
/// Every fallible engine operation maps its failure into one of these
/// variants; the orchestrating entry point converts any of them into a
/// non-zero process exit status.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid or inconsistent setup, detected at initialization.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport-level failure in the message-passing layer.
    #[error(transparent)]
    Communication(#[from] CommError),

    /// Non-finite value or unhandled rank deficiency in the solver.
    #[error(transparent)]
    Numerics(#[from] NumericsError),

    /// Failure reading or writing checkpoint state.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}
