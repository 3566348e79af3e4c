//! Message-passing layer: topology, halo exchange, reductions, transposes.
//!
//! Ranks are threads within one process, connected by dedicated channel
//! pairs. The distributed-memory contract (each rank owns its locals, all
//! sharing goes through explicit messages, collectives are called in
//! lock-step) is identical to an MPI deployment, but engines remain
//! constructible and testable in-process, several at a time.

mod communicator;
mod network;
mod topology;
mod transpose;

pub use communicator::{CommError, Communicator, Message, ReduceOp};
pub use network::Network;
pub use topology::CartTopology;
pub use transpose::{Orientation, PeerIndices, TransposePlan};
