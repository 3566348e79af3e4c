//! Rank-local endpoint of the message-passing layer.
//!
//! One [`Communicator`] exists per rank, holding dedicated channel pairs to
//! every peer. The three collective operations (halo exchange, reduction,
//! transpose) are the only suspension points in the engine; all ranks must
//! call them the same number of times in the same order. That discipline is
//! the caller's invariant: a diverging call sequence stalls on a channel
//! receive and cannot be detected here.

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use super::topology::CartTopology;
use super::transpose::TransposePlan;
use crate::grid::Grid;

/// Transport-level failure. Always fatal: the distributed state cannot be
/// safely resumed once a collective has partially completed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommError {
    /// A peer's channel endpoint is gone (its thread exited).
    #[error("send to rank {peer} failed: channel disconnected")]
    SendFailed { peer: usize },

    /// Receiving from a peer failed.
    #[error("receive from rank {peer} failed: channel disconnected")]
    RecvFailed { peer: usize },

    /// A message of the wrong kind arrived, meaning the ranks' collective
    /// call sequences have diverged.
    #[error("protocol mismatch receiving from rank {peer}: expected {expected}")]
    ProtocolMismatch { peer: usize, expected: &'static str },
}

/// Reduction operator for [`Communicator::all_reduce`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    #[inline]
    fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Max => a.max(b),
            ReduceOp::Min => a.min(b),
        }
    }
}

/// Message payload between ranks.
#[derive(Debug)]
pub enum Message {
    Scalar(f64),
    Block(Vec<f64>),
}

/// Per-rank communicator over dedicated channel pairs.
///
/// Channels are unbounded, so sends never block; the fixed send-then-receive
/// ordering inside each collective is therefore deadlock-free as long as all
/// ranks execute the same collective sequence.
pub struct Communicator {
    pub topo: CartTopology,
    /// `tx[p]` sends to rank p.
    tx: Vec<Sender<Message>>,
    /// `rx[p]` receives from rank p.
    rx: Vec<Receiver<Message>>,
}

impl Communicator {
    pub(super) fn new(
        topo: CartTopology,
        tx: Vec<Sender<Message>>,
        rx: Vec<Receiver<Message>>,
    ) -> Self {
        Self { topo, tx, rx }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.topo.rank
    }

    #[inline]
    pub fn nprocs(&self) -> usize {
        self.topo.npx * self.topo.npy
    }

    fn send_block(&self, peer: usize, buf: Vec<f64>) -> Result<(), CommError> {
        self.tx[peer]
            .send(Message::Block(buf))
            .map_err(|_| CommError::SendFailed { peer })
    }

    fn recv_block(&self, peer: usize) -> Result<Vec<f64>, CommError> {
        match self.rx[peer].recv() {
            Ok(Message::Block(buf)) => Ok(buf),
            Ok(_) => Err(CommError::ProtocolMismatch {
                peer,
                expected: "block",
            }),
            Err(_) => Err(CommError::RecvFailed { peer }),
        }
    }

    fn send_scalar(&self, peer: usize, value: f64) -> Result<(), CommError> {
        self.tx[peer]
            .send(Message::Scalar(value))
            .map_err(|_| CommError::SendFailed { peer })
    }

    fn recv_scalar(&self, peer: usize) -> Result<f64, CommError> {
        match self.rx[peer].recv() {
            Ok(Message::Scalar(v)) => Ok(v),
            Ok(_) => Err(CommError::ProtocolMismatch {
                peer,
                expected: "scalar",
            }),
            Err(_) => Err(CommError::RecvFailed { peer }),
        }
    }

    /// Collective reduction over all ranks.
    ///
    /// Rank 0 folds contributions in ascending rank order and broadcasts
    /// the result, so every rank observes bit-identical output regardless
    /// of scheduling.
    pub fn all_reduce(&self, value: f64, op: ReduceOp) -> Result<f64, CommError> {
        let nprocs = self.nprocs();
        if nprocs == 1 {
            return Ok(value);
        }
        if self.rank() == 0 {
            let mut acc = value;
            for peer in 1..nprocs {
                acc = op.combine(acc, self.recv_scalar(peer)?);
            }
            for peer in 1..nprocs {
                self.send_scalar(peer, acc)?;
            }
            Ok(acc)
        } else {
            self.send_scalar(0, value)?;
            self.recv_scalar(0)
        }
    }

    /// Fill the horizontal ghost layers of a ghosted field array.
    ///
    /// Two phases: x strips over the interior j range, then y strips over
    /// the full i range so that corner ghosts pick up diagonal-neighbor
    /// data. Vertical levels travel in full, including the vertical ghost
    /// layers, which must already hold their boundary values. Periodic
    /// wrap falls out of the periodic topology; a rank that is its own
    /// neighbor copies locally.
    pub fn exchange_halo(&self, data: &mut [f64], grid: &Grid) -> Result<(), CommError> {
        debug_assert_eq!(data.len(), grid.icells * grid.jcells * grid.kcells);
        self.exchange_x(data, grid)?;
        self.exchange_y(data, grid)
    }

    fn exchange_x(&self, data: &mut [f64], grid: &Grid) -> Result<(), CommError> {
        let gc = grid.istart;
        let east = self.topo.east();
        let west = self.topo.west();

        // Pack the outermost interior columns for each direction.
        let pack = |data: &[f64], i0: usize| -> Vec<f64> {
            let mut buf = Vec::with_capacity(gc * grid.jmax * grid.kcells);
            for k in 0..grid.kcells {
                for j in grid.jstart..grid.jend {
                    for m in 0..gc {
                        buf.push(data[grid.ijk(i0 + m, j, k)]);
                    }
                }
            }
            buf
        };
        let unpack = |data: &mut [f64], buf: &[f64], i0: usize| {
            let mut n = 0;
            for k in 0..grid.kcells {
                for j in grid.jstart..grid.jend {
                    for m in 0..gc {
                        data[grid.ijk(i0 + m, j, k)] = buf[n];
                        n += 1;
                    }
                }
            }
        };

        let to_east = pack(data, grid.iend - gc);
        let to_west = pack(data, grid.istart);

        if east == self.rank() {
            // Periodic wrap within this rank.
            unpack(data, &to_east, 0);
            unpack(data, &to_west, grid.iend);
        } else {
            self.send_block(east, to_east)?;
            self.send_block(west, to_west)?;
            let from_west = self.recv_block(west)?;
            unpack(data, &from_west, 0);
            let from_east = self.recv_block(east)?;
            unpack(data, &from_east, grid.iend);
        }
        Ok(())
    }

    fn exchange_y(&self, data: &mut [f64], grid: &Grid) -> Result<(), CommError> {
        let gc = grid.jstart;
        let north = self.topo.north();
        let south = self.topo.south();

        // Full i range: x ghosts were just filled, so corners inherit
        // diagonal-neighbor values through this phase.
        let pack = |data: &[f64], j0: usize| -> Vec<f64> {
            let mut buf = Vec::with_capacity(gc * grid.icells * grid.kcells);
            for k in 0..grid.kcells {
                for m in 0..gc {
                    for i in 0..grid.icells {
                        buf.push(data[grid.ijk(i, j0 + m, k)]);
                    }
                }
            }
            buf
        };
        let unpack = |data: &mut [f64], buf: &[f64], j0: usize| {
            let mut n = 0;
            for k in 0..grid.kcells {
                for m in 0..gc {
                    for i in 0..grid.icells {
                        data[grid.ijk(i, j0 + m, k)] = buf[n];
                        n += 1;
                    }
                }
            }
        };

        let to_north = pack(data, grid.jend - gc);
        let to_south = pack(data, grid.jstart);

        if north == self.rank() {
            unpack(data, &to_north, 0);
            unpack(data, &to_south, grid.jend);
        } else {
            self.send_block(north, to_north)?;
            self.send_block(south, to_south)?;
            let from_south = self.recv_block(south)?;
            unpack(data, &from_south, 0);
            let from_north = self.recv_block(north)?;
            unpack(data, &from_north, grid.jend);
        }
        Ok(())
    }

    /// Execute a precomputed transpose plan.
    ///
    /// `ncomp` is the number of interleaved components per grid point:
    /// 1 for real fields, 2 for complex spectral data. Every element moves
    /// exactly once; this is the dominant communication cost of a pressure
    /// solve.
    pub fn transpose(
        &self,
        src: &[f64],
        dst: &mut [f64],
        plan: &TransposePlan,
        ncomp: usize,
    ) -> Result<(), CommError> {
        debug_assert_eq!(src.len(), plan.src_len * ncomp);
        debug_assert_eq!(dst.len(), plan.dst_len * ncomp);

        let me = self.rank();

        // Self block: straight reindex, no channel round trip.
        let self_send = &plan.send[me];
        let self_recv = &plan.recv[me];
        for (s, d) in self_send.idx.iter().zip(&self_recv.idx) {
            for c in 0..ncomp {
                dst[d * ncomp + c] = src[s * ncomp + c];
            }
        }

        for peer in &plan.send {
            if peer.rank == me {
                continue;
            }
            let mut buf = Vec::with_capacity(peer.idx.len() * ncomp);
            for &s in &peer.idx {
                for c in 0..ncomp {
                    buf.push(src[s * ncomp + c]);
                }
            }
            self.send_block(peer.rank, buf)?;
        }

        for peer in &plan.recv {
            if peer.rank == me {
                continue;
            }
            let buf = self.recv_block(peer.rank)?;
            if buf.len() != peer.idx.len() * ncomp {
                return Err(CommError::ProtocolMismatch {
                    peer: peer.rank,
                    expected: "transpose block",
                });
            }
            for (n, &d) in peer.idx.iter().enumerate() {
                for c in 0..ncomp {
                    dst[d * ncomp + c] = buf[n * ncomp + c];
                }
            }
        }
        Ok(())
    }
}
