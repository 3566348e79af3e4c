//! Construction of the rank-to-rank channel mesh and the SPMD harness.
//!
//! A [`Network`] wires every pair of ranks with a dedicated unbounded
//! channel and hands each rank its [`Communicator`]. [`Network::run`]
//! executes the same closure on one thread per rank, the in-process
//! equivalent of launching an SPMD job; the integration tests and any
//! multi-rank launcher go through it.

use std::thread;

use crossbeam_channel::unbounded;

use super::communicator::{Communicator, Message};
use super::topology::CartTopology;

/// Factory for the per-rank communicators of one process grid.
pub struct Network;

impl Network {
    /// Build communicators for every rank of an `npx` x `npy` grid.
    ///
    /// Element `r` of the result belongs to rank `r`; each pair of ranks
    /// shares a dedicated channel in each direction, so messages between
    /// different pairs can never interleave.
    pub fn connect(npx: usize, npy: usize) -> Vec<Communicator> {
        let nprocs = npx * npy;

        // senders[s][r] transmits s -> r; receivers[r][s] is the matching end.
        let mut senders: Vec<Vec<Option<crossbeam_channel::Sender<Message>>>> =
            (0..nprocs).map(|_| (0..nprocs).map(|_| None).collect()).collect();
        let mut receivers: Vec<Vec<Option<crossbeam_channel::Receiver<Message>>>> =
            (0..nprocs).map(|_| (0..nprocs).map(|_| None).collect()).collect();

        for s in 0..nprocs {
            for r in 0..nprocs {
                let (tx, rx) = unbounded();
                senders[s][r] = Some(tx);
                receivers[r][s] = Some(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (tx_row, rx_row))| {
                let tx = tx_row.into_iter().map(Option::unwrap).collect();
                let rx = rx_row.into_iter().map(Option::unwrap).collect();
                Communicator::new(CartTopology::new(npx, npy, rank), tx, rx)
            })
            .collect()
    }

    /// The trivial single-rank communicator.
    pub fn single() -> Communicator {
        Self::connect(1, 1).pop().expect("one rank")
    }

    /// Run `f` as an SPMD job: one thread per rank, every thread executing
    /// the identical closure. Results are returned in rank order.
    ///
    /// Panics in any rank propagate once all threads have been joined.
    pub fn run<T, F>(npx: usize, npy: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Communicator) -> T + Sync,
    {
        let comms = Self::connect(npx, npy);
        let f = &f;
        thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| scope.spawn(move || f(comm)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("rank thread panicked"))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::ReduceOp;

    #[test]
    fn test_single_rank_reduce_is_identity() {
        let comm = Network::single();
        assert_eq!(comm.all_reduce(3.5, ReduceOp::Sum).unwrap(), 3.5);
    }

    #[test]
    fn test_reduce_sum_over_four_ranks() {
        let results = Network::run(2, 2, |comm| {
            let contribution = (comm.rank() + 1) as f64;
            comm.all_reduce(contribution, ReduceOp::Sum).unwrap()
        });
        for r in results {
            assert_eq!(r, 10.0);
        }
    }

    #[test]
    fn test_reduce_max_and_min() {
        let maxima = Network::run(4, 1, |comm| {
            comm.all_reduce(comm.rank() as f64, ReduceOp::Max).unwrap()
        });
        assert!(maxima.iter().all(|&m| m == 3.0));

        let minima = Network::run(4, 1, |comm| {
            comm.all_reduce(comm.rank() as f64 + 1.0, ReduceOp::Min).unwrap()
        });
        assert!(minima.iter().all(|&m| m == 1.0));
    }

    #[test]
    fn test_reduce_is_bit_identical_across_ranks() {
        // Values chosen so that a different combine order would round
        // differently in the last bit.
        let results = Network::run(2, 2, |comm| {
            let contribution = match comm.rank() {
                0 => 1.0e16,
                1 => 1.0,
                2 => -1.0e16,
                _ => 1.0,
            };
            comm.all_reduce(contribution, ReduceOp::Sum)
                .unwrap()
                .to_bits()
        });
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }
}
