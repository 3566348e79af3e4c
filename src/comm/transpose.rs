//! Precomputed transpose plans between pencil orientations.
//!
//! A plan describes how one rank's share of a field moves when the global
//! array is redistributed from one decomposition to another. Plans are
//! built once at initialization (by the grid, which knows both layouts)
//! and executed by the communicator on every pressure solve; nothing about
//! the data movement is decided per call.
//!
//! The index lists are constructed in one canonical order (ascending
//! global (k, j, i) within each peer block) on both the packing and the
//! unpacking side, so a sender's m-th packed element is exactly the
//! receiver's m-th unpacked slot. Together with full coverage of both
//! layouts this makes every plan a bijection: each grid point appears
//! exactly once in the source lists and exactly once in the destination
//! lists.

/// The two decomposition layouts the pressure solve moves between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// Base layout: x and y split over the process grid, z whole per rank.
    ZPencil,
    /// Spectral layout: z split across all ranks, x and y whole per rank.
    Slab,
}

/// Index list for traffic with one peer rank.
#[derive(Clone, Debug)]
pub struct PeerIndices {
    /// Linear rank of the peer.
    pub rank: usize,
    /// Local array indices, in the canonical exchange order.
    pub idx: Vec<usize>,
}

/// A reusable communication plan redistributing local data between two
/// pencil orientations.
///
/// Immutable after construction; freely shared by reference.
#[derive(Clone, Debug)]
pub struct TransposePlan {
    pub from: Orientation,
    pub to: Orientation,
    /// Element count of the source-local array (per component).
    pub src_len: usize,
    /// Element count of the destination-local array (per component).
    pub dst_len: usize,
    /// Per-peer pack lists (ascending rank order, self included).
    pub send: Vec<PeerIndices>,
    /// Per-peer unpack lists (ascending rank order, self included).
    pub recv: Vec<PeerIndices>,
}

impl TransposePlan {
    /// The reverse plan: running it undoes this plan exactly.
    ///
    /// Swapping the pack and unpack lists of a bijective plan yields the
    /// inverse bijection, so a forward/backward pair is always consistent
    /// by construction.
    pub fn inverted(&self) -> Self {
        Self {
            from: self.to,
            to: self.from,
            src_len: self.dst_len,
            dst_len: self.src_len,
            send: self.recv.clone(),
            recv: self.send.clone(),
        }
    }

    /// Verify that this rank's lists touch every source element exactly
    /// once and every destination element exactly once.
    ///
    /// Used by tests; the construction already guarantees it.
    pub fn is_bijection(&self) -> bool {
        let mut src_seen = vec![false; self.src_len];
        for peer in &self.send {
            for &i in &peer.idx {
                if i >= self.src_len || src_seen[i] {
                    return false;
                }
                src_seen[i] = true;
            }
        }
        let mut dst_seen = vec![false; self.dst_len];
        for peer in &self.recv {
            for &i in &peer.idx {
                if i >= self.dst_len || dst_seen[i] {
                    return false;
                }
                dst_seen[i] = true;
            }
        }
        src_seen.iter().all(|&s| s) && dst_seen.iter().all(|&s| s)
    }
}
