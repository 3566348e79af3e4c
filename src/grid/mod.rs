//! Grid geometry and domain decomposition.
//!
//! The grid owns no physical data: it defines global and local index
//! ranges, the horizontal process-grid topology, the staggered vertical
//! metric, and the transpose plans the pressure solver reuses every call.
//! Everything here is immutable after construction and identical in every
//! rank's understanding of neighbor identity: decomposition is a pure
//! function of the configuration and the rank index.
//!
//! # Index conventions
//!
//! Fields are flat arrays with x fastest, then y, then z:
//! `ijk = i + j * icells + k * ijcells`. Interior cells run over
//! `istart..iend` etc.; one ghost layer surrounds the interior on every
//! axis. Horizontal ghosts are filled by halo exchange, vertical ghosts by
//! boundary-condition application.

pub mod vertical;

pub use vertical::{TanhStretching, UniformStretching, VerticalStretching};

use crate::comm::{Orientation, PeerIndices, TransposePlan};
use crate::config::{Config, ConfigError};

/// Ghost-layer width on every axis.
///
/// The second-order stencils used throughout read one cell beyond the
/// interior, so the width is a fixed crate constant rather than a
/// configuration knob.
pub const GHOST_CELLS: usize = 1;

/// Immutable grid geometry for one rank.
#[derive(Clone, Debug)]
pub struct Grid {
    // Global extents.
    pub itot: usize,
    pub jtot: usize,
    pub ktot: usize,
    pub xsize: f64,
    pub ysize: f64,
    pub zsize: f64,

    // Process grid.
    pub npx: usize,
    pub npy: usize,
    pub rank: usize,
    /// This rank's coordinates (rx, ry) in the process grid.
    pub coords: (usize, usize),

    // Local interior extents and global offsets.
    pub imax: usize,
    pub jmax: usize,
    pub kmax: usize,
    pub xofs: usize,
    pub yofs: usize,

    // Padded extents and interior bounds.
    pub icells: usize,
    pub jcells: usize,
    pub kcells: usize,
    pub ijcells: usize,
    pub istart: usize,
    pub jstart: usize,
    pub kstart: usize,
    pub iend: usize,
    pub jend: usize,
    pub kend: usize,

    // Uniform horizontal metric.
    pub dx: f64,
    pub dy: f64,
    pub dxi: f64,
    pub dyi: f64,

    // Vertical metric, ghost-extended to length `kcells`.
    /// Cell-center heights.
    pub z: Vec<f64>,
    /// Cell-edge heights; `zh[kstart]` is the bottom wall, `zh[kend]` the top.
    pub zh: Vec<f64>,
    /// Cell thickness `zh[k+1] - zh[k]`.
    pub dz: Vec<f64>,
    /// Center-to-center spacing `z[k] - z[k-1]`, located at edge `zh[k]`.
    pub dzh: Vec<f64>,
    /// Inverse of `dz`.
    pub dzi: Vec<f64>,
    /// Inverse of `dzh`.
    pub dzhi: Vec<f64>,
}

impl Grid {
    /// Build the grid for `rank` from a validated configuration.
    ///
    /// # Errors
    ///
    /// Divisibility violations surface as [`ConfigError`] (normally already
    /// caught by [`Config::validate`]); a degenerate vertical stretching is
    /// rejected here because the edges are first realized here.
    pub fn from_config(config: &Config, rank: usize) -> Result<Self, ConfigError> {
        config.validate()?;

        let g = &config.grid;
        let (itot, jtot, ktot) = (g.itot, g.jtot, g.ktot);
        let (npx, npy) = (g.npx, g.npy);

        let imax = itot / npx;
        let jmax = jtot / npy;
        let kmax = ktot;

        // Row-major rank layout: x varies fastest.
        let coords = (rank % npx, rank / npx);
        let xofs = coords.0 * imax;
        let yofs = coords.1 * jmax;

        let gc = GHOST_CELLS;
        let icells = imax + 2 * gc;
        let jcells = jmax + 2 * gc;
        let kcells = kmax + 2 * gc;

        let dx = g.xsize / itot as f64;
        let dy = g.ysize / jtot as f64;

        let edges = vertical::build_edges(g.vertical, ktot, g.zsize)?;

        // Ghost-extended vertical arrays. The interior edge m lives at
        // zh[kstart + m]; centers mirror through the walls so that first
        // derivatives across the walls are well defined.
        let kstart = gc;
        let kend = kmax + gc;

        let mut zh = vec![0.0; kcells];
        for (m, &e) in edges.iter().enumerate() {
            zh[kstart + m] = e;
        }
        zh[kstart - 1] = -edges[1];

        let mut z = vec![0.0; kcells];
        for k in kstart..kend {
            z[k] = 0.5 * (zh[k] + zh[k + 1]);
        }
        z[kstart - 1] = -z[kstart];
        z[kend] = 2.0 * g.zsize - z[kend - 1];

        let mut dz = vec![0.0; kcells];
        for k in kstart..kend {
            dz[k] = zh[k + 1] - zh[k];
        }
        dz[kstart - 1] = dz[kstart];
        dz[kend] = dz[kend - 1];

        let mut dzh = vec![0.0; kcells];
        for k in kstart..=kend {
            dzh[k] = z[k] - z[k - 1];
        }
        dzh[kstart - 1] = dzh[kstart];

        let dzi = dz.iter().map(|&d| if d > 0.0 { 1.0 / d } else { 0.0 }).collect();
        let dzhi = dzh
            .iter()
            .map(|&d| if d > 0.0 { 1.0 / d } else { 0.0 })
            .collect();

        Ok(Self {
            itot,
            jtot,
            ktot,
            xsize: g.xsize,
            ysize: g.ysize,
            zsize: g.zsize,
            npx,
            npy,
            rank,
            coords,
            imax,
            jmax,
            kmax,
            xofs,
            yofs,
            icells,
            jcells,
            kcells,
            ijcells: icells * jcells,
            istart: gc,
            jstart: gc,
            kstart,
            iend: imax + gc,
            jend: jmax + gc,
            kend,
            dx,
            dy,
            dxi: 1.0 / dx,
            dyi: 1.0 / dy,
            z,
            zh,
            dz,
            dzh,
            dzi,
            dzhi,
        })
    }

    /// Total rank count.
    #[inline]
    pub fn nprocs(&self) -> usize {
        self.npx * self.npy
    }

    /// Flat index into a ghosted field array.
    #[inline(always)]
    pub fn ijk(&self, i: usize, j: usize, k: usize) -> usize {
        i + j * self.icells + k * self.ijcells
    }

    /// Number of interior cells on this rank.
    #[inline]
    pub fn interior_len(&self) -> usize {
        self.imax * self.jmax * self.kmax
    }

    /// Vertical extent of one slab-layout plane block.
    #[inline]
    pub fn kslab(&self) -> usize {
        self.ktot / self.nprocs()
    }

    /// Build the transpose plan between two pencil orientations.
    ///
    /// Depends only on the decomposition shape and the global extents;
    /// every rank computes mutually consistent plans. Built once at
    /// initialization and reused for every solve.
    pub fn build_transpose(&self, from: Orientation, to: Orientation) -> TransposePlan {
        assert_ne!(from, to, "transpose between identical orientations");
        match (from, to) {
            (Orientation::ZPencil, Orientation::Slab) => self.build_zpencil_to_slab(),
            (Orientation::Slab, Orientation::ZPencil) => self.build_zpencil_to_slab().inverted(),
            _ => unreachable!(),
        }
    }

    /// Forward plan: interior (imax x jmax x ktot) to slab
    /// (itot x jtot x kslab).
    ///
    /// Both sides enumerate each peer block in ascending global (k, j, i)
    /// order, which makes pack and unpack positions correspond one-to-one.
    fn build_zpencil_to_slab(&self) -> TransposePlan {
        let nprocs = self.nprocs();
        let kslab = self.kslab();
        let (imax, jmax) = (self.imax, self.jmax);
        let (itot, jtot) = (self.itot, self.jtot);

        let mut send = Vec::with_capacity(nprocs);
        for peer in 0..nprocs {
            let mut idx = Vec::with_capacity(imax * jmax * kslab);
            for k in peer * kslab..(peer + 1) * kslab {
                for j in 0..jmax {
                    for i in 0..imax {
                        idx.push(i + imax * (j + jmax * k));
                    }
                }
            }
            send.push(PeerIndices { rank: peer, idx });
        }

        let my_k0 = self.rank * kslab;
        let mut recv = Vec::with_capacity(nprocs);
        for peer in 0..nprocs {
            let (px, py) = (peer % self.npx, peer / self.npx);
            let (pxofs, pyofs) = (px * imax, py * jmax);
            let mut idx = Vec::with_capacity(imax * jmax * kslab);
            for k in my_k0..my_k0 + kslab {
                let kl = k - my_k0;
                for j in 0..jmax {
                    let jg = pyofs + j;
                    for i in 0..imax {
                        let ig = pxofs + i;
                        idx.push(ig + itot * (jg + jtot * kl));
                    }
                }
            }
            recv.push(PeerIndices { rank: peer, idx });
        }

        TransposePlan {
            from: Orientation::ZPencil,
            to: Orientation::Slab,
            src_len: imax * jmax * self.ktot,
            dst_len: itot * jtot * kslab,
            send,
            recv,
        }
    }
}
