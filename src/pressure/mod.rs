//! Elliptic pressure solver enforcing the divergence-free constraint.
//!
//! The discrete Poisson problem decouples under a Fourier transform of the
//! periodic horizontal axes into one tridiagonal system per wavenumber
//! pair, solved directly along the vertical. Two precomputed transpose
//! plans move the data between the base z-pencil layout (x, y split, z
//! whole) and the slab layout (z split, x, y whole) in which the
//! transforms are local; the plans are built once and reused every call.
//!
//! Solve pipeline:
//! 1. assemble the right-hand side div(u*)/dt in z-pencils
//! 2. forward transpose to slabs, Fourier transform in x then y
//! 3. backward transpose to z-pencils in wavenumber space
//! 4. Thomas solve per (kx, ky) column, zero mode pinned
//! 5. forward transpose, inverse transforms, backward transpose
//!
//! Any non-finite intermediate aborts the step; nothing is corrected or
//! retried.

mod spectral;
mod tridiagonal;

pub use spectral::{modified_wavenumbers, Fft};

use num_complex::Complex64;
use thiserror::Error;

use crate::comm::{Communicator, Orientation, TransposePlan};
use crate::error::EngineError;
use crate::fields::FieldStore;
use crate::grid::Grid;

/// Numerical failure inside the solver. Fatal per step: continuing past a
/// divergent solve would produce physically meaningless results.
///
/// An unexpected rank deficiency (outside the pinned zero mode) surfaces
/// as a non-finite pivot in the Thomas sweep and is caught by the same
/// check as overflow from an unstable time step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumericsError {
    /// A non-finite value appeared at the named pipeline stage.
    #[error("non-finite value detected during {stage}")]
    NonFinite { stage: &'static str },
}

fn check_finite(data: &[f64], stage: &'static str) -> Result<(), NumericsError> {
    if data.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(NumericsError::NonFinite { stage })
    }
}

/// Direct spectral-tridiagonal Poisson solver.
///
/// Owns the transpose plans, transform tables, vertical coefficient
/// arrays, and all work buffers; nothing is allocated per call.
pub struct PressureSolver {
    fwd: TransposePlan,
    bwd: TransposePlan,
    fft_x: Fft,
    fft_y: Fft,
    /// Modified-wavenumber eigenvalues per global x / y mode.
    bmati: Vec<f64>,
    bmatj: Vec<f64>,
    /// Vertical operator sub/superdiagonals over the interior levels.
    a: Vec<f64>,
    c: Vec<f64>,
    /// `c` with the first entry zeroed, for the pinned zero-mode system.
    c_pinned: Vec<f64>,
    /// dz over the interior levels, for the zero-mode mean removal.
    dz: Vec<f64>,
    zsize: f64,

    rhs: Vec<f64>,
    slab_re: Vec<f64>,
    slab_cplx: Vec<f64>,
    cols_cplx: Vec<f64>,
    p_packed: Vec<f64>,
    b_scratch: Vec<f64>,
    col_scratch: Vec<Complex64>,
    sweep_scratch: Vec<f64>,
}

impl PressureSolver {
    /// Build the solver for one rank's grid.
    pub fn new(grid: &Grid) -> Self {
        let fwd = grid.build_transpose(Orientation::ZPencil, Orientation::Slab);
        let bwd = grid.build_transpose(Orientation::Slab, Orientation::ZPencil);

        let ktot = grid.ktot;
        let mut a = vec![0.0; ktot];
        let mut c = vec![0.0; ktot];
        for m in 0..ktot {
            let k = grid.kstart + m;
            a[m] = grid.dzi[k] * grid.dzhi[k];
            c[m] = grid.dzi[k] * grid.dzhi[k + 1];
        }
        let mut c_pinned = c.clone();
        c_pinned[0] = 0.0;

        let dz = (0..ktot).map(|m| grid.dz[grid.kstart + m]).collect();

        let interior = grid.interior_len();
        let slab = grid.itot * grid.jtot * grid.kslab();

        Self {
            fwd,
            bwd,
            fft_x: Fft::new(grid.itot),
            fft_y: Fft::new(grid.jtot),
            bmati: modified_wavenumbers(grid.itot, grid.dx),
            bmatj: modified_wavenumbers(grid.jtot, grid.dy),
            a,
            c,
            c_pinned,
            dz,
            zsize: grid.zsize,
            rhs: vec![0.0; interior],
            slab_re: vec![0.0; slab],
            slab_cplx: vec![0.0; 2 * slab],
            cols_cplx: vec![0.0; 2 * interior],
            p_packed: vec![0.0; interior],
            b_scratch: vec![0.0; ktot],
            col_scratch: vec![Complex64::new(0.0, 0.0); ktot],
            sweep_scratch: Vec::new(),
        }
    }

    /// Solve for the pressure correction of the current velocity field and
    /// leave it, with refreshed ghost cells, in `store.p`.
    ///
    /// `dt` is the substage step: the right-hand side is div(u*)/dt so the
    /// subsequent projection with the same dt cancels the divergence
    /// exactly.
    pub fn solve(
        &mut self,
        store: &mut FieldStore,
        grid: &Grid,
        comm: &Communicator,
        dt: f64,
    ) -> Result<(), EngineError> {
        // Right-hand side in the base layout.
        store.compute_divergence(grid, &mut self.rhs);
        let dti = 1.0 / dt;
        for v in self.rhs.iter_mut() {
            *v *= dti;
        }
        check_finite(&self.rhs, "divergence assembly")?;

        // To slabs, forward transforms.
        comm.transpose(&self.rhs, &mut self.slab_re, &self.fwd, 1)?;
        for (idx, &v) in self.slab_re.iter().enumerate() {
            self.slab_cplx[2 * idx] = v;
            self.slab_cplx[2 * idx + 1] = 0.0;
        }
        self.transform_planes(grid, false);
        check_finite(&self.slab_cplx, "forward transform")?;

        // To wavenumber z-pencils, vertical solves.
        comm.transpose(&self.slab_cplx, &mut self.cols_cplx, &self.bwd, 2)?;
        self.solve_columns(grid);
        check_finite(&self.cols_cplx, "vertical solve")?;

        // Back to slabs, inverse transforms, back to the base layout.
        comm.transpose(&self.cols_cplx, &mut self.slab_cplx, &self.fwd, 2)?;
        self.transform_planes(grid, true);
        for (idx, v) in self.slab_re.iter_mut().enumerate() {
            *v = self.slab_cplx[2 * idx];
        }
        check_finite(&self.slab_re, "inverse transform")?;
        comm.transpose(&self.slab_re, &mut self.p_packed, &self.bwd, 1)?;

        store.p.unpack_interior(grid, &self.p_packed);
        store.p.apply_vertical_bc(grid);
        comm.exchange_halo(&mut store.p.data, grid)?;
        Ok(())
    }

    /// Fourier-transform every locally owned horizontal plane in place.
    fn transform_planes(&mut self, grid: &Grid, inverse: bool) {
        let nxy = grid.itot * grid.jtot;
        let fft_x = &self.fft_x;
        let fft_y = &self.fft_y;

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.slab_cplx
                .par_chunks_mut(2 * nxy)
                .for_each(|plane| transform_plane(plane, fft_x, fft_y, inverse));
        }
        #[cfg(not(feature = "parallel"))]
        for plane in self.slab_cplx.chunks_mut(2 * nxy) {
            transform_plane(plane, fft_x, fft_y, inverse);
        }
    }

    /// Thomas-solve every locally owned wavenumber column.
    fn solve_columns(&mut self, grid: &Grid) {
        let ktot = grid.ktot;
        let (imax, jmax) = (grid.imax, grid.jmax);

        for jl in 0..jmax {
            let ky = grid.yofs + jl;
            for il in 0..imax {
                let kx = grid.xofs + il;
                let lambda = self.bmati[kx] + self.bmatj[ky];
                let zero_mode = kx == 0 && ky == 0;

                // Gather the column (stride imax*jmax between levels).
                for m in 0..ktot {
                    let idx = 2 * (il + imax * (jl + jmax * m));
                    self.col_scratch[m] =
                        Complex64::new(self.cols_cplx[idx], self.cols_cplx[idx + 1]);
                }

                // Assemble the diagonal: interior rows carry the full
                // vertical operator plus lambda; the wall rows drop the
                // coefficient reaching across the wall, which is the
                // discrete Neumann condition the projection implies.
                for m in 0..ktot {
                    self.b_scratch[m] = -(self.a[m] + self.c[m]) + lambda;
                }
                self.b_scratch[0] = -self.c[0] + lambda;
                self.b_scratch[ktot - 1] = -self.a[ktot - 1] + lambda;

                let c = if zero_mode {
                    // Singular Neumann system: pin the first level to zero
                    // instead of solving the rank-deficient system.
                    self.b_scratch[0] = 1.0;
                    self.col_scratch[0] = Complex64::new(0.0, 0.0);
                    &self.c_pinned
                } else {
                    &self.c
                };

                tridiagonal::solve(
                    &self.a,
                    &self.b_scratch,
                    c,
                    &mut self.col_scratch,
                    &mut self.sweep_scratch,
                );

                if zero_mode {
                    // Remove the thickness-weighted mean so the domain mean
                    // of the correction is exactly zero.
                    let mut mean = Complex64::new(0.0, 0.0);
                    for m in 0..ktot {
                        mean += self.col_scratch[m] * self.dz[m];
                    }
                    mean /= self.zsize;
                    for v in self.col_scratch.iter_mut() {
                        *v -= mean;
                    }
                }

                // Scatter back.
                for m in 0..ktot {
                    let idx = 2 * (il + imax * (jl + jmax * m));
                    self.cols_cplx[idx] = self.col_scratch[m].re;
                    self.cols_cplx[idx + 1] = self.col_scratch[m].im;
                }
            }
        }
    }
}

/// Transform one interleaved-complex plane: rows along x, then columns
/// along y (separable, order irrelevant).
fn transform_plane(plane: &mut [f64], fft_x: &Fft, fft_y: &Fft, inverse: bool) {
    let itot = fft_x.len();
    let jtot = fft_y.len();
    debug_assert_eq!(plane.len(), 2 * itot * jtot);
    let mut scratch = vec![Complex64::new(0.0, 0.0); itot.max(jtot)];

    for j in 0..jtot {
        for i in 0..itot {
            let idx = 2 * (i + itot * j);
            scratch[i] = Complex64::new(plane[idx], plane[idx + 1]);
        }
        if inverse {
            fft_x.inverse(&mut scratch[..itot]);
        } else {
            fft_x.forward(&mut scratch[..itot]);
        }
        for i in 0..itot {
            let idx = 2 * (i + itot * j);
            plane[idx] = scratch[i].re;
            plane[idx + 1] = scratch[i].im;
        }
    }

    for i in 0..itot {
        for j in 0..jtot {
            let idx = 2 * (i + itot * j);
            scratch[j] = Complex64::new(plane[idx], plane[idx + 1]);
        }
        if inverse {
            fft_y.inverse(&mut scratch[..jtot]);
        } else {
            fft_y.forward(&mut scratch[..jtot]);
        }
        for j in 0..jtot {
            let idx = 2 * (i + itot * j);
            plane[idx] = scratch[j].re;
            plane[idx + 1] = scratch[j].im;
        }
    }
}
