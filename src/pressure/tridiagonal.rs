//! Thomas algorithm for the vertical Poisson systems.
//!
//! One tridiagonal system exists per horizontal wavenumber pair; the
//! coefficients are real (vertical metric plus the modified-wavenumber
//! eigenvalue) while the right-hand side is complex. No pivoting: every
//! non-singular system here is strictly diagonally dominant, and the one
//! singular system (the zero mode) is pinned by the caller before it
//! reaches this routine.

use num_complex::Complex64;

/// Solve `a[k] x[k-1] + b[k] x[k] + c[k] x[k+1] = rhs[k]` in place.
///
/// `a[0]` and `c[n-1]` are never read. `scratch` is resized as needed and
/// reused across calls.
pub fn solve(a: &[f64], b: &[f64], c: &[f64], rhs: &mut [Complex64], scratch: &mut Vec<f64>) {
    let n = rhs.len();
    debug_assert_eq!(a.len(), n);
    debug_assert_eq!(b.len(), n);
    debug_assert_eq!(c.len(), n);
    if n == 0 {
        return;
    }

    scratch.clear();
    scratch.resize(n, 0.0);

    // Forward sweep.
    let mut beta = b[0];
    scratch[0] = c[0] / beta;
    rhs[0] /= beta;
    for k in 1..n {
        beta = b[k] - a[k] * scratch[k - 1];
        scratch[k] = c[k] / beta;
        rhs[k] = (rhs[k] - rhs[k - 1] * a[k]) / beta;
    }

    // Back substitution.
    for k in (0..n - 1).rev() {
        let upper = rhs[k + 1];
        rhs[k] -= upper * scratch[k];
    }
}
