//! Spectral transforms for the periodic horizontal axes.
//!
//! A radix-2 complex FFT with precomputed twiddle tables, plus the
//! modified-wavenumber arrays that make the transformed horizontal
//! Laplacian exact for the second-order staggered stencil. The horizontal
//! extents are validated as powers of two at configuration time, so no
//! mixed-radix path exists.
//!
//! Convention: the forward transform is unnormalized; the inverse applies
//! the 1/n factor. The Poisson solve between them is linear, so the
//! round trip is exact to round-off.

use num_complex::Complex64;

/// One-axis FFT with cached twiddles.
#[derive(Clone, Debug)]
pub struct Fft {
    n: usize,
    /// exp(-2*pi*i*k/n) for k in 0..n/2.
    twiddles: Vec<Complex64>,
}

impl Fft {
    /// Plan a transform of length `n` (must be a power of two).
    pub fn new(n: usize) -> Self {
        assert!(n.is_power_of_two(), "FFT length {n} is not a power of two");
        let twiddles = (0..n / 2)
            .map(|k| {
                let angle = -2.0 * std::f64::consts::PI * k as f64 / n as f64;
                Complex64::new(angle.cos(), angle.sin())
            })
            .collect();
        Self { n, twiddles }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Unnormalized forward transform, in place.
    pub fn forward(&self, buf: &mut [Complex64]) {
        self.transform(buf, false);
    }

    /// Inverse transform, in place, scaled by 1/n.
    pub fn inverse(&self, buf: &mut [Complex64]) {
        self.transform(buf, true);
        let scale = 1.0 / self.n as f64;
        for v in buf.iter_mut() {
            *v *= scale;
        }
    }

    fn transform(&self, buf: &mut [Complex64], inverse: bool) {
        let n = self.n;
        debug_assert_eq!(buf.len(), n);
        if n < 2 {
            return;
        }

        // Bit-reversal permutation.
        let bits = n.trailing_zeros();
        for i in 0..n {
            let j = i.reverse_bits() >> (usize::BITS - bits);
            if i < j {
                buf.swap(i, j);
            }
        }

        // Iterative Cooley-Tukey butterflies.
        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let step = n / len;
            for base in (0..n).step_by(len) {
                for k in 0..half {
                    let mut tw = self.twiddles[k * step];
                    if inverse {
                        tw = tw.conj();
                    }
                    let a = buf[base + k];
                    let b = buf[base + k + half] * tw;
                    buf[base + k] = a + b;
                    buf[base + k + half] = a - b;
                }
            }
            len *= 2;
        }
    }
}

/// Modified wavenumbers for the second-order staggered Laplacian.
///
/// Mode m on an axis of n cells with spacing dx contributes the eigenvalue
/// `(2 cos(2 pi m / n) - 2) / dx^2`, exactly what the central-difference
/// stencil produces under the discrete Fourier transform. This is what
/// makes the projected velocity divergence-free to round-off rather than
/// to truncation error.
pub fn modified_wavenumbers(n: usize, dx: f64) -> Vec<f64> {
    let dxidxi = 1.0 / (dx * dx);
    (0..n)
        .map(|m| {
            let theta = 2.0 * std::f64::consts::PI * m as f64 / n as f64;
            (2.0 * theta.cos() - 2.0) * dxidxi
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Complex64, b: Complex64, tol: f64) {
        assert!(
            (a - b).norm() < tol,
            "expected {b}, got {a} (diff {})",
            (a - b).norm()
        );
    }

    #[test]
    fn test_forward_of_constant_is_delta() {
        let fft = Fft::new(8);
        let mut buf = vec![Complex64::new(1.0, 0.0); 8];
        fft.forward(&mut buf);
        assert_close(buf[0], Complex64::new(8.0, 0.0), 1e-12);
        for &v in &buf[1..] {
            assert!(v.norm() < 1e-12);
        }
    }

    #[test]
    fn test_forward_of_single_mode() {
        // cos(2 pi x / n) splits into modes 1 and n-1 with weight n/2.
        let n = 16;
        let fft = Fft::new(n);
        let mut buf: Vec<Complex64> = (0..n)
            .map(|i| {
                let x = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                Complex64::new(x.cos(), 0.0)
            })
            .collect();
        fft.forward(&mut buf);
        assert_close(buf[1], Complex64::new(n as f64 / 2.0, 0.0), 1e-10);
        assert_close(buf[n - 1], Complex64::new(n as f64 / 2.0, 0.0), 1e-10);
        for (m, &v) in buf.iter().enumerate() {
            if m != 1 && m != n - 1 {
                assert!(v.norm() < 1e-10, "mode {m} = {v}");
            }
        }
    }

    #[test]
    fn test_round_trip_is_identity() {
        let n = 32;
        let fft = Fft::new(n);
        let original: Vec<Complex64> = (0..n)
            .map(|i| Complex64::new((i as f64).sin(), (i as f64 * 0.7).cos()))
            .collect();
        let mut buf = original.clone();
        fft.forward(&mut buf);
        fft.inverse(&mut buf);
        for (a, b) in buf.iter().zip(&original) {
            assert_close(*a, *b, 1e-12);
        }
    }

    #[test]
    fn test_length_one_is_identity() {
        let fft = Fft::new(1);
        let mut buf = vec![Complex64::new(4.0, -1.0)];
        fft.forward(&mut buf);
        fft.inverse(&mut buf);
        assert_close(buf[0], Complex64::new(4.0, -1.0), 1e-14);
    }

    #[test]
    fn test_modified_wavenumbers_match_stencil() {
        // Applying the central second difference to exp(i theta m) must
        // reproduce the modified wavenumber exactly.
        let n = 16;
        let dx = 0.25;
        let bmat = modified_wavenumbers(n, dx);
        assert!((bmat[0] - 0.0).abs() < 1e-14);

        for m in [1usize, 3, 7] {
            let theta = 2.0 * std::f64::consts::PI * m as f64 / n as f64;
            // (f(x+dx) - 2 f(x) + f(x-dx)) / dx^2 for f = exp(i theta x/dx)
            let stencil = (2.0 * theta.cos() - 2.0) / (dx * dx);
            assert!((bmat[m] - stencil).abs() < 1e-12);
        }

        // The Nyquist mode carries the most negative eigenvalue.
        let min = bmat.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!((min - bmat[n / 2]).abs() < 1e-14);
    }
}
