//! Total variation penalties
//!
//! The 1D proximal operator is computed exactly in linear time (in
//! practice) with the direct algorithm of [\[C13\]](#references). The 2D
//! anisotropic penalty splits into a sum of row and column 1D problems,
//! which are combined by Douglas-Rachford iterations [\[BS14\]](#references).
//!
//! References
//! ----------
//! \[C13\]: Condat, L. "A direct algorithm for 1D total variation
//!          denoising." IEEE Signal Processing Letters (2013)
//!
//! \[BS14\]: Barbero, A. and Sra, S. "Modular proximal optimization for
//!           multidimensional total-variation regularization."
//!           arXiv:1411.0589 (2014)

use ndarray::prelude::*;
use ndarray::NdFloat;

use super::Penalty;
use crate::error::{check_dim, OptimizeError, Result};
use crate::utils::lit;

/// Proximal operator of the 1D total variation
///
/// Solves
/// ```math
/// \mathrm{arg}\!\min_x \sum_i |x_{i+1} - x_i| + \frac{1}{2\gamma}\|x - w\|_2^2
/// ```
/// where $`\gamma`$ is `step_size`.
pub fn prox_tv1d<S: NdFloat>(w: ArrayView1<S>, step_size: S) -> Array1<S> {
    let n = w.len();
    let mut out = Array1::<S>::zeros(n);
    if n == 0 {
        return out;
    }
    let lambda = step_size;
    let two_lambda = lambda + lambda;

    // k: current sample, k0: start of the current segment,
    // kminus/kplus: last positions where the lower/upper bound was hit
    let (mut k, mut k0, mut kminus, mut kplus) = (0usize, 0usize, 0usize, 0usize);
    // vmin/vmax: candidate segment values, umin/umax: running residuals
    let mut umin = lambda;
    let mut umax = -lambda;
    let mut vmin = w[0] - lambda;
    let mut vmax = w[0] + lambda;

    loop {
        while k == n - 1 {
            if umin < S::zero() {
                loop {
                    out[k0] = vmin;
                    k0 += 1;
                    if k0 > kminus {
                        break;
                    }
                }
                k = k0;
                kminus = k0;
                vmin = w[k0];
                umin = lambda;
                umax = vmin + umin - vmax;
            } else if umax > S::zero() {
                loop {
                    out[k0] = vmax;
                    k0 += 1;
                    if k0 > kplus {
                        break;
                    }
                }
                k = k0;
                kplus = k0;
                vmax = w[k0];
                umax = -lambda;
                umin = vmax + umax - vmin;
            } else {
                vmin += umin / S::from(k - k0 + 1).unwrap();
                while k0 <= k {
                    out[k0] = vmin;
                    k0 += 1;
                }
                return out;
            }
        }

        umin += w[k + 1] - vmin;
        if umin < -lambda {
            // negative jump: close the segment at the lower bound
            loop {
                out[k0] = vmin;
                k0 += 1;
                if k0 > kminus {
                    break;
                }
            }
            k = k0;
            kminus = k0;
            kplus = k0;
            vmin = w[k0];
            vmax = vmin + two_lambda;
            umin = lambda;
            umax = -lambda;
            continue;
        }

        umax += w[k + 1] - vmax;
        if umax > lambda {
            // positive jump: close the segment at the upper bound
            loop {
                out[k0] = vmax;
                k0 += 1;
                if k0 > kplus {
                    break;
                }
            }
            k = k0;
            kminus = k0;
            kplus = k0;
            vmax = w[k0];
            vmin = vmax - two_lambda;
            umin = lambda;
            umax = -lambda;
        } else {
            k += 1;
            if umin >= lambda {
                kminus = k;
                vmin += (umin - lambda) / S::from(k - k0 + 1).unwrap();
                umin = lambda;
            }
            if umax <= -lambda {
                kplus = k;
                vmax += (umax + lambda) / S::from(k - k0 + 1).unwrap();
                umax = -lambda;
            }
        }
    }
}

/// Applies [`prox_tv1d`] to every row (`by_rows`) or column of the
/// row-major `n_rows x n_cols` image `x`.
fn prox_tv1d_lines<S: NdFloat>(
    x: &Array1<S>,
    step_size: S,
    n_rows: usize,
    n_cols: usize,
    by_rows: bool,
) -> Array1<S> {
    let mut out = Array1::<S>::zeros(x.len());
    let (n_lines, line_len) = if by_rows {
        (n_rows, n_cols)
    } else {
        (n_cols, n_rows)
    };
    let index = |line: usize, pos: usize| {
        if by_rows {
            line * n_cols + pos
        } else {
            pos * n_cols + line
        }
    };
    let mut buf = Array1::<S>::zeros(line_len);
    for line in 0..n_lines {
        for pos in 0..line_len {
            buf[pos] = x[index(line, pos)];
        }
        let denoised = prox_tv1d(buf.view(), step_size);
        for pos in 0..line_len {
            out[index(line, pos)] = denoised[pos];
        }
    }
    out
}

/// Proximal operator of the anisotropic 2D total variation
///
/// `w` is a row-major `n_rows x n_cols` image. Row and column problems
/// are alternated by Douglas-Rachford until two consecutive half-steps
/// agree to within `tol` (max norm) or `max_iter` is reached, in which
/// case a warning is logged and the last iterate returned.
pub fn prox_tv2d<S: NdFloat>(
    w: ArrayView1<S>,
    step_size: S,
    n_rows: usize,
    n_cols: usize,
    max_iter: usize,
    tol: S,
) -> Result<Array1<S>> {
    check_dim("image", n_rows * n_cols, w.len())?;
    Ok(douglas_rachford_tv2d(w, step_size, n_rows, n_cols, max_iter, tol))
}

fn douglas_rachford_tv2d<S: NdFloat>(
    w: ArrayView1<S>,
    step_size: S,
    n_rows: usize,
    n_cols: usize,
    max_iter: usize,
    tol: S,
) -> Array1<S> {
    let mut x = w.to_owned();
    let mut p = Array1::<S>::zeros(w.len());
    let mut q = Array1::<S>::zeros(w.len());
    let mut accuracy = S::infinity();

    for _iter in 0..max_iter {
        let y = prox_tv1d_lines(&(&x + &p), step_size, n_rows, n_cols, false);
        p += &(&x - &y);
        x = prox_tv1d_lines(&(&y + &q), step_size, n_rows, n_cols, true);
        q += &(&y - &x);

        accuracy = (&y - &x).fold(S::zero(), |acc, &d| acc.max(d.abs()));
        if accuracy < tol {
            return x;
        }
    }
    tracing::warn!(
        accuracy = %accuracy,
        max_iter,
        "prox_tv2d did not converge to the desired accuracy"
    );
    x
}

fn tv1d<S: NdFloat>(x: ArrayView1<S>) -> S {
    (1..x.len()).fold(S::zero(), |acc, i| acc + (x[i] - x[i - 1]).abs())
}

/// $`\alpha \sum_i |x_{i+1} - x_i|`$
#[derive(Debug, Clone, Copy)]
pub struct TotalVariation1D<S> {
    pub alpha: S,
}

impl<S: NdFloat> TotalVariation1D<S> {
    pub fn new(alpha: S) -> Self {
        TotalVariation1D { alpha }
    }
}

impl<S: NdFloat> Penalty<S> for TotalVariation1D<S> {
    fn value(&self, x: ArrayView1<S>) -> S {
        self.alpha * tv1d(x)
    }

    fn prox(&self, x: ArrayView1<S>, step_size: S) -> Array1<S> {
        prox_tv1d(x, self.alpha * step_size)
    }
}

/// Anisotropic 2D total variation of a row-major `n_rows x n_cols` image,
/// scaled by `alpha`
#[derive(Debug, Clone, Copy)]
pub struct TotalVariation2D<S> {
    pub alpha: S,
    pub n_rows: usize,
    pub n_cols: usize,
    /// Douglas-Rachford iterations of the proximal operator
    pub max_iter: usize,
    /// tolerance of the proximal operator
    pub tol: S,
}

impl<S: NdFloat> TotalVariation2D<S> {
    /// Defaults to 500 inner iterations and a tolerance of `1e-3`.
    pub fn new(alpha: S, n_rows: usize, n_cols: usize) -> Result<Self> {
        if n_rows == 0 || n_cols == 0 {
            return Err(OptimizeError::EmptyProblem);
        }
        Ok(TotalVariation2D {
            alpha,
            n_rows,
            n_cols,
            max_iter: 500,
            tol: lit(1e-3),
        })
    }

    pub fn with_tolerance(mut self, max_iter: usize, tol: S) -> Self {
        self.max_iter = max_iter;
        self.tol = tol;
        self
    }
}

impl<S: NdFloat> Penalty<S> for TotalVariation2D<S> {
    /// # Panics
    /// if `x` does not hold `n_rows * n_cols` entries
    fn value(&self, x: ArrayView1<S>) -> S {
        let (r, c) = (self.n_rows, self.n_cols);
        assert_eq!(x.len(), r * c, "input is not a {}x{} image", r, c);
        let mut tv = S::zero();
        for i in 0..r {
            for j in 0..c {
                if i + 1 < r {
                    tv += (x[i * c + j] - x[(i + 1) * c + j]).abs();
                }
                if j + 1 < c {
                    tv += (x[i * c + j] - x[i * c + j + 1]).abs();
                }
            }
        }
        self.alpha * tv
    }

    /// # Panics
    /// if `x` does not hold `n_rows * n_cols` entries
    fn prox(&self, x: ArrayView1<S>, step_size: S) -> Array1<S> {
        let (r, c) = (self.n_rows, self.n_cols);
        assert_eq!(x.len(), r * c, "input is not a {}x{} image", r, c);
        douglas_rachford_tv2d(x, self.alpha * step_size, r, c, self.max_iter, self.tol)
    }
}


#[cfg(all(rustc_nightly, test))]
mod benches {
    use super::*;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use test::Bencher;

    #[bench]
    fn bench_prox_tv1d(bench: &mut Bencher) {
        let w = Array::random(10_000, Normal::new(0., 1.).unwrap());
        bench.iter(|| prox_tv1d(w.view(), 0.5));
    }

    #[bench]
    fn bench_prox_tv2d(bench: &mut Bencher) {
        let w = Array::random(64 * 64, Normal::new(0., 1.).unwrap());
        bench.iter(|| prox_tv2d(w.view(), 0.5, 64, 64, 100, 1e-3));
    }
}
