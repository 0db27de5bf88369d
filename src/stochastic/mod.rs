//! Variance-reduced incremental methods for finite sums
//!
//! All solvers in this module target
//! ```math
//! \min_x \frac{1}{n} \sum_{i=1}^n \varphi(a_i^T x, b_i) + \frac{\alpha}{2}\|x\|_2^2 + g(x)
//! ```
//! where the per-sample loss is given through its scalar derivative
//! `f_deriv(p, b)` $`= \varphi'(p, b)`$ (see
//! [`SmoothLoss::partial_deriv`](crate::loss::SmoothLoss::partial_deriv)).
//! Iterations are counted in epochs, each one a pass over a fresh random
//! permutation of the samples.

#![allow(non_snake_case)]

use ndarray::prelude::*;
use ndarray::NdFloat;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{check_dim, check_step, OptimizeError, Result};

mod saga;
pub use saga::*;

mod sparse_saga;
pub use sparse_saga::*;

mod svrg;
pub use svrg::*;

mod vrtos;
pub use vrtos::*;

/// Options shared by the stochastic solvers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StochasticOptions {
    /// must be set to a positive value, e.g. from
    /// [`compute_step_size`](crate::loss::compute_step_size)
    pub step_size: f64,
    /// weight of the $`\ell_2`$ regularization
    pub alpha: f64,
    pub tol: f64,
    /// maximum number of epochs
    pub max_iter: usize,
    /// seed of the sample permutations, drawn from the OS if unset
    pub seed: Option<u64>,
}

impl Default for StochasticOptions {
    fn default() -> Self {
        StochasticOptions {
            step_size: 0.,
            alpha: 0.,
            tol: 1e-6,
            max_iter: 500,
            seed: None,
        }
    }
}

impl StochasticOptions {
    pub fn with_step_size(step_size: f64) -> Self {
        StochasticOptions {
            step_size,
            ..Default::default()
        }
    }
}

/// Checks shapes and options, returning a generator for the epoch order
fn setup<S: NdFloat>(
    A: &ArrayView2<S>,
    b: &ArrayView1<S>,
    x0: &ArrayView1<S>,
    opts: &StochasticOptions,
) -> Result<Sampler> {
    check_problem(A.dim(), b.len(), x0.len(), opts)
}

/// Shape and option checks for a design matrix of the given shape
fn check_problem(
    (n_samples, n_features): (usize, usize),
    n_targets: usize,
    n_x0: usize,
    opts: &StochasticOptions,
) -> Result<Sampler> {
    if n_samples == 0 || n_features == 0 {
        return Err(OptimizeError::EmptyProblem);
    }
    check_dim("b", n_samples, n_targets)?;
    check_dim("x0", n_features, n_x0)?;
    check_step(opts.step_size)?;
    if !(opts.alpha >= 0.) {
        return Err(OptimizeError::invalid("alpha", "must be non-negative"));
    }
    Ok(Sampler::new(n_samples, opts.seed))
}

/// Produces a new random permutation of the samples for every epoch
struct Sampler {
    rng: StdRng,
    order: Vec<usize>,
}

impl Sampler {
    fn new(n_samples: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Sampler {
            rng,
            order: (0..n_samples).collect(),
        }
    }

    fn epoch(&mut self) -> &[usize] {
        self.order.shuffle(&mut self.rng);
        &self.order
    }
}

/// Per-sample derivatives at `x`
fn sample_derivs<S: NdFloat>(
    f_deriv: &impl Fn(S, S) -> S,
    A: &ArrayView2<S>,
    b: &ArrayView1<S>,
    x: &Array1<S>,
) -> Array1<S> {
    let z = A.dot(x);
    let mut out = Array1::<S>::zeros(z.len());
    for ((o, &zi), &bi) in out.iter_mut().zip(z.iter()).zip(b.iter()) {
        *o = f_deriv(zi, bi);
    }
    out
}

#[cfg(test)]
pub(crate) mod test_problems {
    use crate::loss::{compute_step_size, SquareLoss};
    use ndarray::prelude::*;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;

    pub fn square_loss(n: usize, p: usize, alpha: f64) -> (SquareLoss<f64>, f64) {
        let A = Array::random((n, p), Normal::new(0., 1.).unwrap());
        let b = Array::random(n, Normal::new(0., 1.).unwrap());
        let loss = SquareLoss::new(A, b, alpha).unwrap();
        let step = compute_step_size(&loss, 3.);
        (loss, step)
    }
}
