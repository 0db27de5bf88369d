//! Smooth loss functions for linear models
//!
//! Every loss has the form
//! ```math
//! f(x) = \frac{1}{n} \sum_{i=1}^n \varphi(a_i^T x, b_i) + \frac{\alpha}{2}\|x\|_2^2
//! ```
//! where $`a_i`$ is the $`i`$-th row of the design matrix $`A`$. Besides
//! value and gradient, each loss exposes the scalar derivative
//! $`\varphi'(p, b)`$ used by the incremental methods in
//! [`stochastic`](crate::stochastic), and Lipschitz constants for picking
//! step sizes.

#![allow(non_snake_case)]

use ndarray::prelude::*;
use ndarray::NdFloat;

use crate::error::{check_dim, OptimizeError, Result};
use crate::utils::{lit, max_row_norm_sq, spectral_norm_sq};

/// Power iterations used to estimate $`\|A\|_2`$
const SPECTRAL_ITERS: usize = 200;

pub trait SmoothLoss<S: NdFloat> {
    /// Value and gradient at `x`
    fn f_grad(&self, x: ArrayView1<S>) -> (S, Array1<S>);

    fn value(&self, x: ArrayView1<S>) -> S {
        self.f_grad(x).0
    }

    /// Derivative of the per-sample loss with respect to $`p = a_i^T x`$
    fn partial_deriv(&self, p: S, b: S) -> S;

    /// Lipschitz constant of the full gradient
    fn lipschitz(&self) -> S;

    /// Largest Lipschitz constant among the per-sample gradients
    /// (including the $`\ell_2`$ term)
    fn max_lipschitz(&self) -> S;

    /// Design matrix and targets
    fn data(&self) -> (ArrayView2<S>, ArrayView1<S>);

    /// Weight of the $`\ell_2`$ regularization
    fn alpha(&self) -> S;

    fn n_samples(&self) -> usize {
        self.data().0.nrows()
    }

    fn n_features(&self) -> usize {
        self.data().0.ncols()
    }
}

/// Step size for SAGA-type methods: `1 / (factor * max_lipschitz)`
///
/// A `factor` of 3 is the value from the SAGA convergence theory; 4 is a
/// safer default on ill-conditioned problems.
pub fn compute_step_size<S: NdFloat>(loss: &impl SmoothLoss<S>, factor: f64) -> S {
    S::one() / (lit::<S>(factor) * loss.max_lipschitz())
}

/// Shared storage and bookkeeping for the linear-model losses
#[derive(Debug, Clone)]
struct LinearModel<S> {
    A: Array2<S>,
    b: Array1<S>,
    alpha: S,
    spectral_sq: S,
    max_row_sq: S,
}

impl<S: NdFloat> LinearModel<S> {
    fn new(A: Array2<S>, b: Array1<S>, alpha: S) -> Result<Self> {
        if A.nrows() == 0 || A.ncols() == 0 {
            return Err(OptimizeError::EmptyProblem);
        }
        check_dim("b", A.nrows(), b.len())?;
        if !(alpha >= S::zero()) {
            return Err(OptimizeError::invalid("alpha", "must be non-negative"));
        }
        let spectral_sq = spectral_norm_sq(A.view(), SPECTRAL_ITERS);
        let max_row_sq = max_row_norm_sq(A.view());
        Ok(LinearModel {
            A,
            b,
            alpha,
            spectral_sq,
            max_row_sq,
        })
    }

    fn n(&self) -> S {
        lit(self.A.nrows() as f64)
    }

    /// Averages `phi` over samples and chains `dphi` through `A^T`
    fn f_grad(
        &self,
        x: ArrayView1<S>,
        phi: impl Fn(S, S) -> S,
        dphi: impl Fn(S, S) -> S,
    ) -> (S, Array1<S>) {
        let z = self.A.dot(&x);
        let mut obj = S::zero();
        let mut deriv = Array1::<S>::zeros(z.len());
        for ((d, &zi), &bi) in deriv.iter_mut().zip(z.iter()).zip(self.b.iter()) {
            obj += phi(zi, bi);
            *d = dphi(zi, bi);
        }
        let n = self.n();
        let half = lit::<S>(0.5);
        let mut grad = self.A.t().dot(&deriv) / n;
        grad.scaled_add(self.alpha, &x);
        (obj / n + half * self.alpha * x.dot(&x), grad)
    }
}

/// Numerically stable $`\log(1 + e^z)`$
fn log1pexp<S: NdFloat>(z: S) -> S {
    if z > S::zero() {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Numerically stable logistic sigmoid
fn sigmoid<S: NdFloat>(z: S) -> S {
    if z >= S::zero() {
        S::one() / (S::one() + (-z).exp())
    } else {
        let e = z.exp();
        e / (S::one() + e)
    }
}

/// Logistic loss with targets in $`[0, 1]`$
///
/// ```math
/// \varphi(p, b) = \log(1 + e^{p}) - b p
/// ```
#[derive(Debug, Clone)]
pub struct LogLoss<S> {
    model: LinearModel<S>,
}

impl<S: NdFloat> LogLoss<S> {
    pub fn new(A: Array2<S>, b: Array1<S>, alpha: S) -> Result<Self> {
        if b.iter().any(|&bi| bi < S::zero() || bi > S::one()) {
            return Err(OptimizeError::invalid("b", "targets must lie in [0, 1]"));
        }
        Ok(LogLoss {
            model: LinearModel::new(A, b, alpha)?,
        })
    }
}

impl<S: NdFloat> SmoothLoss<S> for LogLoss<S> {
    fn f_grad(&self, x: ArrayView1<S>) -> (S, Array1<S>) {
        self.model
            .f_grad(x, |p, b| log1pexp(p) - b * p, |p, b| sigmoid(p) - b)
    }

    fn partial_deriv(&self, p: S, b: S) -> S {
        sigmoid(p) - b
    }

    fn lipschitz(&self) -> S {
        lit::<S>(0.25) * self.model.spectral_sq / self.model.n() + self.model.alpha
    }

    fn max_lipschitz(&self) -> S {
        lit::<S>(0.25) * self.model.max_row_sq + self.model.alpha
    }

    fn data(&self) -> (ArrayView2<S>, ArrayView1<S>) {
        (self.model.A.view(), self.model.b.view())
    }

    fn alpha(&self) -> S {
        self.model.alpha
    }
}

/// Least squares loss
///
/// ```math
/// \varphi(p, b) = \tfrac12 (p - b)^2
/// ```
#[derive(Debug, Clone)]
pub struct SquareLoss<S> {
    model: LinearModel<S>,
}

impl<S: NdFloat> SquareLoss<S> {
    pub fn new(A: Array2<S>, b: Array1<S>, alpha: S) -> Result<Self> {
        Ok(SquareLoss {
            model: LinearModel::new(A, b, alpha)?,
        })
    }
}

impl<S: NdFloat> SmoothLoss<S> for SquareLoss<S> {
    fn f_grad(&self, x: ArrayView1<S>) -> (S, Array1<S>) {
        let half = lit::<S>(0.5);
        self.model
            .f_grad(x, |p, b| half * (p - b) * (p - b), |p, b| p - b)
    }

    fn partial_deriv(&self, p: S, b: S) -> S {
        p - b
    }

    fn lipschitz(&self) -> S {
        self.model.spectral_sq / self.model.n() + self.model.alpha
    }

    fn max_lipschitz(&self) -> S {
        self.model.max_row_sq + self.model.alpha
    }

    fn data(&self) -> (ArrayView2<S>, ArrayView1<S>) {
        (self.model.A.view(), self.model.b.view())
    }

    fn alpha(&self) -> S {
        self.model.alpha
    }
}

/// Huber loss, quadratic for residuals up to `delta` and linear beyond
#[derive(Debug, Clone)]
pub struct HuberLoss<S> {
    model: LinearModel<S>,
    delta: S,
}

impl<S: NdFloat> HuberLoss<S> {
    pub fn new(A: Array2<S>, b: Array1<S>, alpha: S, delta: S) -> Result<Self> {
        if !(delta > S::zero()) {
            return Err(OptimizeError::invalid("delta", "must be positive"));
        }
        Ok(HuberLoss {
            model: LinearModel::new(A, b, alpha)?,
            delta,
        })
    }

    fn clip(&self, r: S) -> S {
        r.max(-self.delta).min(self.delta)
    }
}

impl<S: NdFloat> SmoothLoss<S> for HuberLoss<S> {
    fn f_grad(&self, x: ArrayView1<S>) -> (S, Array1<S>) {
        let half = lit::<S>(0.5);
        let delta = self.delta;
        self.model.f_grad(
            x,
            |p, b| {
                let r = (p - b).abs();
                if r <= delta {
                    half * r * r
                } else {
                    delta * (r - half * delta)
                }
            },
            |p, b| self.clip(p - b),
        )
    }

    fn partial_deriv(&self, p: S, b: S) -> S {
        self.clip(p - b)
    }

    fn lipschitz(&self) -> S {
        self.model.spectral_sq / self.model.n() + self.model.alpha
    }

    fn max_lipschitz(&self) -> S {
        self.model.max_row_sq + self.model.alpha
    }

    fn data(&self) -> (ArrayView2<S>, ArrayView1<S>) {
        (self.model.A.view(), self.model.b.view())
    }

    fn alpha(&self) -> S {
        self.model.alpha
    }
}
