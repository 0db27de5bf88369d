//! Results, step-size configuration and small numerical helpers shared by
//! all solvers

use std::time::Instant;

use ndarray::prelude::*;
use ndarray::{Data, NdFloat};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{check_dim, Result};

/// Outcome of a solver run
#[derive(Debug, Clone)]
pub struct OptimizeResult<S> {
    /// final iterate
    pub x: Array1<S>,
    /// `true` if the convergence certificate dropped below the tolerance
    pub success: bool,
    /// number of iterations (epochs for stochastic methods) performed
    pub nit: usize,
    /// last value of the method-specific convergence certificate
    pub certificate: S,
    /// step size in use when the solver stopped
    pub step_size: S,
}

impl<S: NdFloat> OptimizeResult<S> {
    pub(crate) fn early(x: Array1<S>, step_size: S) -> Self {
        OptimizeResult {
            x,
            success: false,
            nit: 0,
            certificate: S::infinity(),
            step_size,
        }
    }
}

/// Step-size strategy for the deterministic proximal methods
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSize {
    /// constant step, typically `1/L`
    Fixed(f64),
    /// adaptive step found by a sufficient decrease line search
    Backtracking,
}

/// Do nothing function for optional user callback (returns false)
#[allow(clippy::needless_pass_by_value)]
pub fn nop<T, D>(_x: ArrayView<T, D>, _itr: usize) -> bool {
    false
}

/// Records iterates from within a solver callback
///
/// ```ignore
/// let mut trace = Trace::new();
/// minimize_proximal_gradient(f_grad, prox, x0.view(), &opts, |x, _| trace.record(x))?;
/// let fx = trace.values(|x| loss.value(x));
/// ```
#[derive(Debug, Clone)]
pub struct Trace<S> {
    start: Instant,
    /// recorded iterates, in order
    pub xs: Vec<Array1<S>>,
    /// seconds elapsed since the trace was created, one per iterate
    pub times: Vec<f64>,
}

impl<S: NdFloat> Default for Trace<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: NdFloat> Trace<S> {
    #[must_use]
    pub fn new() -> Trace<S> {
        Trace {
            start: Instant::now(),
            xs: Vec::new(),
            times: Vec::new(),
        }
    }

    /// Stores a copy of `x`. Always returns `false` so it can be used
    /// directly as a callback body.
    pub fn record(&mut self, x: ArrayView1<S>) -> bool {
        self.xs.push(x.to_owned());
        self.times.push(self.start.elapsed().as_secs_f64());
        false
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Evaluates `f` on every recorded iterate, in parallel.
    pub fn values<F>(&self, f: F) -> Vec<S>
    where
        F: Fn(ArrayView1<S>) -> S + Sync,
    {
        self.xs.par_iter().map(|x| f(x.view())).collect()
    }
}

/// Converts an `f64` literal or option into the working float type.
///
/// Both `f32` and `f64` accept any `f64` (possibly rounding or saturating
/// to infinity), so the conversion cannot fail for [`NdFloat`] types.
#[inline]
pub(crate) fn lit<S: NdFloat>(v: f64) -> S {
    S::from(v).unwrap()
}

#[inline]
pub(crate) fn norm<S, D>(x: &ArrayBase<D, Ix1>) -> S
where
    S: NdFloat,
    D: Data<Elem = S>,
{
    x.dot(x).sqrt()
}

/// Initial estimate of the Lipschitz constant of the gradient
///
/// Starts from `L = 1e-3` and multiplies by 10 until a gradient step of
/// size `1/L` from `x0` does not increase the objective. Fails if the
/// gradient and `x0` differ in length.
pub fn init_lipschitz<S: NdFloat>(
    f_grad: impl Fn(ArrayView1<S>) -> (S, Array1<S>),
    x0: ArrayView1<S>,
) -> Result<S> {
    let ten = lit::<S>(10.);
    let mut l0 = lit::<S>(1e-3);
    let (f0, grad0) = f_grad(x0);
    check_dim("gradient", x0.len(), grad0.len())?;
    let mut x_tilde = &x0 - &(&grad0 / l0);
    let mut f_tilde = f_grad(x_tilde.view()).0;
    for _ in 0..100 {
        if f_tilde <= f0 {
            return Ok(l0);
        }
        l0 = l0 * ten;
        x_tilde = &x0 - &(&grad0 / l0);
        f_tilde = f_grad(x_tilde.view()).0;
    }
    tracing::warn!(lipschitz = %l0, "could not find a decreasing gradient step");
    Ok(l0)
}

/// Largest squared row norm `max_i ||a_i||^2`
pub fn max_row_norm_sq<S: NdFloat>(a: ArrayView2<S>) -> S {
    a.outer_iter()
        .map(|row| row.dot(&row))
        .fold(S::zero(), |acc, r| if r > acc { r } else { acc })
}

/// Squared spectral norm `||A||_2^2` by power iteration on `A^T A`
pub fn spectral_norm_sq<S: NdFloat>(a: ArrayView2<S>, maxiter: usize) -> S {
    let n = a.ncols();
    if n == 0 || a.nrows() == 0 {
        return S::zero();
    }
    // fixed seed: estimates must be reproducible between runs
    let mut rng = StdRng::seed_from_u64(0);
    let mut v: Array1<S> = Array1::from(
        (0..n)
            .map(|_| lit::<S>(rng.gen_range(-1.0..1.0)))
            .collect::<Vec<_>>(),
    );
    let mut lambda = S::zero();
    let tol = lit::<S>(1e-12);
    for _iter in 0..maxiter {
        let v_norm: S = norm(&v);
        if v_norm == S::zero() {
            break;
        }
        v /= v_norm;
        let w = a.t().dot(&a.dot(&v));
        let lambda_new = v.dot(&w);
        v = w;
        if (lambda_new - lambda).abs() <= tol * lambda_new.abs() {
            lambda = lambda_new;
            break;
        }
        lambda = lambda_new;
    }
    lambda
}

/// Routes solver events to the test harness, filtered by `RUST_LOG`
#[cfg(test)]
pub(crate) fn init_test_logger() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer().compact())
        .try_init();
}
