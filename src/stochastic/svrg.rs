use ndarray::prelude::*;
use ndarray::NdFloat;

use super::{sample_derivs, setup, StochasticOptions};
use crate::error::Result;
use crate::utils::{lit, norm, OptimizeResult};

/// Stochastic variance reduced gradient (proximal SVRG)
///
/// Each epoch computes the full gradient $`\mu`$ at a snapshot
/// $`\tilde x`$ and then takes one step per sample with the estimator
/// ```math
/// v = \left(\varphi'(a_i^T x, b_i) - \varphi'(a_i^T \tilde x, b_i)\right) a_i + \mu + \alpha(x - \tilde x)
/// ```
/// The certificate is the gradient mapping at the snapshot, so a
/// converged run returns the snapshot without another inner pass.
///
/// Parameters are those of [`minimize_saga`](super::minimize_saga).
///
/// References
/// ----------
/// Johnson, R. and Zhang, T. "Accelerating stochastic gradient descent
/// using predictive variance reduction." NeurIPS (2013)
///
/// Xiao, L. and Zhang, T. "A proximal stochastic gradient method with
/// progressive variance reduction." SIAM Journal on Optimization (2014)
#[allow(non_snake_case)]
pub fn minimize_svrg<S>(
    f_deriv: impl Fn(S, S) -> S,
    A: ArrayView2<S>,
    b: ArrayView1<S>,
    x0: ArrayView1<S>,
    prox: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    opts: &StochasticOptions,
    mut callback: impl FnMut(ArrayView1<S>, usize) -> bool,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat,
{
    let mut sampler = setup(&A, &b, &x0, opts)?;
    let step = lit::<S>(opts.step_size);
    let alpha = lit::<S>(opts.alpha);
    let tol = lit::<S>(opts.tol);
    let n = lit::<S>(A.nrows() as f64);

    let mut x = x0.to_owned();
    if callback(x.view(), 0) {
        return Ok(OptimizeResult::early(x, step));
    }

    let mut certificate = S::infinity();
    let mut success = false;
    let mut nit = 0;
    for epoch in 1..=opts.max_iter {
        let snapshot = x.clone();
        let snapshot_derivs = sample_derivs(&f_deriv, &A, &b, &snapshot);
        let mut full_grad = A.t().dot(&snapshot_derivs) / n;
        full_grad.scaled_add(alpha, &snapshot);

        let mut forward = snapshot.clone();
        forward.scaled_add(-step, &full_grad);
        certificate = norm(&(&snapshot - &prox(forward.view(), step))) / step;
        if certificate < tol {
            success = true;
            break;
        }

        nit = epoch;
        for &i in sampler.epoch() {
            let a_i = A.row(i);
            let delta = f_deriv(a_i.dot(&x), b[i]) - snapshot_derivs[i];
            let mut direction = &x - &snapshot;
            direction *= alpha;
            direction += &full_grad;
            direction.scaled_add(delta, &a_i);
            x.scaled_add(-step, &direction);
            x = prox(x.view(), step);
        }

        tracing::debug!(epoch, certificate = %certificate, "svrg epoch");
        if callback(x.view(), epoch) {
            break;
        }
    }
    if !success {
        tracing::info!(nit, certificate = %certificate, "svrg stopped before reaching tolerance");
    }
    Ok(OptimizeResult {
        x,
        success,
        nit,
        certificate,
        step_size: step,
    })
}
