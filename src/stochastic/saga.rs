use ndarray::prelude::*;
use ndarray::NdFloat;

use super::{setup, StochasticOptions};
use crate::error::Result;
use crate::utils::{lit, norm, OptimizeResult};

/// Stochastic average gradient augmented (SAGA)
///
/// Keeps the last derivative $`\varphi'(a_i^T x, b_i)`$ seen for every
/// sample together with their average gradient $`\bar g`$. Visiting
/// sample $`i`$ with new derivative $`\delta_i`$ performs
/// ```math
/// x \leftarrow \mathrm{prox}_{\gamma g}\left(x - \gamma\left((\delta_i - m_i) a_i + \bar g + \alpha x\right)\right)
/// ```
/// then updates $`m_i`$ and $`\bar g`$.
///
/// After every epoch the certificate
/// $`\|x - \mathrm{prox}_{\gamma g}(x - \gamma(\bar g + \alpha x))\| / \gamma`$
/// is compared with `tol`.
///
/// Parameters
/// ----------
/// - __f_deriv:__   derivative of the per-sample loss, `f_deriv(a_i^T x, b_i)`
/// - __A__, __b:__  samples as rows of `A` with targets `b`
/// - __x0:__        initial guess
/// - __prox:__      proximal operator of $`g`$
/// - __opts:__      step size, $`\ell_2`$ weight, tolerance, epochs, seed
/// - __callback:__  user-defined function to be evaluated with two arguments (x,epoch).
///                   It is evaluated at (x0,0) and then after each epoch.
///                   If it returns True, the function terminates early.
///
/// References
/// ----------
/// Defazio, A., Bach, F. and Lacoste-Julien, S. "SAGA: A fast incremental
/// gradient method with support for non-strongly convex composite
/// objectives." NeurIPS (2014)
#[allow(non_snake_case)]
pub fn minimize_saga<S>(
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
    let mut memory = Array1::<S>::zeros(A.nrows());
    let mut average = Array1::<S>::zeros(A.ncols());

    let mut certificate = S::infinity();
    let mut success = false;
    let mut nit = 0;
    for epoch in 1..=opts.max_iter {
        nit = epoch;
        for &i in sampler.epoch() {
            let a_i = A.row(i);
            let deriv = f_deriv(a_i.dot(&x), b[i]);
            let delta = deriv - memory[i];
            let mut direction = &x * alpha + &average;
            direction.scaled_add(delta, &a_i);
            x.scaled_add(-step, &direction);
            x = prox(x.view(), step);
            average.scaled_add(delta / n, &a_i);
            memory[i] = deriv;
        }

        let mut forward = x.clone();
        forward.scaled_add(-step, &(&x * alpha + &average));
        certificate = norm(&(&x - &prox(forward.view(), step))) / step;

        tracing::debug!(epoch, certificate = %certificate, "saga epoch");
        if callback(x.view(), epoch) {
            break;
        }
        if certificate < tol {
            success = true;
            break;
        }
    }
    if !success {
        tracing::info!(nit, certificate = %certificate, "saga stopped before reaching tolerance");
    }
    Ok(OptimizeResult {
        x,
        success,
        nit,
        certificate,
        step_size: step,
    })
}
