use ndarray::prelude::*;
use ndarray::NdFloat;

use super::{setup, StochasticOptions};
use crate::error::Result;
use crate::utils::{lit, norm, OptimizeResult};

/// Variance-reduced three operator splitting
///
/// Davis-Yin splitting for
/// $`\frac{1}{n}\sum_i \varphi(a_i^T x, b_i) + \frac{\alpha}{2}\|x\|^2 + g(x) + h(x)`$
/// where the gradient of the smooth part is replaced by the SAGA
/// estimator. With the auxiliary variable $`y`$, every sample performs
/// ```math
/// \begin{aligned}
/// x &= \mathrm{prox}_{\gamma g}(y) \\
/// z &= \mathrm{prox}_{\gamma h}\left(2x - y - \gamma v\right) \\
/// y &\leftarrow y - x + z
/// \end{aligned}
/// ```
/// with $`v = (\delta_i - m_i) a_i + \bar g + \alpha x`$. The certificate
/// after each epoch is
/// $`\|x - \mathrm{prox}_{\gamma h}(2x - y - \gamma(\bar g + \alpha x))\| / \gamma`$
/// for $`x = \mathrm{prox}_{\gamma g}(y)`$, and the returned point is
/// $`\mathrm{prox}_{\gamma g}(y)`$.
///
/// References
/// ----------
/// Pedregosa, F., Fatras, K. and Casotto, M. "Proximal splitting meets
/// variance reduction." AISTATS (2019)
#[allow(non_snake_case)]
pub fn minimize_vrtos<S>(
    f_deriv: impl Fn(S, S) -> S,
    A: ArrayView2<S>,
    b: ArrayView1<S>,
    x0: ArrayView1<S>,
    prox_1: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    prox_2: impl Fn(ArrayView1<S>, S) -> Array1<S>,
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
    let two = lit::<S>(2.);

    if callback(x0, 0) {
        return Ok(OptimizeResult::early(x0.to_owned(), step));
    }
    let mut y = x0.to_owned();
    let mut memory = Array1::<S>::zeros(A.nrows());
    let mut average = Array1::<S>::zeros(A.ncols());

    // reflected forward point 2x - y - step (g + alpha x)
    let reflect = |x: &Array1<S>, y: &Array1<S>, g: &Array1<S>| {
        let mut r = x * two - y;
        r.scaled_add(-step, &(x * alpha + g));
        r
    };

    let mut x = prox_1(y.view(), step);
    let mut certificate = S::infinity();
    let mut success = false;
    let mut nit = 0;
    for epoch in 1..=opts.max_iter {
        nit = epoch;
        for &i in sampler.epoch() {
            let x_i = prox_1(y.view(), step);
            let a_i = A.row(i);
            let deriv = f_deriv(a_i.dot(&x_i), b[i]);
            let delta = deriv - memory[i];
            let mut g = average.clone();
            g.scaled_add(delta, &a_i);
            let z = prox_2(reflect(&x_i, &y, &g).view(), step);
            y -= &(&x_i - &z);
            average.scaled_add(delta / n, &a_i);
            memory[i] = deriv;
        }

        x = prox_1(y.view(), step);
        let z = prox_2(reflect(&x, &y, &average).view(), step);
        certificate = norm(&(&x - &z)) / step;

        tracing::debug!(epoch, certificate = %certificate, "vrtos epoch");
        if callback(x.view(), epoch) {
            break;
        }
        if certificate < tol {
            success = true;
            break;
        }
    }
    if !success {
        tracing::info!(nit, certificate = %certificate, "vrtos stopped before reaching tolerance");
    }
    Ok(OptimizeResult {
        x,
        success,
        nit,
        certificate,
        step_size: step,
    })
}
