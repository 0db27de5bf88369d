//! Primal-dual hybrid gradient (Condat-Vu)

use ndarray::prelude::*;
use ndarray::NdFloat;
use ndarray_linalg::Scalar;
use serde::{Deserialize, Serialize};

use crate::error::{check_dim, check_step, Result};
use crate::linop::{operator_norm, Adjoint, LinearOperator};
use crate::utils::{init_lipschitz, lit, norm, OptimizeResult};

/// Options for [`minimize_primal_dual`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimalDualOptions {
    /// primal step, `1 / init_lipschitz` if unset
    pub tau: Option<f64>,
    /// dual step, `1 / (2 tau ||L||^2)` if unset
    pub sigma: Option<f64>,
    pub tol: f64,
    pub max_iter: usize,
}

impl Default for PrimalDualOptions {
    fn default() -> Self {
        PrimalDualOptions {
            tau: None,
            sigma: None,
            tol: 1e-6,
            max_iter: 1000,
        }
    }
}

/// Power iterations used to estimate the operator norm
const NORM_ITERS: usize = 100;

/// Primal-dual hybrid gradient
///
/// Minimizes $`f(x) + g(x) + h(Lx)`$ for smooth $`f`$, proximable
/// $`g`$ (`prox_1`) and $`h`$ (`prox_2`), and a linear operator $`L`$.
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// x_{i+1} &= \mathrm{prox}_{\tau g}\left(x_i - \tau(\nabla f(x_i) + L^* y_i)\right) \\
/// y_{i+1} &= \mathrm{prox}_{\sigma h^*}\left(y_i + \sigma L(2x_{i+1} - x_i)\right)
/// \end{aligned}
/// ```
/// where the dual proximal operator follows from Moreau's identity
/// $`\mathrm{prox}_{\sigma h^*}(v) = v - \sigma\,\mathrm{prox}_{h/\sigma}(v/\sigma)`$.
/// Convergence requires $`1/\tau - \sigma\|L\|^2 \ge L_f/2`$.
///
/// The certificate is
/// $`\|x_{i+1} - x_i\|/\tau + \|y_{i+1} - y_i\|/\sigma`$.
///
/// Parameters
/// ----------
/// - __f_grad:__    value and gradient of $`f`$
/// - __prox_1:__    proximal operator of $`g`$
/// - __prox_2:__    proximal operator of $`h`$
/// - __op:__        linear operator $`L`$ with its adjoint
/// - __x0:__        initial guess
/// - __opts:__      step sizes and stopping criteria
/// - __callback:__  user-defined function to be evaluated with two arguments (x,iter).
///                   It is evaluated at (x0,0) and then after each iteration.
///                   If it returns True, the function terminates early.
///
/// References
/// ----------
/// Condat, L. "A primal-dual splitting method for convex optimization
/// involving Lipschitzian, proximable and linear composite terms." JOTA (2013)
///
/// Vu, B. C. "A splitting algorithm for dual monotone inclusions involving
/// cocoercive operators." Advances in Computational Mathematics (2013)
pub fn minimize_primal_dual<'b, S, R, Q>(
    f_grad: impl Fn(ArrayView1<S>) -> (S, Array1<S>),
    prox_1: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    prox_2: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    op: &'b R,
    x0: ArrayView1<S>,
    opts: &PrimalDualOptions,
    mut callback: impl FnMut(ArrayView1<S>, usize) -> bool,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat + Scalar,
    R: 'b + LinearOperator<Elem = S> + Adjoint<'b, Output = Q>,
    Q: LinearOperator<Elem = S>,
{
    let tau = match opts.tau {
        Some(t) => {
            check_step(t)?;
            lit::<S>(t)
        }
        None => S::one() / init_lipschitz(&f_grad, x0)?,
    };
    let sigma = match opts.sigma {
        Some(s) => {
            check_step(s)?;
            lit::<S>(s)
        }
        None => {
            let op_norm: S = operator_norm(op, x0.len(), NORM_ITERS);
            S::one() / (lit::<S>(2.) * tau * op_norm * op_norm)
        }
    };

    let adjoint = op.adj();
    let mut x = x0.to_owned();
    let mut y = Array1::<S>::zeros(op.apply(&x).len());
    if callback(x.view(), 0) {
        return Ok(OptimizeResult::early(x, tau));
    }
    let (_, grad0) = f_grad(x.view());
    check_dim("gradient", x0.len(), grad0.len())?;

    let tol = lit::<S>(opts.tol);
    let two = lit::<S>(2.);
    let mut certificate = S::infinity();
    let mut success = false;
    let mut nit = 0;
    for iter in 1..=opts.max_iter {
        nit = iter;
        let (_, grad) = f_grad(x.view());
        let mut descent = adjoint.apply(&y);
        descent += &grad;
        let x_next = prox_1((&x - &(descent * tau)).view(), tau);

        let extrapolated = &x_next * two - &x;
        let mut v = op.apply(&extrapolated);
        v *= sigma;
        v += &y;
        // Moreau decomposition
        let p = prox_2((&v / sigma).view(), S::one() / sigma);
        let y_next = v - p * sigma;

        certificate = norm(&(&x_next - &x)) / tau + norm(&(&y_next - &y)) / sigma;
        x = x_next;
        y = y_next;

        tracing::trace!(iteration = iter, certificate = %certificate);
        if callback(x.view(), iter) {
            break;
        }
        if certificate < tol {
            success = true;
            break;
        }
    }
    tracing::debug!(success, nit, certificate = %certificate, "primal-dual finished");
    Ok(OptimizeResult {
        x,
        success,
        nit,
        certificate,
        step_size: tau,
    })
}
