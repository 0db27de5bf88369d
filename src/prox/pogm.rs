//! Proximal Optimized Gradient Method

use ndarray::prelude::*;
use ndarray::NdFloat;
use serde::{Deserialize, Serialize};

use crate::error::{OptimizeError, Result};
use crate::utils::{lit, norm, OptimizeResult};

/// Options for [`pogm`] and [`fista`](super::fista)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PogmOptions {
    /// strong convexity parameter of _f_, 0 if unknown
    pub muf: f64,
    /// adaptive momentum restart
    pub restart: bool,
    pub tol: f64,
    pub max_iter: usize,
}

impl Default for PogmOptions {
    fn default() -> Self {
        PogmOptions {
            muf: 0.,
            restart: false,
            tol: 1e-6,
            max_iter: 500,
        }
    }
}

/// Validates the Lipschitz and strong convexity constants, returning `muf`
#[allow(non_snake_case)]
pub(super) fn check_constants<S: NdFloat>(Lf: S, opts: &PogmOptions) -> Result<S> {
    if !(Lf > S::zero() && Lf.is_finite()) {
        return Err(OptimizeError::invalid(
            "lf",
            "Lipschitz constant must be positive and finite",
        ));
    }
    let muf = lit::<S>(opts.muf);
    if !(muf >= S::zero() && muf < Lf) {
        return Err(OptimizeError::invalid("muf", "must lie in [0, lf)"));
    }
    Ok(muf)
}

/// Proximal Optimized Gradient Method
///
/// Minimizes $`f(x) + g(x)`$ for $`f`$ with $`L_f`$-Lipschitz gradient
/// (and optionally $`\mu_f`$-strongly convex) using only gradients of
/// $`f`$ and the proximal operator of $`g`$.
///
/// The reported certificate is $`L_f \|x_{i+1} - x_i\|`$ on the secondary
/// (proximal) sequence.
///
/// Parameters
/// ----------
/// - __fgrad:__     gradient of $`f`$
/// - __gprox:__     proximal operator of $`g`$, `gprox(x, step)`
/// - __x0:__        initial guess
/// - __Lf:__        Lipschitz constant of $`\nabla f`$
/// - __opts:__      strong convexity, restart and stopping criteria
/// - __callback:__  user-defined function to be evaluated with two arguments (x,iter).
///                   It is evaluated at (x0,0) and then after each iteration.
///                   If it returns True, the function terminates early.
///
/// References
/// ----------
/// Taylor, A., Hendrickx, J. and Glineur, F. "Exact worst-case performance
/// of first-order methods for composite convex optimization." SIAM Journal
/// on Optimization (2017)
///
/// Kim, D. and Fessler, J. "Adaptive restart of the optimized gradient
/// method for convex optimization." JOTA (2018)
pub fn pogm<S>(
    fgrad: impl Fn(ArrayView1<S>) -> Array1<S>,
    gprox: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    x0: ArrayView1<S>,
    #[allow(non_snake_case)] Lf: S,
    opts: &PogmOptions,
    mut callback: impl FnMut(ArrayView1<S>, usize) -> bool,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat,
{
    let muf = check_constants(Lf, opts)?;
    let tol = lit::<S>(opts.tol);
    let maxiter = opts.max_iter;

    let mut x = x0.to_owned();
    if callback(x.view(), 0) {
        return Ok(OptimizeResult::early(x, S::one() / Lf));
    }
    // primary, secondary and restart sequences
    let mut w: Array1<S> = x0.to_owned();
    let mut y = x0.to_owned();
    let mut z = x0.to_owned();

    let mut theta = S::one();
    let mut zeta = S::one();
    let step = -S::one() / Lf;

    let two = lit::<S>(2.);
    let four = lit::<S>(4.);
    let eight = lit::<S>(8.);

    let q = muf / Lf;
    let beta2 = (two + q - (q.powi(2) + eight * q).sqrt()).powi(2) / four / (S::one() - q);
    let gamma2 = (two + q - (q.powi(2) + eight * q).sqrt()) / two;
    let strong = muf > S::zero();

    let mut certificate = S::infinity();
    let mut success = false;
    let mut nit = 0;
    for iter in 1..=maxiter {
        nit = iter;
        let theta_old = theta;

        // the last iteration uses the larger momentum of the OGM bound
        let constant = if iter < maxiter { four } else { eight };
        theta = (S::one() + (constant * theta.powi(2) + S::one()).sqrt()) / two;
        let beta = if strong {
            beta2
        } else {
            (theta_old - S::one()) / theta
        };
        let gamma = if strong { gamma2 } else { theta_old / theta };
        let c3 = beta / (Lf * zeta);
        zeta = (two * theta_old + theta - S::one()) / (Lf * theta);

        let grad = fgrad(x.view());
        let grad_step: Array1<S> = &grad * step;
        let w_next = &x + &grad_step;
        let zmx = &z - &x;
        z = &w_next + &((&w_next - &w) * beta) + grad_step * gamma + &zmx * c3;
        w = w_next;
        let x_next = gprox(z.view(), zeta);

        certificate = norm(&(&x_next - &x)) * Lf;

        if opts.restart {
            let g: Array1<S> = grad + &(zmx / zeta);
            let y_next = &x + &(&g * step);
            if g.dot(&(&y_next - &y)) <= S::zero() {
                tracing::trace!(iteration = iter, "momentum restart");
                theta = S::one();
            }
            y = y_next;
        }
        x = x_next;

        tracing::trace!(iteration = iter, certificate = %certificate);
        if callback(x.view(), iter) {
            break;
        }
        if certificate < tol {
            success = true;
            break;
        }
    }
    tracing::debug!(success, nit, certificate = %certificate, "pogm finished");
    Ok(OptimizeResult {
        x,
        success,
        nit,
        certificate,
        step_size: S::one() / Lf,
    })
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::{SmoothLoss, SquareLoss};
    use crate::penalty::{L1Norm, Penalty};
    use crate::prox::{fista, minimize_proximal_gradient, ProximalGradientOptions};
    use crate::utils::{nop, Trace};
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;

    fn problem(n: usize, p: usize) -> (SquareLoss<f64>, L1Norm<f64>) {
        let A = Array::random((n, p), Normal::new(0., 1.).unwrap());
        let b = Array::random(n, Normal::new(0., 1.).unwrap());
        (SquareLoss::new(A, b, 0.).unwrap(), L1Norm::new(0.05))
    }

    fn reference(loss: &SquareLoss<f64>, l1: &L1Norm<f64>) -> Array1<f64> {
        let opts = ProximalGradientOptions {
            tol: 1e-12,
            max_iter: 50_000,
            ..Default::default()
        };
        minimize_proximal_gradient(
            |x| loss.f_grad(x),
            |x, s| l1.prox(x, s),
            Array1::zeros(loss.n_features()).view(),
            &opts,
            nop,
        )
        .unwrap()
        .x
    }

    #[test]
    fn lasso_pogm_fista() {
        let (loss, l1) = problem(50, 10);
        let x_ref = reference(&loss, &l1);
        let Lf = loss.lipschitz();
        let x0 = Array1::zeros(10);
        for &restart in &[false, true] {
            let opts = PogmOptions {
                restart,
                tol: 1e-9,
                max_iter: 20_000,
                ..Default::default()
            };
            let res = pogm(
                |x| loss.f_grad(x).1,
                |x, s| l1.prox(x, s),
                x0.view(),
                Lf,
                &opts,
                nop,
            )
            .unwrap();
            assert!(res.success);
            assert_abs_diff_eq!(res.x, x_ref, epsilon = 1e-6);

            let res = fista(
                |x| loss.f_grad(x).1,
                |x, s| l1.prox(x, s),
                x0.view(),
                Lf,
                &opts,
                nop,
            )
            .unwrap();
            assert!(res.success);
            assert_abs_diff_eq!(res.x, x_ref, epsilon = 1e-6);
        }
    }

    #[test]
    fn strongly_convex_quadratic() {
        // f(x) = 1/2 x^T D x - c^T x with D = diag(1, 10), g = 0
        let d = array![1., 10.];
        let c = array![1., 1.];
        let fgrad = |x: ArrayView1<f64>| &x * &d - &c;
        let opts = PogmOptions {
            muf: 1.,
            tol: 1e-10,
            max_iter: 2000,
            ..Default::default()
        };
        let x0 = array![0., 0.];
        let res = pogm(fgrad, |x, _| x.to_owned(), x0.view(), 10., &opts, nop).unwrap();
        assert_abs_diff_eq!(res.x, array![1., 0.1], epsilon = 1e-8);
        let res = fista(fgrad, |x, _| x.to_owned(), x0.view(), 10., &opts, nop).unwrap();
        assert_abs_diff_eq!(res.x, array![1., 0.1], epsilon = 1e-8);
    }

    #[test]
    fn callback_sees_every_iterate() {
        let (loss, l1) = problem(20, 5);
        let mut trace = Trace::new();
        let opts = PogmOptions {
            tol: 0.,
            max_iter: 15,
            ..Default::default()
        };
        let res = pogm(
            |x| loss.f_grad(x).1,
            |x, s| l1.prox(x, s),
            Array1::zeros(5).view(),
            loss.lipschitz(),
            &opts,
            |x, _| trace.record(x),
        )
        .unwrap();
        assert_eq!(res.nit, 15);
        assert_eq!(trace.len(), 16);
    }

    #[test]
    fn invalid_constants() {
        let fgrad = |x: ArrayView1<f64>| x.to_owned();
        let prox = |x: ArrayView1<f64>, _: f64| x.to_owned();
        let x0 = array![1.];
        let opts = PogmOptions::default();
        assert!(pogm(fgrad, prox, x0.view(), 0., &opts, nop).is_err());
        assert!(fista(fgrad, prox, x0.view(), f64::NAN, &opts, nop).is_err());
        let opts = PogmOptions {
            muf: 2.,
            ..Default::default()
        };
        assert!(pogm(fgrad, prox, x0.view(), 1., &opts, nop).is_err());
    }
}
