//! Fast Iterative Shrinking/Thresholding Algorithm

use ndarray::prelude::*;
use ndarray::NdFloat;

use super::pogm::{check_constants, PogmOptions};
use crate::error::Result;
use crate::utils::{lit, norm, OptimizeResult};

/// Fast Iterative Shrinking/Thresholding Algorithm
///
/// Accelerated proximal gradient with fixed step $`1/L_f`$. When
/// `opts.muf > 0` the momentum is the constant optimal for
/// $`\mu_f`$-strongly convex $`f`$. With `opts.restart` the momentum is
/// reset whenever
/// ```math
/// \langle y_i - x_{i+1}, x_{i+1} - x_i \rangle > 0
/// ```
/// i.e. the gradient mapping points against the last step.
///
/// The certificate is the gradient mapping $`L_f \|y_i - x_{i+1}\|`$.
///
/// References
/// ----------
/// O'Donoghue, B. and Candès, E. "Adaptive restart for accelerated
/// gradient schemes." Foundations of Computational Mathematics (2015)
pub fn fista<S>(
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
    let step = S::one() / Lf;

    let mut x = x0.to_owned();
    if callback(x.view(), 0) {
        return Ok(OptimizeResult::early(x, step));
    }
    let mut y = x0.to_owned();
    let mut theta = S::one();

    let two = lit::<S>(2.);
    let four = lit::<S>(4.);
    let eight = lit::<S>(8.);

    let q = muf / Lf;
    let beta2 = (two + q - (q.powi(2) + eight * q).sqrt()).powi(2) / four / (S::one() - q);
    let strong = muf > S::zero();

    let mut certificate = S::infinity();
    let mut success = false;
    let mut nit = 0;
    for iter in 1..=opts.max_iter {
        nit = iter;
        let theta_old = theta;
        theta = (S::one() + (four * theta.powi(2) + S::one()).sqrt()) / two;
        let beta = if strong {
            beta2
        } else {
            (theta_old - S::one()) / theta
        };

        let grad = fgrad(y.view());
        let x_next = gprox((&y - &(grad * step)).view(), step);
        let mapping = &y - &x_next;
        certificate = norm(&mapping) * Lf;

        let dx = &x_next - &x;
        x = x_next;
        if opts.restart && mapping.dot(&dx) > S::zero() {
            tracing::trace!(iteration = iter, "momentum restart");
            theta = S::one();
            y.assign(&x);
        } else {
            y = &x + &(dx * beta);
        }

        tracing::trace!(iteration = iter, certificate = %certificate);
        if callback(x.view(), iter) {
            break;
        }
        if certificate < tol {
            success = true;
            break;
        }
    }
    tracing::debug!(success, nit, certificate = %certificate, "fista finished");
    Ok(OptimizeResult {
        x,
        success,
        nit,
        certificate,
        step_size: step,
    })
}
