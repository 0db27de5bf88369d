//! Davis-Yin three operator splitting with adaptive step size

use ndarray::prelude::*;
use ndarray::NdFloat;
use serde::{Deserialize, Serialize};

use crate::error::{check_backtracking, check_dim, check_step, OptimizeError, Result};
use crate::utils::{init_lipschitz, lit, norm, OptimizeResult, StepSize};

/// Options for [`minimize_three_split`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeSplitOptions {
    pub step: StepSize,
    pub tol: f64,
    pub max_iter: usize,
    pub max_iter_backtracking: usize,
    pub backtracking_factor: f64,
    /// Lipschitz constant of $`h`$ (0 if it is an indicator with unknown
    /// constant). When set, the step may grow again after a line search.
    pub h_lipschitz: Option<f64>,
}

impl Default for ThreeSplitOptions {
    fn default() -> Self {
        ThreeSplitOptions {
            step: StepSize::Backtracking,
            tol: 1e-6,
            max_iter: 1000,
            max_iter_backtracking: 100,
            backtracking_factor: 0.7,
            h_lipschitz: None,
        }
    }
}

/// Increments smaller than this skip the line search
const MIN_INCREMENT: f64 = 1e-7;
/// Largest relative growth of the step between iterations
const MAX_STEP_GROWTH: f64 = 1.02;

/// Davis-Yin three operator splitting
///
/// Minimizes $`f(x) + g(x) + h(x)`$ for smooth $`f`$ and proximable
/// $`g`$ (`prox_1`) and $`h`$ (`prox_2`).
///
/// Algorithm
/// ---------
/// Starting from $`z_0 = \mathrm{prox}_{\gamma h}(x_0)`$ and $`u_0 = 0`$,
/// ```math
/// \begin{aligned}
/// x_{i+1} &= \mathrm{prox}_{\gamma g}\left(z_i - \gamma (u_i + \nabla f(z_i))\right) \\
/// z_{i+1} &= \mathrm{prox}_{\gamma h}(x_{i+1} + \gamma u_i) \\
/// u_{i+1} &= u_i + (x_{i+1} - z_{i+1}) / \gamma
/// \end{aligned}
/// ```
/// With [`StepSize::Backtracking`] the step is decreased until
/// ```math
/// f(x_{i+1}) \le f(z_i) + \langle \nabla f(z_i), x_{i+1} - z_i \rangle + \frac{1}{2\gamma}\|x_{i+1} - z_i\|^2
/// ```
/// and, if `h_lipschitz` is given, increased by at most 2% per iteration.
/// The certificate is $`\|x_{i+1} - z_i\| / \gamma`$, checked from the
/// second iteration on.
///
/// Parameters
/// ----------
/// - __f_grad:__    value and gradient of $`f`$
/// - __prox_1:__    proximal operator of $`g`$
/// - __prox_2:__    proximal operator of $`h`$
/// - __x0:__        initial guess
/// - __opts:__      step strategy, tolerance and iteration limits
/// - __callback:__  user-defined function to be evaluated with two arguments (x,iter).
///                   It is evaluated at (x0,0) and then after each iteration.
///                   If it returns True, the function terminates early.
///
/// References
/// ----------
/// Davis, D. and Yin, W. "A three-operator splitting scheme and its
/// optimization applications." Set-Valued and Variational Analysis (2017)
///
/// Pedregosa, F. and Gidel, G. "Adaptive three operator splitting."
/// ICML (2018)
pub fn minimize_three_split<S>(
    f_grad: impl Fn(ArrayView1<S>) -> (S, Array1<S>),
    prox_1: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    prox_2: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    x0: ArrayView1<S>,
    opts: &ThreeSplitOptions,
    mut callback: impl FnMut(ArrayView1<S>, usize) -> bool,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat,
{
    check_backtracking(opts.max_iter_backtracking, opts.backtracking_factor)?;
    if let Some(h) = opts.h_lipschitz {
        if !(h >= 0.) {
            return Err(OptimizeError::invalid("h_lipschitz", "must be non-negative"));
        }
    }
    let (mut step, backtracking) = match opts.step {
        StepSize::Fixed(s) => {
            check_step(s)?;
            (lit::<S>(s), false)
        }
        StepSize::Backtracking => (S::one() / init_lipschitz(&f_grad, x0)?, true),
    };

    if callback(x0, 0) {
        return Ok(OptimizeResult::early(x0.to_owned(), step));
    }

    let mut z = prox_2(x0, step);
    check_dim("prox_2 output", x0.len(), z.len())?;
    let mut u = Array1::<S>::zeros(x0.len());
    let (mut fz, mut grad_fz) = f_grad(z.view());
    check_dim("gradient", x0.len(), grad_fz.len())?;

    let tol = lit::<S>(opts.tol);
    let factor = lit::<S>(opts.backtracking_factor);
    let min_increment = lit::<S>(MIN_INCREMENT);
    let max_growth = lit::<S>(MAX_STEP_GROWTH);
    let two = lit::<S>(2.);

    let mut x = x0.to_owned();
    let mut certificate = S::infinity();
    let mut success = false;
    let mut nit = 0;
    for iter in 1..=opts.max_iter {
        nit = iter;
        let forward = |step: S| prox_1((&z - &((&u + &grad_fz) * step)).view(), step);
        let mut x_next = forward(step);
        let mut incr = &x_next - &z;
        let mut norm_incr = norm(&incr);

        let line_search = backtracking && norm_incr > min_increment;
        // f(x) minus the quadratic upper bound, non-positive once accepted
        let mut ls_gap = S::zero();
        if line_search {
            let mut found = false;
            for _ in 0..opts.max_iter_backtracking {
                let rhs = fz + grad_fz.dot(&incr) + norm_incr * norm_incr / (two * step);
                ls_gap = f_grad(x_next.view()).0 - rhs;
                if ls_gap <= S::epsilon() {
                    found = true;
                    break;
                }
                step = step * factor;
                x_next = forward(step);
                incr = &x_next - &z;
                norm_incr = norm(&incr);
            }
            if !found {
                tracing::warn!(iteration = iter, "maximum number of line-search iterations reached");
            }
        }

        z = prox_2((&x_next + &(&u * step)).view(), step);
        u.scaled_add(S::one() / step, &(&x_next - &z));
        certificate = norm_incr / step;
        x = x_next;

        if line_search {
            if let Some(h) = opts.h_lipschitz {
                let grown = step * max_growth;
                step = if h == 0. {
                    grown
                } else {
                    let quot = lit::<S>(h * h);
                    (step * step - two * step / quot * ls_gap).sqrt().min(grown)
                };
            }
        }

        let (f, g) = f_grad(z.view());
        fz = f;
        grad_fz = g;

        tracing::trace!(iteration = iter, certificate = %certificate, step = %step);
        if callback(x.view(), iter) {
            break;
        }
        if iter > 1 && certificate < tol {
            success = true;
            break;
        }
    }
    tracing::debug!(success, nit, certificate = %certificate, "three operator splitting finished");
    Ok(OptimizeResult {
        x,
        success,
        nit,
        certificate,
        step_size: step,
    })
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::{SmoothLoss, SquareLoss};
    use crate::penalty::{prox_tv2d, L1Norm, Penalty, SimplexConstraint};
    use crate::prox::{minimize_proximal_gradient, ProximalGradientOptions};
    use crate::splitting::test_helpers::prox_tv_lines;
    use crate::utils::nop;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;

    #[test]
    fn tv2d_denoising_by_rows_and_columns() {
        let (r, c) = (4, 5);
        let mut w = Array::random(r * c, Normal::new(0., 1.).unwrap());
        w.slice_mut(s![..2 * c]).mapv_inplace(|v| v + 3.);
        let alpha = 0.3;
        let expected = prox_tv2d(w.view(), alpha, r, c, 10_000, 1e-12).unwrap();
        let x0 = Array1::zeros(r * c);

        let f_grad = |x: ArrayView1<f64>| {
            let d = &x - &w;
            (0.5 * d.dot(&d), d)
        };
        for h_lipschitz in vec![None, Some(0.)] {
            let opts = ThreeSplitOptions {
                tol: 1e-10,
                h_lipschitz,
                ..Default::default()
            };
            let res = minimize_three_split(
                f_grad,
                |x, s| prox_tv_lines(x, alpha * s, r, c, true),
                |x, s| prox_tv_lines(x, alpha * s, r, c, false),
                x0.view(),
                &opts,
                nop,
            )
            .unwrap();
            assert!(res.success);
            assert_abs_diff_eq!(res.x, expected, epsilon = 1e-7);
        }
    }

    #[test]
    fn lasso_with_identity_third_term() {
        let A = Array::random((40, 8), Normal::new(0., 1.).unwrap());
        let b = Array::random(40, Normal::new(0., 1.).unwrap());
        let loss = SquareLoss::new(A, b, 0.).unwrap();
        let l1 = L1Norm::new(0.1);
        let x0 = Array1::<f64>::zeros(8);

        let pgd = minimize_proximal_gradient(
            |x| loss.f_grad(x),
            |x, s| l1.prox(x, s),
            x0.view(),
            &ProximalGradientOptions {
                tol: 1e-12,
                max_iter: 20_000,
                ..Default::default()
            },
            nop,
        )
        .unwrap();
        // a positive constant for h lets the step grow between line searches
        for h_lipschitz in vec![None, Some(1.)] {
            let res = minimize_three_split(
                |x| loss.f_grad(x),
                |x, s| l1.prox(x, s),
                |x, _| x.to_owned(),
                x0.view(),
                &ThreeSplitOptions {
                    tol: 1e-10,
                    max_iter: 20_000,
                    h_lipschitz,
                    ..Default::default()
                },
                nop,
            )
            .unwrap();
            assert!(res.success);
            assert!(res.step_size.is_finite() && res.step_size > 0.);
            assert_abs_diff_eq!(res.x, pgd.x, epsilon = 1e-6);
        }
    }

    #[test]
    fn intersection_of_constraints() {
        // nearest point of {x >= 0, sum x = 1} ∩ {x_0 <= 0.2} to c
        let c = array![1., 0.5, 0.];
        let simplex = SimplexConstraint::new(1., 3);
        let f_grad = |x: ArrayView1<f64>| {
            let d = &x - &c;
            (0.5 * d.dot(&d), d)
        };
        let res = minimize_three_split(
            f_grad,
            |x, s| simplex.prox(x, s),
            |x, _| {
                let mut y = x.to_owned();
                y[0] = y[0].min(0.2);
                y
            },
            array![0., 0., 0.].view(),
            &ThreeSplitOptions {
                step: StepSize::Fixed(1.),
                tol: 1e-10,
                max_iter: 10_000,
                ..Default::default()
            },
            nop,
        )
        .unwrap();
        assert!(res.success);
        assert_abs_diff_eq!(res.x, array![0.2, 0.65, 0.15], epsilon = 1e-6);
    }

    #[test]
    fn stops_on_callback_and_rejects_bad_options() {
        let f_grad = |x: ArrayView1<f64>| (0.5 * x.dot(&x), x.to_owned());
        let id = |x: ArrayView1<f64>, _: f64| x.to_owned();
        let x0 = array![1., 2.];
        let res = minimize_three_split(
            f_grad,
            id,
            id,
            x0.view(),
            &ThreeSplitOptions::default(),
            |_, _| true,
        )
        .unwrap();
        assert_eq!(res.nit, 0);
        assert_eq!(res.x, x0);

        let bad = ThreeSplitOptions {
            h_lipschitz: Some(-1.),
            ..Default::default()
        };
        assert!(minimize_three_split(f_grad, id, id, x0.view(), &bad, nop).is_err());
        let bad = ThreeSplitOptions {
            backtracking_factor: 1.5,
            ..Default::default()
        };
        assert!(minimize_three_split(f_grad, id, id, x0.view(), &bad, nop).is_err());
    }
}
