use ndarray::prelude::*;
use ndarray::NdFloat;
use serde::{Deserialize, Serialize};

use crate::error::{check_backtracking, check_dim, check_step, Result};
use crate::utils::{init_lipschitz, lit, norm, OptimizeResult, StepSize};

/// Options for [`minimize_proximal_gradient`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximalGradientOptions {
    pub step: StepSize,
    /// use Nesterov/FISTA momentum
    pub accelerated: bool,
    /// tolerance on the norm of the gradient mapping
    pub tol: f64,
    pub max_iter: usize,
    pub max_iter_backtracking: usize,
    pub backtracking_factor: f64,
}

impl Default for ProximalGradientOptions {
    fn default() -> Self {
        ProximalGradientOptions {
            step: StepSize::Backtracking,
            accelerated: false,
            tol: 1e-6,
            max_iter: 500,
            max_iter_backtracking: 1000,
            backtracking_factor: 0.6,
        }
    }
}

/// Growth of the step between two line searches
const STEP_GROWTH: f64 = 1.1;

/// Proximal Gradient Descent with optional acceleration
///
/// Minimizes $`f(x) + g(x)`$ where $`f`$ is smooth and $`g`$ has an
/// inexpensive proximal operator.
///
/// Algorithm
/// ---------
/// ```math
/// x_{i+1} = \mathrm{prox}_{\gamma_i g}\left(y_i - \gamma_i \nabla f(y_i)\right)
/// ```
/// with $`y_i = x_i`$ for the plain method and the FISTA extrapolation
/// $`y_{i+1} = x_{i+1} + \frac{t_i - 1}{t_{i+1}}(x_{i+1} - x_i)`$ when
/// accelerated. With [`StepSize::Backtracking`] the step $`\gamma_i`$ is
/// shrunk until the sufficient decrease condition
/// ```math
/// f(x_{i+1}) \le f(y_i) + \langle \nabla f(y_i), x_{i+1} - y_i \rangle + \frac{1}{2\gamma_i}\|x_{i+1} - y_i\|^2
/// ```
/// holds, starting from $`1/L_0`$ where $`L_0`$ comes from
/// [`init_lipschitz`].
///
/// Iteration stops once the gradient mapping
/// $`\|y_i - x_{i+1}\| / \gamma_i`$ drops below `tol`.
///
/// Parameters
/// ----------
/// - __f_grad:__    returns value and gradient of $`f`$
/// - __prox:__      proximal operator of $`g`$, `prox(x, step)`
/// - __x0:__        initial guess
/// - __opts:__      step strategy, tolerance and iteration limits
/// - __callback:__  user-defined function to be evaluated with two arguments (x,iter).
///                   It is evaluated at (x0,0) and then after each iteration.
///                   If it returns True, the function terminates early.
///
/// References
/// ----------
/// Beck, A. and Teboulle, M. "A fast iterative shrinkage-thresholding
/// algorithm for linear inverse problems." SIAM Journal on Imaging
/// Sciences (2009)
pub fn minimize_proximal_gradient<S>(
    f_grad: impl Fn(ArrayView1<S>) -> (S, Array1<S>),
    prox: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    x0: ArrayView1<S>,
    opts: &ProximalGradientOptions,
    mut callback: impl FnMut(ArrayView1<S>, usize) -> bool,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat,
{
    check_backtracking(opts.max_iter_backtracking, opts.backtracking_factor)?;
    let (mut step, backtracking) = match opts.step {
        StepSize::Fixed(s) => {
            check_step(s)?;
            (lit::<S>(s), false)
        }
        StepSize::Backtracking => (S::one() / init_lipschitz(&f_grad, x0)?, true),
    };
    let (f0, grad0) = f_grad(x0);
    check_dim("gradient", x0.len(), grad0.len())?;

    let mut x = x0.to_owned();
    if callback(x.view(), 0) {
        return Ok(OptimizeResult::early(x, step));
    }

    let tol = lit::<S>(opts.tol);
    let factor = lit::<S>(opts.backtracking_factor);
    let growth = lit::<S>(STEP_GROWTH);
    let two = lit::<S>(2.);

    // extrapolated point and its objective, equal to x without momentum
    let mut y = x.clone();
    let (mut fy, mut grad_y) = (f0, grad0);
    let mut tk = S::one();

    let mut certificate = S::infinity();
    let mut success = false;
    let mut nit = 0;
    for iter in 1..=opts.max_iter {
        nit = iter;
        if backtracking && !opts.accelerated {
            step = step * growth;
        }
        let mut x_next = prox((&y - &(&grad_y * step)).view(), step);
        let (mut f_next, mut grad_next) = f_grad(x_next.view());

        if backtracking {
            let mut found = false;
            for _ in 0..opts.max_iter_backtracking {
                let d = &x_next - &y;
                if f_next <= fy + grad_y.dot(&d) + d.dot(&d) / (two * step) {
                    found = true;
                    break;
                }
                step = step * factor;
                x_next = prox((&y - &(&grad_y * step)).view(), step);
                let (f, g) = f_grad(x_next.view());
                f_next = f;
                grad_next = g;
            }
            if !found {
                tracing::warn!(iteration = iter, "maximum number of line-search iterations reached");
            }
        }

        certificate = norm(&(&y - &x_next)) / step;

        if opts.accelerated {
            let tk_next = (S::one() + (S::one() + lit::<S>(4.) * tk * tk).sqrt()) / two;
            let beta = (tk - S::one()) / tk_next;
            y = &x_next + &((&x_next - &x) * beta);
            tk = tk_next;
            x = x_next;
            let (f, g) = f_grad(y.view());
            fy = f;
            grad_y = g;
        } else {
            x = x_next;
            y.assign(&x);
            fy = f_next;
            grad_y = grad_next;
        }

        tracing::trace!(iteration = iter, certificate = %certificate, step = %step);
        if callback(x.view(), iter) {
            break;
        }
        if certificate < tol {
            success = true;
            break;
        }
    }
    tracing::debug!(
        success,
        nit,
        certificate = %certificate,
        "proximal gradient finished"
    );
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
    use crate::error::OptimizeError;
    use crate::loss::{LogLoss, SmoothLoss, SquareLoss};
    use crate::penalty::{L1Ball, L1Norm, Penalty};
    use crate::utils::{init_test_logger, nop, Trace};
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand_distr::{Normal, Uniform};
    use ndarray_rand::RandomExt;

    fn lasso_problem() -> (SquareLoss<f64>, L1Norm<f64>) {
        let A = array![[10., 0.], [0., 20.]];
        let y = array![50., 100.];
        (SquareLoss::new(A, y, 0.).unwrap(), L1Norm::new(1.))
    }

    #[test]
    fn lasso_closed_form() {
        // separable problem: x_j = soft(a_j y_j, n lambda) / a_j^2
        init_test_logger();
        let (loss, l1) = lasso_problem();
        let x0 = array![19., 44.];
        for &accelerated in &[false, true] {
            let opts = ProximalGradientOptions {
                accelerated,
                tol: 1e-10,
                max_iter: 5000,
                ..Default::default()
            };
            let res = minimize_proximal_gradient(
                |x| loss.f_grad(x),
                |x, s| l1.prox(x, s),
                x0.view(),
                &opts,
                nop,
            )
            .unwrap();
            assert!(res.success);
            assert_abs_diff_eq!(
                res.x,
                array![(500. - 2.) / 100., (2000. - 2.) / 400.],
                epsilon = 1e-8
            );
        }
    }

    #[test]
    fn fixed_step_matches_backtracking() {
        let (loss, l1) = lasso_problem();
        let x0 = array![0., 0.];
        let opts = ProximalGradientOptions {
            step: StepSize::Fixed(1. / loss.lipschitz()),
            tol: 1e-10,
            max_iter: 10000,
            ..Default::default()
        };
        let fixed = minimize_proximal_gradient(
            |x| loss.f_grad(x),
            |x, s| l1.prox(x, s),
            x0.view(),
            &opts,
            nop,
        )
        .unwrap();
        let adaptive = minimize_proximal_gradient(
            |x| loss.f_grad(x),
            |x, s| l1.prox(x, s),
            x0.view(),
            &ProximalGradientOptions::default(),
            nop,
        )
        .unwrap();
        assert!(fixed.success);
        assert_abs_diff_eq!(fixed.x, adaptive.x, epsilon = 1e-5);
    }

    #[test]
    fn accelerated_and_plain_agree() {
        let (n, p) = (100, 30);
        let A = Array::random((n, p), Normal::new(0., 1.).unwrap());
        let b = Array::random(n, Uniform::new(0., 1.));
        let loss = LogLoss::new(A, b, 0.).unwrap();
        let l1 = L1Norm::new(0.01);
        let step = StepSize::Fixed(1. / loss.lipschitz());
        let x0 = Array1::zeros(p);

        let run = |accelerated: bool| {
            let opts = ProximalGradientOptions {
                step,
                accelerated,
                tol: 1e-8,
                max_iter: 20000,
                ..Default::default()
            };
            minimize_proximal_gradient(
                |x| loss.f_grad(x),
                |x, s| l1.prox(x, s),
                x0.view(),
                &opts,
                nop,
            )
            .unwrap()
        };
        let plain = run(false);
        let fast = run(true);
        assert!(plain.success && fast.success);
        let objective = |x: ArrayView1<f64>| loss.value(x) + l1.value(x);
        assert_abs_diff_eq!(objective(plain.x.view()), objective(fast.x.view()), epsilon = 1e-6);
    }

    #[test]
    fn constrained_least_squares() {
        // projection onto the l1 ball as proximal operator
        let A = array![[1., 0.], [0., 1.]];
        let b = array![2., 1.];
        let loss = SquareLoss::new(A, b, 0.).unwrap();
        let ball = L1Ball::new(1., 2);
        let res = minimize_proximal_gradient(
            |x| loss.f_grad(x),
            |x, s| ball.prox(x, s),
            array![0., 0.].view(),
            &ProximalGradientOptions {
                tol: 1e-12,
                ..Default::default()
            },
            nop,
        )
        .unwrap();
        // closest point of the ball to (2, 1)
        assert_abs_diff_eq!(res.x, array![1., 0.], epsilon = 1e-8);
    }

    #[test]
    fn callback_and_errors() {
        let (loss, l1) = lasso_problem();
        let x0 = array![19., 44.];
        let res = minimize_proximal_gradient(
            |x| loss.f_grad(x),
            |x, s| l1.prox(x, s),
            x0.view(),
            &ProximalGradientOptions::default(),
            |_x, iter| iter == 0,
        )
        .unwrap();
        assert_eq!(res.nit, 0);
        assert_eq!(res.x, x0);
        assert!(!res.success);

        let mut trace = Trace::new();
        let res = minimize_proximal_gradient(
            |x| loss.f_grad(x),
            |x, s| l1.prox(x, s),
            x0.view(),
            &ProximalGradientOptions {
                max_iter: 7,
                tol: 0.,
                ..Default::default()
            },
            |x, _| trace.record(x),
        )
        .unwrap();
        assert_eq!(res.nit, 7);
        assert_eq!(trace.len(), 8);

        let bad = ProximalGradientOptions {
            step: StepSize::Fixed(-1.),
            ..Default::default()
        };
        assert!(minimize_proximal_gradient(
            |x| loss.f_grad(x),
            |x, s| l1.prox(x, s),
            x0.view(),
            &bad,
            nop
        )
        .is_err());
        let bad = ProximalGradientOptions {
            max_iter_backtracking: 0,
            ..Default::default()
        };
        assert!(minimize_proximal_gradient(
            |x| loss.f_grad(x),
            |x, s| l1.prox(x, s),
            x0.view(),
            &bad,
            nop
        )
        .is_err());

        // wrong gradient length is reported before the initial step size search
        let res = minimize_proximal_gradient(
            |x: ArrayView1<f64>| (x.sum(), Array1::ones(3)),
            |x, s| l1.prox(x, s),
            x0.view(),
            &ProximalGradientOptions::default(),
            nop,
        );
        assert_eq!(
            res.err(),
            Some(OptimizeError::DimensionMismatch {
                what: "gradient",
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn options_from_toml() {
        let opts: ProximalGradientOptions = toml::from_str(
            r#"
            accelerated = true
            tol = 1e-8
            step = "backtracking"
            "#,
        )
        .unwrap();
        assert!(opts.accelerated);
        assert_eq!(opts.tol, 1e-8);
        assert_eq!(opts.step, StepSize::Backtracking);
        assert_eq!(opts.max_iter, 500);
    }
}
