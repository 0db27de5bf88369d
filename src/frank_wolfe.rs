//! Frank-Wolfe (conditional gradient) methods
//!
//! Projection-free minimization of a smooth $`f`$ over a compact convex
//! set that is only accessed through a linear minimization oracle (LMO).
//! Iterates are convex combinations of points of the set and therefore
//! always feasible.
//!
//! The certificate of both solvers is the Frank-Wolfe gap
//! $`\langle d_i, -\nabla f(x_i) \rangle`$, an upper bound on
//! $`f(x_i) - f^\star`$ for the plain method.
//!
//! References
//! ----------
//! \[PNAJ20\]: Pedregosa, F., Negiar, G., Askari, A. and Jaggi, M.
//!             "Linearly convergent Frank-Wolfe with backtracking line-search."
//!             AISTATS (2020)
//!
//! \[LJ15\]: Lacoste-Julien, S. and Jaggi, M. "On the global linear
//!           convergence of Frank-Wolfe optimization variants." NeurIPS (2015)

use ndarray::prelude::*;
use ndarray::NdFloat;
use serde::{Deserialize, Serialize};

use crate::error::{check_dim, OptimizeError, Result};
use crate::penalty::Polytope;
use crate::utils::{lit, norm, OptimizeResult};

/// Step-size rule for the Frank-Wolfe solvers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrankWolfeStep {
    /// adaptive estimate of the local Lipschitz constant \[PNAJ20\]
    Backtracking,
    /// $`\min(g_i / (L\|d_i\|^2), \gamma_{max})`$
    DemyanovRubinov,
    /// $`2/(i+2)`$
    Sublinear,
}

/// Options for [`minimize_frank_wolfe`] and [`minimize_pairwise_frank_wolfe`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrankWolfeOptions {
    pub step: FrankWolfeStep,
    /// Lipschitz constant of $`\nabla f`$ (initial estimate when
    /// backtracking), estimated from a small gradient step if unset
    pub lipschitz: Option<f64>,
    pub tol: f64,
    pub max_iter: usize,
    pub max_iter_backtracking: usize,
}

impl Default for FrankWolfeOptions {
    fn default() -> Self {
        FrankWolfeOptions {
            step: FrankWolfeStep::Backtracking,
            lipschitz: None,
            tol: 1e-12,
            max_iter: 400,
            max_iter_backtracking: 100,
        }
    }
}

impl FrankWolfeOptions {
    fn validate(&self) -> Result<()> {
        if let Some(l) = self.lipschitz {
            if !(l > 0. && l.is_finite()) {
                return Err(OptimizeError::invalid(
                    "lipschitz",
                    "must be positive and finite",
                ));
            }
        }
        if self.step == FrankWolfeStep::Backtracking && self.max_iter_backtracking == 0 {
            return Err(OptimizeError::invalid(
                "max_iter_backtracking",
                "line search iterations need to be greater than 0",
            ));
        }
        Ok(())
    }
}

const RATIO_DECREASE: f64 = 0.9;
const RATIO_INCREASE: f64 = 2.;

/// Lipschitz estimate $`\|\nabla f(x) - \nabla f(x + \epsilon \nabla f(x))\| / (\epsilon \|\nabla f(x)\|)`$
fn estimate_lipschitz<S: NdFloat>(
    f_grad: &impl Fn(ArrayView1<S>) -> (S, Array1<S>),
    x: &Array1<S>,
    grad: &Array1<S>,
) -> S {
    let eps = lit::<S>(1e-3);
    let mut shifted = x.clone();
    shifted.scaled_add(eps, grad);
    let (_, grad_shifted) = f_grad(shifted.view());
    let estimate = norm(&(grad - &grad_shifted)) / (eps * norm(grad));
    // linear objectives and stationary starts give no curvature
    if estimate > S::epsilon() {
        estimate
    } else {
        S::epsilon()
    }
}

/// Current iterate and objective values passed to the line search
struct Point<'a, S> {
    x: &'a Array1<S>,
    f: S,
    old_f: Option<S>,
}

/// Accepted step of the backtracking line search
struct Step<S> {
    size: S,
    f_next: S,
    grad_next: Array1<S>,
}

/// Adaptive step of \[PNAJ20\]
///
/// Shrinks `lipschitz` towards the curvature observed at the last step,
/// then doubles it until the quadratic upper bound holds along `d`.
#[allow(clippy::too_many_arguments)]
fn backtracking_step<S: NdFloat>(
    f_grad: &impl Fn(ArrayView1<S>) -> (S, Array1<S>),
    point: Point<S>,
    d: &Array1<S>,
    certificate: S,
    max_step: S,
    lipschitz: &mut S,
    max_iter: usize,
) -> Step<S> {
    let half = lit::<S>(0.5);
    let two = lit::<S>(2.);
    let norm_d_sq = d.dot(d);
    if let Some(old_f) = point.old_f {
        let decrease = old_f - point.f;
        if decrease > S::zero() {
            let observed = certificate * certificate / (two * decrease * norm_d_sq);
            *lipschitz = observed
                .min(*lipschitz)
                .max(*lipschitz * lit::<S>(RATIO_DECREASE));
        }
    }
    let mut step = Step {
        size: S::zero(),
        f_next: point.f,
        grad_next: Array1::zeros(d.len()),
    };
    for _ in 0..max_iter {
        let mut size = certificate / (norm_d_sq * *lipschitz);
        let rhs = if size < max_step {
            -half * size * certificate
        } else {
            size = max_step;
            -size * certificate + half * size * size * *lipschitz * norm_d_sq
        };
        let mut x_next = point.x.clone();
        x_next.scaled_add(size, d);
        let (f_next, grad_next) = f_grad(x_next.view());
        step = Step {
            size,
            f_next,
            grad_next,
        };
        if f_next - point.f <= rhs + S::epsilon() {
            return step;
        }
        *lipschitz = *lipschitz * lit::<S>(RATIO_INCREASE);
    }
    tracing::warn!("maximum number of line-search iterations reached");
    step
}

/// Frank-Wolfe (conditional gradient) algorithm
///
/// Each iteration queries the oracle `lmo(u, x)` with $`u = -\nabla f(x)`$,
/// which returns an update direction $`d = s - x`$ for
/// $`s \in \mathrm{arg}\!\max_{s} \langle s, u \rangle`$ and the largest
/// admissible step along $`d`$. Then
/// ```math
/// x_{i+1} = x_i + \gamma_i d_i
/// ```
/// with $`\gamma_i`$ chosen by `opts.step`. Iteration stops once the
/// Frank-Wolfe gap $`\langle d_i, u_i \rangle`$ is at most `tol`.
///
/// Parameters
/// ----------
/// - __f_grad:__    value and gradient of $`f`$
/// - __lmo:__       linear minimization oracle, see
///                   [`Polytope::lmo`](crate::penalty::Polytope::lmo)
/// - __x0:__        feasible initial guess
/// - __opts:__      step rule, Lipschitz constant and stopping criteria
/// - __callback:__  user-defined function to be evaluated with two arguments (x,iter).
///                   It is evaluated at (x0,0) and then after each iteration.
///                   If it returns True, the function terminates early.
pub fn minimize_frank_wolfe<S>(
    f_grad: impl Fn(ArrayView1<S>) -> (S, Array1<S>),
    lmo: impl Fn(ArrayView1<S>, ArrayView1<S>) -> (Array1<S>, S),
    x0: ArrayView1<S>,
    opts: &FrankWolfeOptions,
    mut callback: impl FnMut(ArrayView1<S>, usize) -> bool,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat,
{
    opts.validate()?;
    let mut x = x0.to_owned();
    if callback(x.view(), 0) {
        return Ok(OptimizeResult::early(x, S::zero()));
    }
    let (mut f_t, mut grad) = f_grad(x.view());
    check_dim("gradient", x.len(), grad.len())?;
    let mut lipschitz = match opts.lipschitz {
        Some(l) => lit::<S>(l),
        None => estimate_lipschitz(&f_grad, &x, &grad),
    };

    let tol = lit::<S>(opts.tol);
    let mut old_f_t = None;
    let mut step_size = S::zero();
    let mut certificate = S::infinity();
    let mut success = false;
    let mut nit = 0;
    while nit < opts.max_iter {
        let u = grad.mapv(|g| -g);
        let (d, max_step) = lmo(u.view(), x.view());
        certificate = d.dot(&u);
        if certificate <= tol {
            success = true;
            break;
        }
        let norm_d_sq = d.dot(&d);
        match opts.step {
            FrankWolfeStep::Backtracking => {
                let point = Point {
                    x: &x,
                    f: f_t,
                    old_f: old_f_t,
                };
                let step = backtracking_step(
                    &f_grad,
                    point,
                    &d,
                    certificate,
                    max_step,
                    &mut lipschitz,
                    opts.max_iter_backtracking,
                );
                step_size = step.size;
                x.scaled_add(step_size, &d);
                old_f_t = Some(f_t);
                f_t = step.f_next;
                grad = step.grad_next;
            }
            FrankWolfeStep::DemyanovRubinov | FrankWolfeStep::Sublinear => {
                step_size = if opts.step == FrankWolfeStep::Sublinear {
                    lit::<S>(2.) / lit::<S>((nit + 2) as f64)
                } else {
                    (certificate / (lipschitz * norm_d_sq)).min(max_step)
                };
                x.scaled_add(step_size, &d);
                let (f, g) = f_grad(x.view());
                f_t = f;
                grad = g;
            }
        }
        nit += 1;

        tracing::trace!(iteration = nit, gap = %certificate, step = %step_size);
        if callback(x.view(), nit) {
            break;
        }
    }
    tracing::debug!(success, nit, gap = %certificate, "frank-wolfe finished");
    Ok(OptimizeResult {
        x,
        success,
        nit,
        certificate,
        step_size,
    })
}

/// Pairwise Frank-Wolfe
///
/// Keeps `x` as an explicit convex combination of vertices of `polytope`,
/// starting from the vertex `x0_vertex`. Each iteration moves weight from
/// the away vertex (the active vertex with the worst
/// $`\langle v, -\nabla f(x) \rangle`$) to the Frank-Wolfe vertex, so the
/// largest step is the weight of the away vertex. Vertices whose weight
/// drops to zero leave the active set.
///
/// The certificate is the pairwise gap
/// $`\langle s_i - v_i, -\nabla f(x_i) \rangle`$. The method converges
/// linearly for strongly convex $`f`$ \[LJ15\].
pub fn minimize_pairwise_frank_wolfe<S, P>(
    f_grad: impl Fn(ArrayView1<S>) -> (S, Array1<S>),
    polytope: &P,
    x0_vertex: usize,
    opts: &FrankWolfeOptions,
    mut callback: impl FnMut(ArrayView1<S>, usize) -> bool,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat,
    P: Polytope<S>,
{
    opts.validate()?;
    let n_vertices = polytope.n_vertices();
    if x0_vertex >= n_vertices {
        return Err(OptimizeError::invalid(
            "x0_vertex",
            format!("vertex {} out of {}", x0_vertex, n_vertices),
        ));
    }
    let mut weights = Array1::<S>::zeros(n_vertices);
    weights[x0_vertex] = S::one();
    let mut active: Vec<usize> = vec![x0_vertex];
    let mut x = polytope.vertex(x0_vertex);
    if callback(x.view(), 0) {
        return Ok(OptimizeResult::early(x, S::zero()));
    }
    let (mut f_t, mut grad) = f_grad(x.view());
    check_dim("gradient", x.len(), grad.len())?;
    let mut lipschitz = match opts.lipschitz {
        Some(l) => lit::<S>(l),
        None => estimate_lipschitz(&f_grad, &x, &grad),
    };

    let tol = lit::<S>(opts.tol);
    let mut old_f_t = None;
    let mut step_size = S::zero();
    let mut certificate = S::infinity();
    let mut success = false;
    let mut nit = 0;
    while nit < opts.max_iter {
        let u = grad.mapv(|g| -g);
        let s_t = polytope.lmo_vertex(u.view());
        let (v_t, v_dot) = active
            .iter()
            .map(|&k| (k, polytope.vertex_dot(k, u.view())))
            .fold((s_t, S::infinity()), |best, cur| {
                if cur.1 < best.1 {
                    cur
                } else {
                    best
                }
            });
        certificate = polytope.vertex_dot(s_t, u.view()) - v_dot;
        if certificate <= tol {
            success = true;
            break;
        }
        let mut d = Array1::<S>::zeros(x.len());
        polytope.add_vertex(s_t, S::one(), &mut d);
        polytope.add_vertex(v_t, -S::one(), &mut d);
        let norm_d_sq = d.dot(&d);
        let max_step = weights[v_t];

        match opts.step {
            FrankWolfeStep::Backtracking => {
                let point = Point {
                    x: &x,
                    f: f_t,
                    old_f: old_f_t,
                };
                let step = backtracking_step(
                    &f_grad,
                    point,
                    &d,
                    certificate,
                    max_step,
                    &mut lipschitz,
                    opts.max_iter_backtracking,
                );
                step_size = step.size;
                x.scaled_add(step_size, &d);
                old_f_t = Some(f_t);
                f_t = step.f_next;
                grad = step.grad_next;
            }
            FrankWolfeStep::DemyanovRubinov | FrankWolfeStep::Sublinear => {
                let step = if opts.step == FrankWolfeStep::Sublinear {
                    lit::<S>(2.) / lit::<S>((nit + 2) as f64)
                } else {
                    certificate / (lipschitz * norm_d_sq)
                };
                step_size = step.min(max_step);
                x.scaled_add(step_size, &d);
                let (f, g) = f_grad(x.view());
                f_t = f;
                grad = g;
            }
        }

        let was_inactive = weights[s_t] == S::zero();
        weights[s_t] += step_size;
        weights[v_t] -= step_size;
        if was_inactive && weights[s_t] > S::zero() {
            active.push(s_t);
        }
        if weights[v_t] <= S::zero() {
            weights[v_t] = S::zero();
            active.retain(|&k| k != v_t);
        }
        nit += 1;

        tracing::trace!(
            iteration = nit,
            gap = %certificate,
            step = %step_size,
            active = active.len()
        );
        if callback(x.view(), nit) {
            break;
        }
    }
    tracing::debug!(success, nit, gap = %certificate, "pairwise frank-wolfe finished");
    Ok(OptimizeResult {
        x,
        success,
        nit,
        certificate,
        step_size,
    })
}
