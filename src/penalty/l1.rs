use std::cmp::Ordering;

use ndarray::prelude::*;
use ndarray::NdFloat;

use super::{argmax_by, feasibility_tol, Penalty, Polytope};

/// Soft thresholding, the proximal operator of $`t\|\cdot\|_1`$
pub fn soft_threshold<S: NdFloat>(x: ArrayView1<S>, t: S) -> Array1<S> {
    x.mapv(|xi| (xi - t).max(S::zero()) - (-xi - t).max(S::zero()))
}

/// $`\alpha \|x\|_1`$
#[derive(Debug, Clone, Copy)]
pub struct L1Norm<S> {
    pub alpha: S,
}

impl<S: NdFloat> L1Norm<S> {
    pub fn new(alpha: S) -> Self {
        L1Norm { alpha }
    }
}

impl<S: NdFloat> Penalty<S> for L1Norm<S> {
    fn value(&self, x: ArrayView1<S>) -> S {
        self.alpha * x.fold(S::zero(), |acc, &xi| acc + xi.abs())
    }

    fn prox(&self, x: ArrayView1<S>, step_size: S) -> Array1<S> {
        soft_threshold(x, self.alpha * step_size)
    }
}

/// Indicator of the $`\ell_1`$ ball of radius $`\alpha`$
///
/// Vertices are $`+\alpha e_i`$ (index `i`) and $`-\alpha e_i`$ (index
/// `n + i`) for a ball in $`\mathbb{R}^n`$.
#[derive(Debug, Clone, Copy)]
pub struct L1Ball<S> {
    pub alpha: S,
    n_features: usize,
}

impl<S: NdFloat> L1Ball<S> {
    pub fn new(alpha: S, n_features: usize) -> Self {
        L1Ball { alpha, n_features }
    }
}

/// Euclidean projection onto $`\{x : \|x\|_1 \le \alpha\}`$
///
/// Sort-based algorithm of Duchi, Shalev-Shwartz, Singer and Chandra,
/// "Efficient projections onto the l1-ball for learning in high
/// dimensions", ICML 2008.
pub fn project_l1_ball<S: NdFloat>(x: ArrayView1<S>, alpha: S) -> Array1<S> {
    if alpha <= S::zero() {
        return Array1::zeros(x.len());
    }
    let l1 = x.fold(S::zero(), |acc, &xi| acc + xi.abs());
    if l1 <= alpha {
        return x.to_owned();
    }
    let mut u: Vec<S> = x.iter().map(|xi| xi.abs()).collect();
    u.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    let theta = simplex_threshold(&u, alpha);
    x.mapv(|xi| xi.signum() * (xi.abs() - theta).max(S::zero()))
}

/// Threshold $`\theta`$ such that $`\sum_i \max(u_i - \theta, 0) = s`$
/// for `u` sorted in decreasing order
pub(crate) fn simplex_threshold<S: NdFloat>(u: &[S], s: S) -> S {
    let mut cssv = S::zero();
    let mut theta = S::zero();
    for (j, &uj) in u.iter().enumerate() {
        cssv += uj;
        let t = (cssv - s) / S::from(j + 1).unwrap();
        if uj > t {
            theta = t;
        } else {
            break;
        }
    }
    theta
}

impl<S: NdFloat> Penalty<S> for L1Ball<S> {
    fn value(&self, x: ArrayView1<S>) -> S {
        let l1 = x.fold(S::zero(), |acc, &xi| acc + xi.abs());
        if l1 <= self.alpha + feasibility_tol(self.alpha) {
            S::zero()
        } else {
            S::infinity()
        }
    }

    fn prox(&self, x: ArrayView1<S>, _step_size: S) -> Array1<S> {
        project_l1_ball(x, self.alpha)
    }
}

impl<S: NdFloat> Polytope<S> for L1Ball<S> {
    fn dim(&self) -> usize {
        self.n_features
    }

    fn n_vertices(&self) -> usize {
        2 * self.n_features
    }

    fn vertex_dot(&self, idx: usize, u: ArrayView1<S>) -> S {
        let n = self.n_features;
        if idx < n {
            self.alpha * u[idx]
        } else {
            -self.alpha * u[idx - n]
        }
    }

    fn add_vertex(&self, idx: usize, scale: S, x: &mut Array1<S>) {
        let n = self.n_features;
        if idx < n {
            x[idx] += scale * self.alpha;
        } else {
            x[idx - n] -= scale * self.alpha;
        }
    }

    fn lmo_vertex(&self, u: ArrayView1<S>) -> usize {
        let i = argmax_by(u, |ui| ui.abs());
        if u[i] >= S::zero() {
            i
        } else {
            self.n_features + i
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn soft_thresholding() {
        let x = array![3., -0.5, 0.2, -4.];
        let l1 = L1Norm::new(0.5);
        assert_abs_diff_eq!(l1.prox(x.view(), 2.), array![2., 0., 0., -3.]);
        assert_abs_diff_eq!(l1.value(x.view()), 3.85, epsilon = 1e-12);
        // zero step is the identity
        assert_abs_diff_eq!(l1.prox(x.view(), 0.), x);
    }

    #[test]
    fn l1_ball_projection() {
        let x = array![3., -1., 0.5];
        let p = project_l1_ball(x.view(), 2.);
        // theta = 1: [2, 0, 0]
        assert_abs_diff_eq!(p, array![2., 0., 0.]);

        let x = array![1., -1., 1., -1.];
        let p = project_l1_ball(x.view(), 2.);
        assert_abs_diff_eq!(p, array![0.5, -0.5, 0.5, -0.5]);

        // interior points are fixed
        let x = array![0.1, -0.2];
        assert_abs_diff_eq!(project_l1_ball(x.view(), 1.), x);
        assert_abs_diff_eq!(project_l1_ball(x.view(), 0.), array![0., 0.]);
    }

    #[test]
    fn l1_ball_projection_is_idempotent() {
        let x = array![0.3, -2.2, 1.7, 0.05, -0.9];
        let p = project_l1_ball(x.view(), 1.5);
        assert_abs_diff_eq!(p.mapv(f64::abs).sum(), 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(project_l1_ball(p.view(), 1.5), p, epsilon = 1e-12);
    }

    #[test]
    fn l1_ball_indicator() {
        let ball = L1Ball::new(1., 3);
        assert_eq!(ball.value(array![0.5, -0.5, 0.].view()), 0.);
        assert!(f64::is_infinite(ball.value(array![0.5, -0.6, 0.].view())));
    }

    #[test]
    fn l1_ball_vertices() {
        let ball = L1Ball::new(2., 3);
        assert_eq!(ball.n_vertices(), 6);
        let u = array![0.5, -3., 1.];
        let idx = ball.lmo_vertex(u.view());
        assert_eq!(idx, 4);
        assert_eq!(ball.vertex(idx), array![0., -2., 0.]);
        assert_abs_diff_eq!(ball.vertex_dot(idx, u.view()), 6.);

        let x = array![0.5, 0.5, 0.];
        let (d, max_step) = ball.lmo(u.view(), x.view());
        assert_eq!(d, array![-0.5, -2.5, 0.]);
        assert_eq!(max_step, 1.);
    }
}
