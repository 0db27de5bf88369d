use std::cmp::Ordering;

use ndarray::prelude::*;
use ndarray::NdFloat;

use super::l1::simplex_threshold;
use super::{argmax_by, feasibility_tol, Penalty, Polytope};

/// Indicator of the scaled simplex $`\{x \ge 0, \sum_i x_i = s\}`$
///
/// Vertices are $`s e_i`$.
#[derive(Debug, Clone, Copy)]
pub struct SimplexConstraint<S> {
    pub s: S,
    n_features: usize,
}

impl<S: NdFloat> SimplexConstraint<S> {
    pub fn new(s: S, n_features: usize) -> Self {
        SimplexConstraint { s, n_features }
    }
}

/// Euclidean projection onto $`\{x \ge 0, \sum_i x_i = s\}`$
pub fn project_simplex<S: NdFloat>(x: ArrayView1<S>, s: S) -> Array1<S> {
    let mut u: Vec<S> = x.to_vec();
    u.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    let theta = simplex_threshold(&u, s);
    x.mapv(|xi| (xi - theta).max(S::zero()))
}

impl<S: NdFloat> Penalty<S> for SimplexConstraint<S> {
    fn value(&self, x: ArrayView1<S>) -> S {
        let tol = feasibility_tol(self.s);
        let nonneg = x.iter().all(|&xi| xi >= -tol);
        if nonneg && (x.sum() - self.s).abs() <= tol {
            S::zero()
        } else {
            S::infinity()
        }
    }

    fn prox(&self, x: ArrayView1<S>, _step_size: S) -> Array1<S> {
        project_simplex(x, self.s)
    }
}

impl<S: NdFloat> Polytope<S> for SimplexConstraint<S> {
    fn dim(&self) -> usize {
        self.n_features
    }

    fn n_vertices(&self) -> usize {
        self.n_features
    }

    fn vertex_dot(&self, idx: usize, u: ArrayView1<S>) -> S {
        self.s * u[idx]
    }

    fn add_vertex(&self, idx: usize, scale: S, x: &mut Array1<S>) {
        x[idx] += scale * self.s;
    }

    fn lmo_vertex(&self, u: ArrayView1<S>) -> usize {
        argmax_by(u, |ui| ui)
    }
}
