//! Non-smooth penalties and constraint sets
//!
//! Each penalty $`g`$ knows its value and its proximal operator
//! ```math
//! \mathrm{prox}_{\gamma g}(x) = \mathrm{arg}\!\min_z \, g(z) + \frac{1}{2\gamma}\|z - x\|_2^2
//! ```
//! The indicator of a closed convex set has the Euclidean projection as
//! its proximal operator, so constraint sets are penalties too. Sets with
//! a finite number of extreme points additionally implement [`Polytope`]
//! and can be used with the Frank-Wolfe solvers.
//!
//! Solvers take plain closures, so a penalty is passed as
//! `|x, step| penalty.prox(x, step)`.

use ndarray::prelude::*;
use ndarray::NdFloat;

mod l1;
pub use l1::*;
mod group;
pub use group::*;
mod simplex;
pub use simplex::*;
mod tv;
pub use tv::*;

pub trait Penalty<S: NdFloat> {
    fn value(&self, x: ArrayView1<S>) -> S;

    /// Proximal operator with step size `step_size`
    fn prox(&self, x: ArrayView1<S>, step_size: S) -> Array1<S>;
}

/// Constraint set given as the convex hull of finitely many vertices
///
/// Vertices are addressed by index so that Frank-Wolfe methods can keep
/// an active set without storing dense vectors.
pub trait Polytope<S: NdFloat> {
    /// Dimension of the ambient space
    fn dim(&self) -> usize;

    fn n_vertices(&self) -> usize;

    /// $`\langle v_{idx}, u \rangle`$
    fn vertex_dot(&self, idx: usize, u: ArrayView1<S>) -> S;

    /// `x += scale * v_idx`
    fn add_vertex(&self, idx: usize, scale: S, x: &mut Array1<S>);

    /// Index of a vertex maximizing $`\langle v, u \rangle`$
    fn lmo_vertex(&self, u: ArrayView1<S>) -> usize;

    fn vertex(&self, idx: usize) -> Array1<S> {
        let mut v = Array1::zeros(self.dim());
        self.add_vertex(idx, S::one(), &mut v);
        v
    }

    /// Linear minimization oracle for
    /// [`minimize_frank_wolfe`](crate::frank_wolfe::minimize_frank_wolfe)
    ///
    /// Returns the update direction $`s - x`$, where $`s`$ maximizes
    /// $`\langle s, u \rangle`$ over the set, together with the largest
    /// admissible step size (always 1).
    fn lmo(&self, u: ArrayView1<S>, x: ArrayView1<S>) -> (Array1<S>, S) {
        let mut d = x.mapv(|v| -v);
        self.add_vertex(self.lmo_vertex(u), S::one(), &mut d);
        (d, S::one())
    }
}

/// The zero penalty, whose proximal operator is the identity
#[derive(Debug, Clone, Copy, Default)]
pub struct Zero;

impl<S: NdFloat> Penalty<S> for Zero {
    fn value(&self, _x: ArrayView1<S>) -> S {
        S::zero()
    }

    fn prox(&self, x: ArrayView1<S>, _step_size: S) -> Array1<S> {
        x.to_owned()
    }
}

/// Feasibility slack for indicator values, relative to the set's scale
pub(crate) fn feasibility_tol<S: NdFloat>(scale: S) -> S {
    S::epsilon().sqrt() * (S::one() + scale.abs())
}

/// Index of the largest element according to `key`, first one on ties
pub(crate) fn argmax_by<S: NdFloat>(u: ArrayView1<S>, key: impl Fn(S) -> S) -> usize {
    let mut best = 0;
    let mut best_val = S::neg_infinity();
    for (i, &ui) in u.iter().enumerate() {
        let val = key(ui);
        if val > best_val {
            best = i;
            best_val = val;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_penalty() {
        let x = array![1., -2., 3.];
        assert_eq!(Penalty::<f64>::value(&Zero, x.view()), 0.);
        assert_eq!(Zero.prox(x.view(), 10.), x);
    }

    #[test]
    fn argmax_first_on_ties() {
        let u = array![1., -3., 3., 2.];
        assert_eq!(argmax_by(u.view(), |v| v), 2);
        assert_eq!(argmax_by(u.view(), f64::abs), 1);
    }
}
