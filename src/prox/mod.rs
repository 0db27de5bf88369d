//! Minimization for Composite Functions consisting of
//! L-smooth _f_ and non-smooth prox-friendly _g_
//!
//! This includes common objective functions such as the LASSO
//! as well as smooth constrained methods, as a projection is
//! the proximal operator of a constraint set.
//!
//! [`minimize_proximal_gradient`] needs no knowledge of the Lipschitz
//! constant of $`\nabla f`$ and adapts its step by backtracking.
//! [`fista`] and [`pogm`] take the Lipschitz constant (and optionally a
//! strong convexity parameter) and only need gradients.

mod proximal_gradient;
pub use proximal_gradient::*;

mod pogm;
pub use pogm::*;

mod fista;
pub use fista::*;
