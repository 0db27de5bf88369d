//! The `ndarray-composite` crate provides optimization algorithms for
//! composite problems over `ndarray` vectors, i.e. objectives that are a
//! sum of a smooth term and one or more non-smooth (but simple) terms.
//!
//! It includes:
//! - Proximal gradient descent, FISTA and POGM ([`prox`])
//! - Davis-Yin three operator splitting and primal-dual hybrid gradient ([`splitting`])
//! - Frank-Wolfe and pairwise Frank-Wolfe ([`frank_wolfe`])
//! - SAGA, SVRG and variance-reduced three operator splitting ([`stochastic`])
//!
//! together with the building blocks these methods need: smooth losses for
//! linear models ([`loss`]), penalties with their proximal operators and
//! linear minimization oracles ([`penalty`]), and linear operators
//! ([`linop`]).
//!
//! Every solver takes plain closures for the objective terms, an options
//! struct (deserializable from configuration files) and a callback that is
//! evaluated at `(x0, 0)` and after every iteration, and may stop the
//! solver by returning `true`. Solvers return a [`utils::OptimizeResult`]
//! or an [`error::OptimizeError`] for malformed input.
//!
//! Progress is reported through `tracing` events: per-iteration detail at
//! `TRACE`/`DEBUG`, and a `WARN` when an inner line search or proximal
//! sub-solver runs out of iterations.
//!
//! This crate is in the early development stage and is actively changing.

#![cfg_attr(all(rustc_nightly, test), feature(test))]
#[cfg(all(rustc_nightly, test))]
extern crate test;

pub mod error;
pub mod frank_wolfe;
pub mod linop;
pub mod loss;
pub mod penalty;
pub mod prox;
pub mod splitting;
pub mod stochastic;
pub mod utils;

pub use error::{OptimizeError, Result};
pub use utils::{OptimizeResult, StepSize};
