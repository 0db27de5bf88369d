//! Errors reported when a problem or its options are malformed
//!
//! Running out of iterations is not an error: solvers report it through
//! [`OptimizeResult::success`](crate::utils::OptimizeResult).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizeError {
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("step size must be positive and finite, got {0}")]
    InvalidStepSize(f64),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("problem has no samples or no features")]
    EmptyProblem,
}

pub type Result<T> = std::result::Result<T, OptimizeError>;

impl OptimizeError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        OptimizeError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Checks that `found == expected`, naming the offending quantity otherwise.
pub(crate) fn check_dim(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(OptimizeError::DimensionMismatch {
            what,
            expected,
            found,
        })
    }
}

/// Backtracking parameters shared by the line-search based solvers.
pub(crate) fn check_backtracking(max_iter_backtracking: usize, factor: f64) -> Result<()> {
    if max_iter_backtracking == 0 {
        return Err(OptimizeError::invalid(
            "max_iter_backtracking",
            "line search iterations need to be greater than 0",
        ));
    }
    if !(factor > 0. && factor < 1.) {
        return Err(OptimizeError::invalid(
            "backtracking_factor",
            format!("must lie in (0, 1), got {}", factor),
        ));
    }
    Ok(())
}

pub(crate) fn check_step(step: f64) -> Result<()> {
    if step > 0. && step.is_finite() {
        Ok(())
    } else {
        Err(OptimizeError::InvalidStepSize(step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = check_dim("x0", 3, 4).unwrap_err();
        assert_eq!(
            err.to_string(),
            "dimension mismatch for x0: expected 3, found 4"
        );
        assert_eq!(
            check_step(-1.).unwrap_err(),
            OptimizeError::InvalidStepSize(-1.)
        );
        assert!(check_step(f64::INFINITY).is_err());
        assert!(check_step(0.5).is_ok());
    }

    #[test]
    fn backtracking_parameters() {
        assert!(check_backtracking(0, 0.5).is_err());
        assert!(check_backtracking(10, 1.0).is_err());
        assert!(check_backtracking(10, 0.0).is_err());
        assert!(check_backtracking(10, 0.7).is_ok());
    }
}
