use ndarray::prelude::*;
use ndarray::NdFloat;

use super::Penalty;
use crate::error::{OptimizeError, Result};

/// Group lasso penalty $`\alpha \sum_g \|x_g\|_2`$
///
/// Groups are disjoint lists of coordinates. Coordinates that belong to
/// no group are left unpenalized.
#[derive(Debug, Clone)]
pub struct GroupL1<S> {
    pub alpha: S,
    groups: Vec<Vec<usize>>,
}

impl<S: NdFloat> GroupL1<S> {
    /// Checks that every index is below `n_features` and that no
    /// coordinate appears in two groups.
    pub fn new(alpha: S, groups: Vec<Vec<usize>>, n_features: usize) -> Result<Self> {
        let mut seen = vec![false; n_features];
        for g in &groups {
            for &j in g {
                if j >= n_features {
                    return Err(OptimizeError::invalid(
                        "groups",
                        format!("index {} out of bounds for {} features", j, n_features),
                    ));
                }
                if seen[j] {
                    return Err(OptimizeError::invalid(
                        "groups",
                        format!("coordinate {} belongs to more than one group", j),
                    ));
                }
                seen[j] = true;
            }
        }
        Ok(GroupL1 { alpha, groups })
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    fn group_norm(g: &[usize], x: &ArrayView1<S>) -> S {
        g.iter().fold(S::zero(), |acc, &j| acc + x[j] * x[j]).sqrt()
    }
}

impl<S: NdFloat> Penalty<S> for GroupL1<S> {
    fn value(&self, x: ArrayView1<S>) -> S {
        self.alpha
            * self
                .groups
                .iter()
                .fold(S::zero(), |acc, g| acc + Self::group_norm(g, &x))
    }

    /// Block soft thresholding
    fn prox(&self, x: ArrayView1<S>, step_size: S) -> Array1<S> {
        let t = self.alpha * step_size;
        let mut out = x.to_owned();
        for g in &self.groups {
            let norm = Self::group_norm(g, &x);
            let scale = if norm > t {
                S::one() - t / norm
            } else {
                S::zero()
            };
            for &j in g {
                out[j] *= scale;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn block_soft_thresholding() {
        let penalty = GroupL1::new(1., vec![vec![0, 1], vec![2, 3]], 5).unwrap();
        let x = array![3., 4., 0.3, -0.4, 7.];
        assert_abs_diff_eq!(penalty.value(x.view()), 5.5, epsilon = 1e-12);

        let p = penalty.prox(x.view(), 1.);
        // first group shrinks by 1/5, second vanishes, last coordinate is free
        assert_abs_diff_eq!(p, array![2.4, 3.2, 0., 0., 7.], epsilon = 1e-12);
    }

    #[test]
    fn overlapping_groups_are_rejected() {
        assert!(GroupL1::new(1., vec![vec![0, 1], vec![1, 2]], 3).is_err());
        assert!(GroupL1::new(1., vec![vec![0, 3]], 3).is_err());
        let ok = GroupL1::new(1., vec![vec![2], vec![0]], 3).unwrap();
        assert_eq!(ok.groups().len(), 2);
    }
}
