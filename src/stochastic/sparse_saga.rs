use ndarray::prelude::*;
use ndarray::NdFloat;
use sprs::CsMatView;

use super::{check_problem, StochasticOptions};
use crate::error::{check_dim, OptimizeError, Result};
use crate::utils::{lit, norm, OptimizeResult};

/// Feature groups on which the proximal operator acts independently
struct Blocks {
    /// features of every block
    features: Vec<Vec<usize>>,
    /// blocks touched by the nonzeros of every sample
    support: Vec<Vec<usize>>,
    /// `n_samples / #{i : block g is in the support of sample i}`, 0 if unused
    scale: Vec<f64>,
}

impl Blocks {
    fn new<S>(A: &CsMatView<S>, blocks: Option<&[usize]>) -> Result<Self> {
        let n_features = A.cols();
        let assignment: Vec<usize> = match blocks {
            Some(b) => {
                check_dim("blocks", n_features, b.len())?;
                b.to_vec()
            }
            None => (0..n_features).collect(),
        };
        let n_blocks = assignment.iter().max().map_or(0, |&m| m + 1);
        let mut features = vec![Vec::new(); n_blocks];
        for (j, &g) in assignment.iter().enumerate() {
            features[g].push(j);
        }
        if let Some(g) = features.iter().position(Vec::is_empty) {
            return Err(OptimizeError::invalid(
                "blocks",
                format!("block ids must be contiguous, block {} is empty", g),
            ));
        }

        let (indptr, indices) = (A.indptr(), A.indices());
        let mut counts = vec![0usize; n_blocks];
        let support: Vec<Vec<usize>> = (0..A.rows())
            .map(|i| {
                let mut touched: Vec<usize> = indices[indptr[i]..indptr[i + 1]]
                    .iter()
                    .map(|&j| assignment[j])
                    .collect();
                touched.sort_unstable();
                touched.dedup();
                for &g in touched.iter() {
                    counts[g] += 1;
                }
                touched
            })
            .collect();
        let n = A.rows() as f64;
        let scale = counts
            .iter()
            .map(|&c| if c > 0 { n / c as f64 } else { 0. })
            .collect();
        Ok(Blocks {
            features,
            support,
            scale,
        })
    }

    /// Proximal operator applied block by block to the whole vector
    fn prox_all<S: NdFloat>(
        &self,
        prox: &impl Fn(ArrayView1<S>, S) -> Array1<S>,
        x: &Array1<S>,
        step: S,
    ) -> Result<Array1<S>> {
        let mut out = x.clone();
        for feats in self.features.iter() {
            let z: Array1<S> = feats.iter().map(|&j| x[j]).collect();
            let p = prox(z.view(), step);
            check_dim("prox output", feats.len(), p.len())?;
            for (&j, &v) in feats.iter().zip(p.iter()) {
                out[j] = v;
            }
        }
        Ok(out)
    }
}

/// SAGA for sparse design matrices
///
/// Same problem as [`minimize_saga`](super::minimize_saga), with `A` in
/// CSR format and $`g`$ separable over feature blocks: `blocks[j]` is the
/// block of feature `j` (contiguous ids starting at 0, every feature its
/// own block if `None`) and `prox` is the proximal operator of $`g`$
/// restricted to one block.
///
/// Each sample only updates the blocks its nonzeros touch. The dense part
/// $`\bar g + \alpha x`$ of the estimator and the proximal step are
/// reweighted by $`d_g = n / n_g`$, where $`n_g`$ is the number of samples
/// touching block $`g`$, which keeps the update unbiased:
/// ```math
/// x_g \leftarrow \mathrm{prox}_{\gamma d_g g}\left(x_g - \gamma\left((\delta_i - m_i) a_{i,g} + d_g(\bar g_g + \alpha x_g)\right)\right)
/// ```
/// Blocks outside the support of every sample are never updated.
///
/// The per-epoch certificate is that of [`minimize_saga`](super::minimize_saga).
///
/// References
/// ----------
/// Leblond, R., Pedregosa, F. and Lacoste-Julien, S. "ASAGA: Asynchronous
/// parallel SAGA." AISTATS (2017)
///
/// Pedregosa, F., Leblond, R. and Lacoste-Julien, S. "Breaking the
/// nonsmooth barrier: a scalable parallel method for composite
/// optimization." NeurIPS (2017)
#[allow(non_snake_case, clippy::too_many_arguments)]
pub fn minimize_sparse_saga<S>(
    f_deriv: impl Fn(S, S) -> S,
    A: CsMatView<S>,
    b: ArrayView1<S>,
    x0: ArrayView1<S>,
    prox: impl Fn(ArrayView1<S>, S) -> Array1<S>,
    blocks: Option<&[usize]>,
    opts: &StochasticOptions,
    mut callback: impl FnMut(ArrayView1<S>, usize) -> bool,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat,
{
    if !A.is_csr() {
        return Err(OptimizeError::invalid("A", "must be in CSR format"));
    }
    let mut sampler = check_problem((A.rows(), A.cols()), b.len(), x0.len(), opts)?;
    let blocks = Blocks::new(&A, blocks)?;
    let scale: Vec<S> = blocks.scale.iter().map(|&d| lit::<S>(d)).collect();
    let step = lit::<S>(opts.step_size);
    let alpha = lit::<S>(opts.alpha);
    let tol = lit::<S>(opts.tol);
    let n = lit::<S>(A.rows() as f64);
    let (indptr, indices, data) = (A.indptr(), A.indices(), A.data());

    let mut x = x0.to_owned();
    if callback(x.view(), 0) {
        return Ok(OptimizeResult::early(x, step));
    }
    let mut memory = Array1::<S>::zeros(A.rows());
    let mut average = Array1::<S>::zeros(A.cols());
    // sample part of the estimator, nonzero only on the current support
    let mut sample_grad = Array1::<S>::zeros(A.cols());

    let mut certificate = S::infinity();
    let mut success = false;
    let mut nit = 0;
    for epoch in 1..=opts.max_iter {
        nit = epoch;
        for &i in sampler.epoch() {
            let row = indptr[i]..indptr[i + 1];
            let (idx, vals) = (&indices[row.clone()], &data[row]);
            let p = idx
                .iter()
                .zip(vals)
                .fold(S::zero(), |acc, (&j, &a)| acc + a * x[j]);
            let deriv = f_deriv(p, b[i]);
            let delta = deriv - memory[i];
            for (&j, &a) in idx.iter().zip(vals) {
                sample_grad[j] += delta * a;
            }

            for &g in blocks.support[i].iter() {
                let feats = &blocks.features[g];
                let d_g = scale[g];
                let z: Array1<S> = feats
                    .iter()
                    .map(|&j| x[j] - step * (sample_grad[j] + (average[j] + alpha * x[j]) * d_g))
                    .collect();
                let x_g = prox(z.view(), step * d_g);
                check_dim("prox output", feats.len(), x_g.len())?;
                for (&j, &v) in feats.iter().zip(x_g.iter()) {
                    x[j] = v;
                    sample_grad[j] = S::zero();
                }
            }

            for (&j, &a) in idx.iter().zip(vals) {
                average[j] += delta * a / n;
            }
            memory[i] = deriv;
        }

        let mut forward = x.clone();
        forward.scaled_add(-step, &(&x * alpha + &average));
        certificate = norm(&(&x - &blocks.prox_all(&prox, &forward, step)?)) / step;

        tracing::debug!(epoch, certificate = %certificate, "sparse saga epoch");
        if callback(x.view(), epoch) {
            break;
        }
        if certificate < tol {
            success = true;
            break;
        }
    }
    if !success {
        tracing::info!(nit, certificate = %certificate, "sparse saga stopped before reaching tolerance");
    }
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
    use crate::loss::{compute_step_size, SmoothLoss, SquareLoss};
    use crate::penalty::{GroupL1, L1Norm, Penalty};
    use crate::prox::{minimize_proximal_gradient, ProximalGradientOptions};
    use crate::stochastic::minimize_saga;
    use crate::utils::nop;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use sprs::CsMat;

    fn to_csr(A: ArrayView2<f64>) -> CsMat<f64> {
        let mut indptr = vec![0];
        let mut indices = Vec::new();
        let mut data = Vec::new();
        for row in A.outer_iter() {
            for (j, &v) in row.iter().enumerate() {
                if v != 0. {
                    indices.push(j);
                    data.push(v);
                }
            }
            indptr.push(indices.len());
        }
        CsMat::new(A.dim(), indptr, indices, data)
    }

    /// Square loss on a design matrix with roughly half of its entries zero
    fn sparse_problem(alpha: f64) -> (SquareLoss<f64>, CsMat<f64>, f64) {
        let A = Array::random((60, 6), Normal::new(0., 1.).unwrap())
            .mapv(|v: f64| if v.abs() < 0.6 { 0. } else { v });
        let b = Array::random(60, Normal::new(0., 1.).unwrap());
        let csr = to_csr(A.view());
        let loss = SquareLoss::new(A, b, alpha).unwrap();
        let step = compute_step_size(&loss, 3.);
        (loss, csr, step)
    }

    fn reference(loss: &SquareLoss<f64>, penalty: &impl Penalty<f64>) -> Array1<f64> {
        minimize_proximal_gradient(
            |x| loss.f_grad(x),
            |x, s| penalty.prox(x, s),
            Array1::zeros(loss.n_features()).view(),
            &ProximalGradientOptions {
                tol: 1e-12,
                max_iter: 50_000,
                ..Default::default()
            },
            nop,
        )
        .unwrap()
        .x
    }

    #[test]
    fn sparse_lasso() {
        let (loss, csr, step) = sparse_problem(0.01);
        let l1 = L1Norm::new(0.02);
        let (_, b) = loss.data();
        let res = minimize_sparse_saga(
            |p, y| loss.partial_deriv(p, y),
            csr.view(),
            b,
            Array1::zeros(6).view(),
            |x, s| l1.prox(x, s),
            None,
            &StochasticOptions {
                step_size: step,
                alpha: 0.01,
                tol: 1e-8,
                max_iter: 2000,
                seed: Some(4),
            },
            nop,
        )
        .unwrap();
        assert!(res.success);
        assert_abs_diff_eq!(res.x, reference(&loss, &l1), epsilon = 1e-6);
    }

    #[test]
    fn sparse_group_lasso() {
        let (loss, csr, step) = sparse_problem(0.);
        let (_, b) = loss.data();
        let weight = 0.05;
        let penalty = GroupL1::new(weight, vec![vec![0, 1, 2], vec![3, 4], vec![5]], 6).unwrap();
        // block soft thresholding on a single group
        let block_prox = |x: ArrayView1<f64>, s: f64| {
            let nx = x.dot(&x).sqrt();
            let shrink = if nx > weight * s { 1. - weight * s / nx } else { 0. };
            &x * shrink
        };
        let res = minimize_sparse_saga(
            |p, y| loss.partial_deriv(p, y),
            csr.view(),
            b,
            Array1::zeros(6).view(),
            block_prox,
            Some(&[0, 0, 0, 1, 1, 2][..]),
            &StochasticOptions {
                step_size: step,
                tol: 1e-8,
                max_iter: 2000,
                seed: Some(9),
                ..Default::default()
            },
            nop,
        )
        .unwrap();
        assert!(res.success);
        assert_abs_diff_eq!(res.x, reference(&loss, &penalty), epsilon = 1e-6);
    }

    #[test]
    fn dense_rows_follow_saga() {
        // every sample touches every feature, so all block weights are one
        let A = Array::random((20, 4), Normal::new(0., 1.).unwrap());
        let b = Array::random(20, Normal::new(0., 1.).unwrap());
        let loss = SquareLoss::new(A.clone(), b.clone(), 0.1).unwrap();
        let csr = to_csr(A.view());
        let l1 = L1Norm::new(0.05);
        let opts = StochasticOptions {
            step_size: compute_step_size(&loss, 3.),
            alpha: 0.1,
            tol: 0.,
            max_iter: 3,
            seed: Some(21),
        };
        let sparse = minimize_sparse_saga(
            |p, y| loss.partial_deriv(p, y),
            csr.view(),
            b.view(),
            Array1::zeros(4).view(),
            |x, s| l1.prox(x, s),
            None,
            &opts,
            nop,
        )
        .unwrap();
        let dense = minimize_saga(
            |p, y| loss.partial_deriv(p, y),
            A.view(),
            b.view(),
            Array1::zeros(4).view(),
            |x, s| l1.prox(x, s),
            &opts,
            nop,
        )
        .unwrap();
        assert_eq!(sparse.nit, 3);
        assert_abs_diff_eq!(sparse.x, dense.x, epsilon = 1e-10);
        assert_abs_diff_eq!(sparse.certificate, dense.certificate, epsilon = 1e-8);
    }

    #[test]
    fn rejects_bad_blocks() {
        let (loss, csr, step) = sparse_problem(0.);
        let (_, b) = loss.data();
        let opts = StochasticOptions::with_step_size(step);
        let run = |blocks: Option<&[usize]>| {
            minimize_sparse_saga(
                |p, y| loss.partial_deriv(p, y),
                csr.view(),
                b,
                Array1::zeros(6).view(),
                |x, _| x.to_owned(),
                blocks,
                &opts,
                nop,
            )
        };
        assert!(run(Some(&[0, 0, 1][..])).is_err());
        // block 1 is never used
        assert!(run(Some(&[0, 0, 2, 2, 0, 0][..])).is_err());
        assert!(run(Some(&[0, 0, 1, 1, 0, 0][..])).is_ok());

        let csc = csr.to_csc();
        let res = minimize_sparse_saga(
            |p, y| loss.partial_deriv(p, y),
            csc.view(),
            b,
            Array1::zeros(6).view(),
            |x, _| x.to_owned(),
            None,
            &opts,
            nop,
        );
        assert!(res.is_err());
    }
}
