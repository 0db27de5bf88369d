//! Abstract Linear Operators and Adjoints
//! building upon ndarray_linalg::operator
//!
//! The primal-dual solver works with any operator pair implementing
//! [`LinearOperator`] and [`Adjoint`]: dense matrices, diagonals, the
//! identity, and the matrix-free finite differences used for total
//! variation.

use std::marker::PhantomData;

use ndarray::prelude::*;
use ndarray::{Data, DataMut, DataOwned, NdFloat};
pub use ndarray_linalg::diagonal::Diagonal;
pub use ndarray_linalg::operator::LinearOperator;
use ndarray_linalg::Scalar;
use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::utils::{lit, norm};

pub trait Adjoint<'a> {
    type Output;
    fn adj(&'a self) -> Self::Output;
}

impl<'a, A, S> Adjoint<'a> for ArrayBase<S, Ix2>
where
    A: 'a + Float,
    S: Data<Elem = A>,
{
    type Output = ArrayView<'a, A, Ix2>;

    fn adj(&'a self) -> Self::Output {
        self.t()
    }
}

/// Borrowed adjoint of an operator that is its own adjoint
pub struct SelfAdjoint<'a, T>(&'a T);

impl<'a, T> LinearOperator for SelfAdjoint<'a, T>
where
    T: LinearOperator,
{
    type Elem = T::Elem;

    #[inline]
    fn apply<S>(&self, a: &ArrayBase<S, Ix1>) -> Array1<S::Elem>
    where
        S: Data<Elem = Self::Elem>,
    {
        self.0.apply(a)
    }

    #[inline]
    fn apply_mut<S>(&self, a: &mut ArrayBase<S, Ix1>)
    where
        S: DataMut<Elem = Self::Elem>,
    {
        self.0.apply_mut(a)
    }
}

impl<'a, A, Sa> Adjoint<'a> for Diagonal<Sa>
where
    A: 'a + Float,
    Sa: 'a + Data<Elem = A>,
{
    type Output = SelfAdjoint<'a, Diagonal<Sa>>;

    fn adj(&'a self) -> Self::Output {
        SelfAdjoint(self)
    }
}

#[derive(Default)]
pub struct Identity<A> {
    phantom: PhantomData<*const A>,
}

impl<A> Identity<A> {
    #[must_use]
    pub fn new() -> Identity<A> {
        Identity {
            phantom: PhantomData,
        }
    }
}

impl<A> LinearOperator for Identity<A>
where
    A: NdFloat + Scalar,
{
    type Elem = A;

    #[inline]
    fn apply<S>(&self, a: &ArrayBase<S, Ix1>) -> Array1<S::Elem>
    where
        S: Data<Elem = Self::Elem>,
    {
        a.to_owned()
    }

    #[inline]
    fn apply_mut<S>(&self, _a: &mut ArrayBase<S, Ix1>)
    where
        S: DataMut<Elem = Self::Elem>,
    {
    }

    #[inline]
    fn apply_into<S>(&self, a: ArrayBase<S, Ix1>) -> ArrayBase<S, Ix1>
    where
        S: DataOwned<Elem = Self::Elem> + DataMut,
    {
        a
    }
}

impl<'a, A: 'a> Adjoint<'a> for Identity<A> {
    type Output = SelfAdjoint<'a, Identity<A>>;

    fn adj(&'a self) -> Self::Output {
        SelfAdjoint(self)
    }
}

/// Forward differences of an image stored row-major in a vector
///
/// For every pixel `(i, j)`, in row-major order, the output holds
/// `x[i,j] - x[i+1,j]` (when `i < n_rows - 1`) followed by
/// `x[i,j] - x[i,j+1]` (when `j < n_cols - 1`), so that
/// $`\|Dx\|_1`$ is the anisotropic 2D total variation of the image.
#[derive(Debug, Clone, Copy)]
pub struct FiniteDifference2D<A> {
    n_rows: usize,
    n_cols: usize,
    phantom: PhantomData<*const A>,
}

/// Adjoint of [`FiniteDifference2D`], a negative divergence
#[derive(Debug, Clone, Copy)]
pub struct FiniteDifference2DAdjoint<A> {
    n_rows: usize,
    n_cols: usize,
    phantom: PhantomData<*const A>,
}

impl<A> FiniteDifference2D<A> {
    #[must_use]
    pub fn new(n_rows: usize, n_cols: usize) -> FiniteDifference2D<A> {
        FiniteDifference2D {
            n_rows,
            n_cols,
            phantom: PhantomData,
        }
    }

    /// Number of image pixels (input length)
    pub fn n_features(&self) -> usize {
        self.n_rows * self.n_cols
    }

    /// Number of differences (output length)
    pub fn n_differences(&self) -> usize {
        let (r, c) = (self.n_rows, self.n_cols);
        r.saturating_sub(1) * c + r * c.saturating_sub(1)
    }
}

impl<A> LinearOperator for FiniteDifference2D<A>
where
    A: NdFloat + Scalar,
{
    type Elem = A;

    fn apply<S>(&self, a: &ArrayBase<S, Ix1>) -> Array1<A>
    where
        S: Data<Elem = A>,
    {
        let (r, c) = (self.n_rows, self.n_cols);
        assert_eq!(a.len(), r * c, "input is not a {}x{} image", r, c);
        let mut out = Vec::with_capacity(self.n_differences());
        for i in 0..r {
            for j in 0..c {
                let here = a[i * c + j];
                if i + 1 < r {
                    out.push(here - a[(i + 1) * c + j]);
                }
                if j + 1 < c {
                    out.push(here - a[i * c + j + 1]);
                }
            }
        }
        Array1::from(out)
    }
}

impl<A> LinearOperator for FiniteDifference2DAdjoint<A>
where
    A: NdFloat + Scalar,
{
    type Elem = A;

    fn apply<S>(&self, a: &ArrayBase<S, Ix1>) -> Array1<A>
    where
        S: Data<Elem = A>,
    {
        let (r, c) = (self.n_rows, self.n_cols);
        let mut out = Array1::<A>::zeros(r * c);
        let mut k = 0;
        for i in 0..r {
            for j in 0..c {
                if i + 1 < r {
                    out[i * c + j] += a[k];
                    out[(i + 1) * c + j] -= a[k];
                    k += 1;
                }
                if j + 1 < c {
                    out[i * c + j] += a[k];
                    out[i * c + j + 1] -= a[k];
                    k += 1;
                }
            }
        }
        out
    }
}

impl<'a, A: 'a> Adjoint<'a> for FiniteDifference2D<A> {
    type Output = FiniteDifference2DAdjoint<A>;

    fn adj(&'a self) -> Self::Output {
        FiniteDifference2DAdjoint {
            n_rows: self.n_rows,
            n_cols: self.n_cols,
            phantom: PhantomData,
        }
    }
}

/// Largest singular value of `op` by power iteration on `op^H op`
///
/// `dim` is the input dimension of `op`.
pub fn operator_norm<'b, S, R, Q>(op: &'b R, dim: usize, maxiter: usize) -> S
where
    S: NdFloat + Scalar,
    R: 'b + LinearOperator<Elem = S> + Adjoint<'b, Output = Q>,
    Q: LinearOperator<Elem = S>,
{
    if dim == 0 {
        return S::zero();
    }
    let adjoint = op.adj();
    let mut rng = StdRng::seed_from_u64(0);
    let mut v: Array1<S> = Array1::from(
        (0..dim)
            .map(|_| lit::<S>(rng.gen_range(-1.0..1.0)))
            .collect::<Vec<_>>(),
    );
    let mut lambda = S::zero();
    let tol = lit::<S>(1e-12);
    for _iter in 0..maxiter {
        let v_norm: S = norm(&v);
        if v_norm == S::zero() {
            break;
        }
        v /= v_norm;
        let w = adjoint.apply(&op.apply(&v));
        let lambda_new = v.dot(&w);
        v = w;
        let change = Float::abs(lambda_new - lambda);
        lambda = lambda_new;
        if change <= tol * Float::abs(lambda) {
            break;
        }
    }
    Float::sqrt(lambda)
}
