//! Operator splitting for objectives with several non-smooth terms
//!
//! [`minimize_three_split`] handles
//! ```math
//! \min_x f(x) + g(x) + h(x)
//! ```
//! with only the proximal operators of $`g`$ and $`h`$, while
//! [`minimize_primal_dual`] handles $`h(Lx)`$ for a linear operator $`L`$
//! (e.g. finite differences for total variation) without ever forming
//! $`\mathrm{prox}_{h \circ L}`$.

mod three_split;
pub use three_split::*;

mod primal_dual;
pub use primal_dual::*;

#[cfg(test)]
pub(crate) mod test_helpers {
    use crate::penalty::prox_tv1d;
    use ndarray::prelude::*;

    /// 1D total variation prox on every row (or column) of a row-major image
    pub fn prox_tv_lines(
        x: ArrayView1<f64>,
        step: f64,
        n_rows: usize,
        n_cols: usize,
        by_rows: bool,
    ) -> Array1<f64> {
        let mut img = x.to_owned().into_shape((n_rows, n_cols)).unwrap();
        if by_rows {
            for mut row in img.genrows_mut() {
                let p = prox_tv1d(row.view(), step);
                row.assign(&p);
            }
        } else {
            for mut col in img.gencolumns_mut() {
                let p = prox_tv1d(col.view(), step);
                col.assign(&p);
            }
        }
        img.into_shape(n_rows * n_cols).unwrap()
    }
}
