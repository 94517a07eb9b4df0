//! Dense linear-algebra primitives shared by the filter variants
//!
//! Nothing here ever builds a `d×d` matrix: every decomposition is applied to a
//! tall `d×k` factor or to a small `k×k` Gram matrix.

use crate::error::{FilterError, FilterResult};
use nalgebra::{DMatrix, DVector};
use std::cmp::Ordering;

/// Floor applied to residual and scalar precisions
pub const PRECISION_FLOOR: f64 = 1e-12;

/// Clamp `value` from below at `floor`. NaN passes through unchanged.
#[inline]
pub fn floor(value: f64, min: f64) -> f64 {
    if value < min {
        min
    } else {
        value
    }
}

/// Unit-normalize `v`, mapping the zero vector to itself.
pub fn normalize(v: &DVector<f64>) -> DVector<f64> {
    if v.iter().any(|x| *x != 0.0) {
        v / v.norm()
    } else {
        DVector::zeros(v.len())
    }
}

/// `a / b`, or zero when `b` is exactly zero.
#[inline]
pub fn stable_division(a: f64, b: f64) -> f64 {
    if b != 0.0 {
        a / b
    } else {
        0.0
    }
}

/// Multiply column `j` of `m` by `factors[j]`
pub fn scale_columns(m: &DMatrix<f64>, factors: &DVector<f64>) -> DMatrix<f64> {
    let mut out = m.clone();
    for (j, mut col) in out.column_iter_mut().enumerate() {
        col *= factors[j];
    }
    out
}

/// Multiply row `i` of `m` by `factors[i]`
pub fn scale_rows(m: &DMatrix<f64>, factors: &DVector<f64>) -> DMatrix<f64> {
    let mut out = m.clone();
    for (i, mut row) in out.row_iter_mut().enumerate() {
        row *= factors[i];
    }
    out
}

/// Moore-Penrose pseudo-inverse of a small matrix.
///
/// Singular inputs yield a finite, possibly rank-deficient result.
pub fn pinv(m: &DMatrix<f64>) -> FilterResult<DMatrix<f64>> {
    let max_dim = m.nrows().max(m.ncols()) as f64;
    let svd = m.clone().svd(true, true);
    let largest = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let eps = f64::EPSILON * max_dim * largest;
    svd.pseudo_inverse(eps).map_err(FilterError::numerical)
}

/// Factor `F` with `F·Fᵀ = m` for a symmetric positive semi-definite `m`.
///
/// Uses Cholesky when possible and otherwise the eigen-decomposition with
/// negative eigenvalues clipped to zero.
pub fn psd_factor(m: &DMatrix<f64>) -> DMatrix<f64> {
    if let Some(chol) = m.clone().cholesky() {
        return chol.l();
    }
    tracing::warn!(
        "Cholesky failed on {}x{} matrix, using eigen factor",
        m.nrows(),
        m.ncols()
    );
    let sym = (m + m.transpose()) * 0.5;
    let eig = sym.symmetric_eigen();
    let roots = eig.eigenvalues.map(|l| l.max(0.0).sqrt());
    scale_columns(&eig.eigenvectors, &roots)
}

/// Whitening matrix `A = L⁻ᵀ` of an emission covariance `R = L·Lᵀ`, so that
/// `A·Aᵀ = R⁻¹`.
pub fn whitening(r: &DMatrix<f64>) -> FilterResult<DMatrix<f64>> {
    let n = r.nrows();
    FilterError::check_dim("emission covariance columns", n, r.ncols())?;
    let chol = r.clone().cholesky().ok_or_else(|| {
        FilterError::numerical("emission covariance is not positive definite")
    })?;
    let l_inv = chol
        .l()
        .solve_lower_triangular(&DMatrix::identity(n, n))
        .ok_or_else(|| FilterError::numerical("singular Cholesky factor"))?;
    Ok(l_inv.transpose())
}

/// Inverse of the block matrix
///
/// ```text
/// M = [[A,  B],
///      [Bᵀ, D]]
/// ```
///
/// where `A` is diagonal and `D` is the lower-right block of size
/// `lr_block_dim`. Only the Schur complement `D - BᵀA⁻¹B` is inverted.
pub fn invert_block_diag(m: &DMatrix<f64>, lr_block_dim: usize) -> FilterResult<DMatrix<f64>> {
    let n = m.nrows();
    FilterError::check_dim("block matrix columns", n, m.ncols())?;
    if lr_block_dim > n {
        return Err(FilterError::DimensionMismatch {
            what: "lower-right block",
            expected: n,
            found: lr_block_dim,
        });
    }
    let k = n - lr_block_dim;

    let a_inv = DVector::from_fn(k, |i, _| 1.0 / m[(i, i)]);
    let b = m.view((0, k), (k, lr_block_dim)).into_owned();
    let d = m.view((k, k), (lr_block_dim, lr_block_dim)).into_owned();

    // A⁻¹B
    let a_inv_b = scale_rows(&b, &a_inv);
    let schur_inv = pinv(&(d - b.transpose() * &a_inv_b))?;

    let top_right = -(&a_inv_b * &schur_inv);
    let top_left = DMatrix::from_diagonal(&a_inv) + &a_inv_b * &schur_inv * a_inv_b.transpose();

    let mut out = DMatrix::zeros(n, n);
    out.view_mut((0, 0), (k, k)).copy_from(&top_left);
    out.view_mut((0, k), (k, lr_block_dim)).copy_from(&top_right);
    out.view_mut((k, 0), (lr_block_dim, k))
        .copy_from(&top_right.transpose());
    out.view_mut((k, k), (lr_block_dim, lr_block_dim))
        .copy_from(&schur_inv);
    Ok(out)
}

/// Rank-`r` truncation of a thin SVD
#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    /// Leading `r` left singular vectors (`d×r`)
    pub basis: DMatrix<f64>,
    /// Leading `r` singular values, descending
    pub scale: DVector<f64>,
    /// Left singular vectors beyond the first `r`
    pub extra_basis: DMatrix<f64>,
    /// Singular values beyond the first `r`
    pub extra_scale: DVector<f64>,
}

impl TruncatedSvd {
    /// Row-wise squared norms of the discarded factor `extra_basis·diag(extra_scale)`
    pub fn discarded_energy(&self) -> DVector<f64> {
        let w_extra = scale_columns(&self.extra_basis, &self.extra_scale);
        DVector::from_fn(w_extra.nrows(), |i, _| w_extra.row(i).norm_squared())
    }
}

/// Thin SVD of `w` (`d×k`), sorted by singular value and split at `rank`.
///
/// The result always has exactly `rank` leading columns; when
/// `min(d, k) < rank` the missing directions are zero with zero scale.
pub fn truncated_svd(w: &DMatrix<f64>, rank: usize) -> TruncatedSvd {
    let d = w.nrows();
    let svd = w.clone().svd(true, false);
    let sv = svd.singular_values;
    let u = svd.u.unwrap_or_else(|| DMatrix::zeros(d, sv.len()));

    let mut order: Vec<usize> = (0..sv.len()).collect();
    order.sort_by(|&i, &j| sv[j].partial_cmp(&sv[i]).unwrap_or(Ordering::Equal));

    let kept = rank.min(order.len());
    let mut basis = DMatrix::zeros(d, rank);
    let mut scale = DVector::zeros(rank);
    for (dst, &src) in order.iter().take(kept).enumerate() {
        basis.set_column(dst, &u.column(src));
        scale[dst] = sv[src];
    }

    let n_extra = order.len() - kept;
    let mut extra_basis = DMatrix::zeros(d, n_extra);
    let mut extra_scale = DVector::zeros(n_extra);
    for (dst, &src) in order.iter().skip(kept).enumerate() {
        extra_basis.set_column(dst, &u.column(src));
        extra_scale[dst] = sv[src];
    }

    TruncatedSvd {
        basis,
        scale,
        extra_basis,
        extra_scale,
    }
}

/// Index and value of the smallest entry of `v`
pub fn argmin(v: &DVector<f64>) -> (usize, f64) {
    v.iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(best_i, best), (i, &x)| {
            if x < best {
                (i, x)
            } else {
                (best_i, best)
            }
        })
}
