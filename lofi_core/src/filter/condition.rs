//! Measurement update
//!
//! Each variant augments the factor with the whitened Jacobian
//! `W̃ = [U·diag(Λ) | Hᵀ·A]` and computes the mean correction through the
//! Woodbury identity on `Υ + W̃·W̃ᵀ`, so no `d×d` matrix is ever formed.
//! The spherical and diagonal variants truncate `W̃` back to rank `r` with an
//! SVD; the orthogonal variant admits new directions greedily instead.

use crate::belief::{Belief, Residual};
use crate::error::{FilterError, FilterResult};
use crate::linalg::{
    argmin, floor, invert_block_diag, normalize, pinv, scale_columns, scale_rows, truncated_svd,
    whitening, PRECISION_FLOOR,
};
use crate::model::EmissionModel;
use crate::rng::SeedKey;
use nalgebra::{DMatrix, DVector};

/// First-order expansion of the emission around a linearization point
#[derive(Debug, Clone)]
pub struct Linearization {
    /// Predicted observation `ŷ` at the current mean
    pub predicted: DVector<f64>,
    /// `H = ∂h/∂θ` (`obs_dim × d`)
    pub jacobian: DMatrix<f64>,
    /// Emission covariance `R`
    pub covariance: DMatrix<f64>,
}

impl Linearization {
    /// Linearize at the belief mean.
    ///
    /// With `adaptive` set the model covariance is replaced by
    /// `obs_noise_var·I`.
    pub fn at_mean<M: EmissionModel>(
        model: &M,
        bel: &Belief,
        input: &M::Input,
        adaptive: bool,
    ) -> FilterResult<Self> {
        let predicted = model.mean(&bel.mean, input);
        let jacobian = model.jacobian(&bel.mean, input);
        let covariance = emission_covariance(model, bel, &bel.mean, input, predicted.len(), adaptive);
        Self::checked(predicted, jacobian, covariance, bel.dim())
    }

    /// Linearize at a fixed point `mean_lin`:
    /// `ŷ = h(mean_lin) + H(mean_lin)·(mean − mean_lin)`.
    pub fn at_point<M: EmissionModel>(
        model: &M,
        bel: &Belief,
        input: &M::Input,
        mean_lin: &DVector<f64>,
        adaptive: bool,
    ) -> FilterResult<Self> {
        FilterError::check_dim("linearization point", bel.dim(), mean_lin.len())?;
        let jacobian = model.jacobian(mean_lin, input);
        let predicted = model.mean(mean_lin, input) + &jacobian * (&bel.mean - mean_lin);
        let covariance = emission_covariance(model, bel, mean_lin, input, predicted.len(), adaptive);
        Self::checked(predicted, jacobian, covariance, bel.dim())
    }

    fn checked(
        predicted: DVector<f64>,
        jacobian: DMatrix<f64>,
        covariance: DMatrix<f64>,
        dim: usize,
    ) -> FilterResult<Self> {
        let obs_dim = predicted.len();
        FilterError::check_dim("jacobian rows", obs_dim, jacobian.nrows())?;
        FilterError::check_dim("jacobian columns", dim, jacobian.ncols())?;
        FilterError::check_dim("emission covariance rows", obs_dim, covariance.nrows())?;
        FilterError::check_dim("emission covariance columns", obs_dim, covariance.ncols())?;
        Ok(Self {
            predicted,
            jacobian,
            covariance,
        })
    }

    pub fn obs_dim(&self) -> usize {
        self.predicted.len()
    }

    /// Whitened Jacobian `Hᵀ·A` and the gain numerator `Hᵀ·R⁻¹ = Hᵀ·A·Aᵀ`
    fn whitened(&self) -> FilterResult<(DMatrix<f64>, DMatrix<f64>)> {
        let a = whitening(&self.covariance)?;
        let ht_a = self.jacobian.transpose() * &a;
        let ht_r_inv = &ht_a * a.transpose();
        Ok((ht_a, ht_r_inv))
    }

    fn innovation(&self, observed: &DVector<f64>) -> FilterResult<DVector<f64>> {
        FilterError::check_dim("observation", self.obs_dim(), observed.len())?;
        Ok(observed - &self.predicted)
    }
}

pub(crate) fn emission_covariance<M: EmissionModel>(
    model: &M,
    bel: &Belief,
    at: &DVector<f64>,
    input: &M::Input,
    obs_dim: usize,
    adaptive: bool,
) -> DMatrix<f64> {
    if adaptive {
        DMatrix::identity(obs_dim, obs_dim) * bel.obs_noise_var
    } else {
        model.covariance(at, input)
    }
}

fn augmented_factor(bel: &Belief, ht_a: &DMatrix<f64>) -> DMatrix<f64> {
    let rank = bel.memory_size();
    let mut w_tilde = DMatrix::zeros(bel.dim(), rank + ht_a.ncols());
    w_tilde.columns_mut(0, rank).copy_from(&bel.factor());
    w_tilde.columns_mut(rank, ht_a.ncols()).copy_from(ht_a);
    w_tilde
}

/// Condition a spherical belief on one observation
pub fn condition_spherical(
    bel: &Belief,
    lin: &Linearization,
    observed: &DVector<f64>,
) -> FilterResult<Belief> {
    let innovation = lin.innovation(observed)?;
    let (ht_a, ht_r_inv) = lin.whitened()?;
    let eta = bel.precision();

    let svd = truncated_svd(&augmented_factor(bel, &ht_a), bel.memory_size());

    // (ηI + uΛ²uᵀ)⁻¹ = I/η - u·diag(D)·uᵀ over every singular direction
    let v = &ht_r_inv * innovation;
    let mut correction = &v / eta;
    for (u, lamb) in [
        (&svd.basis, &svd.scale),
        (&svd.extra_basis, &svd.extra_scale),
    ] {
        let d = lamb.map(|l| l * l / (eta * eta + eta * l * l));
        correction -= u * (u.transpose() * &v).component_mul(&d);
    }

    Ok(Belief {
        mean: &bel.mean + correction,
        basis: svd.basis,
        scale: svd.scale,
        ..bel.clone()
    })
}

/// Condition a diagonal belief on one observation.
///
/// The energy of the directions dropped by the truncation is folded into the
/// residual.
pub fn condition_diagonal(
    bel: &Belief,
    lin: &Linearization,
    observed: &DVector<f64>,
) -> FilterResult<Belief> {
    let innovation = lin.innovation(observed)?;
    let (ht_a, ht_r_inv) = lin.whitened()?;
    let upsilon = bel.residual.diagonal(bel.dim());
    let w_tilde = augmented_factor(bel, &ht_a);

    let svd = truncated_svd(&w_tilde, bel.memory_size());
    let ups_cond = (&upsilon + svd.discarded_energy()).map(|u| floor(u, PRECISION_FLOOR));

    let inv_ups = upsilon.map(|u| 1.0 / u);
    let w_over = scale_rows(&w_tilde, &inv_ups);
    let k = w_tilde.ncols();
    let g = pinv(&(DMatrix::identity(k, k) + w_tilde.transpose() * &w_over))?;

    let v = &ht_r_inv * innovation;
    let correction = v.component_mul(&inv_ups) - &w_over * (g * (w_over.transpose() * &v));

    Ok(Belief {
        mean: &bel.mean + correction,
        basis: svd.basis,
        scale: svd.scale,
        residual: Residual::Diagonal {
            upsilon: ups_cond,
            precision: bel.precision(),
        },
        ..bel.clone()
    })
}

/// Condition an orthogonal belief on one observation.
///
/// Candidate directions (one per observation dimension) are visited in the
/// order given by `key`. Each is orthogonalised against the current basis and
/// replaces the weakest column when its energy exceeds both that column's scale
/// and `sv_threshold`.
pub fn condition_orthogonal(
    bel: &Belief,
    lin: &Linearization,
    observed: &DVector<f64>,
    sv_threshold: f64,
    key: SeedKey,
) -> FilterResult<Belief> {
    let innovation = lin.innovation(observed)?;
    let (ht_a, ht_r_inv) = lin.whitened()?;
    let eta = bel.precision();
    let obs_dim = lin.obs_dim();

    // Mean update against the prior factor
    let w_tilde = augmented_factor(bel, &ht_a);
    let k = w_tilde.ncols();
    let s = DMatrix::identity(k, k) * eta + w_tilde.transpose() * &w_tilde;
    let s_inv = invert_block_diag(&s, obs_dim)?;
    let v = &ht_r_inv * innovation;
    let correction = (&v - &w_tilde * (s_inv * (w_tilde.transpose() * &v))) / eta;

    let mut basis = bel.basis.clone();
    let mut scale = bel.scale.clone();
    for i in key.permutation(obs_dim) {
        let g = ht_a.column(i);
        let residual = g - &basis * (basis.transpose() * g);
        let u = normalize(&residual);
        let energy = u.dot(&residual);

        let (weakest, min_scale) = argmin(&scale);
        if energy > min_scale && energy > sv_threshold {
            basis.set_column(weakest, &u);
            scale[weakest] = energy;
        }
    }

    Ok(Belief {
        mean: &bel.mean + correction,
        basis,
        scale,
        ..bel.clone()
    })
}

/// Observation covariance of the one-step-ahead predictive,
/// `H·(Υ + W·Wᵀ)⁻¹·Hᵀ + R`
pub fn predictive_covariance(bel: &Belief, lin: &Linearization) -> FilterResult<DMatrix<f64>> {
    let rank = bel.memory_size();
    let inv_ups = bel.residual.diagonal(bel.dim()).map(|u| 1.0 / u);
    let w = bel.factor();

    let h_over = scale_columns(&lin.jacobian, &inv_ups);
    let g = pinv(&(DMatrix::identity(rank, rank) + w.transpose() * scale_rows(&w, &inv_ups)))?;
    let hw = &h_over * &w;
    let epistemic = &h_over * lin.jacobian.transpose() - &hw * g * hw.transpose();
    Ok(epistemic + &lin.covariance)
}
