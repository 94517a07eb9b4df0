//! Factored Gaussian belief over the parameter vector
//!
//! The posterior precision is represented as
//!
//! ```text
//! Σ⁻¹ = Υ + U·diag(Λ)²·Uᵀ
//! ```
//!
//! with `U` the `d×r` basis, `Λ` the `r` scales and `Υ` either `η·I`
//! (spherical and orthogonal variants) or a diagonal matrix (diagonal variant).
//! A [`Belief`] is a value: every filter operation returns a new one built with
//! the `with_*` constructors and never touches the caller's copy.

use crate::config::FilterConfig;
use crate::error::{FilterError, FilterResult};
use crate::linalg::scale_columns;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Linear-Gaussian dynamics `θ_{t+1} = γ·θ_t + N(0, q·I)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dynamics {
    /// Decay `γ`
    pub decay: f64,
    /// Process noise `q`
    pub noise: f64,
}

impl Dynamics {
    pub fn new(decay: f64, noise: f64) -> FilterResult<Self> {
        if !(noise >= 0.0) {
            return Err(FilterError::config(format!(
                "dynamics noise must be non-negative, got {}",
                noise
            )));
        }
        Ok(Self { decay, noise })
    }

    /// Identity dynamics (`γ = 1`, `q = 0`)
    pub fn identity() -> Self {
        Self {
            decay: 1.0,
            noise: 0.0,
        }
    }
}

/// Precision carried outside the low-rank factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Residual {
    /// `Υ = η·I`
    Spherical { precision: f64 },
    /// `Υ = diag(upsilon)`; `precision` is the isotropic reference `η` used by
    /// the bayesian and hybrid inflation policies
    Diagonal {
        upsilon: DVector<f64>,
        precision: f64,
    },
}

impl Residual {
    /// Scalar precision `η`
    pub fn precision(&self) -> f64 {
        match self {
            Residual::Spherical { precision } => *precision,
            Residual::Diagonal { precision, .. } => *precision,
        }
    }

    /// Name of the residual kind, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Residual::Spherical { .. } => "spherical",
            Residual::Diagonal { .. } => "diagonal",
        }
    }

    /// Diagonal of `Υ` expanded to `d` entries
    pub fn diagonal(&self, dim: usize) -> DVector<f64> {
        match self {
            Residual::Spherical { precision } => DVector::from_element(dim, *precision),
            Residual::Diagonal { upsilon, .. } => upsilon.clone(),
        }
    }
}

/// Sufficient statistic of the filter at one timestep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    /// Current parameter estimate
    pub mean: DVector<f64>,
    /// Predictive prior mean `m0`, the reference for bayesian inflation
    pub prior_mean: DVector<f64>,
    /// Low-rank directions, `d×r`
    pub basis: DMatrix<f64>,
    /// Per-direction singular values, length `r`
    pub scale: DVector<f64>,
    pub residual: Residual,
    /// Running emission-noise variance estimate
    pub obs_noise_var: f64,
    /// Observations absorbed by the noise estimator
    pub nobs: usize,
    pub dynamics: Dynamics,
}

impl Belief {
    /// Spherical belief `N(mean, initial_covariance·I)` with a zero rank-`r` factor
    pub fn spherical(
        mean: DVector<f64>,
        memory_size: usize,
        initial_covariance: f64,
        dynamics: Dynamics,
    ) -> FilterResult<Self> {
        let precision = initial_precision(initial_covariance)?;
        Ok(Self::zero_factor(
            mean,
            memory_size,
            Residual::Spherical { precision },
            dynamics,
        ))
    }

    /// Diagonal belief `N(mean, initial_covariance·I)` with a zero rank-`r` factor
    pub fn diagonal(
        mean: DVector<f64>,
        memory_size: usize,
        initial_covariance: f64,
        dynamics: Dynamics,
    ) -> FilterResult<Self> {
        let precision = initial_precision(initial_covariance)?;
        let upsilon = DVector::from_element(mean.len(), precision);
        Ok(Self::zero_factor(
            mean,
            memory_size,
            Residual::Diagonal { upsilon, precision },
            dynamics,
        ))
    }

    /// Initial belief for the variant and hyperparameters in `config`
    pub fn from_config(mean: DVector<f64>, config: &FilterConfig) -> FilterResult<Self> {
        use crate::config::CovarianceVariant;

        config.validate()?;
        let dynamics = Dynamics::new(config.dynamics_decay, config.effective_dynamics_noise())?;
        let belief = match config.variant {
            CovarianceVariant::Diagonal => Self::diagonal(
                mean,
                config.memory_size,
                config.initial_covariance,
                dynamics,
            )?,
            CovarianceVariant::Spherical | CovarianceVariant::Orthogonal => Self::spherical(
                mean,
                config.memory_size,
                config.initial_covariance,
                dynamics,
            )?,
        };
        Ok(belief.with_noise(0, config.initial_obs_noise_var))
    }

    fn zero_factor(
        mean: DVector<f64>,
        memory_size: usize,
        residual: Residual,
        dynamics: Dynamics,
    ) -> Self {
        let dim = mean.len();
        Self {
            prior_mean: mean.clone(),
            mean,
            basis: DMatrix::zeros(dim, memory_size),
            scale: DVector::zeros(memory_size),
            residual,
            obs_noise_var: 1.0,
            nobs: 0,
            dynamics,
        }
    }

    /// Parameter dimension `d`
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Rank `r` of the covariance factor
    pub fn memory_size(&self) -> usize {
        self.scale.len()
    }

    /// Scalar precision `η`
    pub fn precision(&self) -> f64 {
        self.residual.precision()
    }

    /// Low-rank precision factor `W = U·diag(Λ)`
    pub fn factor(&self) -> DMatrix<f64> {
        scale_columns(&self.basis, &self.scale)
    }

    /// Verify that every field agrees with the parameter dimension and rank
    pub fn check_shapes(&self) -> FilterResult<()> {
        let dim = self.dim();
        let rank = self.memory_size();
        FilterError::check_dim("prior mean", dim, self.prior_mean.len())?;
        FilterError::check_dim("basis rows", dim, self.basis.nrows())?;
        FilterError::check_dim("basis columns", rank, self.basis.ncols())?;
        if let Residual::Diagonal { upsilon, .. } = &self.residual {
            FilterError::check_dim("residual", dim, upsilon.len())?;
        }
        Ok(())
    }

    pub fn with_mean(&self, mean: DVector<f64>) -> Self {
        Self {
            mean,
            ..self.clone()
        }
    }

    pub fn with_prior_mean(&self, prior_mean: DVector<f64>) -> Self {
        Self {
            prior_mean,
            ..self.clone()
        }
    }

    pub fn with_factor(&self, basis: DMatrix<f64>, scale: DVector<f64>) -> Self {
        Self {
            basis,
            scale,
            ..self.clone()
        }
    }

    pub fn with_residual(&self, residual: Residual) -> Self {
        Self {
            residual,
            ..self.clone()
        }
    }

    pub fn with_noise(&self, nobs: usize, obs_noise_var: f64) -> Self {
        Self {
            nobs,
            obs_noise_var,
            ..self.clone()
        }
    }

    pub fn with_dynamics(&self, dynamics: Dynamics) -> Self {
        Self {
            dynamics,
            ..self.clone()
        }
    }

    /// Dense posterior precision `Υ + W·Wᵀ`.
    ///
    /// Diagnostic only: this is `d×d`.
    pub fn precision_matrix(&self) -> DMatrix<f64> {
        let w = self.factor();
        DMatrix::from_diagonal(&self.residual.diagonal(self.dim())) + &w * w.transpose()
    }

    /// Dense posterior covariance. Diagnostic only, see [`Belief::precision_matrix`].
    pub fn covariance_matrix(&self) -> FilterResult<DMatrix<f64>> {
        self.precision_matrix()
            .try_inverse()
            .ok_or_else(|| FilterError::numerical("posterior precision is singular"))
    }
}

fn initial_precision(initial_covariance: f64) -> FilterResult<f64> {
    if !(initial_covariance > 0.0) {
        return Err(FilterError::config(format!(
            "initial_covariance must be positive, got {}",
            initial_covariance
        )));
    }
    Ok(1.0 / initial_covariance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_init_spherical() {
        let bel = Belief::spherical(DVector::zeros(4), 2, 0.5, Dynamics::identity()).unwrap();
        assert_eq!(bel.dim(), 4);
        assert_eq!(bel.memory_size(), 2);
        assert_eq!(bel.basis.shape(), (4, 2));
        assert_eq!(bel.precision(), 2.0);
        assert!(bel.check_shapes().is_ok());

        let cov = bel.covariance_matrix().unwrap();
        assert_abs_diff_eq!(cov, DMatrix::identity(4, 4) * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_init_diagonal() {
        let bel = Belief::diagonal(DVector::zeros(3), 1, 0.25, Dynamics::identity()).unwrap();
        match &bel.residual {
            Residual::Diagonal { upsilon, precision } => {
                assert_eq!(upsilon.len(), 3);
                assert_eq!(*precision, 4.0);
            }
            other => panic!("unexpected residual {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_prior() {
        assert!(Belief::spherical(DVector::zeros(2), 1, 0.0, Dynamics::identity()).is_err());
        assert!(Dynamics::new(1.0, -1.0).is_err());
    }

    #[test]
    fn test_with_leaves_input_untouched() {
        let bel = Belief::spherical(DVector::zeros(2), 1, 1.0, Dynamics::identity()).unwrap();
        let moved = bel.with_mean(DVector::from_element(2, 3.0));
        assert_eq!(bel.mean, DVector::zeros(2));
        assert_eq!(moved.mean[0], 3.0);
        assert_eq!(moved.basis, bel.basis);
    }

    #[test]
    fn test_check_shapes_detects_mismatch() {
        let bel = Belief::spherical(DVector::zeros(3), 2, 1.0, Dynamics::identity()).unwrap();
        let broken = bel.with_factor(DMatrix::zeros(4, 2), DVector::zeros(2));
        assert!(matches!(
            broken.check_shapes(),
            Err(FilterError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_precision_matrix_includes_factor() {
        let bel = Belief::spherical(DVector::zeros(2), 1, 1.0, Dynamics::identity())
            .unwrap()
            .with_factor(
                DMatrix::from_column_slice(2, 1, &[1.0, 0.0]),
                DVector::from_element(1, 2.0),
            );
        let p = bel.precision_matrix();
        assert_abs_diff_eq!(p[(0, 0)], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[(1, 1)], 1.0, epsilon = 1e-12);
    }
}
