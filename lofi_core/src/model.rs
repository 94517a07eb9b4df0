//! Emission models consumed by the filters
//!
//! A model maps a parameter vector `θ` and an input `x` to the mean and
//! covariance of the observation distribution. The filters linearize it through
//! [`EmissionModel::jacobian`], which defaults to central finite differences.

use nalgebra::{DMatrix, DVector};

/// Observation model `y ~ N(h(θ, x), R(θ, x))`
pub trait EmissionModel {
    /// Per-observation input
    type Input;

    /// Emission mean `h(θ, x)`
    fn mean(&self, params: &DVector<f64>, input: &Self::Input) -> DVector<f64>;

    /// Emission covariance `R(θ, x)`, positive definite
    fn covariance(&self, params: &DVector<f64>, input: &Self::Input) -> DMatrix<f64>;

    /// Jacobian `∂h/∂θ` (`obs_dim × d`)
    fn jacobian(&self, params: &DVector<f64>, input: &Self::Input) -> DMatrix<f64> {
        finite_difference_jacobian(|p| self.mean(p, input), params)
    }
}

impl<M: EmissionModel + ?Sized> EmissionModel for &M {
    type Input = M::Input;

    fn mean(&self, params: &DVector<f64>, input: &Self::Input) -> DVector<f64> {
        (**self).mean(params, input)
    }

    fn covariance(&self, params: &DVector<f64>, input: &Self::Input) -> DMatrix<f64> {
        (**self).covariance(params, input)
    }

    fn jacobian(&self, params: &DVector<f64>, input: &Self::Input) -> DMatrix<f64> {
        (**self).jacobian(params, input)
    }
}

/// Central finite-difference Jacobian of `f` at `params`
pub fn finite_difference_jacobian<F>(f: F, params: &DVector<f64>) -> DMatrix<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let dim = params.len();
    let obs_dim = f(params).len();
    let mut jac = DMatrix::zeros(obs_dim, dim);
    let mut probe = params.clone();

    for j in 0..dim {
        let step = 1e-6 * params[j].abs().max(1.0);
        probe[j] = params[j] + step;
        let forward = f(&probe);
        probe[j] = params[j] - step;
        let backward = f(&probe);
        probe[j] = params[j];

        jac.set_column(j, &((forward - backward) / (2.0 * step)));
    }
    jac
}

/// Linear regression `y = b + wᵀx` with fixed noise variance.
///
/// Parameters are laid out as `[b, w_1, …, w_n]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegression {
    pub noise_var: f64,
}

impl LinearRegression {
    pub fn new(noise_var: f64) -> Self {
        Self { noise_var }
    }

    /// Number of parameters for `n_features` inputs
    pub fn param_dim(n_features: usize) -> usize {
        n_features + 1
    }

    fn design_row(input: &DVector<f64>) -> DMatrix<f64> {
        let mut row = DMatrix::zeros(1, input.len() + 1);
        row[(0, 0)] = 1.0;
        for (j, x) in input.iter().enumerate() {
            row[(0, j + 1)] = *x;
        }
        row
    }
}

impl EmissionModel for LinearRegression {
    type Input = DVector<f64>;

    fn mean(&self, params: &DVector<f64>, input: &DVector<f64>) -> DVector<f64> {
        Self::design_row(input) * params
    }

    fn covariance(&self, _params: &DVector<f64>, _input: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::from_element(1, 1, self.noise_var)
    }

    fn jacobian(&self, _params: &DVector<f64>, input: &DVector<f64>) -> DMatrix<f64> {
        Self::design_row(input)
    }
}
