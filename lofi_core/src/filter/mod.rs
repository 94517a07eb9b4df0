//! Low-rank recursive filter
//!
//! [`LowRankFilter`] folds a sequence of `(input, output)` pairs into a
//! [`Belief`], one timestep at a time:
//!
//! ```text
//! inflate -> predict -> condition-on -> noise estimate
//! ```
//!
//! The covariance parameterization is chosen by
//! [`CovarianceVariant`](crate::config::CovarianceVariant); all three share the
//! same belief type and driver.
//!
//! # Example
//!
//! ```rust
//! use lofi_core::{FilterConfig, LinearRegression, LowRankFilter};
//! use lofi_core::observer::Discard;
//! use nalgebra::DVector;
//!
//! let config = FilterConfig::spherical(2).with_initial_covariance(1.0);
//! let filter = LowRankFilter::new(LinearRegression::new(0.1), DVector::zeros(2), config)?;
//!
//! let xs: Vec<DVector<f64>> = (0..5).map(|i| DVector::from_element(1, i as f64)).collect();
//! let ys: Vec<DVector<f64>> = (0..5).map(|i| DVector::from_element(1, 2.0 * i as f64)).collect();
//! let (belief, _) = filter.scan(&xs, &ys, Discard)?;
//! assert_eq!(belief.mean.len(), 2);
//! # Ok::<(), lofi_core::FilterError>(())
//! ```

pub mod condition;
pub mod inflate;
pub mod noise;
pub mod predict;

pub use condition::Linearization;
pub use noise::{estimate_noise, NOISE_FLOOR};

use crate::belief::{Belief, Residual};
use crate::config::{CovarianceVariant, FilterConfig};
use crate::error::{FilterError, FilterResult};
use crate::model::EmissionModel;
use crate::observer::{Observer, StepRecord};
use crate::rng::SeedKey;
use nalgebra::{DMatrix, DVector};

/// Recursive filter over a fixed-rank factored precision
#[derive(Debug, Clone)]
pub struct LowRankFilter<M> {
    model: M,
    config: FilterConfig,
    initial_mean: DVector<f64>,
    key: SeedKey,
}

impl<M: EmissionModel> LowRankFilter<M> {
    /// Create a filter; fails if `config` is invalid
    pub fn new(model: M, initial_mean: DVector<f64>, config: FilterConfig) -> FilterResult<Self> {
        config.validate()?;
        if initial_mean.is_empty() {
            return Err(FilterError::config("initial mean must not be empty"));
        }
        tracing::debug!(
            "Created {:?} filter: dim={}, rank={}",
            config.variant,
            initial_mean.len(),
            config.memory_size
        );
        let key = SeedKey::new(config.seed);
        Ok(Self {
            model,
            config,
            initial_mean,
            key,
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Root key of every random choice the filter makes
    pub fn key(&self) -> SeedKey {
        self.key
    }

    /// Replace the root key, e.g. for one trajectory of a batch
    pub fn with_key(mut self, key: SeedKey) -> Self {
        self.key = key;
        self
    }

    /// Borrowing copy of the filter with a different root key
    pub fn fork(&self, key: SeedKey) -> LowRankFilter<&M> {
        LowRankFilter {
            model: &self.model,
            config: self.config.clone(),
            initial_mean: self.initial_mean.clone(),
            key,
        }
    }

    /// Initial belief `N(initial_mean, initial_covariance·I)`
    pub fn init_belief(&self) -> FilterResult<Belief> {
        Belief::from_config(self.initial_mean.clone(), &self.config)
    }

    fn check_belief(&self, bel: &Belief) -> FilterResult<()> {
        bel.check_shapes()?;
        FilterError::check_dim("belief dimension", self.initial_mean.len(), bel.dim())?;
        FilterError::check_dim("memory size", self.config.memory_size, bel.memory_size())?;
        match (self.config.variant, &bel.residual) {
            (CovarianceVariant::Diagonal, Residual::Diagonal { .. })
            | (
                CovarianceVariant::Spherical | CovarianceVariant::Orthogonal,
                Residual::Spherical { .. },
            ) => Ok(()),
            (variant, residual) => Err(FilterError::config(format!(
                "{:?} filter cannot use a belief with a {} residual",
                variant,
                residual.kind()
            ))),
        }
    }

    /// Covariance inflation by `1 + inflation_factor`
    pub fn inflate(&self, bel: &Belief) -> FilterResult<Belief> {
        self.check_belief(bel)?;
        let alpha = self.config.inflation_factor;
        let policy = self.config.inflation_policy;
        match self.config.variant {
            CovarianceVariant::Diagonal => inflate::inflate_diagonal(bel, alpha, policy),
            CovarianceVariant::Spherical | CovarianceVariant::Orthogonal => {
                inflate::inflate_spherical(bel, alpha, policy)
            }
        }
    }

    /// Dynamics step only
    pub fn predict(&self, bel: &Belief) -> FilterResult<Belief> {
        self.check_belief(bel)?;
        match self.config.variant {
            CovarianceVariant::Diagonal => predict::predict_diagonal(bel),
            CovarianceVariant::Spherical | CovarianceVariant::Orthogonal => {
                Ok(predict::predict_spherical(bel, self.config.steady_state))
            }
        }
    }

    /// Inflate then predict
    pub fn predict_state(&self, bel: &Belief) -> FilterResult<Belief> {
        let inflated = self.inflate(bel)?;
        self.predict(&inflated)
    }

    /// Predicted observation `h(mean, x)`
    pub fn predict_obs(&self, bel: &Belief, input: &M::Input) -> DVector<f64> {
        self.model.mean(&bel.mean, input)
    }

    /// Covariance of the predicted observation, `H·Σ·Hᵀ + R`
    pub fn predict_obs_cov(&self, bel: &Belief, input: &M::Input) -> FilterResult<DMatrix<f64>> {
        let lin = self.linearize(bel, input)?;
        condition::predictive_covariance(bel, &lin)
    }

    /// Linearization at the belief mean, honouring the adaptive-variance setting
    pub fn linearize(&self, bel: &Belief, input: &M::Input) -> FilterResult<Linearization> {
        Linearization::at_mean(&self.model, bel, input, self.config.adaptive_variance)
    }

    /// Condition on `(input, output)` at timestep `t`, then update the noise
    /// estimate
    pub fn update_state(
        &self,
        bel: &Belief,
        input: &M::Input,
        output: &DVector<f64>,
        t: usize,
    ) -> FilterResult<Belief> {
        self.check_belief(bel)?;
        let lin = self.linearize(bel, input)?;
        self.update_linearized(bel, &lin, input, output, self.key.fold_in(t as u64))
    }

    /// Condition on an already linearized observation.
    ///
    /// `key` drives the orthogonal variant's candidate order.
    pub fn update_linearized(
        &self,
        bel: &Belief,
        lin: &Linearization,
        input: &M::Input,
        output: &DVector<f64>,
        key: SeedKey,
    ) -> FilterResult<Belief> {
        self.check_belief(bel)?;
        let cond = match self.config.variant {
            CovarianceVariant::Diagonal => condition::condition_diagonal(bel, lin, output)?,
            CovarianceVariant::Spherical => condition::condition_spherical(bel, lin, output)?,
            CovarianceVariant::Orthogonal => {
                condition::condition_orthogonal(bel, lin, output, self.config.sv_threshold, key)?
            }
        };

        let predicted = self.model.mean(&cond.mean, input);
        let (nobs, obs_noise_var) = estimate_noise(
            &predicted,
            output,
            cond.nobs,
            cond.obs_noise_var,
            self.config.adaptive_variance,
        );
        Ok(cond.with_noise(nobs, obs_noise_var))
    }

    /// Run the filter over a whole sequence from the initial belief
    pub fn scan<O>(
        &self,
        inputs: &[M::Input],
        outputs: &[DVector<f64>],
        observer: O,
    ) -> FilterResult<(Belief, Vec<O::Output>)>
    where
        O: Observer<M::Input>,
    {
        let bel = self.init_belief()?;
        self.scan_from(bel, inputs, outputs, observer)
    }

    /// Run the filter over a sequence starting from `bel`
    pub fn scan_from<O>(
        &self,
        mut bel: Belief,
        inputs: &[M::Input],
        outputs: &[DVector<f64>],
        mut observer: O,
    ) -> FilterResult<(Belief, Vec<O::Output>)>
    where
        O: Observer<M::Input>,
    {
        FilterError::check_dim("outputs", inputs.len(), outputs.len())?;
        let mut records = Vec::with_capacity(inputs.len());

        for (t, (input, output)) in inputs.iter().zip(outputs).enumerate() {
            let bel_pred = self.predict_state(&bel)?;
            let predicted = self.predict_obs(&bel_pred, input);
            let bel_post = self.update_state(&bel_pred, input, output, t)?;
            tracing::trace!(
                "t={} obs_noise_var={:.4e} precision={:.4e}",
                t,
                bel_post.obs_noise_var,
                bel_post.precision()
            );

            records.push(observer.observe(&StepRecord {
                belief: &bel_post,
                predicted: &predicted,
                t,
                input,
                output,
                belief_before: &bel_pred,
            }));
            bel = bel_post;
        }

        Ok((bel, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InflationPolicy;
    use crate::model::LinearRegression;
    use approx::assert_abs_diff_eq;

    fn line(n: usize) -> (Vec<DVector<f64>>, Vec<DVector<f64>>) {
        let xs: Vec<_> = (0..n)
            .map(|i| DVector::from_element(1, i as f64 / n as f64))
            .collect();
        let ys = xs
            .iter()
            .map(|x| DVector::from_element(1, 1.0 - 3.0 * x[0]))
            .collect();
        (xs, ys)
    }

    fn regression(
        noise_var: f64,
        dim: usize,
        config: FilterConfig,
    ) -> FilterResult<LowRankFilter<LinearRegression>> {
        LowRankFilter::new(LinearRegression::new(noise_var), DVector::zeros(dim), config)
    }

    #[test]
    fn test_create() {
        let filter = regression(0.1, 2, FilterConfig::diagonal(1)).unwrap();
        let bel = filter.init_belief().unwrap();
        assert_eq!(bel.memory_size(), 1);
        assert_eq!(bel.obs_noise_var, 1.0);

        assert!(regression(0.1, 2, FilterConfig::diagonal(0)).is_err());
        assert!(regression(0.1, 0, FilterConfig::diagonal(1)).is_err());
    }

    #[test]
    fn test_predict_identity() {
        let filter = regression(0.1, 2, FilterConfig::spherical(2)).unwrap();
        let (xs, ys) = line(4);
        let (bel, _) = filter.scan(&xs, &ys, crate::observer::Discard).unwrap();

        let pred = filter.predict_state(&bel).unwrap();
        assert_eq!(pred.mean, bel.mean);
        assert_abs_diff_eq!(pred.scale, bel.scale, epsilon = 1e-12);
        assert_abs_diff_eq!(pred.precision(), bel.precision(), epsilon = 1e-12);
    }

    #[test]
    fn test_scan_fits_line() {
        for config in [
            FilterConfig::spherical(2),
            FilterConfig::diagonal(2),
            FilterConfig::orthogonal(2),
        ] {
            let config = config
                .with_initial_covariance(10.0)
                .with_inflation(1e-4, InflationPolicy::Hybrid);
            let filter = regression(1e-4, 2, config).unwrap();
            let (xs, ys) = line(50);
            let (bel, ts) = filter
                .scan(&xs, &ys, |step: &StepRecord<'_, DVector<f64>>| step.t)
                .unwrap();

            assert_eq!(ts, (0..50).collect::<Vec<_>>());
            assert_abs_diff_eq!(bel.mean[0], 1.0, epsilon = 0.05);
            assert_abs_diff_eq!(bel.mean[1], -3.0, epsilon = 0.1);
        }
    }

    #[test]
    fn test_predict_obs_cov_positive() {
        let filter = regression(0.2, 2, FilterConfig::spherical(1)).unwrap();
        let bel = filter.init_belief().unwrap();
        let x = DVector::from_element(1, 1.0);
        let cov = filter.predict_obs_cov(&bel, &x).unwrap();
        // H·I·Hᵀ + R = 2 + 0.2
        assert_abs_diff_eq!(cov[(0, 0)], 2.2, epsilon = 1e-12);
        assert_eq!(filter.predict_obs(&bel, &x)[0], 0.0);
    }

    #[test]
    fn test_rejects_foreign_belief() {
        let filter = regression(0.2, 2, FilterConfig::spherical(1)).unwrap();
        let other = Belief::from_config(DVector::zeros(3), &FilterConfig::spherical(1)).unwrap();
        assert!(matches!(
            filter.predict_state(&other),
            Err(FilterError::DimensionMismatch { .. })
        ));

        let (xs, ys) = line(3);
        assert!(filter.scan(&xs, &ys[..2], crate::observer::Discard).is_err());
    }

    #[test]
    fn test_rejects_belief_of_other_variant() {
        let diagonal = Belief::from_config(DVector::zeros(2), &FilterConfig::diagonal(1))
            .unwrap()
            .with_residual(Residual::Diagonal {
                upsilon: DVector::from_vec(vec![5.0, 0.1]),
                precision: 1.0,
            });
        let x = DVector::from_element(1, 1.0);
        let y = DVector::from_element(1, 2.0);

        for config in [FilterConfig::spherical(1), FilterConfig::orthogonal(1)] {
            let filter = regression(0.2, 2, config).unwrap();
            assert!(matches!(
                filter.predict_state(&diagonal),
                Err(FilterError::Config(_))
            ));
            assert!(matches!(filter.inflate(&diagonal), Err(FilterError::Config(_))));
            assert!(matches!(
                filter.update_state(&diagonal, &x, &y, 0),
                Err(FilterError::Config(_))
            ));
        }

        let spherical = Belief::from_config(DVector::zeros(2), &FilterConfig::spherical(1)).unwrap();
        let filter = regression(0.2, 2, FilterConfig::diagonal(1)).unwrap();
        assert!(matches!(filter.predict(&spherical), Err(FilterError::Config(_))));
        assert!(filter.predict_state(&diagonal).is_ok());
    }
}
