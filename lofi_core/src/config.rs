//! Filter configuration
//!
//! Every hyperparameter of a run lives in [`FilterConfig`]. It can be built in
//! code from one of the presets, or loaded from a TOML/JSON file:
//!
//! ```toml
//! variant = "diagonal"
//! memory_size = 10
//! dynamics_decay = 1.0
//! dynamics_noise = 1e-4
//! initial_covariance = 0.1
//! inflation_factor = 1e-5
//! inflation_policy = "bayesian"
//! adaptive_variance = true
//!
//! [replay]
//! buffer_size = 5
//! n_inner = 1
//! ```

use crate::error::{FilterError, FilterResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Covariance parameterization used by the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceVariant {
    /// Low-rank factor plus a per-coordinate residual precision
    Diagonal,
    /// Low-rank factor plus a scalar precision
    Spherical,
    /// Scalar precision with greedy, SVD-free basis replacement
    Orthogonal,
}

/// How the covariance is inflated before each prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InflationPolicy {
    /// Inflate the covariance and pull the mean towards the predictive prior mean
    Bayesian,
    /// Only shrink the precision by `1/(1+α)`
    Simple,
    /// Inflate the covariance like `Bayesian` but keep the mean
    Hybrid,
}

/// Replay buffer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Number of buffered observations (and belief snapshots)
    pub buffer_size: usize,
    /// Number of passes over the buffer per timestep
    pub n_inner: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            buffer_size: 10,
            n_inner: 1,
        }
    }
}

/// Complete filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub variant: CovarianceVariant,
    /// Rank `r` of the covariance factor
    pub memory_size: usize,
    /// Dynamics decay `γ`
    pub dynamics_decay: f64,
    /// Dynamics process noise `q`
    pub dynamics_noise: f64,
    /// Scalar prior covariance; the initial precision is its reciprocal
    pub initial_covariance: f64,
    /// Inflation factor `α`
    pub inflation_factor: f64,
    pub inflation_policy: InflationPolicy,
    /// Use the steady-state predict and the matching process-noise constraint
    pub steady_state: bool,
    /// Replace the emission covariance with a running scalar noise estimate
    pub adaptive_variance: bool,
    /// Starting value of the running noise estimate
    pub initial_obs_noise_var: f64,
    /// Admission threshold of the orthogonal variant
    pub sv_threshold: f64,
    /// Root seed for every random choice of a run
    pub seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay: Option<ReplayConfig>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            variant: CovarianceVariant::Spherical,
            memory_size: 10,
            dynamics_decay: 1.0,
            dynamics_noise: 0.0,
            initial_covariance: 1.0,
            inflation_factor: 0.0,
            inflation_policy: InflationPolicy::Bayesian,
            steady_state: false,
            adaptive_variance: false,
            initial_obs_noise_var: 1.0,
            sv_threshold: 0.0,
            seed: 0,
            replay: None,
        }
    }
}

impl FilterConfig {
    /// Spherical filter of rank `memory_size` with default dynamics
    pub fn spherical(memory_size: usize) -> Self {
        Self {
            variant: CovarianceVariant::Spherical,
            memory_size,
            ..Default::default()
        }
    }

    /// Diagonal filter of rank `memory_size` with default dynamics
    pub fn diagonal(memory_size: usize) -> Self {
        Self {
            variant: CovarianceVariant::Diagonal,
            memory_size,
            ..Default::default()
        }
    }

    /// Orthogonal filter of rank `memory_size` with default dynamics
    pub fn orthogonal(memory_size: usize) -> Self {
        Self {
            variant: CovarianceVariant::Orthogonal,
            memory_size,
            ..Default::default()
        }
    }

    pub fn with_dynamics(mut self, decay: f64, noise: f64) -> Self {
        self.dynamics_decay = decay;
        self.dynamics_noise = noise;
        self
    }

    pub fn with_inflation(mut self, factor: f64, policy: InflationPolicy) -> Self {
        self.inflation_factor = factor;
        self.inflation_policy = policy;
        self
    }

    pub fn with_initial_covariance(mut self, initial_covariance: f64) -> Self {
        self.initial_covariance = initial_covariance;
        self
    }

    pub fn with_adaptive_variance(mut self, enabled: bool) -> Self {
        self.adaptive_variance = enabled;
        self
    }

    pub fn with_steady_state(mut self, enabled: bool) -> Self {
        self.steady_state = enabled;
        self
    }

    pub fn with_sv_threshold(mut self, threshold: f64) -> Self {
        self.sv_threshold = threshold;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_replay(mut self, buffer_size: usize, n_inner: usize) -> Self {
        self.replay = Some(ReplayConfig {
            buffer_size,
            n_inner,
        });
        self
    }

    /// Process noise actually used by the dynamics.
    ///
    /// Under the steady-state constraint `q = (1 - γ²) / η₀`, floored at zero.
    pub fn effective_dynamics_noise(&self) -> f64 {
        if self.steady_state {
            let gamma = self.dynamics_decay;
            ((1.0 - gamma * gamma) * self.initial_covariance).max(0.0)
        } else {
            self.dynamics_noise
        }
    }

    /// Check every precondition on the configuration values
    pub fn validate(&self) -> FilterResult<()> {
        if self.memory_size < 1 {
            return Err(FilterError::config("memory_size must be at least 1"));
        }
        if !self.dynamics_decay.is_finite() {
            return Err(FilterError::config("dynamics_decay must be finite"));
        }
        if !(self.dynamics_noise >= 0.0) {
            return Err(FilterError::config(format!(
                "dynamics_noise must be non-negative, got {}",
                self.dynamics_noise
            )));
        }
        if !(self.initial_covariance > 0.0) || !self.initial_covariance.is_finite() {
            return Err(FilterError::config(format!(
                "initial_covariance must be positive, got {}",
                self.initial_covariance
            )));
        }
        if !(self.inflation_factor >= 0.0) {
            return Err(FilterError::config(format!(
                "inflation_factor must be non-negative, got {}",
                self.inflation_factor
            )));
        }
        if !(self.sv_threshold >= 0.0) {
            return Err(FilterError::config(format!(
                "sv_threshold must be non-negative, got {}",
                self.sv_threshold
            )));
        }
        if !(self.initial_obs_noise_var > 0.0) {
            return Err(FilterError::config(format!(
                "initial_obs_noise_var must be positive, got {}",
                self.initial_obs_noise_var
            )));
        }
        if let Some(replay) = &self.replay {
            if replay.buffer_size < 1 {
                return Err(FilterError::config("buffer_size must be at least 1"));
            }
            if replay.n_inner < 1 {
                return Err(FilterError::config("n_inner must be at least 1"));
            }
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> FilterResult<Self> {
        let config: FilterConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(s: &str) -> FilterResult<Self> {
        let config: FilterConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, choosing the format from its extension
    pub fn from_file(path: &Path) -> FilterResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            other => Err(FilterError::config(format!(
                "Unsupported config format: {:?} (expected .toml or .json)",
                other
            ))),
        }
    }

    /// Serialize to a TOML document
    pub fn to_toml_string(&self) -> FilterResult<String> {
        toml::to_string(self).map_err(|e| FilterError::config(format!("TOML encode failed: {}", e)))
    }
}
