//! # LOFI - Low-rank Filtering
//!
//! Online Bayesian estimation of high-dimensional parameter vectors with a
//! factored, fixed-rank covariance.
//!
//! ## Quick Start
//!
//! ```rust
//! use lofi::prelude::*;
//!
//! fn main() -> AnyResult<()> {
//!     let config = FilterConfig::spherical(2).with_inflation(1e-4, InflationPolicy::Hybrid);
//!     let filter = LowRankFilter::new(LinearRegression::new(0.1), DVector::zeros(2), config)?;
//!
//!     let xs: Vec<_> = (0..10).map(|i| DVector::from_element(1, i as f64)).collect();
//!     let ys: Vec<_> = xs.iter().map(|x| DVector::from_element(1, 1.0 + x[0])).collect();
//!     let (belief, metrics) = filter.scan(&xs, &ys, OneStepAhead)?;
//!
//!     println!("mean = {}, last rmse = {:.3}", belief.mean, metrics[9].rmse);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Diagonal, spherical and orthogonal** covariance variants
//! - **Bayesian, simple and hybrid** covariance inflation
//! - **Adaptive emission noise** estimation
//! - **Replay buffer** with re-linearization over a bounded window
//! - **Parallel trajectories** with splittable seeds

// Re-export core components
pub use lofi_core::{self, *};

// Linear algebra types used throughout the API
pub use nalgebra;

/// The LOFI prelude - everything you need to run a filter
pub mod prelude {
    // Filters and beliefs
    pub use lofi_core::belief::{Belief, Dynamics, Residual};
    pub use lofi_core::filter::{Linearization, LowRankFilter};
    pub use lofi_core::replay::{ReplayBelief, ReplayFilter};

    // Configuration
    pub use lofi_core::config::{
        CovarianceVariant, FilterConfig, InflationPolicy, ReplayConfig,
    };

    // Models and observers
    pub use lofi_core::model::{EmissionModel, LinearRegression};
    pub use lofi_core::observer::{Discard, Observer, OneStepAhead, StepMetrics, StepRecord};

    // Parallel runs
    pub use lofi_core::batch::{run_trajectories, Trajectory};
    pub use lofi_core::rng::SeedKey;

    // Error types
    pub use lofi_core::error::{FilterError, FilterResult};
    pub type Result<T> = FilterResult<T>;

    // Linear algebra
    pub use nalgebra::{DMatrix, DVector};

    // Common traits
    pub use serde::{Deserialize, Serialize};

    // Re-export anyhow for error handling
    pub use anyhow::{anyhow, bail, ensure, Context, Result as AnyResult};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get LOFI version
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::version().is_empty());
    }

    #[test]
    fn test_prelude_round_trip() {
        let config = FilterConfig::orthogonal(1).with_sv_threshold(0.1);
        let filter =
            LowRankFilter::new(LinearRegression::new(0.5), DVector::zeros(2), config).unwrap();
        let xs = vec![DVector::from_element(1, 1.0)];
        let ys = vec![DVector::from_element(1, 2.0)];
        let (belief, _) = filter.scan(&xs, &ys, Discard).unwrap();
        assert_eq!(belief.memory_size(), 1);
    }
}
