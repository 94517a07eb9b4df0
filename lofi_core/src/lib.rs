//! # LOFI Core
//!
//! Low-rank recursive filtering of high-dimensional parameter vectors.
//!
//! The posterior precision over `d` parameters is kept as a rank-`r` factor
//! plus a diagonal or scalar residual, so each observation costs `O(d·r²)`
//! instead of `O(d³)`:
//!
//! - **Belief**: the factored Gaussian threaded through every step
//! - **Filter**: inflate, predict, condition-on and noise estimation for the
//!   diagonal, spherical and orthogonal variants
//! - **Replay**: a bounded window of past observations re-absorbed at the
//!   newest linearization point
//! - **Batch**: independent trajectories on the rayon pool
//!
//! ## Quick Start
//!
//! ```rust
//! use lofi_core::{FilterConfig, LinearRegression, LowRankFilter, OneStepAhead};
//! use nalgebra::DVector;
//!
//! let config = FilterConfig::diagonal(2).with_dynamics(1.0, 1e-4);
//! let filter = LowRankFilter::new(LinearRegression::new(0.1), DVector::zeros(2), config)?;
//!
//! let xs = vec![DVector::from_element(1, 0.5), DVector::from_element(1, 1.5)];
//! let ys = vec![DVector::from_element(1, 1.0), DVector::from_element(1, 3.0)];
//! let (belief, metrics) = filter.scan(&xs, &ys, OneStepAhead)?;
//! assert_eq!(metrics.len(), 2);
//! assert_eq!(belief.memory_size(), 2);
//! # Ok::<(), lofi_core::FilterError>(())
//! ```

pub mod batch;
pub mod belief;
pub mod config;
pub mod error;
pub mod filter;
pub mod linalg;
pub mod model;
pub mod observer;
pub mod replay;
pub mod rng;

// Re-export commonly used types for easy access
pub use batch::{run_trajectories, Trajectory};
pub use belief::{Belief, Dynamics, Residual};
pub use config::{CovarianceVariant, FilterConfig, InflationPolicy, ReplayConfig};
pub use error::{FilterError, FilterResult};
pub use filter::{Linearization, LowRankFilter};
pub use model::{EmissionModel, LinearRegression};
pub use observer::{Discard, Observer, OneStepAhead, StepMetrics, StepRecord};
pub use replay::{ReplayBelief, ReplayFilter};
pub use rng::SeedKey;
