//! Error types for the LOFI filters
//!
//! Precondition violations (bad configuration, mismatched shapes) are reported
//! at the boundary; the recursive core itself never sanitizes NaNs.

use thiserror::Error;

/// Errors produced by filter construction and the per-step operations
#[derive(Debug, Error)]
pub enum FilterError {
    /// A configuration value is outside its valid range
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Two quantities that must agree in size do not
    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// A decomposition could not be carried out
    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FilterError {
    /// Shorthand for [`FilterError::Config`]
    pub fn config(msg: impl Into<String>) -> Self {
        FilterError::Config(msg.into())
    }

    /// Shorthand for [`FilterError::Numerical`]
    pub fn numerical(msg: impl Into<String>) -> Self {
        FilterError::Numerical(msg.into())
    }

    /// Fails with [`FilterError::DimensionMismatch`] unless `expected == found`
    pub fn check_dim(what: &'static str, expected: usize, found: usize) -> FilterResult<()> {
        if expected == found {
            Ok(())
        } else {
            Err(FilterError::DimensionMismatch {
                what,
                expected,
                found,
            })
        }
    }
}

/// Result alias used throughout the crate
pub type FilterResult<T> = Result<T, FilterError>;
