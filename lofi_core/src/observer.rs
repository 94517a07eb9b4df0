//! Per-step observer hook and evaluation helpers
//!
//! An [`Observer`] is called once per timestep of a scan with a [`StepRecord`]
//! and its outputs are collected in order. Any `FnMut(&StepRecord<I>) -> T`
//! closure is an observer.
//!
//! # Example
//!
//! ```rust
//! use lofi_core::observer::StepRecord;
//! use nalgebra::DVector;
//!
//! let mut errors = Vec::new();
//! let mut observer = |step: &StepRecord<'_, DVector<f64>>| {
//!     errors.push((step.output - step.predicted).norm());
//! };
//! ```

use crate::belief::Belief;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Replacement for NaN metrics
pub const NAN_SENTINEL: f64 = -1e8;

/// Everything known about one timestep after its update
#[derive(Debug)]
pub struct StepRecord<'a, I> {
    /// Belief after conditioning on `output`
    pub belief: &'a Belief,
    /// One-step-ahead prediction made before conditioning
    pub predicted: &'a DVector<f64>,
    pub t: usize,
    pub input: &'a I,
    pub output: &'a DVector<f64>,
    /// Predicted belief the update started from
    pub belief_before: &'a Belief,
}

pub trait Observer<I> {
    type Output;

    fn observe(&mut self, step: &StepRecord<'_, I>) -> Self::Output;
}

impl<I, T, F> Observer<I> for F
where
    F: FnMut(&StepRecord<'_, I>) -> T,
{
    type Output = T;

    fn observe(&mut self, step: &StepRecord<'_, I>) -> T {
        self(step)
    }
}

/// Observer that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl<I> Observer<I> for Discard {
    type Output = ();

    fn observe(&mut self, _step: &StepRecord<'_, I>) {}
}

/// Root mean squared error between two equally sized vectors
pub fn rmse(predicted: &DVector<f64>, observed: &DVector<f64>) -> f64 {
    if predicted.is_empty() {
        return 0.0;
    }
    ((predicted - observed).norm_squared() / predicted.len() as f64).sqrt()
}

/// Negative log density of `observed` under independent Gaussians with
/// per-dimension variance `variance`
pub fn gaussian_nll(predicted: &DVector<f64>, observed: &DVector<f64>, variance: f64) -> f64 {
    let n = predicted.len() as f64;
    let sq_err = (predicted - observed).norm_squared();
    0.5 * (n * (2.0 * PI * variance).ln() + sq_err / variance)
}

/// Replace NaN with `sentinel`
#[inline]
pub fn sanitize(value: f64, sentinel: f64) -> f64 {
    if value.is_nan() {
        sentinel
    } else {
        value
    }
}

/// Metrics of the one-step-ahead prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub rmse: f64,
    pub nll: f64,
}

/// Scores every prediction against its observation.
///
/// The likelihood uses the belief's running noise estimate as variance; NaNs
/// are replaced with [`NAN_SENTINEL`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OneStepAhead;

impl<I> Observer<I> for OneStepAhead {
    type Output = StepMetrics;

    fn observe(&mut self, step: &StepRecord<'_, I>) -> StepMetrics {
        let variance = step.belief_before.obs_noise_var;
        StepMetrics {
            rmse: sanitize(rmse(step.predicted, step.output), NAN_SENTINEL),
            nll: sanitize(
                gaussian_nll(step.predicted, step.output, variance),
                NAN_SENTINEL,
            ),
        }
    }
}
