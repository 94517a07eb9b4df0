//! Running estimate of the emission-noise variance

use crate::linalg::floor;
use nalgebra::DVector;

/// Lower bound of the noise estimate
pub const NOISE_FLOOR: f64 = 1e-6;

/// One step of the running-mean noise estimator.
///
/// `predicted` is the emission mean at the post-update parameters. Returns the
/// new `(nobs, obs_noise_var)`; when `adaptive` is false the inputs come back
/// unchanged.
pub fn estimate_noise(
    predicted: &DVector<f64>,
    observed: &DVector<f64>,
    nobs: usize,
    obs_noise_var: f64,
    adaptive: bool,
) -> (usize, f64) {
    if !adaptive {
        return (nobs, obs_noise_var);
    }

    let sq_err = (predicted - observed).norm_squared() / predicted.len().max(1) as f64;
    let nobs = nobs + 1;
    let var = obs_noise_var + (sq_err - obs_noise_var) / nobs as f64;
    (nobs, floor(var, NOISE_FLOOR))
}
