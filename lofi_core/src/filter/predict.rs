//! Dynamics step
//!
//! Applies `θ_{t+1} = γ·θ_t + N(0, q·I)` to the mean, the predictive prior mean
//! and the factored precision.

use crate::belief::{Belief, Residual};
use crate::error::FilterResult;
use crate::linalg::{floor, pinv, psd_factor, scale_rows, truncated_svd, PRECISION_FLOOR};
use nalgebra::{DMatrix, DVector};

/// Closed-form predict for a scalar residual precision.
///
/// The basis is left untouched. In steady-state mode `η` is held fixed and
/// only the scales diffuse.
pub fn predict_spherical(bel: &Belief, steady_state: bool) -> Belief {
    let gamma = bel.dynamics.decay;
    let q = bel.dynamics.noise;
    let eta = bel.precision();
    let g2 = gamma * gamma;

    let (eta_pred, scale_pred) = if steady_state {
        let scale = bel
            .scale
            .map(|lambda| (g2 * lambda * lambda / (1.0 + q * lambda * lambda)).sqrt());
        (eta, scale)
    } else {
        let denom = g2 + q * eta;
        let scale = bel
            .scale
            .map(|lambda| (g2 * lambda * lambda / (denom * (denom + q * lambda * lambda))).sqrt());
        (eta / denom, scale)
    };

    Belief {
        mean: &bel.mean * gamma,
        prior_mean: &bel.prior_mean * gamma,
        scale: scale_pred,
        residual: Residual::Spherical {
            precision: floor(eta_pred, PRECISION_FLOOR),
        },
        ..bel.clone()
    }
}

/// Predict for a per-coordinate residual precision.
///
/// The residual update rescales each row of the factor differently, so the
/// factor is re-orthogonalised with an SVD.
pub fn predict_diagonal(bel: &Belief) -> FilterResult<Belief> {
    let gamma = bel.dynamics.decay;
    let q = bel.dynamics.noise;
    let rank = bel.memory_size();
    let upsilon = bel.residual.diagonal(bel.dim());

    let ups_pred = upsilon.map(|u| floor(1.0 / (gamma * gamma / u + q), PRECISION_FLOOR));
    let ratio = DVector::from_fn(upsilon.len(), |i, _| ups_pred[i] / upsilon[i]);

    let w = bel.factor();
    let w_scaled = scale_rows(&w, &ratio);
    let c = pinv(&(DMatrix::identity(rank, rank) + (w.transpose() * &w_scaled) * q))?;
    let w_pred = (w_scaled * psd_factor(&c)) * gamma;
    let svd = truncated_svd(&w_pred, rank);

    let eta = bel.precision();
    let eta_pred = floor(eta / (gamma * gamma + q * eta), PRECISION_FLOOR);

    Ok(Belief {
        mean: &bel.mean * gamma,
        prior_mean: &bel.prior_mean * gamma,
        basis: svd.basis,
        scale: svd.scale,
        residual: Residual::Diagonal {
            upsilon: ups_pred,
            precision: eta_pred,
        },
        ..bel.clone()
    })
}
