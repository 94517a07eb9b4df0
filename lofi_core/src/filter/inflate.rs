//! Covariance inflation applied ahead of the dynamics step

use crate::belief::{Belief, Residual};
use crate::config::InflationPolicy;
use crate::error::FilterResult;
use crate::linalg::{floor, pinv, scale_columns, scale_rows, PRECISION_FLOOR};
use nalgebra::{DMatrix, DVector};

/// Inflate a belief with a scalar residual precision by `1 + α`.
pub fn inflate_spherical(
    bel: &Belief,
    alpha: f64,
    policy: InflationPolicy,
) -> FilterResult<Belief> {
    let scale = &bel.scale / (1.0 + alpha).sqrt();
    let eta = bel.precision();

    let (mean, eta_infl) = match policy {
        InflationPolicy::Bayesian => {
            let w = scale_columns(&bel.basis, &scale);
            let rank = w.ncols();
            let g = pinv(&(DMatrix::identity(rank, rank) + w.transpose() * &w / eta))?;
            let e = &bel.prior_mean - &bel.mean;
            let k = &e - (&w / eta) * (g * (w.transpose() * &e));
            (&bel.mean + k * (alpha / (1.0 + alpha)), eta)
        }
        InflationPolicy::Simple => (bel.mean.clone(), eta / (1.0 + alpha)),
        InflationPolicy::Hybrid => (bel.mean.clone(), eta),
    };

    Ok(Belief {
        mean,
        scale,
        residual: Residual::Spherical {
            precision: floor(eta_infl, PRECISION_FLOOR),
        },
        ..bel.clone()
    })
}

/// Inflate a belief with a per-coordinate residual precision by `1 + α`.
///
/// The bayesian and hybrid policies pull the residual towards the isotropic
/// reference precision `η`.
pub fn inflate_diagonal(
    bel: &Belief,
    alpha: f64,
    policy: InflationPolicy,
) -> FilterResult<Belief> {
    let eta = bel.precision();
    let upsilon = bel.residual.diagonal(bel.dim());
    let scale = &bel.scale / (1.0 + alpha).sqrt();

    let ups_infl = match policy {
        InflationPolicy::Simple => &upsilon / (1.0 + alpha),
        InflationPolicy::Bayesian | InflationPolicy::Hybrid => {
            upsilon.map(|u| u / (1.0 + alpha) + alpha * eta / (1.0 + alpha))
        }
    }
    .map(|u| floor(u, PRECISION_FLOOR));

    let mean = match policy {
        InflationPolicy::Bayesian => {
            let w = scale_columns(&bel.basis, &scale);
            let inv_ups = ups_infl.map(|u| 1.0 / u);
            let w_over = scale_rows(&w, &inv_ups);
            let rank = w.ncols();
            let g = pinv(&(DMatrix::identity(rank, rank) + w.transpose() * &w_over))?;
            let e = &bel.prior_mean - &bel.mean;
            let inner: DVector<f64> = &e - &w * (g * (w_over.transpose() * &e));
            let k = inner.component_mul(&inv_ups);
            &bel.mean + k * (alpha * eta / (1.0 + alpha))
        }
        InflationPolicy::Simple | InflationPolicy::Hybrid => bel.mean.clone(),
    };

    Ok(Belief {
        mean,
        scale,
        residual: Residual::Diagonal {
            upsilon: ups_infl,
            precision: eta,
        },
        ..bel.clone()
    })
}
