// Full-rank filters must track the dense Kalman filter step by step
use lofi_core::{Belief, FilterConfig, LinearRegression, LowRankFilter, StepRecord};
use nalgebra::{DMatrix, DVector};

const YS: [f64; 21] = [
    2.486, -0.303, -4.053, -4.336, -6.174, -5.604, -3.507, -2.326, -4.638, -0.233, -1.986,
    1.028, -2.264, -0.451, 1.167, 6.652, 4.145, 5.268, 6.34, 9.626, 14.784,
];
const OBS_VAR: f64 = 0.1;
const TOLERANCE: f64 = 1e-3;

fn dataset() -> (Vec<DVector<f64>>, Vec<DVector<f64>>) {
    let xs = (0..YS.len())
        .map(|i| DVector::from_element(1, i as f64))
        .collect();
    let ys = YS.iter().map(|&y| DVector::from_element(1, y)).collect();
    (xs, ys)
}

/// Dense Kalman filter for a static parameter, one `(mean, covariance)` per step
fn dense_kalman(xs: &[DVector<f64>], ys: &[DVector<f64>]) -> Vec<(DVector<f64>, DMatrix<f64>)> {
    let mut mean = DVector::zeros(2);
    let mut cov = DMatrix::identity(2, 2);
    let mut steps = Vec::with_capacity(xs.len());

    for (x, y) in xs.iter().zip(ys) {
        let h = DMatrix::from_row_slice(1, 2, &[1.0, x[0]]);
        let s = (&h * &cov * h.transpose())[(0, 0)] + OBS_VAR;
        let gain = &cov * h.transpose() / s;
        let innovation = y[0] - (&h * &mean)[(0, 0)];
        mean += &gain * innovation;
        cov = &cov - &gain * &h * &cov;
        steps.push((mean.clone(), cov.clone()));
    }
    steps
}

fn low_rank_steps(config: FilterConfig) -> Vec<(DVector<f64>, DMatrix<f64>)> {
    let (xs, ys) = dataset();
    let filter = LowRankFilter::new(LinearRegression::new(OBS_VAR), DVector::zeros(2), config)
        .expect("valid filter");
    let (_, steps) = filter
        .scan(&xs, &ys, |step: &StepRecord<'_, DVector<f64>>| {
            let belief: &Belief = step.belief;
            (
                belief.mean.clone(),
                belief.covariance_matrix().expect("invertible precision"),
            )
        })
        .expect("scan succeeds");
    steps
}

fn assert_matches_kalman(config: FilterConfig) {
    let variant = config.variant;
    let (xs, ys) = dataset();
    let reference = dense_kalman(&xs, &ys);
    let steps = low_rank_steps(config);
    assert_eq!(steps.len(), reference.len());

    for (t, ((mean, cov), (kf_mean, kf_cov))) in steps.iter().zip(&reference).enumerate() {
        let mean_err = (mean - kf_mean).amax();
        let cov_err = (cov - kf_cov).amax();
        assert!(
            mean_err < TOLERANCE,
            "{:?} mean diverged at t={}: {} vs {}",
            variant,
            t,
            mean,
            kf_mean
        );
        assert!(
            cov_err < TOLERANCE,
            "{:?} covariance diverged at t={}: {} vs {}",
            variant,
            t,
            cov,
            kf_cov
        );
    }
}

#[test]
fn test_spherical_matches_kalman() {
    assert_matches_kalman(FilterConfig::spherical(2));
}

#[test]
fn test_diagonal_matches_kalman() {
    assert_matches_kalman(FilterConfig::diagonal(2));
}

#[test]
fn test_final_estimate_is_batch_posterior() {
    for config in [FilterConfig::spherical(2), FilterConfig::diagonal(2)] {
        let steps = low_rank_steps(config);
        let (mean, _) = steps.last().expect("non-empty run");
        // Closed-form posterior mean of the whole dataset
        assert!((mean[0] + 5.8557).abs() < TOLERANCE, "intercept {}", mean[0]);
        assert!((mean[1] - 0.6627).abs() < TOLERANCE, "slope {}", mean[1]);
    }
}
