//! Online linear regression with every LOFI variant
//!
//! Fits `y = b + w·x` on a small noisy dataset, one observation at a time,
//! and reports the final estimate and the average one-step-ahead error.
//!
//! Run with: cargo run --example linreg
//! Set RUST_LOG=lofi_core=trace to see every step.

use lofi::prelude::*;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const YS: [f64; 21] = [
    2.486, -0.303, -4.053, -4.336, -6.174, -5.604, -3.507, -2.326, -4.638, -0.233, -1.986,
    1.028, -2.264, -0.451, 1.167, 6.652, 4.145, 5.268, 6.34, 9.626, 14.784,
];

fn dataset() -> (Vec<DVector<f64>>, Vec<DVector<f64>>) {
    let xs = (0..YS.len())
        .map(|i| DVector::from_element(1, i as f64))
        .collect();
    let ys = YS.iter().map(|&y| DVector::from_element(1, y)).collect();
    (xs, ys)
}

fn report(name: &str, mean: &DVector<f64>, metrics: &[StepMetrics]) {
    let n = metrics.len().max(1) as f64;
    let rmse = metrics.iter().map(|m| m.rmse).sum::<f64>() / n;
    let nll = metrics.iter().map(|m| m.nll).sum::<f64>() / n;
    println!(
        "{:<12} b = {:>8.4}  w = {:>8.4}  mean rmse = {:>7.3}  mean nll = {:>9.3}",
        name, mean[0], mean[1], rmse, nll
    );
}

fn main() -> AnyResult<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "lofi_core=debug".into()))
        .with(fmt::layer())
        .init();

    println!("=== LOFI {} linear regression ===\n", lofi::version());

    let (xs, ys) = dataset();
    let model = LinearRegression::new(0.1);
    let dim = LinearRegression::param_dim(1);
    tracing::info!("Fitting {} parameters to {} observations", dim, xs.len());

    let variants = [
        ("spherical", FilterConfig::spherical(1)),
        ("diagonal", FilterConfig::diagonal(1)),
        ("orthogonal", FilterConfig::orthogonal(1).with_seed(7)),
    ];

    for (name, config) in variants {
        let filter = LowRankFilter::new(model.clone(), DVector::zeros(dim), config)
            .with_context(|| format!("building {} filter", name))?;
        let (belief, metrics) = filter.scan(&xs, &ys, OneStepAhead)?;
        report(name, &belief.mean, &metrics);
    }

    let config = FilterConfig::diagonal(1)
        .with_adaptive_variance(true)
        .with_replay(5, 2);
    let filter = ReplayFilter::new(model, DVector::zeros(dim), config)
        .context("building replay filter")?;
    let (belief, metrics) = filter.scan(&xs, &ys, OneStepAhead)?;
    report("replay", &belief.belief.mean, &metrics);
    println!(
        "\nreplay noise estimate: {:.4} after {} observations",
        belief.belief.obs_noise_var, belief.belief.nobs
    );

    Ok(())
}
