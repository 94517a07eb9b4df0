// Filters driven by configuration files on disk
use lofi_core::{
    CovarianceVariant, FilterConfig, FilterError, InflationPolicy, LinearRegression, OneStepAhead,
    ReplayFilter,
};
use nalgebra::DVector;
use std::fs;

const REPLAY_TOML: &str = r#"
variant = "diagonal"
memory_size = 2
dynamics_decay = 0.999
dynamics_noise = 1e-5
inflation_factor = 1e-3
inflation_policy = "bayesian"
adaptive_variance = true
seed = 17

[replay]
buffer_size = 3
n_inner = 2
"#;

#[test]
fn test_toml_file_drives_replay_filter() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lofi.toml");
    fs::write(&path, REPLAY_TOML).unwrap();

    let config = FilterConfig::from_file(&path).unwrap();
    assert_eq!(config.variant, CovarianceVariant::Diagonal);
    assert_eq!(config.inflation_policy, InflationPolicy::Bayesian);

    let filter = ReplayFilter::new(LinearRegression::new(0.1), DVector::zeros(2), config).unwrap();
    assert_eq!(filter.replay_config().buffer_size, 3);
    assert_eq!(filter.replay_config().n_inner, 2);

    let xs: Vec<_> = (0..6).map(|i| DVector::from_element(1, i as f64)).collect();
    let ys: Vec<_> = xs
        .iter()
        .map(|x| DVector::from_element(1, 2.0 * x[0] - 1.0))
        .collect();
    let (bel, metrics) = filter.scan(&xs, &ys, OneStepAhead).unwrap();
    assert_eq!(metrics.len(), 6);
    assert_eq!(bel.belief.nobs, 6);

    let json = serde_json::to_string(&bel.belief).unwrap();
    assert!(json.contains("obs_noise_var"));
}

#[test]
fn test_saved_config_reloads_identically() {
    let dir = tempfile::tempdir().unwrap();
    let config = FilterConfig::spherical(4)
        .with_steady_state(true)
        .with_dynamics(0.95, 0.0)
        .with_inflation(0.01, InflationPolicy::Simple);

    let toml_path = dir.path().join("saved.toml");
    fs::write(&toml_path, config.to_toml_string().unwrap()).unwrap();
    assert_eq!(FilterConfig::from_file(&toml_path).unwrap(), config);

    let json_path = dir.path().join("saved.json");
    fs::write(&json_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    assert_eq!(FilterConfig::from_file(&json_path).unwrap(), config);
}

#[test]
fn test_invalid_files_fail_at_load() {
    let dir = tempfile::tempdir().unwrap();

    let path = dir.path().join("negative.toml");
    fs::write(&path, "dynamics_noise = -1.0").unwrap();
    assert!(matches!(
        FilterConfig::from_file(&path),
        Err(FilterError::Config(_))
    ));

    let missing = dir.path().join("missing.toml");
    assert!(matches!(
        FilterConfig::from_file(&missing),
        Err(FilterError::Io(_))
    ));

    let broken = dir.path().join("broken.json");
    fs::write(&broken, "{ memory_size: ").unwrap();
    assert!(matches!(
        FilterConfig::from_file(&broken),
        Err(FilterError::Json(_))
    ));
}
