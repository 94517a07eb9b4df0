//! Synthetic workloads for the LOFI benchmarks
//!
//! Every workload is a noisy linear regression stream drawn from a fixed
//! seed, so benchmark runs are comparable across machines and revisions.

use lofi::prelude::*;
use rand::Rng;

/// Benchmark workload sizes: (parameter dimension, memory size)
pub const WORKLOAD_SIZES: &[(usize, usize)] = &[(64, 5), (256, 10), (1024, 20)];

/// A regression stream with known true parameters
#[derive(Debug, Clone)]
pub struct Workload {
    pub truth: DVector<f64>,
    pub inputs: Vec<DVector<f64>>,
    pub outputs: Vec<DVector<f64>>,
    pub noise_var: f64,
}

impl Workload {
    /// `steps` observations of a model with `dim` parameters
    pub fn regression(dim: usize, steps: usize, seed: u64) -> Self {
        let noise_var = 0.1;
        let mut rng = SeedKey::new(seed).rng();
        let truth = DVector::from_fn(dim, |_, _| rng.gen_range(-1.0..1.0));
        let model = LinearRegression::new(noise_var);

        let mut inputs = Vec::with_capacity(steps);
        let mut outputs = Vec::with_capacity(steps);
        for _ in 0..steps {
            let x = DVector::from_fn(dim - 1, |_, _| rng.gen_range(-1.0..1.0));
            let noise = noise_var.sqrt() * rng.gen_range(-1.0..1.0);
            outputs.push(model.mean(&truth, &x).add_scalar(noise));
            inputs.push(x);
        }

        Self {
            truth,
            inputs,
            outputs,
            noise_var,
        }
    }

    pub fn dim(&self) -> usize {
        self.truth.len()
    }

    pub fn model(&self) -> LinearRegression {
        LinearRegression::new(self.noise_var)
    }

    /// Filter for this workload starting from a zero mean
    pub fn filter(&self, config: FilterConfig) -> Result<LowRankFilter<LinearRegression>> {
        LowRankFilter::new(self.model(), DVector::zeros(self.dim()), config)
    }

    /// Replay filter for this workload starting from a zero mean
    pub fn replay_filter(&self, config: FilterConfig) -> Result<ReplayFilter<LinearRegression>> {
        ReplayFilter::new(self.model(), DVector::zeros(self.dim()), config)
    }
}

/// Configuration of each covariance variant at `memory_size`
pub fn variants(memory_size: usize) -> [(&'static str, FilterConfig); 3] {
    [
        ("spherical", FilterConfig::spherical(memory_size)),
        ("diagonal", FilterConfig::diagonal(memory_size)),
        (
            "orthogonal",
            FilterConfig::orthogonal(memory_size).with_seed(0),
        ),
    ]
}
