//! Independent trajectories in parallel
//!
//! Each trajectory owns its belief and derives its randomness from
//! `root.fold_in(index)`, so results do not depend on how rayon schedules the
//! work.

use crate::belief::Belief;
use crate::error::{FilterError, FilterResult};
use crate::filter::LowRankFilter;
use crate::model::EmissionModel;
use crate::observer::Observer;
use crate::rng::SeedKey;
use nalgebra::DVector;
use rayon::prelude::*;

/// Result of one trajectory
#[derive(Debug, Clone)]
pub struct Trajectory<T> {
    pub index: usize,
    pub key: SeedKey,
    /// Order in which the dataset was visited
    pub order: Vec<usize>,
    pub belief: Belief,
    pub outputs: Vec<T>,
}

/// Run `n_trajectories` independent scans of the dataset.
///
/// With `shuffle` set every trajectory visits the data in its own random
/// order. `make_observer` builds a fresh observer per trajectory. Results come
/// back ordered by trajectory index.
pub fn run_trajectories<M, O, F>(
    filter: &LowRankFilter<M>,
    inputs: &[M::Input],
    outputs: &[DVector<f64>],
    n_trajectories: usize,
    shuffle: bool,
    make_observer: F,
) -> FilterResult<Vec<Trajectory<O::Output>>>
where
    M: EmissionModel + Sync,
    M::Input: Clone + Sync,
    F: Fn(usize) -> O + Sync,
    O: Observer<M::Input>,
    O::Output: Send,
{
    FilterError::check_dim("outputs", inputs.len(), outputs.len())?;
    tracing::info!(
        "Running {} trajectories over {} steps (shuffle={})",
        n_trajectories,
        inputs.len(),
        shuffle
    );

    let root = filter.key();
    let results = (0..n_trajectories)
        .into_par_iter()
        .map(|index| -> FilterResult<Trajectory<O::Output>> {
            let key = root.fold_in(index as u64);
            let order = if shuffle {
                key.permutation(inputs.len())
            } else {
                (0..inputs.len()).collect()
            };
            let xs: Vec<M::Input> = order.iter().map(|&j| inputs[j].clone()).collect();
            let ys: Vec<DVector<f64>> = order.iter().map(|&j| outputs[j].clone()).collect();

            let (belief, records) = filter.fork(key).scan(&xs, &ys, make_observer(index))?;
            Ok(Trajectory {
                index,
                key,
                order,
                belief,
                outputs: records,
            })
        })
        .collect::<FilterResult<Vec<_>>>()?;

    tracing::info!("Finished {} trajectories", results.len());
    Ok(results)
}
