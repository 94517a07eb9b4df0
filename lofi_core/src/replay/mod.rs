//! Replay-buffer extension of the low-rank filter
//!
//! Keeps the last `buffer_size` observations together with a snapshot of the
//! belief before each of them. Once the snapshot buffer is full, every new
//! observation triggers a replay: the belief is rolled back to the oldest
//! snapshot and the whole window is re-absorbed `n_inner` times, linearizing
//! the emission at the newest mean instead of at the stale means the
//! observations were first seen with.
//!
//! ```text
//! fill:   [x0 .. x_{L-2}]      ordinary updates, one snapshot per step
//! replay: [x_{t-L+1} .. x_t]   restore oldest snapshot, n_inner passes
//! ```
//!
//! The observation counter is reset after every pass, so `nobs` advances by
//! exactly one per timestep however many passes run.

pub mod buffer;

pub use buffer::{RingBuffer, Snapshot};

use crate::belief::Belief;
use crate::config::{FilterConfig, ReplayConfig};
use crate::error::{FilterError, FilterResult};
use crate::filter::{Linearization, LowRankFilter};
use crate::model::EmissionModel;
use crate::observer::{Observer, StepRecord};
use nalgebra::{DMatrix, DVector};

/// Belief of the replay filter: the current belief plus its history window
#[derive(Debug, Clone)]
pub struct ReplayBelief<I> {
    pub belief: Belief,
    /// Point at which the buffered observations are linearized
    pub mean_lin: DVector<f64>,
    inputs: RingBuffer<I>,
    outputs: RingBuffer<DVector<f64>>,
    snapshots: RingBuffer<Snapshot>,
}

impl<I> ReplayBelief<I> {
    /// Number of buffered observations
    pub fn buffered(&self) -> usize {
        self.inputs.len()
    }

    /// Whether the next update replays the window
    pub fn is_replaying(&self) -> bool {
        self.snapshots.is_full()
    }

    pub fn snapshots(&self) -> &RingBuffer<Snapshot> {
        &self.snapshots
    }
}

/// Low-rank filter with a bounded replay window
#[derive(Debug, Clone)]
pub struct ReplayFilter<M> {
    inner: LowRankFilter<M>,
    replay: ReplayConfig,
}

impl<M> ReplayFilter<M>
where
    M: EmissionModel,
    M::Input: Clone,
{
    /// Create a replay filter. Missing replay settings fall back to
    /// [`ReplayConfig::default`].
    pub fn new(model: M, initial_mean: DVector<f64>, config: FilterConfig) -> FilterResult<Self> {
        let replay = config.replay.unwrap_or_default();
        let inner = LowRankFilter::new(model, initial_mean, config)?;
        tracing::debug!(
            "Created replay filter: buffer_size={}, n_inner={}",
            replay.buffer_size,
            replay.n_inner
        );
        Ok(Self { inner, replay })
    }

    /// Filter used for the individual steps
    pub fn inner(&self) -> &LowRankFilter<M> {
        &self.inner
    }

    pub fn replay_config(&self) -> ReplayConfig {
        self.replay
    }

    /// Initial belief with empty observation buffers and the initial belief as
    /// the only snapshot
    pub fn init_belief(&self) -> FilterResult<ReplayBelief<M::Input>> {
        let belief = self.inner.init_belief()?;
        let mut snapshots = RingBuffer::new(self.replay.buffer_size);
        snapshots.push(Snapshot::of(&belief));
        Ok(ReplayBelief {
            mean_lin: belief.mean.clone(),
            belief,
            inputs: RingBuffer::new(self.replay.buffer_size),
            outputs: RingBuffer::new(self.replay.buffer_size),
            snapshots,
        })
    }

    /// Inflate and predict the current belief. The buffers move along
    /// untouched.
    pub fn predict_state(
        &self,
        mut bel: ReplayBelief<M::Input>,
    ) -> FilterResult<ReplayBelief<M::Input>> {
        bel.belief = self.inner.predict_state(&bel.belief)?;
        Ok(bel)
    }

    pub fn predict_obs(&self, bel: &ReplayBelief<M::Input>, input: &M::Input) -> DVector<f64> {
        self.inner.predict_obs(&bel.belief, input)
    }

    pub fn predict_obs_cov(
        &self,
        bel: &ReplayBelief<M::Input>,
        input: &M::Input,
    ) -> FilterResult<DMatrix<f64>> {
        self.inner.predict_obs_cov(&bel.belief, input)
    }

    /// Absorb `(input, output)` observed at timestep `t`.
    ///
    /// Runs an ordinary update while the snapshot buffer is filling and a
    /// replay of the whole window afterwards.
    pub fn update_state(
        &self,
        mut bel: ReplayBelief<M::Input>,
        input: &M::Input,
        output: &DVector<f64>,
        t: usize,
    ) -> FilterResult<ReplayBelief<M::Input>> {
        let replaying = bel.is_replaying();
        bel.inputs.push(input.clone());
        bel.outputs.push(output.clone());

        if replaying {
            self.update_with_replay(bel, t)
        } else {
            self.update_without_replay(bel, input, output, t)
        }
    }

    fn update_without_replay(
        &self,
        mut bel: ReplayBelief<M::Input>,
        input: &M::Input,
        output: &DVector<f64>,
        t: usize,
    ) -> FilterResult<ReplayBelief<M::Input>> {
        bel.mean_lin = bel.belief.mean.clone();
        bel.belief = self.inner.update_state(&bel.belief, input, output, t)?;
        bel.snapshots.push(Snapshot::of(&bel.belief));
        if bel.snapshots.is_full() {
            tracing::debug!("Replay buffer filled at t={}", t);
        }
        Ok(bel)
    }

    fn update_with_replay(
        &self,
        mut bel: ReplayBelief<M::Input>,
        t: usize,
    ) -> FilterResult<ReplayBelief<M::Input>> {
        let oldest = bel
            .snapshots
            .oldest()
            .ok_or_else(|| FilterError::config("replay started with an empty snapshot buffer"))?;
        bel.mean_lin = bel.belief.mean.clone();
        bel.belief = oldest.restore(&bel.belief);

        let adaptive = self.inner.config().adaptive_variance;
        let key = self.inner.key().fold_in(t as u64);
        let model = self.inner.model();

        for pass in 0..self.replay.n_inner {
            let pass_key = key.fold_in(pass as u64);
            let start_nobs = bel.belief.nobs;
            let mut current = bel.belief.clone();

            for (k, (x, y)) in bel.inputs.iter().zip(bel.outputs.iter()).enumerate() {
                let pred = self.inner.predict_state(&current)?;
                let lin = Linearization::at_point(model, &pred, x, &bel.mean_lin, adaptive)?;
                current = self
                    .inner
                    .update_linearized(&pred, &lin, x, y, pass_key.fold_in(k as u64))?;
            }

            bel.belief = current.with_noise(start_nobs, current.obs_noise_var);
        }

        if adaptive {
            bel.belief = bel
                .belief
                .with_noise(bel.belief.nobs + 1, bel.belief.obs_noise_var);
        }
        tracing::trace!("t={} replayed {} observations", t, bel.buffered());

        bel.snapshots.push(Snapshot::of(&bel.belief));
        Ok(bel)
    }

    /// Run the replay filter over a whole sequence
    pub fn scan<O>(
        &self,
        inputs: &[M::Input],
        outputs: &[DVector<f64>],
        observer: O,
    ) -> FilterResult<(ReplayBelief<M::Input>, Vec<O::Output>)>
    where
        O: Observer<M::Input>,
    {
        let bel = self.init_belief()?;
        self.scan_from(bel, inputs, outputs, observer)
    }

    /// Run the replay filter over a sequence starting from `bel`
    pub fn scan_from<O>(
        &self,
        mut bel: ReplayBelief<M::Input>,
        inputs: &[M::Input],
        outputs: &[DVector<f64>],
        mut observer: O,
    ) -> FilterResult<(ReplayBelief<M::Input>, Vec<O::Output>)>
    where
        O: Observer<M::Input>,
    {
        FilterError::check_dim("outputs", inputs.len(), outputs.len())?;
        let mut records = Vec::with_capacity(inputs.len());

        for (t, (input, output)) in inputs.iter().zip(outputs).enumerate() {
            let bel_pred = self.predict_state(bel)?;
            let predicted = self.predict_obs(&bel_pred, input);
            let before = bel_pred.belief.clone();
            let bel_post = self.update_state(bel_pred, input, output, t)?;

            records.push(observer.observe(&StepRecord {
                belief: &bel_post.belief,
                predicted: &predicted,
                t,
                input,
                output,
                belief_before: &before,
            }));
            bel = bel_post;
        }

        Ok((bel, records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinearRegression;
    use crate::observer::Discard;
    use approx::assert_abs_diff_eq;

    fn stream(n: usize) -> (Vec<DVector<f64>>, Vec<DVector<f64>>) {
        let xs: Vec<_> = (0..n)
            .map(|i| DVector::from_element(1, (i as f64 * 0.7).sin()))
            .collect();
        let ys = xs
            .iter()
            .map(|x| DVector::from_element(1, 0.5 + 2.0 * x[0]))
            .collect();
        (xs, ys)
    }

    fn replay_filter(config: FilterConfig) -> ReplayFilter<LinearRegression> {
        ReplayFilter::new(LinearRegression::new(0.01), DVector::zeros(2), config).unwrap()
    }

    #[test]
    fn test_fill_then_replay() {
        let filter = replay_filter(FilterConfig::spherical(2).with_replay(3, 1));
        let (xs, ys) = stream(5);
        let mut bel = filter.init_belief().unwrap();
        assert_eq!(bel.snapshots().len(), 1);
        assert!(!bel.is_replaying());

        for t in 0..5 {
            let pred = filter.predict_state(bel).unwrap();
            bel = filter.update_state(pred, &xs[t], &ys[t], t).unwrap();
            assert_eq!(bel.buffered(), (t + 1).min(3));
            // The update at t = buffer_size - 1 is the first replay
            assert_eq!(bel.is_replaying(), t >= 1);
        }
        assert_eq!(bel.snapshots().len(), 3);
    }

    #[test]
    fn test_unit_buffer_matches_plain_filter() {
        // With a single slot the replay re-absorbs only the newest observation
        // from the previous posterior, linearized at the current mean
        let config = FilterConfig::diagonal(2).with_replay(1, 1);
        let filter = replay_filter(config.clone());
        let plain =
            LowRankFilter::new(LinearRegression::new(0.01), DVector::zeros(2), config).unwrap();
        let (xs, ys) = stream(6);

        let (replayed, _) = filter.scan(&xs, &ys, Discard).unwrap();
        let (direct, _) = plain.scan(&xs, &ys, Discard).unwrap();
        assert_abs_diff_eq!(replayed.belief.mean, direct.mean, epsilon = 1e-9);
    }

    #[test]
    fn test_nobs_advances_once_per_step() {
        for n_inner in [1, 3] {
            let config = FilterConfig::spherical(2)
                .with_adaptive_variance(true)
                .with_replay(3, n_inner);
            let filter = replay_filter(config);
            let (xs, ys) = stream(7);
            let (bel, counts) = filter
                .scan(&xs, &ys, |step: &StepRecord<'_, DVector<f64>>| step.belief.nobs)
                .unwrap();
            assert_eq!(counts, (1..=7).collect::<Vec<_>>());
            assert_eq!(bel.belief.nobs, 7);
        }
    }

    #[test]
    fn test_steps_move_buffers_without_copying() {
        let filter = replay_filter(FilterConfig::diagonal(2).with_replay(4, 1));
        let (xs, ys) = stream(3);
        let mut bel = filter.init_belief().unwrap();
        let oldest = bel.snapshots().oldest().unwrap().basis.as_ptr();

        for t in 0..3 {
            let pred = filter.predict_state(bel).unwrap();
            assert_eq!(pred.snapshots().oldest().unwrap().basis.as_ptr(), oldest);
            bel = filter.update_state(pred, &xs[t], &ys[t], t).unwrap();
            assert_eq!(bel.snapshots().oldest().unwrap().basis.as_ptr(), oldest);
        }
        assert_eq!(bel.snapshots().len(), 4);
    }

    #[test]
    fn test_missing_replay_section_uses_defaults() {
        let filter = replay_filter(FilterConfig::spherical(2));
        assert_eq!(filter.replay_config(), ReplayConfig::default());
    }
}
