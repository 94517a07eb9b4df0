//! Fixed-capacity FIFO buffers used by the replay filter

use crate::belief::{Belief, Residual};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// FIFO buffer that evicts its oldest entry once `capacity` is reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item`, returning the evicted entry if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Every belief field the replay restores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub prior_mean: DVector<f64>,
    pub mean: DVector<f64>,
    pub basis: DMatrix<f64>,
    pub scale: DVector<f64>,
    pub residual: Residual,
    pub obs_noise_var: f64,
}

impl Snapshot {
    pub fn of(bel: &Belief) -> Self {
        Self {
            prior_mean: bel.prior_mean.clone(),
            mean: bel.mean.clone(),
            basis: bel.basis.clone(),
            scale: bel.scale.clone(),
            residual: bel.residual.clone(),
            obs_noise_var: bel.obs_noise_var,
        }
    }

    /// `current` with the snapshot's fields written back; the observation
    /// counter and dynamics are kept.
    pub fn restore(&self, current: &Belief) -> Belief {
        Belief {
            prior_mean: self.prior_mean.clone(),
            mean: self.mean.clone(),
            basis: self.basis.clone(),
            scale: self.scale.clone(),
            residual: self.residual.clone(),
            obs_noise_var: self.obs_noise_var,
            ..current.clone()
        }
    }
}
