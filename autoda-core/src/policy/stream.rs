//! Infinite, pull-based stream of augmented mini-batches.

use crate::data::ChannelStats;
use crate::error::{AutodaError, Result};
use crate::policy::TransformPlan;
use crate::tensor::{Batch, Split};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Yields freshly augmented, normalised batches forever.
///
/// Samples are drawn by walking a shuffled permutation of the split; the permutation is
/// reshuffled every time it is exhausted. Never returns `None`, so callers bound
/// consumption themselves (e.g. with `Iterator::take`).
pub struct AugmentedStream<'a> {
    split: &'a Split,
    stats: &'a ChannelStats,
    plan: TransformPlan,
    batch_size: usize,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
    height: usize,
    width: usize,
    channels: usize,
    produced: usize,
}

impl<'a> AugmentedStream<'a> {
    pub fn new(
        split: &'a Split,
        stats: &'a ChannelStats,
        plan: TransformPlan,
        batch_size: usize,
        seed: u64,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(AutodaError::precondition("batch_size must be positive"));
        }
        if split.is_empty() {
            return Err(AutodaError::precondition("cannot stream from an empty split"));
        }
        let &[height, width, channels] = split.input_shape() else {
            return Err(AutodaError::augmentation(format!(
                "expected [height, width, channels] samples, got {:?}",
                split.input_shape()
            )));
        };
        if stats.channels() != channels {
            return Err(AutodaError::precondition(format!(
                "statistics cover {} channels but samples have {channels}",
                stats.channels()
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..split.len()).collect();
        order.shuffle(&mut rng);
        Ok(Self {
            split,
            stats,
            plan,
            batch_size,
            order,
            cursor: 0,
            rng,
            height,
            width,
            channels,
            produced: 0,
        })
    }

    /// Batches yielded so far.
    pub fn produced(&self) -> usize {
        self.produced
    }

    fn next_indices(&mut self) -> Vec<usize> {
        let mut indices = Vec::with_capacity(self.batch_size);
        while indices.len() < self.batch_size {
            if self.cursor == self.order.len() {
                self.order.shuffle(&mut self.rng);
                self.cursor = 0;
            }
            let take = (self.batch_size - indices.len()).min(self.order.len() - self.cursor);
            indices.extend_from_slice(&self.order[self.cursor..self.cursor + take]);
            self.cursor += take;
        }
        indices
    }
}

impl Iterator for AugmentedStream<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let indices = self.next_indices();
        let mut batch = self.split.gather(&indices);
        for i in 0..batch.len() {
            let sample = batch.features.row_mut(i);
            self.plan
                .apply(sample, self.height, self.width, self.channels, &mut self.rng);
            self.stats.normalize_slice(sample);
        }
        self.produced += 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}
