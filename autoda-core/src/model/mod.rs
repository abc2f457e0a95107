//! Model boundary: the capability trait the trainer drives, plus built-in architectures.

pub mod registry;
pub mod softmax;

pub use registry::ArchitectureRegistry;
pub use softmax::SoftmaxClassifier;

use crate::error::Result;
use crate::tensor::{Batch, Split, Tensor};
use serde::{Deserialize, Serialize};

/// Metric names reported by `fit` and `fit_stream`.
pub mod metrics {
    pub const LOSS: &str = "loss";
    pub const ACCURACY: &str = "accuracy";
    pub const VAL_LOSS: &str = "val_loss";
    pub const VAL_ACCURACY: &str = "val_accuracy";
}

/// Options for an in-memory `fit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitOptions {
    pub batch_size: usize,
    /// Index of the epoch to stop at (exclusive).
    pub epochs: usize,
    /// Index of the first epoch to run.
    pub initial_epoch: usize,
    pub shuffle: bool,
    pub seed: u64,
}

/// Options for a streaming `fit_stream` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub steps_per_epoch: usize,
    pub epochs: usize,
    pub initial_epoch: usize,
}

/// Final evaluation of a model on one split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

/// Per-epoch metrics produced by a single fit call, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitHistory {
    metrics: Vec<(String, Vec<f64>)>,
}

impl FitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value to a metric, creating it on first use.
    pub fn record(&mut self, name: &str, value: f64) {
        match self.metrics.iter_mut().find(|(n, _)| n == name) {
            Some((_, values)) => values.push(value),
            None => self.metrics.push((name.to_string(), vec![value])),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.metrics
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Number of epochs this call completed, counted by its loss records.
    pub fn epochs(&self) -> usize {
        self.get(metrics::LOSS).map_or(0, <[f64]>::len)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.metrics.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// A trainable classifier.
///
/// The trainer dispatches to `fit` or `fit_stream` depending on whether an augmentation
/// policy is active. Both run epochs `initial_epoch..epochs` and return one record per
/// completed epoch, including validation metrics computed on `validation`.
pub trait Model: Send {
    fn name(&self) -> &str;

    fn fit(&mut self, train: &Split, validation: &Split, options: &FitOptions) -> Result<FitHistory>;

    /// Consume exactly `steps_per_epoch` batches per epoch from `stream`.
    fn fit_stream(
        &mut self,
        stream: &mut dyn Iterator<Item = Batch>,
        validation: &Split,
        options: &StreamOptions,
    ) -> Result<FitHistory>;

    fn evaluate(&self, features: &Tensor, labels: &Tensor) -> Result<Evaluation>;
}
