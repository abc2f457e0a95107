//! Dataset loading: providers, per-channel statistics, normalisation.

pub mod idx;
pub mod synthetic;

pub use idx::IdxDataset;
pub use synthetic::SyntheticDataset;

use crate::config::DataConfig;
use crate::error::{AutodaError, Result};
use crate::tensor::{Split, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Added to the variance before taking the square root during normalisation.
pub const NORMALIZATION_EPSILON: f32 = 1e-7;

/// Per-channel mean and variance of the raw training features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: Vec<f32>,
    pub variance: Vec<f32>,
}

impl ChannelStats {
    /// Compute statistics over every pixel of every sample, per channel (NHWC).
    pub fn compute(features: &Tensor) -> Result<Self> {
        let channels = features.channels();
        let data = features.data();
        if data.is_empty() {
            return Err(AutodaError::dataset("cannot compute statistics of an empty tensor"));
        }
        let per_channel = (data.len() / channels) as f64;

        let mut sum = vec![0.0f64; channels];
        for (i, &v) in data.iter().enumerate() {
            sum[i % channels] += f64::from(v);
        }
        let mean: Vec<f64> = sum.iter().map(|s| s / per_channel).collect();

        let mut sq = vec![0.0f64; channels];
        for (i, &v) in data.iter().enumerate() {
            let d = f64::from(v) - mean[i % channels];
            sq[i % channels] += d * d;
        }

        Ok(Self {
            mean: mean.iter().map(|&m| m as f32).collect(),
            variance: sq.iter().map(|&s| (s / per_channel) as f32).collect(),
        })
    }

    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    /// Normalise one sample (or any NHWC slice) in place.
    pub fn normalize_slice(&self, values: &mut [f32]) {
        let channels = self.channels();
        for (i, v) in values.iter_mut().enumerate() {
            let c = i % channels;
            *v = (*v - self.mean[c]) / (self.variance[c] + NORMALIZATION_EPSILON).sqrt();
        }
    }

    pub fn normalize(&self, features: &mut Tensor) {
        self.normalize_slice(features.data_mut());
    }
}

/// Train/validation/test splits plus the training statistics.
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub train: Split,
    pub validation: Split,
    pub test: Split,
    pub stats: ChannelStats,
    /// Whether `train` was left un-normalised for an augmentation stream.
    pub augment: bool,
}

impl DatasetSplits {
    /// Compute statistics on the raw training split and normalise.
    ///
    /// With `augment` the training split stays raw; the augmentation stream normalises
    /// each batch after transforming it.
    pub fn from_raw(mut train: Split, mut validation: Split, mut test: Split, augment: bool) -> Result<Self> {
        let stats = ChannelStats::compute(&train.features)?;
        if !augment {
            stats.normalize(&mut train.features);
        }
        stats.normalize(&mut validation.features);
        stats.normalize(&mut test.features);
        Ok(Self {
            train,
            validation,
            test,
            stats,
            augment,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.train.num_classes()
    }

    pub fn input_shape(&self) -> Vec<usize> {
        self.train.input_shape().to_vec()
    }
}

/// Supplies normalised splits for a named dataset.
pub trait DatasetProvider: Send + Sync {
    fn load(&self, name: &str, augment: bool) -> Result<DatasetSplits>;
}

/// Name-indexed set of dataset providers.
pub struct DatasetCatalog {
    providers: BTreeMap<String, Box<dyn DatasetProvider>>,
}

impl DatasetCatalog {
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    /// Catalog with the built-in providers configured from `config`.
    pub fn from_config(config: &DataConfig) -> Self {
        let mut catalog = Self::new();
        catalog.register("synthetic", Box::new(SyntheticDataset::new(config.synthetic.clone())));
        for name in ["mnist", "fashion-mnist"] {
            catalog.register(
                name,
                Box::new(IdxDataset::new(&config.data_dir, config.validation_fraction)),
            );
        }
        catalog
    }

    pub fn register(&mut self, name: &str, provider: Box<dyn DatasetProvider>) {
        self.providers.insert(name.to_string(), provider);
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetProvider for DatasetCatalog {
    fn load(&self, name: &str, augment: bool) -> Result<DatasetSplits> {
        let provider = self.providers.get(name).ok_or_else(|| {
            AutodaError::not_found(format!(
                "dataset '{name}' (available: {})",
                self.names().join(", ")
            ))
        })?;
        let splits = provider.load(name, augment)?;
        info!(
            dataset = name,
            augment,
            train = splits.train.len(),
            validation = splits.validation.len(),
            test = splits.test.len(),
            "Loaded dataset"
        );
        debug!(mean = ?splits.stats.mean, variance = ?splits.stats.variance, "Training statistics");
        Ok(splits)
    }
}
