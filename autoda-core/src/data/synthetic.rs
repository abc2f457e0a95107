//! Seeded synthetic image dataset.
//!
//! Every class owns a random prototype image; samples are the prototype plus uniform
//! noise, clamped to `[0, 1]`. Small enough to train in seconds, structured enough
//! for a linear model to beat chance.

use crate::config::SyntheticConfig;
use crate::data::{DatasetProvider, DatasetSplits};
use crate::error::{AutodaError, Result};
use crate::tensor::{Split, Tensor, one_hot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NOISE_AMPLITUDE: f32 = 0.35;

pub struct SyntheticDataset {
    config: SyntheticConfig,
}

impl SyntheticDataset {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    fn sample_len(&self) -> usize {
        self.config.height * self.config.width * self.config.channels
    }

    fn generate(&self, prototypes: &[Vec<f32>], count: usize, rng: &mut StdRng) -> Result<Split> {
        let classes = self.config.num_classes;
        let len = self.sample_len();
        let mut data = Vec::with_capacity(count * len);
        let mut labels = Vec::with_capacity(count);
        for i in 0..count {
            let class = i % classes;
            labels.push(class);
            data.extend(
                prototypes[class]
                    .iter()
                    .map(|&p| (p + rng.gen_range(-NOISE_AMPLITUDE..NOISE_AMPLITUDE)).clamp(0.0, 1.0)),
            );
        }
        let shape = vec![count, self.config.height, self.config.width, self.config.channels];
        Split::new(Tensor::new(shape, data)?, one_hot(&labels, classes)?)
    }
}

impl DatasetProvider for SyntheticDataset {
    fn load(&self, _name: &str, augment: bool) -> Result<DatasetSplits> {
        let c = &self.config;
        if c.num_classes < 2 || self.sample_len() == 0 || c.train_samples == 0 {
            return Err(AutodaError::dataset(format!(
                "synthetic dataset needs at least 2 classes, non-empty images and training samples (got {c:?})"
            )));
        }

        let mut rng = StdRng::seed_from_u64(c.seed);
        let prototypes: Vec<Vec<f32>> = (0..c.num_classes)
            .map(|_| (0..self.sample_len()).map(|_| rng.gen_range(0.0..1.0)).collect())
            .collect();

        let train = self.generate(&prototypes, c.train_samples, &mut rng)?;
        let validation = self.generate(&prototypes, c.validation_samples, &mut rng)?;
        let test = self.generate(&prototypes, c.test_samples, &mut rng)?;
        DatasetSplits::from_raw(train, validation, test, augment)
    }
}
