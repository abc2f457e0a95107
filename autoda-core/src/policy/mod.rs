//! Augmentation policies: the search space and the sampled configurations that drive
//! augmented mini-batch streams.

pub mod stream;
pub mod transform;

pub use stream::AugmentedStream;
pub use transform::TransformPlan;

use crate::data::ChannelStats;
use crate::error::{AutodaError, Result};
use crate::tensor::Split;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A sampled parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Bool(b) => f64::from(u8::from(b)),
            ParamValue::Int(i) => i as f64,
            ParamValue::Float(f) => f,
        }
    }

    pub fn as_bool(&self) -> bool {
        match *self {
            ParamValue::Bool(b) => b,
            ParamValue::Int(i) => i != 0,
            ParamValue::Float(f) => f != 0.0,
        }
    }
}

/// Parameter name to sampled value, ordered by name.
pub type ConfigDictionary = BTreeMap<String, ParamValue>;

/// One dimension of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Hyperparameter {
    Float { name: String, low: f64, high: f64 },
    Int { name: String, low: i64, high: i64 },
    Bool { name: String },
}

impl Hyperparameter {
    pub fn name(&self) -> &str {
        match self {
            Hyperparameter::Float { name, .. }
            | Hyperparameter::Int { name, .. }
            | Hyperparameter::Bool { name } => name,
        }
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> ParamValue {
        match self {
            Hyperparameter::Float { low, high, .. } if high > low => ParamValue::Float(rng.gen_range(*low..=*high)),
            Hyperparameter::Float { low, .. } => ParamValue::Float(*low),
            Hyperparameter::Int { low, high, .. } if high > low => ParamValue::Int(rng.gen_range(*low..=*high)),
            Hyperparameter::Int { low, .. } => ParamValue::Int(*low),
            Hyperparameter::Bool { .. } => ParamValue::Bool(rng.gen_bool(0.5)),
        }
    }

    fn check(&self, value: &ParamValue) -> Result<()> {
        let ok = match (self, value) {
            (Hyperparameter::Float { low, high, .. }, ParamValue::Float(_) | ParamValue::Int(_)) => {
                let v = value.as_f64();
                v.is_finite() && v >= *low && v <= *high
            }
            (Hyperparameter::Int { low, high, .. }, ParamValue::Int(v)) => v >= low && v <= high,
            (Hyperparameter::Bool { .. }, ParamValue::Bool(_)) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(AutodaError::augmentation(format!(
                "value {value:?} invalid for {self:?}"
            )))
        }
    }
}

/// The augmentation search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSpace {
    pub hyperparameters: Vec<Hyperparameter>,
}

impl Default for ConfigSpace {
    fn default() -> Self {
        let float = |name: &str, low, high| Hyperparameter::Float {
            name: name.to_string(),
            low,
            high,
        };
        let flag = |name: &str| Hyperparameter::Bool {
            name: name.to_string(),
        };
        Self {
            hyperparameters: vec![
                float(transform::ROTATION_RANGE, 0.0, 30.0),
                float(transform::WIDTH_SHIFT_RANGE, 0.0, 0.25),
                float(transform::HEIGHT_SHIFT_RANGE, 0.0, 0.25),
                flag(transform::HORIZONTAL_FLIP),
                flag(transform::VERTICAL_FLIP),
                Hyperparameter::Int {
                    name: transform::CROP_PADDING.to_string(),
                    low: 0,
                    high: 4,
                },
                float(transform::AUGMENT_PROBABILITY, 0.0, 1.0),
            ],
        }
    }
}

impl ConfigSpace {
    pub fn get(&self, name: &str) -> Option<&Hyperparameter> {
        self.hyperparameters.iter().find(|h| h.name() == name)
    }

    /// Draw one value for every hyperparameter.
    pub fn sample_configuration<R: Rng>(&self, rng: &mut R) -> AugmentationPolicy {
        let params = self
            .hyperparameters
            .iter()
            .map(|h| (h.name().to_string(), h.sample(rng)))
            .collect();
        AugmentationPolicy { params }
    }

    pub fn sample_with_seed(&self, seed: u64) -> AugmentationPolicy {
        self.sample_configuration(&mut StdRng::seed_from_u64(seed))
    }

    /// Check a dictionary against the space: known names, in-range values, nothing missing.
    pub fn validate(&self, params: &ConfigDictionary) -> Result<()> {
        for (name, value) in params {
            let hp = self
                .get(name)
                .ok_or_else(|| AutodaError::augmentation(format!("unknown parameter '{name}'")))?;
            hp.check(value)?;
        }
        for hp in &self.hyperparameters {
            if !params.contains_key(hp.name()) {
                return Err(AutodaError::augmentation(format!(
                    "missing parameter '{}'",
                    hp.name()
                )));
            }
        }
        Ok(())
    }
}

/// A sampled augmentation configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AugmentationPolicy {
    params: ConfigDictionary,
}

impl AugmentationPolicy {
    /// Build a policy from an explicit dictionary, validated against `space`.
    pub fn from_dictionary(space: &ConfigSpace, params: ConfigDictionary) -> Result<Self> {
        space.validate(&params)?;
        Ok(Self { params })
    }

    /// Parse a JSON object such as the `configs` field of a previous trial.
    pub fn from_json(space: &ConfigSpace, json: &str) -> Result<Self> {
        let params: ConfigDictionary = serde_json::from_str(json)?;
        Self::from_dictionary(space, params)
    }

    pub fn get_dictionary(&self) -> ConfigDictionary {
        self.params.clone()
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.params.get(name).copied()
    }

    /// Lazily produce augmented, normalised mini-batches from `train`, indefinitely.
    pub fn apply_transform<'a>(
        &self,
        train: &'a Split,
        stats: &'a ChannelStats,
        batch_size: usize,
        seed: u64,
    ) -> Result<AugmentedStream<'a>> {
        AugmentedStream::new(train, stats, TransformPlan::from_policy(self)?, batch_size, seed)
    }
}
