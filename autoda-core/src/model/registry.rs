//! Architecture registry: maps benchmark names to model constructors.

use crate::config::ModelConfig;
use crate::error::{AutodaError, Result};
use crate::model::{Model, SoftmaxClassifier};
use std::collections::BTreeMap;
use tracing::debug;

/// Builds a ready-to-train model from `(num_classes, input_shape, config)`.
pub type ModelBuilder =
    Box<dyn Fn(usize, &[usize], &ModelConfig) -> Result<Box<dyn Model>> + Send + Sync>;

/// Registry of available architectures.
pub struct ArchitectureRegistry {
    builders: BTreeMap<String, ModelBuilder>,
}

impl ArchitectureRegistry {
    pub fn new() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Registry with the built-in architectures.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for name in ["softmax", "LogisticRegression"] {
            registry.register(name, |classes, shape, config| {
                Ok(Box::new(SoftmaxClassifier::new(classes, shape, config)?) as Box<dyn Model>)
            });
        }
        registry
    }

    pub fn register<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(usize, &[usize], &ModelConfig) -> Result<Box<dyn Model>> + Send + Sync + 'static,
    {
        self.builders.insert(name.to_string(), Box::new(builder));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    /// Construct the named architecture.
    pub fn build(
        &self,
        name: &str,
        num_classes: usize,
        input_shape: &[usize],
        config: &ModelConfig,
    ) -> Result<Box<dyn Model>> {
        let builder = self.builders.get(name).ok_or_else(|| {
            AutodaError::precondition(format!(
                "unregistered benchmark '{name}' (available: {})",
                self.names().join(", ")
            ))
        })?;
        debug!(benchmark = name, num_classes, ?input_shape, "Building model");
        builder(num_classes, input_shape, config)
    }
}

impl Default for ArchitectureRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
