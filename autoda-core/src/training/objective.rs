//! Objective function: one complete trial from configuration to result.

use crate::config::AutodaConfig;
use crate::data::DatasetProvider;
use crate::error::{AutodaError, Result};
use crate::model::ArchitectureRegistry;
use crate::policy::AugmentationPolicy;
use crate::session::ComputeSession;
use crate::training::result::TrialResult;
use crate::training::trainer::{Augmentation, BudgetedTrainer, TrainingJob};
use std::time::Instant;
use tracing::info;

/// A finished trial plus what it took to set it up.
#[derive(Debug, Clone)]
pub struct ObjectiveOutcome {
    pub result: TrialResult,
    /// Seconds spent constructing the model.
    pub compile_time: f64,
    pub dataset: String,
    pub benchmark: String,
}

/// Load the dataset, build the benchmark model and run one budgeted trial.
///
/// The dataset is loaded un-normalised for training when a policy is given, since the
/// augmented stream normalises batches itself.
pub fn objective_function(
    config: &AutodaConfig,
    policy: Option<AugmentationPolicy>,
    session: &ComputeSession,
    datasets: &dyn DatasetProvider,
    registry: &ArchitectureRegistry,
) -> Result<ObjectiveOutcome> {
    let benchmark = &config.model.benchmark;
    if !registry.contains(benchmark) {
        return Err(AutodaError::precondition(format!(
            "unregistered benchmark '{benchmark}' (available: {})",
            registry.names().join(", ")
        )));
    }

    let augmentation = Augmentation::from(policy);
    let splits = datasets.load(&config.data.dataset, augmentation.policy().is_some())?;

    let compile_start = Instant::now();
    let mut model = registry.build(
        benchmark,
        splits.num_classes(),
        &splits.input_shape(),
        &config.model,
    )?;
    let compile_time = compile_start.elapsed().as_secs_f64();
    info!(benchmark = %benchmark, compile_time, "Model ready");

    let job = TrainingJob {
        train: splits.train,
        validation: splits.validation,
        stats: splits.stats,
        batch_size: config.training.batch_size,
        time_budget: config.training.time_budget_secs,
        max_epochs: config.training.max_epochs,
        augmentation,
        seed: config.training.seed,
    };

    let result = BudgetedTrainer::from_config(&config.training).run(session, model.as_mut(), &job)?;
    Ok(ObjectiveOutcome {
        result,
        compile_time,
        dataset: config.data.dataset.clone(),
        benchmark: benchmark.clone(),
    })
}
