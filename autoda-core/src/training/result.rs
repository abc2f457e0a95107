//! Trial results handed back to the outer optimizer.

use crate::error::{AutodaError, Result};
use crate::model::{Evaluation, metrics};
use crate::policy::ConfigDictionary;
use crate::training::budget::{BudgetState, StopReason};
use crate::training::history::EpochHistory;
use serde::{Deserialize, Serialize};

/// Outcome of one budgeted training trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// Last training accuracy recorded in the history.
    pub train_accuracy: f64,
    /// Last validation loss recorded in the history.
    pub validation_loss: f64,
    /// `1 - accuracy` of the final validation evaluation. The optimisation target.
    pub validation_error: f64,
    /// Wall-clock seconds consumed by training.
    pub used_budget: f64,
    pub train_history: EpochHistory,
    /// Policy parameters, or empty when training without augmentation.
    pub configs: ConfigDictionary,
    pub num_epochs: usize,
    /// Elapsed seconds after each training call.
    pub runtime: Vec<f64>,
    pub stop_reason: StopReason,
}

impl TrialResult {
    pub(crate) fn assemble(
        history: EpochHistory,
        budget: BudgetState,
        evaluation: Evaluation,
        configs: ConfigDictionary,
        stop_reason: StopReason,
    ) -> Result<Self> {
        if budget.num_epochs == 0 || history.is_empty() {
            return Err(AutodaError::NoEpochsCompleted);
        }
        let last = |name: &str| {
            history
                .last(name)
                .ok_or_else(|| AutodaError::MissingMetric(name.to_string()))
        };
        Ok(Self {
            train_accuracy: last(metrics::ACCURACY)?,
            validation_loss: last(metrics::VAL_LOSS)?,
            validation_error: 1.0 - evaluation.accuracy,
            used_budget: budget.used_budget,
            num_epochs: budget.num_epochs,
            runtime: budget.runtime,
            train_history: history,
            configs,
            stop_reason,
        })
    }
}
