//! Budgeted trainer: trains one epoch at a time until the epoch cap or the wall-clock
//! budget stops it.
//!
//! Before each epoch the trainer predicts its cost as `margin` times the previous epoch's
//! duration and refuses to start it if `used_budget + margin * duration_last_epoch` would
//! reach the budget. An epoch in progress is never interrupted, so a single unexpectedly
//! slow epoch can still overshoot.

use crate::config::{TrainingConfig, ZeroProgressPolicy};
use crate::data::ChannelStats;
use crate::error::{AutodaError, Result};
use crate::model::{FitHistory, FitOptions, Model, StreamOptions};
use crate::policy::{AugmentationPolicy, ConfigDictionary};
use crate::session::ComputeSession;
use crate::tensor::Split;
use crate::training::budget::{BudgetState, Clock, MonotonicClock};
use crate::training::history::EpochHistory;
use crate::training::result::TrialResult;
use tracing::{debug, info, info_span, warn};

/// Whether a trial trains on raw batches or on an augmented stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Augmentation {
    Disabled,
    Enabled(AugmentationPolicy),
}

impl Augmentation {
    pub fn policy(&self) -> Option<&AugmentationPolicy> {
        match self {
            Augmentation::Disabled => None,
            Augmentation::Enabled(policy) => Some(policy),
        }
    }

    /// Parameter dictionary reported in the result.
    pub fn configs(&self) -> ConfigDictionary {
        self.policy()
            .map(AugmentationPolicy::get_dictionary)
            .unwrap_or_default()
    }
}

impl From<Option<AugmentationPolicy>> for Augmentation {
    fn from(policy: Option<AugmentationPolicy>) -> Self {
        policy.map_or(Augmentation::Disabled, Augmentation::Enabled)
    }
}

/// Everything one trial trains on, except the model itself.
#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub train: Split,
    pub validation: Split,
    /// Per-channel statistics of the raw training data, used by the augmented stream.
    pub stats: ChannelStats,
    pub batch_size: usize,
    /// Wall-clock budget in seconds.
    pub time_budget: f64,
    pub max_epochs: usize,
    pub augmentation: Augmentation,
    pub seed: u64,
}

impl TrainingJob {
    /// Number of batches streamed per epoch: `floor(num_datapoints / batch_size)`.
    pub fn steps_per_epoch(&self) -> usize {
        if self.batch_size == 0 {
            0
        } else {
            self.train.len() / self.batch_size
        }
    }

    /// Reject jobs the loop cannot run meaningfully.
    pub fn validate(&self) -> Result<()> {
        if self.max_epochs == 0 {
            return Err(AutodaError::precondition("max_epochs must be at least 1"));
        }
        if !(self.time_budget.is_finite() && self.time_budget > 0.0) {
            return Err(AutodaError::precondition(format!(
                "time_budget must be a positive number of seconds, got {}",
                self.time_budget
            )));
        }
        if self.batch_size == 0 {
            return Err(AutodaError::precondition("batch_size must be positive"));
        }
        for (name, split) in [("train", &self.train), ("validation", &self.validation)] {
            if split.features.rows() != split.labels.rows() {
                return Err(AutodaError::precondition(format!(
                    "{name} split has {} feature rows but {} label rows",
                    split.features.rows(),
                    split.labels.rows()
                )));
            }
            if split.is_empty() {
                return Err(AutodaError::precondition(format!("{name} split is empty")));
            }
        }
        if self.train.input_shape() != self.validation.input_shape()
            || self.train.num_classes() != self.validation.num_classes()
        {
            return Err(AutodaError::precondition(format!(
                "train samples {:?} x {} classes do not match validation samples {:?} x {} classes",
                self.train.input_shape(),
                self.train.num_classes(),
                self.validation.input_shape(),
                self.validation.num_classes()
            )));
        }
        if let Augmentation::Enabled(_) = self.augmentation {
            if self.stats.channels() != self.train.features.channels() {
                return Err(AutodaError::precondition(format!(
                    "statistics cover {} channels, training data has {}",
                    self.stats.channels(),
                    self.train.features.channels()
                )));
            }
            if self.steps_per_epoch() == 0 {
                return Err(AutodaError::precondition(format!(
                    "{} training samples cannot fill one batch of {}",
                    self.train.len(),
                    self.batch_size
                )));
            }
        }
        Ok(())
    }
}

/// Runs the budgeted epoch loop.
pub struct BudgetedTrainer<C: Clock = MonotonicClock> {
    clock: C,
    margin: f64,
    zero_progress: ZeroProgressPolicy,
}

impl BudgetedTrainer<MonotonicClock> {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::new())
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new()
            .with_margin(config.budget_margin)
            .with_zero_progress(config.zero_progress)
    }
}

impl Default for BudgetedTrainer<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> BudgetedTrainer<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            margin: 1.11,
            zero_progress: ZeroProgressPolicy::default(),
        }
    }

    /// Safety factor applied to the previous epoch's duration.
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_zero_progress(mut self, policy: ZeroProgressPolicy) -> Self {
        self.zero_progress = policy;
        self
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Train `model` on `job` within the job's epoch and time limits.
    ///
    /// Preconditions are checked before the model is touched. On success the model has
    /// been evaluated once on the validation split and the result carries the full
    /// epoch history.
    pub fn run(&self, session: &ComputeSession, model: &mut dyn Model, job: &TrainingJob) -> Result<TrialResult> {
        if !(self.margin.is_finite() && self.margin >= 0.0) {
            return Err(AutodaError::precondition(format!(
                "budget margin must be a non-negative number, got {}",
                self.margin
            )));
        }
        job.validate()?;

        let span = info_span!("trial", session_id = session.id(), device = session.device(), model = model.name());
        let _enter = span.enter();
        info!(
            time_budget = job.time_budget,
            max_epochs = job.max_epochs,
            batch_size = job.batch_size,
            augmented = job.augmentation.policy().is_some(),
            "Starting budgeted training"
        );

        let start = self.clock.now();
        let mut budget = BudgetState::default();
        let mut history = EpochHistory::new();
        let mut empty_calls = 0;

        let stop_reason = loop {
            if let Some(reason) = budget.stop_reason(job.max_epochs, job.time_budget, self.margin) {
                break reason;
            }
            debug!(
                epoch = budget.num_epochs,
                projected = budget.projected(self.margin),
                "Starting epoch"
            );

            let call = self.train_epoch(model, job, budget.num_epochs)?;
            let epochs = call.epochs();
            if epochs > 1 {
                return Err(AutodaError::model(format!(
                    "training call for epoch {} reported {epochs} epochs",
                    budget.num_epochs
                )));
            }
            history.merge(&call);

            let elapsed = self.clock.now().saturating_sub(start).as_secs_f64();
            budget.record(elapsed, epochs);
            info!(
                num_epochs = budget.num_epochs,
                used_budget = budget.used_budget,
                duration_last_epoch = budget.duration_last_epoch,
                time_budget = job.time_budget,
                "Epoch finished"
            );

            if epochs == 0 {
                empty_calls += 1;
                let allowed = match self.zero_progress {
                    ZeroProgressPolicy::Fail => 0,
                    ZeroProgressPolicy::RetryOnce => 1,
                };
                if empty_calls > allowed {
                    return Err(AutodaError::ZeroProgress {
                        epoch: budget.num_epochs,
                        attempts: empty_calls,
                    });
                }
                warn!(epoch = budget.num_epochs, "Training call made no progress, retrying");
            } else {
                empty_calls = 0;
            }
        };

        info!(%stop_reason, num_epochs = budget.num_epochs, used_budget = budget.used_budget, "Training stopped");
        if budget.num_epochs == 0 {
            return Err(AutodaError::NoEpochsCompleted);
        }

        let evaluation = model.evaluate(&job.validation.features, &job.validation.labels)?;
        debug!(loss = evaluation.loss, accuracy = evaluation.accuracy, "Final validation");

        TrialResult::assemble(history, budget, evaluation, job.augmentation.configs(), stop_reason)
    }

    /// Run exactly one more epoch, starting at `epoch`.
    fn train_epoch(&self, model: &mut dyn Model, job: &TrainingJob, epoch: usize) -> Result<FitHistory> {
        match &job.augmentation {
            Augmentation::Disabled => {
                let options = FitOptions {
                    batch_size: job.batch_size,
                    epochs: epoch + 1,
                    initial_epoch: epoch,
                    shuffle: true,
                    seed: job.seed,
                };
                model.fit(&job.train, &job.validation, &options)
            }
            Augmentation::Enabled(policy) => {
                let steps = job.steps_per_epoch();
                let stream = policy.apply_transform(
                    &job.train,
                    &job.stats,
                    job.batch_size,
                    job.seed.wrapping_add(epoch as u64),
                )?;
                let mut bounded = stream.take(steps);
                let options = StreamOptions {
                    steps_per_epoch: steps,
                    epochs: epoch + 1,
                    initial_epoch: epoch,
                };
                model.fit_stream(&mut bounded, &job.validation, &options)
            }
        }
    }
}
