//! Budgeted training: the epoch loop and its bookkeeping.

pub mod budget;
pub mod history;
pub mod objective;
pub mod result;
pub mod trainer;

pub use budget::{BudgetState, Clock, ManualClock, MonotonicClock, StopReason};
pub use history::EpochHistory;
pub use objective::{ObjectiveOutcome, objective_function};
pub use result::TrialResult;
pub use trainer::{Augmentation, BudgetedTrainer, TrainingJob};
