//! # autoda-core: budgeted training trials for augmentation policy search
//!
//! One trial trains an image classifier for as many epochs as a wall-clock budget allows,
//! optionally on a stream of batches augmented by a sampled policy, and reports a
//! [`TrialResult`] whose `validation_error` an outer optimizer minimises.
//!
//! Collaborators sit behind small seams:
//! - [`data::DatasetProvider`] supplies normalised splits and channel statistics
//! - [`model::Model`] is driven by the trainer; [`model::ArchitectureRegistry`] builds them
//! - [`policy::AugmentationPolicy`] produces the augmented batch stream
//! - [`session::ComputeSession`] owns the compute device for the trial

pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod policy;
pub mod session;
pub mod tensor;
pub mod training;

pub use config::AutodaConfig;
pub use error::AutodaError;
pub use policy::{AugmentationPolicy, ConfigSpace};
pub use session::ComputeSession;
pub use training::{BudgetedTrainer, TrainingJob, TrialResult};
