//! Configuration for AutoDA trials.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/autoda/config.toml` and/or `.autoda/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::AutodaError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutodaConfig {
    /// Budgeted training loop settings.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Dataset selection and loading.
    #[serde(default)]
    pub data: DataConfig,
    /// Architecture and optimizer.
    #[serde(default)]
    pub model: ModelConfig,
    /// Compute device lease.
    #[serde(default)]
    pub session: SessionConfig,
    /// Result artifacts.
    #[serde(default)]
    pub output: OutputConfig,
}

/// What to do when an epoch call reports no completed epochs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroProgressPolicy {
    /// Raise on the first empty call.
    Fail,
    /// Allow one immediate retry, raise on the second consecutive empty call.
    #[default]
    RetryOnce,
}

impl std::fmt::Display for ZeroProgressPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZeroProgressPolicy::Fail => write!(f, "fail"),
            ZeroProgressPolicy::RetryOnce => write!(f, "retry_once"),
        }
    }
}

/// Budgeted training loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Mini-batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Hard cap on completed epochs.
    #[serde(default = "default_max_epochs")]
    pub max_epochs: usize,
    /// Wall-clock budget per trial, in seconds.
    #[serde(default = "default_time_budget")]
    pub time_budget_secs: f64,
    /// Multiplier applied to the last epoch's duration when predicting the next one.
    #[serde(default = "default_budget_margin")]
    pub budget_margin: f64,
    /// Handling of epoch calls that report no progress.
    #[serde(default)]
    pub zero_progress: ZeroProgressPolicy,
    /// Base seed for shuffling, augmentation and policy sampling.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_epochs: default_max_epochs(),
            time_budget_secs: default_time_budget(),
            budget_margin: default_budget_margin(),
            zero_progress: ZeroProgressPolicy::default(),
            seed: default_seed(),
        }
    }
}

fn default_batch_size() -> usize {
    512
}

fn default_max_epochs() -> usize {
    40
}

fn default_time_budget() -> f64 {
    900.0
}

fn default_budget_margin() -> f64 {
    1.11
}

fn default_seed() -> u64 {
    42
}

/// Dataset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Dataset name resolved through the dataset catalog.
    #[serde(default = "default_dataset")]
    pub dataset: String,
    /// Directory holding on-disk datasets (one sub-directory per dataset).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Fraction of the training set held out for validation.
    #[serde(default = "default_validation_fraction")]
    pub validation_fraction: f64,
    /// Synthetic dataset shape.
    #[serde(default)]
    pub synthetic: SyntheticConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            data_dir: default_data_dir(),
            validation_fraction: default_validation_fraction(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

fn default_dataset() -> String {
    "synthetic".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".autoda/data")
}

fn default_validation_fraction() -> f64 {
    0.1
}

/// Shape of the generated `synthetic` dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_synthetic_train")]
    pub train_samples: usize,
    #[serde(default = "default_synthetic_eval")]
    pub validation_samples: usize,
    #[serde(default = "default_synthetic_eval")]
    pub test_samples: usize,
    #[serde(default = "default_synthetic_side")]
    pub height: usize,
    #[serde(default = "default_synthetic_side")]
    pub width: usize,
    #[serde(default = "default_synthetic_channels")]
    pub channels: usize,
    #[serde(default = "default_synthetic_classes")]
    pub num_classes: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            train_samples: default_synthetic_train(),
            validation_samples: default_synthetic_eval(),
            test_samples: default_synthetic_eval(),
            height: default_synthetic_side(),
            width: default_synthetic_side(),
            channels: default_synthetic_channels(),
            num_classes: default_synthetic_classes(),
            seed: default_seed(),
        }
    }
}

fn default_synthetic_train() -> usize {
    2048
}

fn default_synthetic_eval() -> usize {
    256
}

fn default_synthetic_side() -> usize {
    16
}

fn default_synthetic_channels() -> usize {
    3
}

fn default_synthetic_classes() -> usize {
    10
}

/// Architecture and optimizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Benchmark name resolved through the architecture registry.
    #[serde(default = "default_benchmark")]
    pub benchmark: String,
    /// Adam learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Seed for weight initialisation.
    #[serde(default = "default_seed")]
    pub init_seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            benchmark: default_benchmark(),
            learning_rate: default_learning_rate(),
            init_seed: default_seed(),
        }
    }
}

fn default_benchmark() -> String {
    "softmax".to_string()
}

fn default_learning_rate() -> f64 {
    0.001_668_100_537_200_057_5
}

/// Compute session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Device identifier, e.g. `cpu:0` or `gpu:1`.
    #[serde(default = "default_device")]
    pub device: String,
    /// Directory for device lease files (platform data dir if unset).
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
    /// Log where each operation is placed.
    #[serde(default)]
    pub log_device_placement: bool,
    /// Fall back to another device when the requested one cannot run an operation.
    #[serde(default = "default_true")]
    pub allow_soft_placement: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            lock_dir: None,
            log_device_placement: false,
            allow_soft_placement: true,
        }
    }
}

fn default_device() -> String {
    "cpu:0".to_string()
}

fn default_true() -> bool {
    true
}

/// Result artifact configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving `config_<id>.json` files.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
        }
    }
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Platform project directories for AutoDA.
pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "autoda", "autoda")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `AUTODA_`, `__` separates sections)
/// 3. Explicit config file, if given
/// 4. Workspace-local config (`.autoda/config.toml`)
/// 5. User config (`~/.config/autoda/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&AutodaConfig>,
) -> Result<AutodaConfig, AutodaError> {
    let mut figment = Figment::from(Serialized::defaults(AutodaConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".autoda").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(AutodaError::not_found(format!(
                "config file {}",
                path.display()
            )));
        }
        figment = figment.merge(Toml::file(path));
    }

    // AUTODA_TRAINING__TIME_BUDGET_SECS, AUTODA_MODEL__BENCHMARK, ...
    figment = figment.merge(Env::prefixed("AUTODA_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    Ok(figment.extract()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AutodaConfig::default();
        assert_eq!(config.training.batch_size, 512);
        assert_eq!(config.training.max_epochs, 40);
        assert!((config.training.time_budget_secs - 900.0).abs() < f64::EPSILON);
        assert!((config.training.budget_margin - 1.11).abs() < f64::EPSILON);
        assert_eq!(config.training.zero_progress, ZeroProgressPolicy::RetryOnce);
        assert_eq!(config.model.benchmark, "softmax");
        assert_eq!(config.session.device, "cpu:0");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AutodaConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AutodaConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.training.max_epochs, config.training.max_epochs);
        assert_eq!(deserialized.data.dataset, config.data.dataset);
        assert_eq!(deserialized.output.results_dir, config.output.results_dir);
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config: AutodaConfig = toml::from_str(
            r#"
[training]
max_epochs = 3
zero_progress = "fail"
"#,
        )
        .unwrap();
        assert_eq!(config.training.max_epochs, 3);
        assert_eq!(config.training.batch_size, 512);
        assert_eq!(config.training.zero_progress, ZeroProgressPolicy::Fail);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = AutodaConfig::default();
        overrides.training.time_budget_secs = 60.0;
        overrides.model.benchmark = "LogisticRegression".to_string();

        let config = load_config(None, None, Some(&overrides)).unwrap();
        assert!((config.training.time_budget_secs - 60.0).abs() < f64::EPSILON);
        assert_eq!(config.model.benchmark, "LogisticRegression");
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let autoda_dir = dir.path().join(".autoda");
        std::fs::create_dir_all(&autoda_dir).unwrap();
        std::fs::write(
            autoda_dir.join("config.toml"),
            r#"
[training]
batch_size = 128
max_epochs = 12

[data]
dataset = "mnist"
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None, None).unwrap();
        assert_eq!(config.training.batch_size, 128);
        assert_eq!(config.training.max_epochs, 12);
        assert_eq!(config.data.dataset, "mnist");
    }

    #[test]
    fn test_explicit_config_file_wins_over_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let autoda_dir = dir.path().join(".autoda");
        std::fs::create_dir_all(&autoda_dir).unwrap();
        std::fs::write(autoda_dir.join("config.toml"), "[training]\nmax_epochs = 12\n").unwrap();
        let explicit = dir.path().join("trial.toml");
        std::fs::write(&explicit, "[training]\nmax_epochs = 2\n").unwrap();

        let config = load_config(Some(dir.path()), Some(&explicit), None).unwrap();
        assert_eq!(config.training.max_epochs, 2);
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_config(None, Some(&missing), None).unwrap_err();
        assert!(matches!(err, AutodaError::NotFound(_)));
    }

    #[test]
    fn test_zero_progress_display() {
        assert_eq!(ZeroProgressPolicy::Fail.to_string(), "fail");
        assert_eq!(ZeroProgressPolicy::RetryOnce.to_string(), "retry_once");
    }
}
