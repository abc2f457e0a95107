//! AutoDA driver: runs one budgeted augmentation trial and records its result.
//!
//! Invoked once per configuration by an outer optimizer, e.g.
//! `autoda 17 --dataset mnist --time-budget 600`.

mod report;

use anyhow::Context;
use autoda_core::config::{AutodaConfig, load_config, project_dirs};
use autoda_core::data::DatasetCatalog;
use autoda_core::model::ArchitectureRegistry;
use autoda_core::training::objective_function;
use autoda_core::{AugmentationPolicy, ComputeSession, ConfigSpace};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// AutoDA: budgeted training trials for augmentation policy search
#[derive(Parser, Debug)]
#[command(name = "autoda", version, about, long_about = None)]
struct Cli {
    /// Identifier of this configuration; names the result file and seeds policy sampling
    config_id: u64,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Dataset to train on (synthetic, mnist, fashion-mnist)
    #[arg(long)]
    dataset: Option<String>,

    /// Registered benchmark architecture
    #[arg(long)]
    benchmark: Option<String>,

    /// Wall-clock training budget in seconds
    #[arg(long)]
    time_budget: Option<f64>,

    /// Maximum number of epochs
    #[arg(long)]
    max_epochs: Option<usize>,

    /// Mini-batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Train on raw batches without augmentation
    #[arg(long, conflicts_with = "policy")]
    no_augment: bool,

    /// JSON file with a fixed policy instead of sampling one
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Directory receiving config_<id>.json
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AutodaConfig) {
        if let Some(dataset) = &self.dataset {
            config.data.dataset = dataset.clone();
        }
        if let Some(benchmark) = &self.benchmark {
            config.model.benchmark = benchmark.clone();
        }
        if let Some(budget) = self.time_budget {
            config.training.time_budget_secs = budget;
        }
        if let Some(max_epochs) = self.max_epochs {
            config.training.max_epochs = max_epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(dir) = &self.results_dir {
            config.output.results_dir = dir.clone();
        }
    }
}

/// Pick the policy for this trial: none, a fixed one from disk, or a seeded sample.
fn resolve_policy(cli: &Cli, config: &AutodaConfig) -> anyhow::Result<Option<AugmentationPolicy>> {
    let space = ConfigSpace::default();
    if cli.no_augment {
        return Ok(None);
    }
    if let Some(path) = &cli.policy {
        let json = std::fs::read_to_string(path).with_context(|| format!("reading policy {}", path.display()))?;
        let policy = AugmentationPolicy::from_json(&space, &json)?;
        return Ok(Some(policy));
    }
    let seed = config.training.seed.wrapping_add(cli.config_id);
    Ok(Some(space.sample_with_seed(seed)))
}

fn resolve_results_dir(workspace: &Path, results_dir: &Path) -> PathBuf {
    if results_dir.is_absolute() {
        results_dir.to_path_buf()
    } else {
        workspace.join(results_dir)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = project_dirs()
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "autoda.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = load_config(Some(&workspace), cli.config.as_deref(), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    cli.apply_overrides(&mut config);

    let policy = resolve_policy(&cli, &config)?;
    match &policy {
        Some(policy) => info!(config_id = cli.config_id, policy = ?policy.get_dictionary(), "Augmentation policy"),
        None => warn!(config_id = cli.config_id, "Augmentation disabled"),
    }

    let session = ComputeSession::acquire(&config.session)?;
    let session_id = session.id().to_string();
    let results_dir = resolve_results_dir(&workspace, &config.output.results_dir);
    let started_at = chrono::Utc::now();

    let trial_config = config.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let catalog = DatasetCatalog::from_config(&trial_config.data);
        let registry = ArchitectureRegistry::with_defaults();
        // The device lease is released when `session` drops at the end of the trial.
        objective_function(&trial_config, policy, &session, &catalog, &registry)
    })
    .await
    .context("trial task panicked")??;

    let record = report::TrialRecord::new(cli.config_id, session_id, outcome, started_at, chrono::Utc::now());
    let path = report::write_record(&results_dir, &record).await?;
    info!(
        config_id = cli.config_id,
        validation_error = record.result.validation_error,
        num_epochs = record.result.num_epochs,
        used_budget = record.result.used_budget,
        "Trial finished"
    );
    println!("{}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoda_core::policy::ParamValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_overrides_apply() {
        let cli = Cli::parse_from([
            "autoda",
            "4",
            "--dataset",
            "mnist",
            "--time-budget",
            "60",
            "--max-epochs",
            "5",
            "--batch-size",
            "64",
        ]);
        let mut config = AutodaConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(cli.config_id, 4);
        assert_eq!(config.data.dataset, "mnist");
        assert_eq!(config.training.time_budget_secs, 60.0);
        assert_eq!(config.training.max_epochs, 5);
        assert_eq!(config.training.batch_size, 64);
        assert_eq!(config.model.benchmark, "softmax");
    }

    #[test]
    fn test_policy_sampled_from_config_id() {
        let config = AutodaConfig::default();
        let a = resolve_policy(&Cli::parse_from(["autoda", "1"]), &config).unwrap();
        let b = resolve_policy(&Cli::parse_from(["autoda", "1"]), &config).unwrap();
        let c = resolve_policy(&Cli::parse_from(["autoda", "2"]), &config).unwrap();
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_no_augment() {
        let config = AutodaConfig::default();
        let policy = resolve_policy(&Cli::parse_from(["autoda", "1", "--no-augment"]), &config).unwrap();
        assert!(policy.is_none());
    }

    #[test]
    fn test_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(
            &path,
            r#"{"rotation_range": 10.5, "width_shift_range": 0.125, "height_shift_range": 0.25,
                "horizontal_flip": true, "vertical_flip": false, "crop_padding": 2,
                "augment_probability": 0.5}"#,
        )
        .unwrap();

        let cli = Cli::parse_from(["autoda", "1", "--policy", path.to_str().unwrap()]);
        let policy = resolve_policy(&cli, &AutodaConfig::default()).unwrap().unwrap();
        assert_eq!(policy.get("rotation_range"), Some(ParamValue::Float(10.5)));
        assert_eq!(policy.get("crop_padding"), Some(ParamValue::Int(2)));
        assert_eq!(policy.get("horizontal_flip"), Some(ParamValue::Bool(true)));
    }

    #[test]
    fn test_policy_file_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"rotation_range": 400.0}"#).unwrap();

        let cli = Cli::parse_from(["autoda", "1", "--policy", path.to_str().unwrap()]);
        assert!(resolve_policy(&cli, &AutodaConfig::default()).is_err());
    }

    #[test]
    fn test_policy_conflicts_with_no_augment() {
        let parsed = Cli::try_parse_from(["autoda", "1", "--no-augment", "--policy", "p.json"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_results_dir_relative_to_workspace() {
        let ws = Path::new("/tmp/ws");
        assert_eq!(resolve_results_dir(ws, Path::new("results")), ws.join("results"));
        assert_eq!(resolve_results_dir(ws, Path::new("/abs/out")), PathBuf::from("/abs/out"));
    }
}
