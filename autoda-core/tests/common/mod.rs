//! Shared fixtures: a scripted model driven by a manual clock.

#![allow(dead_code)]

use autoda_core::config::SessionConfig;
use autoda_core::data::ChannelStats;
use autoda_core::error::{AutodaError, Result};
use autoda_core::model::{Evaluation, FitHistory, FitOptions, Model, StreamOptions, metrics};
use autoda_core::session::ComputeSession;
use autoda_core::tensor::{Batch, Split, Tensor, one_hot};
use autoda_core::training::{Augmentation, ManualClock, TrainingJob};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Model whose epochs take scripted amounts of (manual) time.
pub struct ScriptedModel {
    clock: ManualClock,
    /// Seconds per call; the last entry repeats.
    durations: Vec<f64>,
    /// Epoch records per call; the last entry repeats.
    records: Vec<usize>,
    pub fail_on_call: Option<usize>,
    /// `val_loss` reported by calls that complete no epoch.
    pub stray_val_loss: Option<f64>,
    pub final_accuracy: f64,
    pub fit_calls: usize,
    pub stream_calls: usize,
    /// Batches pulled from the stream, per streaming call.
    pub batches_per_call: Vec<usize>,
    pub options_seen: Vec<(usize, usize)>,
    pub evaluate_calls: AtomicUsize,
    pub last_shuffle: Mutex<Option<bool>>,
}

impl ScriptedModel {
    pub fn new(clock: &ManualClock, durations: &[f64]) -> Self {
        Self {
            clock: clock.clone(),
            durations: durations.to_vec(),
            records: vec![1],
            fail_on_call: None,
            stray_val_loss: None,
            final_accuracy: 0.8,
            fit_calls: 0,
            stream_calls: 0,
            batches_per_call: Vec::new(),
            options_seen: Vec::new(),
            evaluate_calls: AtomicUsize::new(0),
            last_shuffle: Mutex::new(None),
        }
    }

    pub fn with_records(mut self, records: &[usize]) -> Self {
        self.records = records.to_vec();
        self
    }

    pub fn total_calls(&self) -> usize {
        self.fit_calls + self.stream_calls
    }

    fn scripted<T: Copy>(values: &[T], call: usize) -> T {
        values[call.min(values.len() - 1)]
    }

    fn epoch_call(&mut self, initial_epoch: usize, epochs: usize) -> Result<FitHistory> {
        let call = self.total_calls();
        self.options_seen.push((initial_epoch, epochs));
        if self.fail_on_call == Some(call) {
            return Err(AutodaError::model("device lost"));
        }
        self.clock.advance_secs(Self::scripted(&self.durations, call));

        let mut history = FitHistory::new();
        let records = Self::scripted(&self.records, call);
        if let (0, Some(value)) = (records, self.stray_val_loss) {
            history.record(metrics::VAL_LOSS, value);
        }
        for i in 0..records {
            let epoch = (initial_epoch + i) as f64;
            history.record(metrics::LOSS, 1.0 / (epoch + 1.0));
            history.record(metrics::ACCURACY, 0.5 + epoch / 100.0);
            history.record(metrics::VAL_LOSS, 1.5 / (epoch + 1.0));
            history.record(metrics::VAL_ACCURACY, 0.4 + epoch / 100.0);
        }
        Ok(history)
    }
}

impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fit(&mut self, _train: &Split, _validation: &Split, options: &FitOptions) -> Result<FitHistory> {
        *self.last_shuffle.lock().unwrap() = Some(options.shuffle);
        let history = self.epoch_call(options.initial_epoch, options.epochs);
        self.fit_calls += 1;
        history
    }

    fn fit_stream(
        &mut self,
        stream: &mut dyn Iterator<Item = Batch>,
        _validation: &Split,
        options: &StreamOptions,
    ) -> Result<FitHistory> {
        // Pull everything offered; the trainer is responsible for bounding the stream.
        let pulled = stream.count();
        self.batches_per_call.push(pulled);
        assert_eq!(pulled, options.steps_per_epoch);
        let history = self.epoch_call(options.initial_epoch, options.epochs);
        self.stream_calls += 1;
        history
    }

    fn evaluate(&self, _features: &Tensor, _labels: &Tensor) -> Result<Evaluation> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Evaluation {
            loss: 0.3,
            accuracy: self.final_accuracy,
        })
    }
}

/// `n` samples of 2x2x1 images over 2 classes.
pub fn split(n: usize) -> Split {
    let data: Vec<f32> = (0..n * 4).map(|v| (v % 7) as f32 / 7.0).collect();
    let labels: Vec<usize> = (0..n).map(|i| i % 2).collect();
    Split::new(
        Tensor::new(vec![n, 2, 2, 1], data).unwrap(),
        one_hot(&labels, 2).unwrap(),
    )
    .unwrap()
}

pub fn job(time_budget: f64, max_epochs: usize) -> TrainingJob {
    TrainingJob {
        train: split(10),
        validation: split(4),
        stats: ChannelStats {
            mean: vec![0.5],
            variance: vec![0.1],
        },
        batch_size: 3,
        time_budget,
        max_epochs,
        augmentation: Augmentation::Disabled,
        seed: 7,
    }
}

/// A session leased in its own temporary lock directory.
pub fn session() -> (tempfile::TempDir, ComputeSession) {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig {
        lock_dir: Some(dir.path().to_path_buf()),
        ..SessionConfig::default()
    };
    let session = ComputeSession::acquire(&config).unwrap();
    (dir, session)
}
