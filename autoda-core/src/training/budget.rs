//! Wall-clock budget bookkeeping and the clocks that feed it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of elapsed time for the trainer.
pub trait Clock: Send + Sync {
    /// Time since an arbitrary fixed origin. Must never go backwards.
    fn now(&self) -> Duration;
}

/// Real monotonic time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Why the loop stopped starting new epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `max_epochs` epochs completed.
    MaxEpochs,
    /// The next epoch was predicted to exceed the time budget.
    TimeBudget,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::MaxEpochs => write!(f, "max_epochs"),
            StopReason::TimeBudget => write!(f, "time_budget"),
        }
    }
}

/// Budget consumed so far in one trial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    /// Seconds consumed by completed training calls.
    pub used_budget: f64,
    /// Seconds taken by the most recent training call.
    pub duration_last_epoch: f64,
    pub num_epochs: usize,
    /// Elapsed seconds sampled after every training call.
    pub runtime: Vec<f64>,
}

impl BudgetState {
    /// Predicted budget usage after one more epoch.
    pub fn projected(&self, margin: f64) -> f64 {
        self.used_budget + margin * self.duration_last_epoch
    }

    /// Reason to stop before the next epoch, if any.
    pub fn stop_reason(&self, max_epochs: usize, time_budget: f64, margin: f64) -> Option<StopReason> {
        if self.num_epochs >= max_epochs {
            Some(StopReason::MaxEpochs)
        } else if self.projected(margin) >= time_budget {
            Some(StopReason::TimeBudget)
        } else {
            None
        }
    }

    /// Account for one training call that finished at `elapsed` seconds after the start.
    pub fn record(&mut self, elapsed: f64, epochs: usize) {
        self.duration_last_epoch = (elapsed - self.used_budget).max(0.0);
        self.used_budget += self.duration_last_epoch;
        self.num_epochs += epochs;
        self.runtime.push(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance_secs(2.5);
        assert_eq!(other.now(), Duration::from_millis(2500));
    }

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_record_tracks_duration_and_total() {
        let mut state = BudgetState::default();
        state.record(5.0, 1);
        state.record(12.0, 1);
        assert_eq!(state.num_epochs, 2);
        assert!((state.used_budget - 12.0).abs() < 1e-9);
        assert!((state.duration_last_epoch - 7.0).abs() < 1e-9);
        assert_eq!(state.runtime, vec![5.0, 12.0]);
    }

    #[test]
    fn test_first_epoch_always_allowed() {
        let state = BudgetState::default();
        assert_eq!(state.stop_reason(1, 0.001, 1.11), None);
    }

    #[test]
    fn test_margin_blocks_epoch_that_would_overshoot() {
        let mut state = BudgetState::default();
        state.record(9.0, 1);
        // 9 + 1.11 * 9 = 18.99 >= 10
        assert_eq!(state.stop_reason(40, 10.0, 1.11), Some(StopReason::TimeBudget));
        assert_eq!(state.stop_reason(40, 19.0, 1.11), None);
        assert_eq!(state.stop_reason(1, 1000.0, 1.11), Some(StopReason::MaxEpochs));
    }
}
