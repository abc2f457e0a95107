//! Property-based tests for the budgeted loop, history aggregation and policy sampling.

mod common;

use proptest::prelude::*;

use autoda_core::model::{FitHistory, metrics};
use autoda_core::policy::ConfigSpace;
use autoda_core::training::{BudgetedTrainer, EpochHistory, ManualClock, StopReason};
use common::{ScriptedModel, job, session, split};

// --- Budgeted loop properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn epochs_bounded_and_budget_monotonic(
        durations in prop::collection::vec(0.01f64..20.0, 1..12),
        time_budget in 0.5f64..200.0,
        max_epochs in 1usize..15,
    ) {
        let (_dir, session) = session();
        let clock = ManualClock::new();
        let mut model = ScriptedModel::new(&clock, &durations);

        let result = BudgetedTrainer::with_clock(clock.clone())
            .run(&session, &mut model, &job(time_budget, max_epochs))
            .unwrap();

        prop_assert!(result.num_epochs >= 1);
        prop_assert!(result.num_epochs <= max_epochs);
        prop_assert_eq!(result.num_epochs, model.total_calls());
        prop_assert_eq!(result.train_history.len(), result.num_epochs);
        prop_assert!(result.runtime.windows(2).all(|w| w[0] <= w[1]));
        let elapsed = clock_secs(&clock);
        prop_assert!((result.used_budget - elapsed).abs() < 1e-6);
    }

    #[test]
    fn stops_only_when_next_epoch_is_projected_over_budget(
        durations in prop::collection::vec(0.5f64..20.0, 1..12),
        time_budget in 0.5f64..200.0,
    ) {
        let (_dir, session) = session();
        let clock = ManualClock::new();
        let mut model = ScriptedModel::new(&clock, &durations);

        let result = BudgetedTrainer::with_clock(clock.clone())
            .run(&session, &mut model, &job(time_budget, 1000))
            .unwrap();

        prop_assert_eq!(result.stop_reason, StopReason::TimeBudget);
        let runtime = &result.runtime;
        let n = runtime.len();
        let last = runtime[n - 1] - if n > 1 { runtime[n - 2] } else { 0.0 };
        prop_assert!(result.used_budget + 1.11 * last >= time_budget - 1e-6);

        // Every epoch after the first was started with room to spare.
        for k in 1..n {
            let used = runtime[k - 1];
            let previous = used - if k > 1 { runtime[k - 2] } else { 0.0 };
            prop_assert!(used + 1.11 * previous < time_budget + 1e-6);
        }
    }
}

fn clock_secs(clock: &ManualClock) -> f64 {
    use autoda_core::training::Clock;
    clock.now().as_secs_f64()
}

// --- History aggregation properties ---

proptest! {
    #[test]
    fn merge_extends_in_call_order(
        calls in prop::collection::vec(
            prop::collection::vec((0usize..3, -10.0f64..10.0), 0..4),
            1..8,
        ),
    ) {
        let names = [metrics::LOSS, metrics::ACCURACY, metrics::VAL_LOSS];
        let mut history = EpochHistory::new();
        let mut expected: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

        for call in &calls {
            let mut fit = FitHistory::new();
            for &(metric, value) in call {
                fit.record(names[metric], value);
            }
            // Calls without a loss record completed no epoch and are dropped whole.
            if fit.epochs() > 0 {
                for &(metric, value) in call {
                    expected[metric].push(value);
                }
            }
            history.merge(&fit);
        }

        for (i, name) in names.iter().enumerate() {
            match history.get(name) {
                Some(values) => prop_assert_eq!(values, expected[i].as_slice()),
                None => prop_assert!(expected[i].is_empty()),
            }
        }
    }

    #[test]
    fn history_survives_json(values in prop::collection::vec(0.0f64..1.0, 1..10)) {
        let mut history = EpochHistory::new();
        for v in &values {
            let mut fit = FitHistory::new();
            fit.record(metrics::LOSS, *v);
            fit.record(metrics::ACCURACY, 1.0 - *v);
            history.merge(&fit);
        }
        let json = serde_json::to_string(&history).unwrap();
        let back: EpochHistory = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back.names().collect::<Vec<_>>(), vec![metrics::LOSS, metrics::ACCURACY]);
        let restored = back.get(metrics::LOSS).unwrap();
        prop_assert_eq!(restored.len(), values.len());
        for (a, b) in restored.iter().zip(&values) {
            prop_assert!((a - b).abs() < 1e-12);
        }
    }
}

// --- Policy sampling properties ---

proptest! {
    #[test]
    fn sampled_policies_validate(seed in any::<u64>()) {
        let space = ConfigSpace::default();
        let policy = space.sample_with_seed(seed);
        prop_assert!(space.validate(&policy.get_dictionary()).is_ok());
        prop_assert_eq!(policy, space.sample_with_seed(seed));
    }

    #[test]
    fn augmented_batches_are_full_and_finite(seed in any::<u64>(), batch_size in 1usize..10) {
        let train = split(10);
        let stats = autoda_core::data::ChannelStats::compute(&train.features).unwrap();
        let policy = ConfigSpace::default().sample_with_seed(seed);
        let stream = policy.apply_transform(&train, &stats, batch_size, seed).unwrap();

        for batch in stream.take(25) {
            prop_assert_eq!(batch.len(), batch_size);
            prop_assert!(batch.features.data().iter().all(|v| v.is_finite()));
        }
    }
}
