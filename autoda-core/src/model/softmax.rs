//! Softmax regression over flattened images, trained with Adam.

use crate::config::ModelConfig;
use crate::error::{AutodaError, Result};
use crate::model::{Evaluation, FitHistory, FitOptions, Model, StreamOptions, metrics};
use crate::tensor::{Batch, Split, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::trace;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;
const EVAL_BATCH: usize = 1024;

/// Linear classifier with categorical cross-entropy loss.
pub struct SoftmaxClassifier {
    inputs: usize,
    classes: usize,
    learning_rate: f64,
    /// Row-major `[inputs, classes]`.
    weights: Vec<f32>,
    bias: Vec<f32>,
    m_w: Vec<f64>,
    v_w: Vec<f64>,
    m_b: Vec<f64>,
    v_b: Vec<f64>,
    step: i32,
}

/// Summed loss and correct predictions over a group of samples.
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    loss: f64,
    correct: usize,
    seen: usize,
}

impl Tally {
    fn add(&mut self, other: Tally) {
        self.loss += other.loss;
        self.correct += other.correct;
        self.seen += other.seen;
    }

    fn mean_loss(&self) -> f64 {
        if self.seen == 0 { 0.0 } else { self.loss / self.seen as f64 }
    }

    fn accuracy(&self) -> f64 {
        if self.seen == 0 { 0.0 } else { self.correct as f64 / self.seen as f64 }
    }
}

impl SoftmaxClassifier {
    pub fn new(num_classes: usize, input_shape: &[usize], config: &ModelConfig) -> Result<Self> {
        let inputs: usize = input_shape.iter().product();
        if inputs == 0 || num_classes < 2 {
            return Err(AutodaError::model(format!(
                "softmax classifier needs a non-empty input and >= 2 classes (input {input_shape:?}, classes {num_classes})"
            )));
        }
        if !(config.learning_rate > 0.0 && config.learning_rate.is_finite()) {
            return Err(AutodaError::model(format!(
                "learning rate must be positive, got {}",
                config.learning_rate
            )));
        }

        let limit = (6.0 / (inputs + num_classes) as f64).sqrt() as f32;
        let mut rng = StdRng::seed_from_u64(config.init_seed);
        let weights = (0..inputs * num_classes)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();

        Ok(Self {
            inputs,
            classes: num_classes,
            learning_rate: config.learning_rate,
            weights,
            bias: vec![0.0; num_classes],
            m_w: vec![0.0; inputs * num_classes],
            v_w: vec![0.0; inputs * num_classes],
            m_b: vec![0.0; num_classes],
            v_b: vec![0.0; num_classes],
            step: 0,
        })
    }

    fn check_shapes(&self, features: &Tensor, labels: &Tensor) -> Result<()> {
        if features.row_len() != self.inputs || labels.row_len() != self.classes {
            return Err(AutodaError::model(format!(
                "expected {} inputs and {} classes, got samples of {:?} with {} label columns",
                self.inputs,
                self.classes,
                features.sample_shape(),
                labels.row_len()
            )));
        }
        if features.rows() != labels.rows() {
            return Err(AutodaError::model("feature and label counts differ"));
        }
        Ok(())
    }

    /// Softmax probabilities for one sample, written into `probs`.
    fn forward(&self, x: &[f32], probs: &mut [f64]) {
        for (k, p) in probs.iter_mut().enumerate() {
            *p = f64::from(self.bias[k]);
        }
        for (i, &xi) in x.iter().enumerate() {
            if xi == 0.0 {
                continue;
            }
            let row = &self.weights[i * self.classes..(i + 1) * self.classes];
            for (p, &w) in probs.iter_mut().zip(row) {
                *p += f64::from(xi) * f64::from(w);
            }
        }
        let max = probs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for p in probs.iter_mut() {
            *p = (*p - max).exp();
            sum += *p;
        }
        for p in probs.iter_mut() {
            *p /= sum;
        }
    }

    fn score(&self, probs: &[f64], y: &[f32]) -> Tally {
        let target = argmax(y);
        let predicted = argmax_f64(probs);
        Tally {
            loss: -probs[target].max(1e-12).ln(),
            correct: usize::from(predicted == target),
            seen: 1,
        }
    }

    /// One Adam step on a mini-batch; returns the batch tally before the update.
    fn train_batch(&mut self, features: &Tensor, labels: &Tensor) -> Tally {
        let n = features.rows();
        let mut tally = Tally::default();
        if n == 0 {
            return tally;
        }
        let mut grad_w = vec![0.0f64; self.weights.len()];
        let mut grad_b = vec![0.0f64; self.classes];
        let mut probs = vec![0.0f64; self.classes];

        for s in 0..n {
            let x = features.row(s);
            let y = labels.row(s);
            self.forward(x, &mut probs);
            tally.add(self.score(&probs, y));
            for k in 0..self.classes {
                let g = (probs[k] - f64::from(y[k])) / n as f64;
                grad_b[k] += g;
                probs[k] = g;
            }
            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                let row = &mut grad_w[i * self.classes..(i + 1) * self.classes];
                for (gw, &g) in row.iter_mut().zip(probs.iter()) {
                    *gw += f64::from(xi) * g;
                }
            }
        }

        self.step += 1;
        let lr_t = self.learning_rate * (1.0 - BETA2.powi(self.step)).sqrt() / (1.0 - BETA1.powi(self.step));
        adam_update(&mut self.weights, &grad_w, &mut self.m_w, &mut self.v_w, lr_t);
        adam_update(&mut self.bias, &grad_b, &mut self.m_b, &mut self.v_b, lr_t);
        tally
    }

    fn evaluate_tally(&self, features: &Tensor, labels: &Tensor) -> Tally {
        let mut tally = Tally::default();
        let mut probs = vec![0.0f64; self.classes];
        for start in (0..features.rows()).step_by(EVAL_BATCH) {
            let end = (start + EVAL_BATCH).min(features.rows());
            for s in start..end {
                self.forward(features.row(s), &mut probs);
                tally.add(self.score(&probs, labels.row(s)));
            }
        }
        tally
    }

    fn record_epoch(&self, history: &mut FitHistory, train: Tally, validation: &Split) {
        let val = self.evaluate_tally(&validation.features, &validation.labels);
        history.record(metrics::LOSS, train.mean_loss());
        history.record(metrics::ACCURACY, train.accuracy());
        history.record(metrics::VAL_LOSS, val.mean_loss());
        history.record(metrics::VAL_ACCURACY, val.accuracy());
    }
}

fn adam_update(params: &mut [f32], grads: &[f64], m: &mut [f64], v: &mut [f64], lr_t: f64) {
    for i in 0..params.len() {
        m[i] = BETA1 * m[i] + (1.0 - BETA1) * grads[i];
        v[i] = BETA2 * v[i] + (1.0 - BETA2) * grads[i] * grads[i];
        params[i] -= (lr_t * m[i] / (v[i].sqrt() + ADAM_EPSILON)) as f32;
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

fn argmax_f64(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

impl Model for SoftmaxClassifier {
    fn name(&self) -> &str {
        "softmax"
    }

    fn fit(&mut self, train: &Split, validation: &Split, options: &FitOptions) -> Result<FitHistory> {
        self.check_shapes(&train.features, &train.labels)?;
        self.check_shapes(&validation.features, &validation.labels)?;
        if options.batch_size == 0 {
            return Err(AutodaError::model("batch_size must be positive"));
        }

        let mut history = FitHistory::new();
        let mut indices: Vec<usize> = (0..train.len()).collect();
        for epoch in options.initial_epoch..options.epochs {
            if options.shuffle {
                let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(epoch as u64));
                indices.shuffle(&mut rng);
            }
            let mut tally = Tally::default();
            for chunk in indices.chunks(options.batch_size) {
                let batch = train.gather(chunk);
                tally.add(self.train_batch(&batch.features, &batch.labels));
            }
            trace!(epoch, loss = tally.mean_loss(), "Finished in-memory epoch");
            self.record_epoch(&mut history, tally, validation);
        }
        Ok(history)
    }

    fn fit_stream(
        &mut self,
        stream: &mut dyn Iterator<Item = Batch>,
        validation: &Split,
        options: &StreamOptions,
    ) -> Result<FitHistory> {
        self.check_shapes(&validation.features, &validation.labels)?;

        let mut history = FitHistory::new();
        for epoch in options.initial_epoch..options.epochs {
            let mut tally = Tally::default();
            let mut steps = 0;
            while steps < options.steps_per_epoch {
                let Some(batch) = stream.next() else { break };
                self.check_shapes(&batch.features, &batch.labels)?;
                tally.add(self.train_batch(&batch.features, &batch.labels));
                steps += 1;
            }
            if steps == 0 {
                // Stream ran dry before this epoch started.
                break;
            }
            trace!(epoch, steps, loss = tally.mean_loss(), "Finished streamed epoch");
            self.record_epoch(&mut history, tally, validation);
            if steps < options.steps_per_epoch {
                break;
            }
        }
        Ok(history)
    }

    fn evaluate(&self, features: &Tensor, labels: &Tensor) -> Result<Evaluation> {
        self.check_shapes(features, labels)?;
        if features.rows() == 0 {
            return Err(AutodaError::model("cannot evaluate on an empty split"));
        }
        let tally = self.evaluate_tally(features, labels);
        Ok(Evaluation {
            loss: tally.mean_loss(),
            accuracy: tally.accuracy(),
        })
    }
}
