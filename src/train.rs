//! Mini-batch training with a validation hold-out and early stopping.

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    autodiff::Tape,
    dataset::{holdout, Label},
    error::{Error, Result},
    model::Classifier,
    optim::OptimizerConfig,
    report::{EpochRecord, History},
    sequence::Padded,
    tensor::Tensor,
};

mod early_stopping;

pub use early_stopping::EarlyStopping;

/// Hyperparameters of a training run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    /// Number of sequences per gradient step.
    pub batch_size: usize,
    /// Maximum number of passes over the training data.
    pub epochs: usize,
    /// Fraction of the training data held out, from its end, to validate each epoch.
    pub validation_split: f64,
    /// Number of epochs without validation improvement before stopping.
    pub patience: usize,
    /// The optimizer updating the parameters.
    pub optimizer: OptimizerConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            epochs: 10,
            validation_split: 0.2,
            patience: 2,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Check that the hyperparameters describe a run that can happen.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::configuration("batch size must be positive"));
        }
        if self.epochs == 0 {
            return Err(Error::configuration("at least one epoch is required"));
        }
        if self.patience == 0 {
            return Err(Error::configuration("patience must be at least one epoch"));
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(Error::configuration(format!(
                "validation split must be in (0, 1), got {}",
                self.validation_split
            )));
        }
        self.optimizer.build().map(|_| ())
    }
}

/// Loss and accuracy over a set of labeled sequences.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Mean binary cross-entropy.
    pub loss: f32,
    /// Fraction of sequences whose predicted probability falls on the side of 0.5 of their label.
    pub accuracy: f32,
}

/// Running sums of per-sample loss and hits, weighted by batch size.
#[derive(Debug, Default)]
struct Accumulator {
    loss: f64,
    correct: usize,
    seen: usize,
}

impl Accumulator {
    fn add(&mut self, mean_loss: f32, correct: usize, rows: usize) {
        self.loss += f64::from(mean_loss) * rows as f64;
        self.correct += correct;
        self.seen += rows;
    }

    fn metrics(&self) -> Metrics {
        Metrics {
            loss: (self.loss / self.seen as f64) as f32,
            accuracy: self.correct as f32 / self.seen as f32,
        }
    }
}

/// Returns the `[rows, 1]` targets of the selected rows.
fn label_targets(labels: &[Label], rows: &[usize]) -> Tensor {
    Tensor::from_fn([rows.len(), 1], |i, _| f32::from(labels[rows[i]]))
}

/// Count the logits on the same side of zero as their target.
fn count_correct(logits: &Tensor, targets: &Tensor) -> usize {
    logits
        .as_slice()
        .iter()
        .zip(targets.as_slice())
        .filter(|&(&z, &y)| (z > 0.0) == (y > 0.5))
        .count()
}

fn check_labels(inputs: &Padded, labels: &[Label]) -> Result<()> {
    if inputs.num_rows() != labels.len() {
        return Err(Error::configuration(format!(
            "{} sequences but {} labels",
            inputs.num_rows(),
            labels.len()
        )));
    }
    if inputs.is_empty() {
        return Err(Error::configuration("no labeled sequences"));
    }
    if let Some((i, label)) = labels.iter().enumerate().find(|(_, &label)| label > 1) {
        return Err(Error::configuration(format!(
            "label {label} of sequence {i} is neither 0 nor 1"
        )));
    }
    Ok(())
}

/// Fits a [`Classifier`] and evaluates it.
#[derive(Clone, Debug)]
pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    /// Create a trainer after validating its hyperparameters.
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Returns the hyperparameters.
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train `model` in place and return the record of every completed epoch.
    ///
    /// The last `validation_split` of the rows is held out before shuffling. Every epoch shuffles
    /// the remaining rows, takes one optimizer step per mini-batch with dropout active, and then
    /// evaluates the hold-out without dropout. Training stops after `epochs` epochs or once the
    /// validation loss has not improved for `patience` epochs, leaving the parameters of the last
    /// epoch in place.
    pub fn fit<R>(
        &self,
        model: &mut Classifier,
        inputs: &Padded,
        labels: &[Label],
        rng: &mut R,
    ) -> Result<History>
    where
        R: Rng + ?Sized,
    {
        check_labels(inputs, labels)?;
        let at = holdout(labels.len(), self.config.validation_split)?;
        let (train_inputs, val_inputs) = inputs.split_at(at);
        let (train_labels, val_labels) = labels.split_at(at);
        info!(
            train = train_labels.len(),
            validation = val_labels.len(),
            epochs = self.config.epochs,
            batch_size = self.config.batch_size,
            "training"
        );

        let mut optimizer = self.config.optimizer.build()?;
        let mut early_stopping = EarlyStopping::new(self.config.patience);
        let mut history = History::default();
        let mut order: Vec<usize> = (0..at).collect();
        for epoch in 1..=self.config.epochs {
            order.shuffle(rng);
            let mut train = Accumulator::default();
            for (step, rows) in order.chunks(self.config.batch_size).enumerate() {
                let masks = model.sample_masks(rng, rows.len())?;
                let batch = train_inputs.select(rows);
                let targets = label_targets(train_labels, rows);
                let (loss, correct, grads) = {
                    let tape = Tape::default();
                    let bound = model.bind(&tape);
                    let logits = bound.forward(&batch, &masks)?;
                    let loss = logits.bce_with_logits(&targets)?;
                    let correct = count_correct(&logits.value(), &targets);
                    let value = loss.value().as_slice()[0];
                    (value, correct, bound.gradients(loss))
                };
                optimizer.step(&mut model.parameters_mut(), &grads)?;
                train.add(loss, correct, rows.len());
                debug!(epoch, step, loss, "batch");
            }
            let train = train.metrics();
            let val = self.evaluate(model, &val_inputs, val_labels)?;
            history.push(EpochRecord {
                train_loss: train.loss,
                train_accuracy: train.accuracy,
                val_loss: val.loss,
                val_accuracy: val.accuracy,
            });
            info!(
                epoch,
                loss = train.loss,
                accuracy = train.accuracy,
                val_loss = val.loss,
                val_accuracy = val.accuracy,
                "epoch complete"
            );
            if early_stopping.update(val.loss) {
                info!(
                    epoch,
                    best_val_loss = early_stopping.best(),
                    patience = self.config.patience,
                    "validation loss stopped improving, stopping early"
                );
                break;
            }
        }
        Ok(history)
    }

    /// Compute the loss and accuracy of `model` on labeled sequences, without dropout.
    pub fn evaluate(
        &self,
        model: &Classifier,
        inputs: &Padded,
        labels: &[Label],
    ) -> Result<Metrics> {
        check_labels(inputs, labels)?;
        let rows: Vec<usize> = (0..labels.len()).collect();
        let mut total = Accumulator::default();
        for rows in rows.chunks(self.config.batch_size) {
            let targets = label_targets(labels, rows);
            let tape = Tape::default();
            let logits = model.bind(&tape).forward(&inputs.select(rows), &[])?;
            let loss = logits.bce_with_logits(&targets)?.value().as_slice()[0];
            total.add(loss, count_correct(&logits.value(), &targets), rows.len());
        }
        Ok(total.metrics())
    }
}
