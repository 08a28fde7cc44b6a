//! The per-epoch training history and the best-epoch report derived from it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metrics recorded at the end of one epoch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Mean training loss over the epoch's mini-batches, with dropout active.
    pub train_loss: f32,
    /// Mean training accuracy over the epoch's mini-batches, with dropout active.
    pub train_accuracy: f32,
    /// Loss on the validation hold-out.
    pub val_loss: f32,
    /// Accuracy on the validation hold-out.
    pub val_accuracy: f32,
}

/// The records of every completed epoch, in order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    records: Vec<EpochRecord>,
}

impl History {
    /// Append the record of the epoch that just completed.
    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    /// Returns every record, oldest first.
    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    /// Returns the number of completed epochs.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no epoch completed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the index of the epoch with the lowest validation loss.
    ///
    /// Ties go to the earliest epoch. A NaN loss is never preferred over a number.
    pub fn best_epoch(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (epoch, record) in self.records.iter().enumerate() {
            let loss = record.val_loss;
            best = match best {
                None => Some((epoch, loss)),
                Some((_, best_loss)) if best_loss.is_nan() && !loss.is_nan() => {
                    Some((epoch, loss))
                }
                Some((_, best_loss)) if loss < best_loss => Some((epoch, loss)),
                keep => keep,
            };
        }
        best.map(|(epoch, _)| epoch)
    }
}

/// Round to three decimal places.
fn round3(x: f32) -> f64 {
    (f64::from(x) * 1000.0).round() / 1000.0
}

/// The validation metrics of the best epoch of a training run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Zero-based index of the selected epoch.
    pub epoch: usize,
    /// Its validation loss, rounded to three decimals.
    pub loss: f64,
    /// Its validation accuracy, rounded to three decimals.
    pub accuracy: f64,
}

impl Report {
    /// Select the epoch with the lowest validation loss.
    ///
    /// The model itself is not rolled back to that epoch, so the report describes the best epoch
    /// seen, not necessarily the current parameters.
    pub fn from_history(history: &History) -> Result<Self> {
        let epoch = history.best_epoch().ok_or(Error::EmptyHistory)?;
        let record = &history.records()[epoch];
        Ok(Self {
            epoch,
            loss: round3(record.val_loss),
            accuracy: round3(record.val_accuracy),
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "best epoch had a loss of {} and an accuracy of {}",
            self.loss, self.accuracy
        )
    }
}
