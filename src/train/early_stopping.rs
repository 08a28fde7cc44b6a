//! Stopping training once the validation loss stagnates.

/// Tracks the best validation loss and how many epochs passed without improving on it.
///
/// An epoch improves when its loss is strictly lower than the best so far. Training should stop
/// once `patience` consecutive epochs did not improve, so with the minimum at epoch `m` the last
/// epoch run is `m + patience`. The parameters of the best epoch are not restored.
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: usize,
    best: f32,
    wait: usize,
}

impl EarlyStopping {
    /// Create a tracker stopping after `patience` epochs without improvement.
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f32::INFINITY,
            wait: 0,
        }
    }

    /// Record the validation loss of the epoch that just completed and return whether training
    /// should stop.
    pub fn update(&mut self, loss: f32) -> bool {
        if loss < self.best {
            self.best = loss;
            self.wait = 0;
        } else {
            self.wait += 1;
        }
        self.wait >= self.patience
    }

    /// Returns the best loss seen so far.
    pub fn best(&self) -> f32 {
        self.best
    }

    /// Returns the number of consecutive epochs without improvement.
    pub fn wait(&self) -> usize {
        self.wait
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// Feed `losses` until the tracker asks to stop, returning the index of the last epoch run.
    fn last_epoch(losses: &[f32], patience: usize) -> usize {
        let mut early_stopping = EarlyStopping::new(patience);
        for (epoch, &loss) in losses.iter().enumerate() {
            if early_stopping.update(loss) {
                return epoch;
            }
        }
        losses.len() - 1
    }

    #[test]
    fn stops_patience_epochs_after_the_minimum() {
        let losses = [0.9, 0.7, 0.5, 0.6, 0.55, 0.3, 0.2];
        assert_eq!(last_epoch(&losses, 2), 4);
        assert_eq!(last_epoch(&losses, 1), 3);
        assert_eq!(last_epoch(&losses, 3), 6);
    }

    #[test]
    fn equal_loss_is_not_an_improvement() {
        let mut early_stopping = EarlyStopping::new(2);
        assert!(!early_stopping.update(0.5));
        assert!(!early_stopping.update(0.5));
        assert_eq!(early_stopping.wait(), 1);
        assert!(early_stopping.update(0.5));
        assert_eq!(early_stopping.best(), 0.5);
    }

    #[test]
    fn nan_never_improves() {
        let mut early_stopping = EarlyStopping::new(3);
        early_stopping.update(0.4);
        early_stopping.update(f32::NAN);
        assert_eq!(early_stopping.best(), 0.4);
        assert_eq!(early_stopping.wait(), 1);
    }

    proptest! {
        #[test]
        fn last_epoch_is_minimum_plus_patience(
            losses in prop::collection::vec(0.0f32..1.0, 1..40),
            patience in 1usize..6,
        ) {
            let last = last_epoch(&losses, patience);
            let run = &losses[..=last];
            let mut best = 0;
            for (i, &loss) in run.iter().enumerate() {
                if loss < run[best] {
                    best = i;
                }
            }
            if last + 1 < losses.len() {
                prop_assert_eq!(last, best + patience);
            } else {
                prop_assert!(last <= best + patience);
            }
        }
    }
}
