//! Data structures and methods for dealing with labeled sequence datasets.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sequence::TokenId,
};

mod jsonl;
mod synthetic;

pub use jsonl::JsonlCorpus;
pub use synthetic::SyntheticCorpus;

/// Binary label of a sample, either 0 or 1.
pub type Label = u8;

/// A single sample: a sequence of token IDs and its label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Token IDs, all in `[1, vocab_size)`.
    pub tokens: Vec<TokenId>,
    /// The label.
    pub label: Label,
}

/// The disjoint train and test splits of a corpus.
#[derive(Clone, Debug, Default)]
pub struct Split {
    /// Samples used for fitting, including the validation hold-out.
    pub train: Vec<Sample>,
    /// Samples used for the final evaluation.
    pub test: Vec<Sample>,
}

/// A source of labeled, integer-encoded sequences.
pub trait Corpus {
    /// Fetch the train and test splits, keeping only the `vocab_size` most frequent tokens.
    ///
    /// Token IDs are frequency ranks, so this drops every ID `>= vocab_size` from the sequences.
    /// Rare tokens are removed, not replaced by an unknown-token symbol.
    fn fetch(&self, vocab_size: usize) -> Result<Split>;
}

/// Drop every token outside of `[1, vocab_size)` from `tokens`, returning how many were dropped.
pub(crate) fn restrict_vocabulary(tokens: &mut Vec<TokenId>, vocab_size: usize) -> usize {
    let before = tokens.len();
    tokens.retain(|&id| (id as usize) < vocab_size);
    before - tokens.len()
}

/// Return the index splitting `len` samples into a fitting part and a trailing hold-out of
/// `fraction` of the samples.
///
/// The hold-out is taken from the end, before any shuffling. Both parts must be non-empty.
pub fn holdout(len: usize, fraction: f64) -> Result<usize> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(Error::configuration(format!(
            "validation fraction must be in (0, 1), got {fraction}"
        )));
    }
    let at = (len as f64 * (1.0 - fraction)) as usize;
    if at == 0 || at == len {
        return Err(Error::configuration(format!(
            "a validation fraction of {fraction} leaves an empty partition of {len} samples"
        )));
    }
    Ok(at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rare_tokens_are_dropped() {
        let mut tokens = vec![1, 9, 10, 3, 12];
        assert_eq!(restrict_vocabulary(&mut tokens, 10), 2);
        assert_eq!(tokens, vec![1, 9, 3]);
    }

    #[test]
    fn holdout_takes_the_tail() {
        assert_eq!(holdout(10, 0.2).unwrap(), 8);
        assert_eq!(holdout(2, 0.2).unwrap(), 1);
        assert_eq!(holdout(25_000, 0.2).unwrap(), 20_000);
    }

    #[test]
    fn holdout_rejects_degenerate_fractions() {
        assert!(matches!(holdout(10, 0.0), Err(Error::Configuration(_))));
        assert!(matches!(holdout(10, 1.0), Err(Error::Configuration(_))));
        let nan = f64::NAN;
        assert!(matches!(holdout(10, nan), Err(Error::Configuration(_))));
        assert!(matches!(holdout(1, 0.5), Err(Error::Configuration(_))));
    }
}
