//! A generated corpus with a learnable relation between tokens and labels.

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Bernoulli, Uniform};

use super::{restrict_vocabulary, Corpus, Sample, Split};
use crate::{
    error::{Error, Result},
    sequence::TokenId,
};

/// First ID of the tokens hinting at a positive label.
const POSITIVE_CUES: TokenId = 10;
/// First ID of the tokens hinting at a negative label.
const NEGATIVE_CUES: TokenId = 20;
/// Number of cue tokens per polarity.
const CUES: TokenId = 10;

/// A reproducible corpus of random sequences where some tokens hint at the label.
///
/// Each token is, with probability `cue_rate`, drawn from a small band of IDs tied to the label
/// and otherwise drawn uniformly from the whole vocabulary.
#[derive(Clone, Debug)]
pub struct SyntheticCorpus {
    train_size: usize,
    test_size: usize,
    seed: u64,
    vocab: TokenId,
    min_len: usize,
    max_len: usize,
    cue_rate: f64,
}

impl SyntheticCorpus {
    /// Create a corpus with the given split sizes, generated from `seed`.
    pub fn new(train_size: usize, test_size: usize, seed: u64) -> Self {
        Self {
            train_size,
            test_size,
            seed,
            vocab: 1000,
            min_len: 20,
            max_len: 80,
            cue_rate: 0.15,
        }
    }

    /// Set the number of distinct token IDs the generator draws from.
    #[must_use]
    pub fn with_vocab(mut self, vocab: TokenId) -> Self {
        self.vocab = vocab;
        self
    }

    /// Set the inclusive range of sequence lengths.
    #[must_use]
    pub fn with_lengths(mut self, min_len: usize, max_len: usize) -> Self {
        self.min_len = min_len;
        self.max_len = max_len;
        self
    }

    /// Set the probability of a token being a label cue.
    #[must_use]
    pub fn with_cue_rate(mut self, cue_rate: f64) -> Self {
        self.cue_rate = cue_rate;
        self
    }

    fn sample<R: Rng>(&self, rng: &mut R, cue: &Bernoulli, label: u8) -> Sample {
        let len = rng.gen_range(self.min_len..=self.max_len);
        let first_cue = if label == 1 {
            POSITIVE_CUES
        } else {
            NEGATIVE_CUES
        };
        let neutral = Uniform::new(1, self.vocab);
        let tokens = (0..len)
            .map(|_| {
                if rng.sample(cue) {
                    first_cue + rng.gen_range(0..CUES)
                } else {
                    rng.sample(neutral)
                }
            })
            .collect();
        Sample { tokens, label }
    }
}

impl Corpus for SyntheticCorpus {
    fn fetch(&self, vocab_size: usize) -> Result<Split> {
        if self.vocab <= NEGATIVE_CUES + CUES {
            return Err(Error::data_unavailable(
                "synthetic corpus",
                format!(
                    "a vocabulary of {} leaves no room for cue tokens",
                    self.vocab
                ),
            ));
        }
        if self.min_len > self.max_len {
            return Err(Error::data_unavailable(
                "synthetic corpus",
                format!("empty length range {}..={}", self.min_len, self.max_len),
            ));
        }
        let cue = Bernoulli::new(self.cue_rate)
            .map_err(|err| Error::data_unavailable("synthetic corpus", err))?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut generate = |n: usize| -> Vec<Sample> {
            (0..n)
                .map(|i| {
                    let mut sample = self.sample(&mut rng, &cue, (i % 2) as u8);
                    restrict_vocabulary(&mut sample.tokens, vocab_size);
                    sample
                })
                .collect()
        };
        let train = generate(self.train_size);
        let test = generate(self.test_size);
        Ok(Split { train, test })
    }
}
