//! A corpus stored as JSON lines on disk.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use serde::Deserialize;
use tracing::{debug, info};

use super::{restrict_vocabulary, Corpus, Label, Sample, Split};
use crate::{
    error::{Error, Result},
    sequence::{TokenId, PAD},
};

#[derive(Debug, Deserialize)]
struct Record {
    tokens: Vec<TokenId>,
    label: Label,
}

/// A corpus made of `train.jsonl` and `test.jsonl` in one directory.
///
/// Every non-blank line is an object `{"tokens": [..], "label": 0 | 1}` whose tokens are
/// frequency-ranked IDs starting at 1.
#[derive(Clone, Debug)]
pub struct JsonlCorpus {
    dir: PathBuf,
}

impl JsonlCorpus {
    /// Name of the file holding the training split.
    pub const TRAIN_FILE: &'static str = "train.jsonl";
    /// Name of the file holding the test split.
    pub const TEST_FILE: &'static str = "test.jsonl";

    /// Create a corpus reading from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_split(&self, name: &str, vocab_size: usize) -> Result<Vec<Sample>> {
        let path = self.dir.join(name);
        let origin = path.display().to_string();
        let file = File::open(&path).map_err(|err| Error::data_unavailable(&origin, err))?;

        let mut samples = Vec::new();
        let mut dropped = 0;
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let at = || format!("{origin}:{}", lineno + 1);
            let line = line.map_err(|err| Error::data_unavailable(at(), err))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record =
                serde_json::from_str(&line).map_err(|err| Error::data_unavailable(at(), err))?;
            if record.label > 1 {
                return Err(Error::data_unavailable(
                    at(),
                    format!("label must be 0 or 1, got {}", record.label),
                ));
            }
            if record.tokens.contains(&PAD) {
                return Err(Error::data_unavailable(
                    at(),
                    "token ID 0 is reserved for padding",
                ));
            }
            let mut tokens = record.tokens;
            dropped += restrict_vocabulary(&mut tokens, vocab_size);
            samples.push(Sample {
                tokens,
                label: record.label,
            });
        }
        debug!(file = %origin, dropped, "restricted vocabulary");
        Ok(samples)
    }
}

impl Corpus for JsonlCorpus {
    fn fetch(&self, vocab_size: usize) -> Result<Split> {
        let train = self.read_split(Self::TRAIN_FILE, vocab_size)?;
        let test = self.read_split(Self::TEST_FILE, vocab_size)?;
        info!(
            dir = %self.dir.display(),
            train = train.len(),
            test = test.len(),
            "loaded corpus"
        );
        Ok(Split { train, test })
    }
}
