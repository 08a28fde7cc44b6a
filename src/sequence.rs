//! Normalizing variable-length token sequences to a fixed length.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Integer ID of a token. IDs are frequency ranks starting at 1.
pub type TokenId = u32;

/// Sentinel used for padding. It never collides with a vocabulary ID since those start at 1.
pub const PAD: TokenId = 0;

/// Which end of a sequence padding is added to, or tokens are dropped from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The start of the sequence.
    #[default]
    Pre,
    /// The end of the sequence.
    Post,
}

/// A rectangular `(n, len)` batch of token IDs where every row has exactly `len` entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Padded {
    data: Vec<TokenId>,
    len: usize,
}

impl Padded {
    /// Return the shape as `[rows, len]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.num_rows(), self.len]
    }

    /// Return the number of rows.
    pub fn num_rows(&self) -> usize {
        self.data.len() / self.len
    }

    /// Return the fixed row length.
    pub fn seq_len(&self) -> usize {
        self.len
    }

    /// Check if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Return a single row.
    pub fn row(&self, index: usize) -> Option<&[TokenId]> {
        self.data.chunks_exact(self.len).nth(index)
    }

    /// Iterate over the rows.
    pub fn rows(&self) -> impl Iterator<Item = &[TokenId]> {
        self.data.chunks_exact(self.len)
    }

    /// Return the token IDs at timestep `t` of every row, ready for an embedding lookup.
    ///
    /// # Panics
    ///
    /// Panics if `t` is not less than [`Padded::seq_len`].
    pub fn column(&self, t: usize) -> Vec<usize> {
        assert!(t < self.len, "timestep {t} is out of range for length {}", self.len);
        self.rows().map(|row| row[t] as usize).collect()
    }

    /// Return a new batch made of the rows at `indices`, in that order.
    ///
    /// # Panics
    ///
    /// Panics if any index is not less than [`Padded::num_rows`].
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.len);
        for &i in indices {
            let row = self.row(i).unwrap_or_else(|| {
                panic!("row {i} is out of range for {} rows", self.num_rows())
            });
            data.extend_from_slice(row);
        }
        Self {
            data,
            len: self.len,
        }
    }

    /// Split into the first `at` rows and the rest.
    pub fn split_at(&self, at: usize) -> (Self, Self) {
        let (head, tail) = self.data.split_at(at * self.len);
        (
            Self {
                data: head.to_vec(),
                len: self.len,
            },
            Self {
                data: tail.to_vec(),
                len: self.len,
            },
        )
    }
}

/// Pad or truncate every sequence to exactly `len` tokens.
///
/// Shorter sequences get [`PAD`] added on the `padding` side; longer ones lose tokens on the
/// `truncating` side. With the defaults ([`Side::Pre`] for both) padding goes in front and the
/// most recent `len` tokens are kept, so early context of long sequences is lost. Applying the
/// function again with the same arguments returns the same batch.
pub fn pad_sequences<S>(
    sequences: &[S],
    len: usize,
    padding: Side,
    truncating: Side,
) -> Result<Padded>
where
    S: AsRef<[TokenId]>,
{
    if len == 0 {
        return Err(Error::configuration("sequence length must be positive"));
    }
    let mut data = Vec::with_capacity(sequences.len() * len);
    for seq in sequences {
        let seq = seq.as_ref();
        let kept = if seq.len() > len {
            match truncating {
                Side::Pre => &seq[seq.len() - len..],
                Side::Post => &seq[..len],
            }
        } else {
            seq
        };
        let fill = len - kept.len();
        if padding == Side::Pre {
            data.extend(std::iter::repeat(PAD).take(fill));
        }
        data.extend_from_slice(kept);
        if padding == Side::Post {
            data.extend(std::iter::repeat(PAD).take(fill));
        }
    }
    Ok(Padded { data, len })
}
