//! Errors surfaced by the training workflow.

use thiserror::Error;

use crate::tensor::TensorError;

/// A specialized result type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure of the load, pad, build, train and report stages.
#[derive(Debug, Error)]
pub enum Error {
    /// The corpus could not be fetched or is corrupt.
    #[error("data unavailable from {origin}: {reason}")]
    DataUnavailable {
        /// What was being read, e.g. a file path and line.
        origin: String,
        /// Why it could not be used.
        reason: String,
    },
    /// A structurally invalid model or training configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// A report was requested before any epoch completed.
    #[error("the training history is empty")]
    EmptyHistory,
    /// Tensors of incompatible shapes met at runtime.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl Error {
    pub(crate) fn data_unavailable(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::DataUnavailable {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}
