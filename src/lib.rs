//! Recurrent neural network classifiers for binary sentiment analysis of integer-encoded text.
//!
//! The workflow has five stages, each in its own module:
//!
//! 1. [`dataset`] fetches labeled token sequences, restricted to the most frequent tokens.
//! 2. [`sequence`] pads or truncates them to a fixed length.
//! 3. [`model`] builds an embedding, stacked simple or LSTM recurrent layers and a scoring head.
//! 4. [`train`] fits the model with mini-batches, a validation hold-out and early stopping.
//! 5. [`report`] picks the epoch with the lowest validation loss.
//!
//! [`pipeline::run`] chains them using the settings of a [`config::Config`]. Gradients are
//! computed by the reverse-mode automatic differentiation of [`autodiff`] over the matrices of
//! [`tensor`].

#![deny(unsafe_code, rust_2018_idioms, rust_2021_compatibility)]
#![warn(missing_docs)]

pub mod autodiff;
pub mod config;
pub mod dataset;
pub mod error;
pub mod model;
pub mod optim;
pub mod pipeline;
pub mod report;
pub mod sequence;
pub mod tensor;
pub mod train;

pub use error::{Error, Result};
