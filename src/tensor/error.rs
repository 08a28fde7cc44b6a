//! Defines tensor errors.

use thiserror::Error;

/// An error type for all operations on tensors.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TensorError {
    /// An operation was performed on 2 objects with incompatible shapes.
    #[error("incompatible shapes {0:?} and {1:?}")]
    IncompatibleShapes(Vec<usize>, Vec<usize>),
    /// The number of elements does not match the number implied by the shape.
    #[error("shape {shape:?} holds {expected} elements, but got {actual}")]
    DataLength {
        /// The requested shape.
        shape: Vec<usize>,
        /// Number of elements implied by the shape.
        expected: usize,
        /// Number of elements given.
        actual: usize,
    },
    /// A row index is outside of the tensor.
    #[error("row {index} is out of bounds for {rows} rows")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// Number of rows in the tensor.
        rows: usize,
    },
}
