//! Auto-differentiation.
//!
//! A [`Tape`] is created for every forward pass that needs gradients. Parameters are lifted onto
//! it with [`Tape::var`], the computation is expressed through [`Var`] operations, and
//! [`Var::gradients`] walks the tape backwards once to produce the gradients of every leaf.

mod ops;
mod tape;

pub use ops::sigmoid;
pub use tape::{Gradients, Tape, Var};
