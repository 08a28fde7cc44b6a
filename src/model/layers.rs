//! The embedding lookup and the dense scoring layer.

use rand::Rng;

use super::init::{glorot_uniform, uniform};
use crate::{
    autodiff::{Tape, Var},
    sequence::Padded,
    tensor::{Tensor, TensorError},
};

/// A learned `[vocab_size, embed_dim]` table of token vectors.
#[derive(Clone, Debug)]
pub struct Embedding {
    table: Tensor,
}

impl Embedding {
    /// Create a table with entries uniform in `[-0.05, 0.05)`.
    pub fn rand<R>(rng: &mut R, vocab_size: usize, embed_dim: usize) -> Self
    where
        R: Rng + ?Sized,
    {
        Self {
            table: uniform(rng, [vocab_size, embed_dim], 0.05),
        }
    }

    /// Lift the table onto `tape`.
    pub fn bind<'t>(&self, tape: &'t Tape) -> BoundEmbedding<'t> {
        BoundEmbedding {
            table: tape.var(self.table.clone()),
        }
    }

    /// Returns the table.
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.table]
    }
}

/// An [`Embedding`] whose table lives on a tape.
#[derive(Clone, Copy, Debug)]
pub struct BoundEmbedding<'t> {
    table: Var<'t>,
}

impl<'t> BoundEmbedding<'t> {
    /// Look up every timestep of a batch, producing one `[batch, embed_dim]` variable per
    /// timestep.
    pub fn forward(&self, batch: &Padded) -> Result<Vec<Var<'t>>, TensorError> {
        (0..batch.seq_len())
            .map(|t| self.table.gather(&batch.column(t)))
            .collect()
    }

    /// Returns the table variable.
    pub fn parameters(&self) -> Vec<Var<'t>> {
        vec![self.table]
    }
}

/// A fully connected layer `x W + b`.
#[derive(Clone, Debug)]
pub struct Dense {
    pub(crate) weight: Tensor,
    pub(crate) bias: Tensor,
}

impl Dense {
    /// Create a layer with a glorot-uniform weight and a zero bias.
    pub fn rand<R>(rng: &mut R, input_size: usize, output_size: usize) -> Self
    where
        R: Rng + ?Sized,
    {
        Self {
            weight: glorot_uniform(rng, input_size, output_size),
            bias: Tensor::zeros([1, output_size]),
        }
    }

    /// Lift the parameters onto `tape`.
    pub fn bind<'t>(&self, tape: &'t Tape) -> BoundDense<'t> {
        BoundDense {
            weight: tape.var(self.weight.clone()),
            bias: tape.var(self.bias.clone()),
        }
    }

    /// Returns the parameters, in the order of [`BoundDense::parameters`].
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }
}

/// A [`Dense`] layer whose parameters live on a tape.
#[derive(Clone, Copy, Debug)]
pub struct BoundDense<'t> {
    weight: Var<'t>,
    bias: Var<'t>,
}

impl<'t> BoundDense<'t> {
    /// Applies the layer to a `[batch, input_size]` variable.
    pub fn forward(&self, input: Var<'t>) -> Result<Var<'t>, TensorError> {
        input.matmul(self.weight)?.add_row(self.bias)
    }

    /// Returns the parameter variables, in the order of [`Dense::parameters_mut`].
    pub fn parameters(&self) -> Vec<Var<'t>> {
        vec![self.weight, self.bias]
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::sequence::{pad_sequences, Side};

    #[test]
    fn embedding_rows_follow_timesteps() {
        let mut rng = StdRng::seed_from_u64(0);
        let embedding = Embedding::rand(&mut rng, 6, 3);
        let batch = pad_sequences(&[vec![4, 5], vec![3]], 2, Side::Pre, Side::Pre).unwrap();
        let tape = Tape::default();
        let steps = embedding.bind(&tape).forward(&batch).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].shape(), [2, 3]);
        // The second row is padded in front.
        assert_eq!(steps[0].value().row(1), embedding.table.row(0));
        assert_eq!(steps[1].value().row(1), embedding.table.row(3));
    }

    #[test]
    fn embedding_rejects_unknown_ids() {
        let mut rng = StdRng::seed_from_u64(0);
        let embedding = Embedding::rand(&mut rng, 4, 2);
        let batch = pad_sequences(&[vec![4]], 1, Side::Pre, Side::Pre).unwrap();
        let tape = Tape::default();
        assert!(embedding.bind(&tape).forward(&batch).is_err());
    }

    #[test]
    fn dense_is_affine() {
        let dense = Dense {
            weight: Tensor::new([2, 1], vec![2.0, -1.0]).unwrap(),
            bias: Tensor::scalar(0.5),
        };
        let tape = Tape::default();
        let x = tape.var(Tensor::new([2, 2], vec![1.0, 1.0, 0.0, 3.0]).unwrap());
        let y = dense.bind(&tape).forward(x).unwrap();
        assert_eq!(y.value().as_slice(), &[1.5, -2.5]);
    }
}
