//! A recurrent layer unrolling a cell over a sequence, with input and recurrent dropout.

use rand::Rng;
use rand_distr::Bernoulli;

use super::{
    cell::{BoundCell, Cell, Step},
    LayerSpec,
};
use crate::{
    autodiff::{Tape, Var},
    error::{Error, Result},
    tensor::{Tensor, TensorError},
};

/// Dropout masks of one recurrent layer for one forward pass.
///
/// Each mask is sampled once and applied at every timestep of the pass, so the same input and
/// recurrent units are dropped throughout the sequence. Kept units are scaled by `1 / (1 - rate)`.
#[derive(Clone, Debug, Default)]
pub struct DropoutMasks {
    /// `[batch, input_size]` mask applied to the input at every timestep.
    pub input: Option<Tensor>,
    /// `[batch, units]` mask applied to the previous hidden state at every timestep.
    pub recurrent: Option<Tensor>,
}

impl DropoutMasks {
    /// Sample masks for a batch. A rate of zero yields no mask.
    pub fn sample<R>(
        rng: &mut R,
        batch: usize,
        input_size: usize,
        units: usize,
        dropout: f32,
        recurrent_dropout: f32,
    ) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        Ok(Self {
            input: bernoulli_mask(rng, [batch, input_size], dropout)?,
            recurrent: bernoulli_mask(rng, [batch, units], recurrent_dropout)?,
        })
    }
}

fn bernoulli_mask<R>(rng: &mut R, shape: [usize; 2], rate: f32) -> Result<Option<Tensor>>
where
    R: Rng + ?Sized,
{
    if rate == 0.0 {
        return Ok(None);
    }
    let keep = 1.0 - rate;
    let distribution = Bernoulli::new(f64::from(keep))
        .map_err(|err| Error::configuration(format!("dropout rate {rate}: {err}")))?;
    let scale = 1.0 / keep;
    Ok(Some(Tensor::from_fn(shape, |_, _| {
        if rng.sample(distribution) {
            scale
        } else {
            0.0
        }
    })))
}

/// A recurrent layer.
#[derive(Clone, Debug)]
pub struct Recurrent {
    pub(crate) cell: Cell,
    input_size: usize,
    units: usize,
    dropout: f32,
    recurrent_dropout: f32,
    return_sequences: bool,
}

impl Recurrent {
    /// Create a layer with randomized parameters reading inputs of `input_size` features.
    pub fn rand<R>(rng: &mut R, spec: &LayerSpec, input_size: usize) -> Self
    where
        R: Rng + ?Sized,
    {
        Self {
            cell: Cell::rand(rng, spec.kind, input_size, spec.units),
            input_size,
            units: spec.units,
            dropout: spec.dropout,
            recurrent_dropout: spec.recurrent_dropout,
            return_sequences: spec.return_sequences,
        }
    }

    /// Sample the dropout masks of one training forward pass.
    pub fn sample_masks<R>(&self, rng: &mut R, batch: usize) -> Result<DropoutMasks>
    where
        R: Rng + ?Sized,
    {
        DropoutMasks::sample(
            rng,
            batch,
            self.input_size,
            self.units,
            self.dropout,
            self.recurrent_dropout,
        )
    }

    /// Lift the parameters onto `tape`.
    pub fn bind<'t>(&self, tape: &'t Tape) -> BoundRecurrent<'t> {
        BoundRecurrent {
            tape,
            cell: self.cell.bind(tape),
            return_sequences: self.return_sequences,
        }
    }

    /// Returns the parameters, in the order of [`BoundRecurrent::parameters`].
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.cell.parameters_mut()
    }
}

/// A [`Recurrent`] layer whose parameters live on a tape.
#[derive(Clone, Copy, Debug)]
pub struct BoundRecurrent<'t> {
    tape: &'t Tape,
    cell: BoundCell<'t>,
    return_sequences: bool,
}

impl<'t> BoundRecurrent<'t> {
    /// Run the layer over a sequence of `[batch, input_size]` inputs.
    ///
    /// Returns the hidden state of every timestep when the layer returns sequences, or a single
    /// element holding the final hidden state otherwise.
    pub fn forward(
        &self,
        inputs: &[Var<'t>],
        masks: &DropoutMasks,
    ) -> Result<Vec<Var<'t>>, TensorError> {
        match &self.cell {
            BoundCell::Simple(cell) => self.unroll(cell, inputs, masks),
            BoundCell::Lstm(cell) => self.unroll(cell, inputs, masks),
        }
    }

    /// Returns the parameter variables, in the order of [`Recurrent::parameters_mut`].
    pub fn parameters(&self) -> Vec<Var<'t>> {
        self.cell.parameters()
    }

    fn unroll<C>(
        &self,
        cell: &C,
        inputs: &[Var<'t>],
        masks: &DropoutMasks,
    ) -> Result<Vec<Var<'t>>, TensorError>
    where
        C: Step<'t>,
    {
        let Some(first) = inputs.first() else {
            return Ok(Vec::new());
        };
        let mut state = cell.initial_state(self.tape, first.shape()[0]);
        let mut outputs = Vec::with_capacity(if self.return_sequences {
            inputs.len()
        } else {
            1
        });
        for &input in inputs {
            let input = match &masks.input {
                Some(mask) => input.mask(mask)?,
                None => input,
            };
            let recurrent = match &masks.recurrent {
                Some(mask) => C::hidden(&state).mask(mask)?,
                None => C::hidden(&state),
            };
            state = cell.step(input, recurrent, &state)?;
            if self.return_sequences {
                outputs.push(C::hidden(&state));
            }
        }
        if !self.return_sequences {
            outputs.push(C::hidden(&state));
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::model::{
        cell::{Gate, SimpleCell},
        RecurrentKind,
    };

    fn spec(return_sequences: bool, recurrent_dropout: f32) -> LayerSpec {
        LayerSpec {
            kind: RecurrentKind::Simple,
            units: 16,
            dropout: 0.0,
            recurrent_dropout,
            return_sequences,
        }
    }

    /// A simple layer with no input weights and an identity recurrent kernel: units whose
    /// recurrent connection is dropped stay at `tanh(bias)` forever.
    fn masked_layer(rng: &mut StdRng, recurrent_dropout: f32) -> Recurrent {
        let mut layer = Recurrent::rand(rng, &spec(true, recurrent_dropout), 2);
        layer.cell = Cell::Simple(SimpleCell {
            gate: Gate {
                kernel: Tensor::zeros([2, 16]),
                recurrent: Tensor::from_fn([16, 16], |i, j| if i == j { 1.0 } else { 0.0 }),
                bias: Tensor::full([1, 16], 0.5),
            },
        });
        layer
    }

    fn zeros_of(row: &[f32]) -> BTreeSet<usize> {
        row.iter()
            .enumerate()
            .filter(|&(_, &x)| x == 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn recurrent_mask_is_shared_by_all_timesteps() {
        let mut rng = StdRng::seed_from_u64(11);
        let layer = masked_layer(&mut rng, 0.5);
        let resting = 0.5f32.tanh();

        let mut dropped_sets = Vec::new();
        for _pass in 0..2 {
            let masks = layer.sample_masks(&mut rng, 1).unwrap();
            assert!(masks.input.is_none());
            let mask = masks.recurrent.clone().unwrap();
            let dropped = zeros_of(mask.as_slice());

            let tape = Tape::default();
            let inputs: Vec<_> = (0..8).map(|_| tape.var(Tensor::zeros([1, 2]))).collect();
            let outputs = layer.bind(&tape).forward(&inputs, &masks).unwrap();
            assert_eq!(outputs.len(), 8);
            // From the second step on, exactly the dropped units sit at rest.
            for h in &outputs[1..] {
                let at_rest: BTreeSet<usize> = h
                    .value()
                    .as_slice()
                    .iter()
                    .enumerate()
                    .filter(|&(_, &x)| (x - resting).abs() < 1e-6)
                    .map(|(i, _)| i)
                    .collect();
                assert_eq!(at_rest, dropped);
            }
            dropped_sets.push(dropped);
        }
        // Masks are resampled between passes.
        assert_ne!(dropped_sets[0], dropped_sets[1]);
    }

    #[test]
    fn masks_are_scaled_and_absent_at_rate_zero() {
        let mut rng = StdRng::seed_from_u64(5);
        let masks = DropoutMasks::sample(&mut rng, 4, 3, 8, 0.25, 0.0).unwrap();
        assert!(masks.recurrent.is_none());
        let input = masks.input.unwrap();
        assert_eq!(input.shape(), [4, 3]);
        assert!(input
            .as_slice()
            .iter()
            .all(|&x| x == 0.0 || (x - 1.0 / 0.75).abs() < 1e-6));
    }

    #[test]
    fn final_state_only_without_sequences() {
        let mut rng = StdRng::seed_from_u64(2);
        let layer = Recurrent::rand(&mut rng, &spec(false, 0.0), 2);
        let tape = Tape::default();
        let inputs: Vec<_> = (0..5).map(|_| tape.var(Tensor::full([3, 2], 0.1))).collect();
        let outputs = layer
            .bind(&tape)
            .forward(&inputs, &DropoutMasks::default())
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].shape(), [3, 16]);
    }
}
