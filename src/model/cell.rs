//! Recurrent cells as pure step functions from an input and a previous state to the next state.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::init::{glorot_uniform, orthogonal};
use crate::{
    autodiff::{Tape, Var},
    tensor::{Tensor, TensorError},
};

/// The kind of recurrent cell used by a layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrentKind {
    /// `h_t = tanh(W_x x_t + W_h h_{t-1} + b)`.
    Simple,
    /// The gated-memory cell with forget, input and output gates and an additive cell state.
    #[default]
    Lstm,
}

/// One step of a recurrent cell.
///
/// `recurrent` is the previous hidden state as seen by the recurrent connections, i.e. after
/// recurrent dropout, while `state` is the undropped previous state.
pub trait Step<'t> {
    /// The state carried between timesteps.
    type State: Copy;

    /// The all-zero state for a batch of `batch` sequences.
    fn initial_state(&self, tape: &'t Tape, batch: usize) -> Self::State;

    /// The hidden state exposed as the output of the cell.
    fn hidden(state: &Self::State) -> Var<'t>;

    /// Compute the next state.
    fn step(
        &self,
        input: Var<'t>,
        recurrent: Var<'t>,
        state: &Self::State,
    ) -> Result<Self::State, TensorError>;
}

/// An affine map of the input and the previous hidden state: `x W + h U + b`.
#[derive(Clone, Debug)]
pub struct Gate {
    pub(crate) kernel: Tensor,
    pub(crate) recurrent: Tensor,
    pub(crate) bias: Tensor,
}

impl Gate {
    fn rand<R>(rng: &mut R, input_size: usize, units: usize, bias: f32) -> Self
    where
        R: Rng + ?Sized,
    {
        Self {
            kernel: glorot_uniform(rng, input_size, units),
            recurrent: orthogonal(rng, units),
            bias: Tensor::full([1, units], bias),
        }
    }

    fn bind<'t>(&self, tape: &'t Tape) -> BoundGate<'t> {
        BoundGate {
            kernel: tape.var(self.kernel.clone()),
            recurrent: tape.var(self.recurrent.clone()),
            bias: tape.var(self.bias.clone()),
        }
    }

    fn parameters_mut(&mut self) -> [&mut Tensor; 3] {
        [&mut self.kernel, &mut self.recurrent, &mut self.bias]
    }
}

#[derive(Clone, Copy, Debug)]
struct BoundGate<'t> {
    kernel: Var<'t>,
    recurrent: Var<'t>,
    bias: Var<'t>,
}

impl<'t> BoundGate<'t> {
    fn pre_activation(&self, input: Var<'t>, hidden: Var<'t>) -> Result<Var<'t>, TensorError> {
        input
            .matmul(self.kernel)?
            .add(hidden.matmul(self.recurrent)?)?
            .add_row(self.bias)
    }

    fn parameters(&self) -> [Var<'t>; 3] {
        [self.kernel, self.recurrent, self.bias]
    }
}

/// The simple recurrent cell.
#[derive(Clone, Debug)]
pub struct SimpleCell {
    pub(crate) gate: Gate,
}

/// The gated-memory (LSTM) cell.
#[derive(Clone, Debug)]
pub struct LstmCell {
    pub(crate) forget: Gate,
    pub(crate) input: Gate,
    pub(crate) output: Gate,
    pub(crate) candidate: Gate,
}

/// A recurrent cell of either kind.
#[derive(Clone, Debug)]
pub enum Cell {
    /// See [`SimpleCell`].
    Simple(SimpleCell),
    /// See [`LstmCell`].
    Lstm(LstmCell),
}

impl Cell {
    /// Create a cell with randomized parameters.
    ///
    /// Kernels are glorot-uniform, recurrent kernels orthogonal and biases zero, except for the
    /// LSTM forget gate whose bias starts at 1 so the cell initially remembers.
    pub fn rand<R>(rng: &mut R, kind: RecurrentKind, input_size: usize, units: usize) -> Self
    where
        R: Rng + ?Sized,
    {
        match kind {
            RecurrentKind::Simple => Cell::Simple(SimpleCell {
                gate: Gate::rand(rng, input_size, units, 0.0),
            }),
            RecurrentKind::Lstm => Cell::Lstm(LstmCell {
                input: Gate::rand(rng, input_size, units, 0.0),
                forget: Gate::rand(rng, input_size, units, 1.0),
                candidate: Gate::rand(rng, input_size, units, 0.0),
                output: Gate::rand(rng, input_size, units, 0.0),
            }),
        }
    }

    /// Return the kind of the cell.
    pub fn kind(&self) -> RecurrentKind {
        match self {
            Cell::Simple(_) => RecurrentKind::Simple,
            Cell::Lstm(_) => RecurrentKind::Lstm,
        }
    }

    /// Lift the parameters onto `tape`.
    pub fn bind<'t>(&self, tape: &'t Tape) -> BoundCell<'t> {
        match self {
            Cell::Simple(cell) => BoundCell::Simple(BoundSimpleCell {
                gate: cell.gate.bind(tape),
            }),
            Cell::Lstm(cell) => BoundCell::Lstm(BoundLstmCell {
                forget: cell.forget.bind(tape),
                input: cell.input.bind(tape),
                output: cell.output.bind(tape),
                candidate: cell.candidate.bind(tape),
            }),
        }
    }

    /// Returns the parameters, in the order of [`BoundCell::parameters`].
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        match self {
            Cell::Simple(cell) => cell.gate.parameters_mut().into_iter().collect(),
            Cell::Lstm(cell) => [
                &mut cell.forget,
                &mut cell.input,
                &mut cell.output,
                &mut cell.candidate,
            ]
            .into_iter()
            .flat_map(Gate::parameters_mut)
            .collect(),
        }
    }
}

/// A [`Cell`] whose parameters live on a tape.
#[derive(Clone, Copy, Debug)]
pub enum BoundCell<'t> {
    /// See [`BoundSimpleCell`].
    Simple(BoundSimpleCell<'t>),
    /// See [`BoundLstmCell`].
    Lstm(BoundLstmCell<'t>),
}

impl<'t> BoundCell<'t> {
    /// Returns the parameter variables, in the order of [`Cell::parameters_mut`].
    pub fn parameters(&self) -> Vec<Var<'t>> {
        match self {
            BoundCell::Simple(cell) => cell.gate.parameters().to_vec(),
            BoundCell::Lstm(cell) => [cell.forget, cell.input, cell.output, cell.candidate]
                .iter()
                .flat_map(BoundGate::parameters)
                .collect(),
        }
    }
}

/// A [`SimpleCell`] whose parameters live on a tape.
#[derive(Clone, Copy, Debug)]
pub struct BoundSimpleCell<'t> {
    gate: BoundGate<'t>,
}

impl<'t> Step<'t> for BoundSimpleCell<'t> {
    type State = Var<'t>;

    fn initial_state(&self, tape: &'t Tape, batch: usize) -> Self::State {
        let units = self.gate.bias.shape()[1];
        tape.var(Tensor::zeros([batch, units]))
    }

    fn hidden(state: &Self::State) -> Var<'t> {
        *state
    }

    fn step(
        &self,
        input: Var<'t>,
        recurrent: Var<'t>,
        _state: &Self::State,
    ) -> Result<Self::State, TensorError> {
        Ok(self.gate.pre_activation(input, recurrent)?.tanh())
    }
}

/// The state of an LSTM cell.
#[derive(Clone, Copy, Debug)]
pub struct LstmState<'t> {
    /// `h_t`.
    pub hidden: Var<'t>,
    /// `c_t`.
    pub cell: Var<'t>,
}

/// A [`LstmCell`] whose parameters live on a tape.
#[derive(Clone, Copy, Debug)]
pub struct BoundLstmCell<'t> {
    forget: BoundGate<'t>,
    input: BoundGate<'t>,
    output: BoundGate<'t>,
    candidate: BoundGate<'t>,
}

impl<'t> Step<'t> for BoundLstmCell<'t> {
    type State = LstmState<'t>;

    fn initial_state(&self, tape: &'t Tape, batch: usize) -> Self::State {
        let units = self.forget.bias.shape()[1];
        LstmState {
            hidden: tape.var(Tensor::zeros([batch, units])),
            cell: tape.var(Tensor::zeros([batch, units])),
        }
    }

    fn hidden(state: &Self::State) -> Var<'t> {
        state.hidden
    }

    fn step(
        &self,
        input: Var<'t>,
        recurrent: Var<'t>,
        state: &Self::State,
    ) -> Result<Self::State, TensorError> {
        let f = self.forget.pre_activation(input, recurrent)?.sigmoid();
        let i = self.input.pre_activation(input, recurrent)?.sigmoid();
        let o = self.output.pre_activation(input, recurrent)?.sigmoid();
        let g = self.candidate.pre_activation(input, recurrent)?.tanh();
        // c_t = f ⊙ c_{t-1} + i ⊙ g
        let cell = f.mul(state.cell)?.add(i.mul(g)?)?;
        let hidden = o.mul(cell.tanh())?;
        Ok(LstmState { hidden, cell })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::autodiff::sigmoid;

    fn constant_gate(input_size: usize, units: usize, w: f32, u: f32, b: f32) -> Gate {
        Gate {
            kernel: Tensor::full([input_size, units], w),
            recurrent: Tensor::full([units, units], u),
            bias: Tensor::full([1, units], b),
        }
    }

    #[test]
    fn simple_step_matches_formula() {
        let cell = Cell::Simple(SimpleCell {
            gate: constant_gate(2, 1, 0.5, -1.0, 0.25),
        });
        let tape = Tape::default();
        let BoundCell::Simple(bound) = cell.bind(&tape) else {
            unreachable!()
        };
        let x = tape.var(Tensor::new([1, 2], vec![1.0, 2.0]).unwrap());
        let h = tape.var(Tensor::scalar(0.5));
        let next = bound.step(x, h, &h).unwrap();
        let expected = (0.5 * 1.0 + 0.5 * 2.0 - 0.5 + 0.25f32).tanh();
        assert_abs_diff_eq!(next.value().as_slice()[0], expected, epsilon = 1e-6);
    }

    #[test]
    fn lstm_step_matches_formula() {
        let cell = Cell::Lstm(LstmCell {
            forget: constant_gate(1, 1, 0.1, 0.2, 1.0),
            input: constant_gate(1, 1, 0.3, -0.1, 0.0),
            output: constant_gate(1, 1, -0.2, 0.4, 0.5),
            candidate: constant_gate(1, 1, 0.7, 0.6, -0.3),
        });
        let tape = Tape::default();
        let BoundCell::Lstm(bound) = cell.bind(&tape) else {
            unreachable!()
        };
        let (x, h, c) = (2.0f32, 0.5f32, -0.4f32);
        let state = LstmState {
            hidden: tape.var(Tensor::scalar(h)),
            cell: tape.var(Tensor::scalar(c)),
        };
        let next = bound
            .step(tape.var(Tensor::scalar(x)), state.hidden, &state)
            .unwrap();

        let f = sigmoid(0.1 * x + 0.2 * h + 1.0);
        let i = sigmoid(0.3 * x - 0.1 * h);
        let o = sigmoid(-0.2 * x + 0.4 * h + 0.5);
        let g = (0.7 * x + 0.6 * h - 0.3).tanh();
        let c_next = f * c + i * g;
        let h_next = o * c_next.tanh();
        assert_abs_diff_eq!(next.cell.value().as_slice()[0], c_next, epsilon = 1e-6);
        assert_abs_diff_eq!(next.hidden.value().as_slice()[0], h_next, epsilon = 1e-6);
    }

    #[test]
    fn parameters_align_with_bound_parameters() {
        let mut rng = StdRng::seed_from_u64(3);
        for kind in [RecurrentKind::Simple, RecurrentKind::Lstm] {
            let mut cell = Cell::rand(&mut rng, kind, 3, 5);
            let tape = Tape::default();
            let bound: Vec<_> = cell.bind(&tape).parameters().iter().map(Var::value).collect();
            let owned: Vec<_> = cell.parameters_mut().into_iter().map(|t| t.clone()).collect();
            assert_eq!(bound, owned);
            assert_eq!(cell.kind(), kind);
        }
    }

    #[test]
    fn lstm_forget_bias_starts_at_one() {
        let mut rng = StdRng::seed_from_u64(4);
        let Cell::Lstm(cell) = Cell::rand(&mut rng, RecurrentKind::Lstm, 3, 4) else {
            unreachable!()
        };
        assert!(cell.forget.bias.as_slice().iter().all(|&b| b == 1.0));
        assert!(cell.input.bias.as_slice().iter().all(|&b| b == 0.0));
    }
}
