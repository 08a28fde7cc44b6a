//! Reverse mode automatic differentiation on matrices. This implementation uses a tape to store
//! the computation graph.

use std::{cell::RefCell, ops, ptr};

use crate::tensor::{Tensor, TensorError};

use super::ops::{bce_with_logits, sigmoid, Op};

/// A node in the computation graph holding its value and the operation that produced it.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) value: Tensor,
    pub(crate) op: Op,
}

/// A tape recording the computation graph in evaluation order.
///
/// Nodes only ever refer to nodes with a smaller index, so walking the tape backwards visits every
/// node after all of its consumers.
#[derive(Debug, Default)]
pub struct Tape {
    nodes: RefCell<Vec<Node>>,
}

impl Tape {
    /// Get the number of nodes in the tape.
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Check if the tape is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a variable to the tape and return it. A variable created this way does not depend on
    /// any other variable.
    pub fn var(&self, value: Tensor) -> Var<'_> {
        self.push(value, Op::Leaf)
    }

    fn push(&self, value: Tensor, op: Op) -> Var<'_> {
        let mut nodes = self.nodes.borrow_mut();
        let index = nodes.len();
        nodes.push(Node { value, op });
        Var { index, tape: self }
    }
}

/// A variable in the computation graph. Operations on variables return new variables and do not
/// mutate the original ones.
#[derive(Debug, Clone, Copy)]
pub struct Var<'t> {
    index: usize,
    tape: &'t Tape,
}

impl<'t> ops::Add for Var<'t> {
    type Output = Var<'t>;

    fn add(self, rhs: Self) -> Self::Output {
        Var::add(self, rhs).expect("variables must have the same shape")
    }
}

impl<'t> ops::Mul for Var<'t> {
    type Output = Var<'t>;

    fn mul(self, rhs: Self) -> Self::Output {
        Var::mul(self, rhs).expect("variables must have the same shape")
    }
}

impl<'t> Var<'t> {
    /// Returns a copy of the value of the variable.
    pub fn value(&self) -> Tensor {
        self.tape.nodes.borrow()[self.index].value.clone()
    }

    /// Returns the shape of the value of the variable.
    pub fn shape(&self) -> [usize; 2] {
        self.tape.nodes.borrow()[self.index].value.shape()
    }

    /// Element-wise sum.
    pub fn add(self, rhs: Self) -> Result<Self, TensorError> {
        self.binary(rhs, Op::Add(self.index, rhs.index), Tensor::add)
    }

    /// Element-wise product.
    pub fn mul(self, rhs: Self) -> Result<Self, TensorError> {
        self.binary(rhs, Op::Mul(self.index, rhs.index), Tensor::mul)
    }

    /// Matrix product.
    pub fn matmul(self, rhs: Self) -> Result<Self, TensorError> {
        self.binary(rhs, Op::MatMul(self.index, rhs.index), Tensor::matmul)
    }

    /// Add a `[1, cols]` row variable to every row.
    pub fn add_row(self, row: Self) -> Result<Self, TensorError> {
        self.binary(row, Op::AddRow(self.index, row.index), Tensor::add_row)
    }

    /// Logistic function applied to each element.
    #[must_use]
    pub fn sigmoid(self) -> Self {
        let value = self.tape.nodes.borrow()[self.index].value.map(sigmoid);
        self.tape.push(value, Op::Sigmoid(self.index))
    }

    /// Hyperbolic tangent applied to each element.
    #[must_use]
    pub fn tanh(self) -> Self {
        let value = self.tape.nodes.borrow()[self.index].value.map(f32::tanh);
        self.tape.push(value, Op::Tanh(self.index))
    }

    /// Sum of all elements as a `[1, 1]` variable.
    #[must_use]
    pub fn sum(self) -> Self {
        let value = Tensor::scalar(self.tape.nodes.borrow()[self.index].value.sum());
        self.tape.push(value, Op::Sum(self.index))
    }

    /// Element-wise product with a constant that is not differentiated.
    pub fn mask(self, mask: &Tensor) -> Result<Self, TensorError> {
        let value = self.tape.nodes.borrow()[self.index].value.mul(mask)?;
        Ok(self.tape.push(value, Op::Mask(self.index, mask.clone())))
    }

    /// Treat the variable as a lookup table and select its rows.
    pub fn gather(self, ids: &[usize]) -> Result<Self, TensorError> {
        let value = self.tape.nodes.borrow()[self.index]
            .value
            .gather_rows(ids)?;
        Ok(self.tape.push(value, Op::Gather(self.index, ids.to_vec())))
    }

    /// Mean binary cross-entropy of the variable, read as logits, against 0/1 `targets`.
    pub fn bce_with_logits(self, targets: &Tensor) -> Result<Self, TensorError> {
        let loss = {
            let nodes = self.tape.nodes.borrow();
            let logits = &nodes[self.index].value;
            bce_with_logits(logits, targets).ok_or_else(|| {
                TensorError::IncompatibleShapes(
                    logits.layout().shape().to_vec(),
                    targets.layout().shape().to_vec(),
                )
            })?
        };
        Ok(self.tape.push(
            Tensor::scalar(loss),
            Op::BceWithLogits(self.index, targets.clone()),
        ))
    }

    /// Returns the gradients of the variable with respect to every leaf it depends on.
    ///
    /// The variable is seeded with an adjoint of ones, so for a `[1, 1]` loss these are the usual
    /// gradients.
    pub fn gradients(&self) -> Gradients {
        let nodes = self.tape.nodes.borrow();
        let mut adjoints: Vec<Option<Tensor>> = vec![None; nodes.len()];
        adjoints[self.index] = Some(Tensor::full(nodes[self.index].value.shape(), 1.0));
        for idx in (0..=self.index).rev() {
            let node = &nodes[idx];
            if matches!(node.op, Op::Leaf) {
                continue;
            }
            // Intermediate adjoints are no longer needed once propagated.
            let Some(adjoint) = adjoints[idx].take() else {
                continue;
            };
            node.op.backward(&nodes, &node.value, &adjoint, &mut adjoints);
        }
        Gradients { adjoints }
    }

    fn binary<F>(self, rhs: Self, op: Op, f: F) -> Result<Self, TensorError>
    where
        F: FnOnce(&Tensor, &Tensor) -> Result<Tensor, TensorError>,
    {
        assert!(
            ptr::eq(self.tape, rhs.tape),
            "variables must live on the same tape"
        );
        let value = {
            let nodes = self.tape.nodes.borrow();
            f(&nodes[self.index].value, &nodes[rhs.index].value)?
        };
        Ok(self.tape.push(value, op))
    }
}

/// Gradients of a variable with respect to the leaves of its tape.
#[derive(Debug)]
pub struct Gradients {
    adjoints: Vec<Option<Tensor>>,
}

impl Gradients {
    /// Returns the gradient with respect to `var`, or `None` when the differentiated variable does
    /// not depend on it.
    pub fn wrt(&self, var: &Var<'_>) -> Option<&Tensor> {
        self.adjoints.get(var.index).and_then(Option::as_ref)
    }

    /// Moves the gradient with respect to `var` out of the collection.
    pub fn take(&mut self, var: &Var<'_>) -> Option<Tensor> {
        self.adjoints.get_mut(var.index).and_then(Option::take)
    }
}
