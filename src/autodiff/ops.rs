//! Differentiable operations recorded on the tape and their vector-Jacobian products.

use crate::tensor::Tensor;

use super::tape::Node;

/// The operation that produced a node, holding the indices of its operands and any constant
/// needed to back-propagate through it.
#[derive(Debug)]
pub(crate) enum Op {
    /// A value lifted onto the tape. Gradients stop here.
    Leaf,
    Add(usize, usize),
    Mul(usize, usize),
    MatMul(usize, usize),
    /// A `[rows, cols]` operand plus a `[1, cols]` row broadcast over all rows.
    AddRow(usize, usize),
    Sigmoid(usize),
    Tanh(usize),
    Sum(usize),
    /// Element-wise product with a constant tensor.
    Mask(usize, Tensor),
    /// Row lookup into a table.
    Gather(usize, Vec<usize>),
    /// Mean binary cross-entropy of logits against constant 0/1 targets.
    BceWithLogits(usize, Tensor),
}

/// Numerically stable logistic function.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Mean binary cross-entropy between `logits` and `targets`, computed without forming the
/// probabilities: `max(z, 0) - z * y + ln(1 + exp(-|z|))`.
pub(crate) fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> Option<f32> {
    if logits.shape() != targets.shape() {
        return None;
    }
    let total: f32 = logits
        .as_slice()
        .iter()
        .zip(targets.as_slice())
        .map(|(&z, &y)| z.max(0.0) - z * y + (-z.abs()).exp().ln_1p())
        .sum();
    Some(total / logits.as_slice().len() as f32)
}

impl Op {
    /// Propagate the adjoint of the node holding `value` to the adjoints of its operands.
    pub(crate) fn backward(
        &self,
        nodes: &[Node],
        value: &Tensor,
        adjoint: &Tensor,
        adjoints: &mut [Option<Tensor>],
    ) {
        match self {
            Op::Leaf => {}
            Op::Add(lhs, rhs) => {
                accumulate(adjoints, *lhs, adjoint.clone());
                accumulate(adjoints, *rhs, adjoint.clone());
            }
            Op::Mul(lhs, rhs) => {
                accumulate(adjoints, *lhs, adjoint * &nodes[*rhs].value);
                accumulate(adjoints, *rhs, adjoint * &nodes[*lhs].value);
            }
            Op::MatMul(lhs, rhs) => {
                let d_lhs = adjoint
                    .matmul(&nodes[*rhs].value.transpose())
                    .expect("adjoint conforms to the right operand");
                let d_rhs = nodes[*lhs]
                    .value
                    .transpose()
                    .matmul(adjoint)
                    .expect("left operand conforms to the adjoint");
                accumulate(adjoints, *lhs, d_lhs);
                accumulate(adjoints, *rhs, d_rhs);
            }
            Op::AddRow(x, row) => {
                accumulate(adjoints, *x, adjoint.clone());
                accumulate(adjoints, *row, adjoint.sum_rows());
            }
            Op::Sigmoid(x) => {
                let local = value.map(|y| y * (1.0 - y));
                accumulate(adjoints, *x, adjoint * &local);
            }
            Op::Tanh(x) => {
                let local = value.map(|y| 1.0 - y * y);
                accumulate(adjoints, *x, adjoint * &local);
            }
            Op::Sum(x) => {
                let g = adjoint.as_slice()[0];
                accumulate(adjoints, *x, Tensor::full(nodes[*x].value.shape(), g));
            }
            Op::Mask(x, mask) => {
                accumulate(adjoints, *x, adjoint * mask);
            }
            Op::Gather(table, ids) => {
                let slot = adjoints[*table]
                    .get_or_insert_with(|| Tensor::zeros(nodes[*table].value.shape()));
                slot.scatter_add_rows(ids, adjoint)
                    .expect("gathered ids were checked on the forward pass");
            }
            Op::BceWithLogits(logits, targets) => {
                let g = adjoint.as_slice()[0];
                let n = targets.as_slice().len() as f32;
                let d_logits = nodes[*logits]
                    .value
                    .zip_with(targets, |z, y| (sigmoid(z) - y) * g / n)
                    .expect("targets were checked on the forward pass");
                accumulate(adjoints, *logits, d_logits);
            }
        }
    }
}

fn accumulate(adjoints: &mut [Option<Tensor>], index: usize, contribution: Tensor) {
    match &mut adjoints[index] {
        Some(acc) => acc
            .add_assign(&contribution)
            .expect("adjoint has the shape of its primal"),
        slot @ None => *slot = Some(contribution),
    }
}
