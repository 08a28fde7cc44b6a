//! A dense, row-major matrix of `f32`.
//!
//! Every value flowing through the models is a rank-2 tensor: a batch of row vectors, a weight
//! matrix, or a `[1, n]` bias row. Operations check shapes and return [`TensorError`] instead of
//! broadcasting implicitly, except for [`Tensor::add_row`] which broadcasts a single row over all
//! rows of a batch.

use std::ops;

use rand::Rng;
use rand_distr::Distribution;

pub mod error;
pub mod layout;

pub use error::TensorError;
pub use layout::Layout;

/// A dense matrix stored contiguously in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    layout: Layout,
}

impl ops::Add<Self> for &Tensor {
    type Output = Tensor;

    fn add(self, other: Self) -> Self::Output {
        Tensor::add(self, other).expect("tensors must have the same shape")
    }
}

impl ops::Sub<Self> for &Tensor {
    type Output = Tensor;

    fn sub(self, other: Self) -> Self::Output {
        Tensor::sub(self, other).expect("tensors must have the same shape")
    }
}

impl ops::Mul<Self> for &Tensor {
    type Output = Tensor;

    fn mul(self, other: Self) -> Self::Output {
        Tensor::mul(self, other).expect("tensors must have the same shape")
    }
}

impl Tensor {
    /// Create a tensor given its shape and data in row-major order.
    pub fn new(shape: [usize; 2], data: Vec<f32>) -> Result<Self, TensorError> {
        let layout = Layout::new(&shape);
        if layout.elems() != data.len() {
            return Err(TensorError::DataLength {
                shape: shape.to_vec(),
                expected: layout.elems(),
                actual: data.len(),
            });
        }
        Ok(Self { data, layout })
    }

    /// Create a tensor filled with a single value.
    pub fn full(shape: [usize; 2], value: f32) -> Self {
        let layout = Layout::new(&shape);
        Self {
            data: vec![value; layout.elems()],
            layout,
        }
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: [usize; 2]) -> Self {
        Self::full(shape, 0.0)
    }

    /// Create a `[1, 1]` tensor.
    pub fn scalar(value: f32) -> Self {
        Self::full([1, 1], value)
    }

    /// Create a tensor whose element at `(row, col)` is `f(row, col)`.
    pub fn from_fn<F>(shape: [usize; 2], mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f32,
    {
        let layout = Layout::new(&shape);
        let data = (0..layout.elems())
            .map(|pos| {
                let index = layout.position_to_index(pos);
                f(index[0], index[1])
            })
            .collect();
        Self { data, layout }
    }

    /// Create a tensor with elements sampled independently from `distribution`.
    pub fn rand<R, D>(shape: [usize; 2], rng: &mut R, distribution: &D) -> Self
    where
        R: Rng + ?Sized,
        D: Distribution<f32>,
    {
        let layout = Layout::new(&shape);
        let data = (0..layout.elems())
            .map(|_| distribution.sample(rng))
            .collect();
        Self { data, layout }
    }

    /// Return the shape of the tensor as `[rows, cols]`.
    pub fn shape(&self) -> [usize; 2] {
        let shape = self.layout.shape();
        [shape[0], shape[1]]
    }

    /// Return the number of rows.
    pub fn rows(&self) -> usize {
        self.layout.shape()[0]
    }

    /// Return the number of columns.
    pub fn cols(&self) -> usize {
        self.layout.shape()[1]
    }

    /// Return the memory layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Return the elements in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Return the elements in row-major order, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Return the element at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.rows() || col >= self.cols() {
            return None;
        }
        Some(self.data[self.layout.index_to_position(&[row, col])])
    }

    /// Return a row as a slice.
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        if row >= self.rows() {
            return None;
        }
        let cols = self.cols();
        Some(&self.data[row * cols..(row + 1) * cols])
    }

    /// Apply `f` to each element.
    #[must_use]
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f32) -> f32,
    {
        Self {
            data: self.data.iter().map(|&x| f(x)).collect(),
            layout: self.layout.clone(),
        }
    }

    /// Combine two tensors of the same shape element by element.
    pub fn zip_with<F>(&self, other: &Self, f: F) -> Result<Self, TensorError>
    where
        F: Fn(f32, f32) -> f32,
    {
        self.expect_same_shape(other)?;
        Ok(Self {
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&x, &y)| f(x, y))
                .collect(),
            layout: self.layout.clone(),
        })
    }

    /// Add `other` to `self`, element-wise.
    pub fn add(&self, other: &Self) -> Result<Self, TensorError> {
        self.zip_with(other, |x, y| x + y)
    }

    /// Subtract `other` from `self`, element-wise.
    pub fn sub(&self, other: &Self) -> Result<Self, TensorError> {
        self.zip_with(other, |x, y| x - y)
    }

    /// Multiply `self` by `other`, element-wise.
    pub fn mul(&self, other: &Self) -> Result<Self, TensorError> {
        self.zip_with(other, |x, y| x * y)
    }

    /// Add a `[1, cols]` row to every row of `self`.
    pub fn add_row(&self, row: &Self) -> Result<Self, TensorError> {
        if row.rows() != 1 || row.cols() != self.cols() {
            return Err(TensorError::IncompatibleShapes(
                self.layout.shape().to_vec(),
                row.layout.shape().to_vec(),
            ));
        }
        let mut out = self.clone();
        for chunk in out.data.chunks_mut(self.cols()) {
            for (x, b) in chunk.iter_mut().zip(&row.data) {
                *x += b;
            }
        }
        Ok(out)
    }

    /// Reduce over the rows, returning a `[1, cols]` tensor of column sums.
    #[must_use]
    pub fn sum_rows(&self) -> Self {
        let mut out = Self::zeros([1, self.cols()]);
        for chunk in self.data.chunks(self.cols()) {
            for (acc, x) in out.data.iter_mut().zip(chunk) {
                *acc += x;
            }
        }
        out
    }

    /// Matrix product of a `[m, k]` and a `[k, n]` tensor.
    pub fn matmul(&self, other: &Self) -> Result<Self, TensorError> {
        let [m, k] = self.shape();
        let [k2, n] = other.shape();
        if k != k2 {
            return Err(TensorError::IncompatibleShapes(
                self.layout.shape().to_vec(),
                other.layout.shape().to_vec(),
            ));
        }
        let mut out = vec![0.0; m * n];
        for i in 0..m {
            let lhs_row = &self.data[i * k..(i + 1) * k];
            let out_row = &mut out[i * n..(i + 1) * n];
            for (p, &a) in lhs_row.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                let rhs_row = &other.data[p * n..(p + 1) * n];
                for (o, &b) in out_row.iter_mut().zip(rhs_row) {
                    *o += a * b;
                }
            }
        }
        Self::new([m, n], out)
    }

    /// Swap rows and columns.
    #[must_use]
    pub fn transpose(&self) -> Self {
        let view = self.layout.transposed();
        let (rows, cols) = (view.shape()[0], view.shape()[1]);
        let (row_stride, col_stride) = (view.strides()[0], view.strides()[1]);
        let data = (0..rows)
            .flat_map(|i| (0..cols).map(move |j| i * row_stride + j * col_stride))
            .map(|pos| self.data[pos])
            .collect();
        Self {
            data,
            layout: Layout::new(&[rows, cols]),
        }
    }

    /// Select rows by index, producing a `[ids.len(), cols]` tensor.
    pub fn gather_rows(&self, ids: &[usize]) -> Result<Self, TensorError> {
        let cols = self.cols();
        let mut data = Vec::with_capacity(ids.len() * cols);
        for &id in ids {
            let row = self.row(id).ok_or(TensorError::IndexOutOfBounds {
                index: id,
                rows: self.rows(),
            })?;
            data.extend_from_slice(row);
        }
        Self::new([ids.len(), cols], data)
    }

    /// Add row `i` of `src` into row `ids[i]` of `self`. Repeated ids accumulate.
    pub fn scatter_add_rows(&mut self, ids: &[usize], src: &Self) -> Result<(), TensorError> {
        if src.rows() != ids.len() || src.cols() != self.cols() {
            return Err(TensorError::IncompatibleShapes(
                self.layout.shape().to_vec(),
                src.layout.shape().to_vec(),
            ));
        }
        let cols = self.cols();
        let rows = self.rows();
        for (i, &id) in ids.iter().enumerate() {
            if id >= rows {
                return Err(TensorError::IndexOutOfBounds { index: id, rows });
            }
            let dst = &mut self.data[id * cols..(id + 1) * cols];
            for (d, s) in dst.iter_mut().zip(&src.data[i * cols..(i + 1) * cols]) {
                *d += s;
            }
        }
        Ok(())
    }

    /// Add `other` into `self`, element-wise.
    pub fn add_assign(&mut self, other: &Self) -> Result<(), TensorError> {
        self.expect_same_shape(other)?;
        for (x, y) in self.data.iter_mut().zip(&other.data) {
            *x += y;
        }
        Ok(())
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Euclidean norm of all elements.
    pub fn norm(&self) -> f32 {
        self.data.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    fn expect_same_shape(&self, other: &Self) -> Result<(), TensorError> {
        if self.layout.shape() != other.layout.shape() {
            return Err(TensorError::IncompatibleShapes(
                self.layout.shape().to_vec(),
                other.layout.shape().to_vec(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::Uniform;

    use super::*;

    fn t(shape: [usize; 2], data: &[f32]) -> Tensor {
        Tensor::new(shape, data.to_vec()).unwrap()
    }

    #[test]
    fn new_rejects_wrong_length() {
        let err = Tensor::new([2, 3], vec![0.0; 5]).unwrap_err();
        assert_eq!(
            err,
            TensorError::DataLength {
                shape: vec![2, 3],
                expected: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn arithmetics() {
        let a = t([2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let b = t([2, 2], &[5.0, 6.0, 7.0, 8.0]);
        assert_eq!((&a + &b).as_slice(), &[6.0, 8.0, 10.0, 12.0]);
        assert_eq!((&b - &a).as_slice(), &[4.0, 4.0, 4.0, 4.0]);
        assert_eq!((&a * &b).as_slice(), &[5.0, 12.0, 21.0, 32.0]);
        assert!(a.add(&t([1, 4], &[0.0; 4])).is_err());
    }

    #[test]
    fn matmul() {
        let a = t([2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = t([3, 2], &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), [2, 2]);
        assert_eq!(c.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
        assert!(a.matmul(&a).is_err());
    }

    #[test]
    fn transpose() {
        let a = t([2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let at = a.transpose();
        assert_eq!(at.shape(), [3, 2]);
        assert_eq!(at.as_slice(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(at.transpose(), a);
    }

    #[test]
    fn add_row_and_sum_rows() {
        let a = t([2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = t([1, 3], &[10.0, 20.0, 30.0]);
        assert_eq!(
            a.add_row(&b).unwrap().as_slice(),
            &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0]
        );
        assert_eq!(a.sum_rows().as_slice(), &[5.0, 7.0, 9.0]);
        assert!(a.add_row(&a).is_err());
    }

    #[test]
    fn gather_and_scatter() {
        let table = t([3, 2], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let g = table.gather_rows(&[2, 0, 2]).unwrap();
        assert_eq!(g.as_slice(), &[4.0, 5.0, 0.0, 1.0, 4.0, 5.0]);
        assert_eq!(
            table.gather_rows(&[3]).unwrap_err(),
            TensorError::IndexOutOfBounds { index: 3, rows: 3 }
        );

        let mut acc = Tensor::zeros([3, 2]);
        acc.scatter_add_rows(&[2, 0, 2], &Tensor::full([3, 2], 1.0))
            .unwrap();
        assert_eq!(acc.as_slice(), &[1.0, 1.0, 0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn reductions() {
        let a = t([1, 4], &[3.0, 4.0, 0.0, 0.0]);
        assert_abs_diff_eq!(a.norm(), 5.0);
        assert_abs_diff_eq!(a.sum(), 7.0);
    }

    #[test]
    fn rand_respects_distribution() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Tensor::rand([16, 16], &mut rng, &Uniform::new(-0.05f32, 0.05));
        assert!(a.as_slice().iter().all(|x| (-0.05..0.05).contains(x)));
    }
}
