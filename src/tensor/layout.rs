//! Memory layout of a row-major tensor.

/// Shape and strides of a contiguous, row-major tensor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl Layout {
    /// Create the contiguous layout of the given shape.
    pub fn new(shape: &[usize]) -> Self {
        let mut strides = Vec::with_capacity(shape.len());
        let mut stride = 1;
        for s in shape.iter().rev() {
            strides.push(stride);
            stride *= s;
        }
        strides.reverse();
        Self {
            shape: shape.to_vec(),
            strides,
        }
    }

    /// Return the shape.
    pub fn shape(&self) -> &[usize] {
        self.shape.as_slice()
    }

    /// Return the strides.
    pub fn strides(&self) -> &[usize] {
        self.strides.as_slice()
    }

    /// Return the number of elements described by the layout.
    pub fn elems(&self) -> usize {
        self.shape.iter().product()
    }

    /// Return the layout with the axes reversed, as seen by a transposed view of the same buffer.
    pub fn transposed(&self) -> Self {
        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        shape.reverse();
        strides.reverse();
        Self { shape, strides }
    }

    /// Return the buffer position of a multi-dimensional index.
    pub fn index_to_position(&self, index: &[usize]) -> usize {
        index
            .iter()
            .zip(self.strides.iter())
            .map(|(x, s)| x * s)
            .sum()
    }

    /// Return the multi-dimensional index of a buffer position. Only valid for contiguous layouts.
    pub fn position_to_index(&self, position: usize) -> Vec<usize> {
        let mut index = Vec::with_capacity(self.shape.len());
        let mut remainder = position;
        for s in self.strides() {
            index.push(remainder / s);
            remainder %= s;
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_strides() {
        let layout = Layout::new(&[2, 3, 4]);
        assert_eq!(layout.strides(), &[12, 4, 1]);
        assert_eq!(layout.elems(), 24);
    }

    #[test]
    fn position_round_trip() {
        let layout = Layout::new(&[3, 5]);
        for pos in 0..layout.elems() {
            let index = layout.position_to_index(pos);
            assert_eq!(layout.index_to_position(&index), pos);
        }
    }

    #[test]
    fn transposed_view_reads_columns() {
        let layout = Layout::new(&[2, 3]);
        let t = layout.transposed();
        assert_eq!(t.shape(), &[3, 2]);
        // Element (2, 1) of the transpose is element (1, 2) of the original.
        let position = layout.index_to_position(&[1, 2]);
        assert_eq!(t.index_to_position(&[2, 1]), position);
    }
}
