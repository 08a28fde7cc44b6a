//! Parameter initializers.

use rand::Rng;
use rand_distr::{StandardNormal, Uniform};

use crate::tensor::Tensor;

/// Uniform in `[-limit, limit]` with `limit = sqrt(6 / (fan_in + fan_out))`.
pub fn glorot_uniform<R>(rng: &mut R, fan_in: usize, fan_out: usize) -> Tensor
where
    R: Rng + ?Sized,
{
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    Tensor::rand(
        [fan_in, fan_out],
        rng,
        &Uniform::new_inclusive(-limit, limit),
    )
}

/// Uniform in `[-scale, scale)`.
pub fn uniform<R>(rng: &mut R, shape: [usize; 2], scale: f32) -> Tensor
where
    R: Rng + ?Sized,
{
    Tensor::rand(shape, rng, &Uniform::new(-scale, scale))
}

/// A random `[n, n]` orthogonal matrix, obtained by Gram-Schmidt on Gaussian rows.
pub fn orthogonal<R>(rng: &mut R, n: usize) -> Tensor
where
    R: Rng + ?Sized,
{
    let mut rows: Vec<Vec<f32>> = Vec::with_capacity(n);
    while rows.len() < n {
        let mut v: Vec<f32> = (0..n).map(|_| rng.sample(StandardNormal)).collect();
        for q in &rows {
            let dot: f32 = v.iter().zip(q).map(|(a, b)| a * b).sum();
            v.iter_mut().zip(q).for_each(|(a, b)| *a -= dot * b);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        // Nearly dependent draws are discarded and redrawn.
        if norm > 1e-3 {
            v.iter_mut().for_each(|x| *x /= norm);
            rows.push(v);
        }
    }
    Tensor::from_fn([n, n], |i, j| rows[i][j])
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn orthogonal_rows_are_orthonormal() {
        let mut rng = StdRng::seed_from_u64(0);
        let q = orthogonal(&mut rng, 6);
        let qqt = q.matmul(&q.transpose()).unwrap();
        for i in 0..6 {
            for j in 0..6 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(qqt.get(i, j).unwrap(), expected, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn glorot_limit() {
        let mut rng = StdRng::seed_from_u64(1);
        let w = glorot_uniform(&mut rng, 10, 14);
        let limit = 0.5;
        assert_eq!(w.shape(), [10, 14]);
        assert!(w.as_slice().iter().all(|x| x.abs() <= limit));
    }
}
