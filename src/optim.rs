//! Gradient-descent optimizers with adaptive per-parameter learning rates.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    tensor::{Tensor, TensorError},
};

/// An optimization algorithm updating parameters in place from their gradients.
pub trait Optimizer {
    /// Perform a single optimization step. `grads[i]` is the gradient of `params[i]`, and the
    /// parameters must be passed in the same order at every step.
    fn step(&mut self, params: &mut [&mut Tensor], grads: &[Tensor]) -> Result<(), TensorError>;

    /// Get the learning rate.
    fn learning_rate(&self) -> f32;
}

/// Allocate one zeroed state buffer per parameter on the first step, and check shapes on the
/// following ones.
fn ensure_state(
    state: &mut Vec<Tensor>,
    params: &[&mut Tensor],
    grads: &[Tensor],
) -> Result<(), TensorError> {
    if params.len() != grads.len() {
        return Err(TensorError::IncompatibleShapes(
            vec![params.len()],
            vec![grads.len()],
        ));
    }
    if state.is_empty() {
        *state = params.iter().map(|p| Tensor::zeros(p.shape())).collect();
    }
    for ((param, grad), buffer) in params.iter().zip(grads).zip(state.iter()) {
        if param.shape() != grad.shape() || param.shape() != buffer.shape() {
            return Err(TensorError::IncompatibleShapes(
                param.shape().to_vec(),
                grad.shape().to_vec(),
            ));
        }
    }
    Ok(())
}

/// Adam: per-parameter step sizes from bias-corrected estimates of the first and second moments
/// of the gradients.
#[derive(Clone, Debug)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: i32,
    m: Vec<Tensor>,
    v: Vec<Tensor>,
}

impl Adam {
    /// Create an optimizer with `beta1 = 0.9`, `beta2 = 0.999` and `epsilon = 1e-7`.
    pub fn new(lr: f32) -> Self {
        Self::with_params(lr, 0.9, 0.999, 1e-7)
    }

    /// Create an optimizer with explicit hyperparameters.
    pub fn with_params(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Tensor], grads: &[Tensor]) -> Result<(), TensorError> {
        ensure_state(&mut self.m, params, grads)?;
        ensure_state(&mut self.v, params, grads)?;
        self.t += 1;
        let lr_t = self.lr * (1.0 - self.beta2.powi(self.t)).sqrt()
            / (1.0 - self.beta1.powi(self.t));

        for (((param, grad), m), v) in params
            .iter_mut()
            .zip(grads)
            .zip(&mut self.m)
            .zip(&mut self.v)
        {
            let moments = m.as_mut_slice().iter_mut().zip(v.as_mut_slice());
            for ((p, &g), (m, v)) in param
                .as_mut_slice()
                .iter_mut()
                .zip(grad.as_slice())
                .zip(moments)
            {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                *p -= lr_t * *m / (v.sqrt() + self.epsilon);
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }
}

/// RMSprop: steps scaled by a moving average of the squared gradients.
#[derive(Clone, Debug)]
pub struct RmsProp {
    lr: f32,
    rho: f32,
    epsilon: f32,
    mean_square: Vec<Tensor>,
}

impl RmsProp {
    /// Create an optimizer with `rho = 0.9` and `epsilon = 1e-7`.
    pub fn new(lr: f32) -> Self {
        Self::with_params(lr, 0.9, 1e-7)
    }

    /// Create an optimizer with explicit hyperparameters.
    pub fn with_params(lr: f32, rho: f32, epsilon: f32) -> Self {
        Self {
            lr,
            rho,
            epsilon,
            mean_square: Vec::new(),
        }
    }
}

impl Optimizer for RmsProp {
    fn step(&mut self, params: &mut [&mut Tensor], grads: &[Tensor]) -> Result<(), TensorError> {
        ensure_state(&mut self.mean_square, params, grads)?;
        for ((param, grad), mean_square) in params.iter_mut().zip(grads).zip(&mut self.mean_square)
        {
            for ((p, &g), s) in param
                .as_mut_slice()
                .iter_mut()
                .zip(grad.as_slice())
                .zip(mean_square.as_mut_slice())
            {
                *s = self.rho * *s + (1.0 - self.rho) * g * g;
                *p -= self.lr * g / (s.sqrt() + self.epsilon);
            }
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }
}

/// The optimizer to train with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OptimizerConfig {
    /// See [`Adam`].
    Adam {
        /// Learning rate.
        #[serde(default = "default_learning_rate")]
        learning_rate: f32,
    },
    /// See [`RmsProp`].
    RmsProp {
        /// Learning rate.
        #[serde(default = "default_learning_rate")]
        learning_rate: f32,
    },
}

fn default_learning_rate() -> f32 {
    1e-3
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::RmsProp {
            learning_rate: default_learning_rate(),
        }
    }
}

impl OptimizerConfig {
    /// Create the configured optimizer.
    pub fn build(&self) -> Result<Box<dyn Optimizer>> {
        let (Self::Adam { learning_rate } | Self::RmsProp { learning_rate }) = *self;
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(Error::configuration(format!(
                "learning rate must be positive, got {learning_rate}"
            )));
        }
        Ok(match self {
            Self::Adam { .. } => Box::new(Adam::new(learning_rate)),
            Self::RmsProp { .. } => Box::new(RmsProp::new(learning_rate)),
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    /// Minimize `sum((x - 3)^2)` from zero.
    fn minimize(optimizer: &mut dyn Optimizer, steps: usize) -> Tensor {
        let mut x = Tensor::zeros([1, 2]);
        for _ in 0..steps {
            let grad = x.map(|v| 2.0 * (v - 3.0));
            optimizer.step(&mut [&mut x], &[grad]).unwrap();
        }
        x
    }

    #[test]
    fn adam_first_step_has_the_size_of_the_learning_rate() {
        let mut adam = Adam::new(0.1);
        let x = minimize(&mut adam, 1);
        for &v in x.as_slice() {
            assert_abs_diff_eq!(v, 0.1, epsilon = 1e-5);
        }
    }

    #[test]
    fn rmsprop_first_step_is_scaled_by_the_mean_square() {
        let mut rmsprop = RmsProp::new(0.01);
        let x = minimize(&mut rmsprop, 1);
        // s = 0.1 * 36, step = 0.01 * 6 / sqrt(3.6)
        for &v in x.as_slice() {
            assert_abs_diff_eq!(v, 0.06 / 3.6f32.sqrt(), epsilon = 1e-5);
        }
    }

    #[test]
    fn both_converge_on_a_quadratic() {
        for mut optimizer in [
            Box::new(Adam::new(0.05)) as Box<dyn Optimizer>,
            Box::new(RmsProp::new(0.01)),
        ] {
            let x = minimize(optimizer.as_mut(), 2000);
            for &v in x.as_slice() {
                assert_abs_diff_eq!(v, 3.0, epsilon = 0.05);
            }
        }
    }

    #[test]
    fn mismatched_gradients_are_rejected() {
        let mut adam = Adam::new(0.1);
        let mut x = Tensor::zeros([2, 2]);
        assert!(adam.step(&mut [&mut x], &[Tensor::zeros([1, 2])]).is_err());
        assert!(adam.step(&mut [&mut x], &[]).is_err());
    }

    #[test]
    fn config_is_tagged_by_kind() {
        let config: OptimizerConfig = serde_yaml::from_str("kind: adam").unwrap();
        assert_eq!(
            config,
            OptimizerConfig::Adam {
                learning_rate: 1e-3
            }
        );
        assert_eq!(config.build().unwrap().learning_rate(), 1e-3);
        let default = OptimizerConfig::default().build().unwrap();
        assert_eq!(default.learning_rate(), 1e-3);

        let negative = OptimizerConfig::RmsProp {
            learning_rate: -1.0,
        };
        assert!(matches!(negative.build(), Err(Error::Configuration(_))));
    }
}
