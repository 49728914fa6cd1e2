//! RMSprop optimizer.
//!
//! RMSprop maintains a moving average of squared gradients to normalize
//! the gradient. It adapts the learning rate for each parameter, making
//! it well-suited for non-stationary objectives and online settings.
//!
//! # Example
//!
//! ```
//! use quantrnn_optimizer::{Optimizer, Rmsprop};
//!
//! let mut rmsprop = Rmsprop::new(0.9, 0.0, 1e-10);
//! let mut weights = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//! rmsprop.apply_gradients(0.001, &mut weights, &gradients);
//! ```

use crate::{Optimizer, OptimizerConfig};
use serde::{Deserialize, Serialize};

/// RMSprop optimizer with adaptive learning rates.
///
/// Updates parameters using the formula:
/// ```text
/// mean_square = decay * mean_square + (1 - decay) * gradient^2
/// if momentum > 0:
///     mom = momentum * mom + learning_rate * gradient / sqrt(mean_square + epsilon)
///     param = param - mom
/// else:
///     param = param - learning_rate * gradient / sqrt(mean_square + epsilon)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rmsprop {
    /// Decay rate for the moving average of squared gradients.
    decay: f32,
    /// Momentum coefficient.
    momentum: f32,
    /// Small constant for numerical stability.
    epsilon: f32,
    /// Moving average of squared gradients.
    mean_square: Vec<f32>,
    /// Momentum buffer.
    mom: Vec<f32>,
    /// Configuration used to create this optimizer.
    config: OptimizerConfig,
}

impl Rmsprop {
    /// Creates a new RMSprop optimizer with the given parameters.
    pub fn new(decay: f32, momentum: f32, epsilon: f32) -> Self {
        Self {
            decay,
            momentum,
            epsilon,
            mean_square: Vec::new(),
            mom: Vec::new(),
            config: OptimizerConfig::Rmsprop {
                decay,
                momentum,
                epsilon,
            },
        }
    }

    /// Returns the current mean square state.
    pub fn mean_square(&self) -> &[f32] {
        &self.mean_square
    }

    /// Returns the current momentum buffer.
    pub fn momentum_buffer(&self) -> &[f32] {
        &self.mom
    }

    /// Resets the optimizer state.
    pub fn reset_state(&mut self) {
        self.mean_square.clear();
        self.mom.clear();
    }
}

impl Optimizer for Rmsprop {
    fn apply_gradients(&mut self, learning_rate: f32, param: &mut [f32], gradients: &[f32]) {
        if self.mean_square.len() != param.len() {
            self.mean_square = vec![0.0; param.len()];
            if self.momentum > 0.0 {
                self.mom = vec![0.0; param.len()];
            }
        }

        for (i, (p, g)) in param.iter_mut().zip(gradients.iter()).enumerate() {
            self.mean_square[i] = self.decay * self.mean_square[i] + (1.0 - self.decay) * g * g;

            if self.momentum > 0.0 {
                self.mom[i] = self.momentum * self.mom[i]
                    + learning_rate * g / (self.mean_square[i] + self.epsilon).sqrt();
                *p -= self.mom[i];
            } else {
                *p -= learning_rate * g / (self.mean_square[i] + self.epsilon).sqrt();
            }
        }
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}
