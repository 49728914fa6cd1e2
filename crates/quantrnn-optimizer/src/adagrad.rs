//! Adagrad optimizer.
//!
//! Adagrad adapts the learning rate for each parameter based on the
//! historical sum of squared gradients. This allows for larger updates
//! on infrequent parameters and smaller updates on frequent ones.
//!
//! # Example
//!
//! ```
//! use quantrnn_optimizer::{Adagrad, Optimizer};
//!
//! let mut adagrad = Adagrad::new(0.1);
//! let mut weights = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//! adagrad.apply_gradients(0.01, &mut weights, &gradients);
//! ```

use crate::{Optimizer, OptimizerConfig};
use serde::{Deserialize, Serialize};

/// Adagrad optimizer with per-parameter adaptive learning rates.
///
/// Updates parameters using the formula:
/// ```text
/// accumulator = accumulator + gradient^2
/// param = param - learning_rate * gradient / sqrt(accumulator)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adagrad {
    /// Initial value for the accumulator.
    initial_accumulator: f32,
    /// Accumulated squared gradients for each parameter.
    accumulator: Vec<f32>,
    /// Configuration used to create this optimizer.
    config: OptimizerConfig,
}

impl Adagrad {
    /// Creates a new Adagrad optimizer with the given initial accumulator.
    pub fn new(initial_accumulator: f32) -> Self {
        Self {
            initial_accumulator,
            accumulator: Vec::new(),
            config: OptimizerConfig::Adagrad {
                initial_accumulator,
            },
        }
    }

    /// Returns the current accumulator state.
    pub fn accumulator(&self) -> &[f32] {
        &self.accumulator
    }

    /// Resets the accumulator state.
    pub fn reset_state(&mut self) {
        self.accumulator.clear();
    }
}

impl Optimizer for Adagrad {
    fn apply_gradients(&mut self, learning_rate: f32, param: &mut [f32], gradients: &[f32]) {
        if self.accumulator.len() != param.len() {
            self.accumulator = vec![self.initial_accumulator; param.len()];
        }

        for (i, (p, g)) in param.iter_mut().zip(gradients.iter()).enumerate() {
            self.accumulator[i] += g * g;
            *p -= learning_rate * g / self.accumulator[i].sqrt();
        }
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adagrad_basic_update() {
        let mut adagrad = Adagrad::new(0.1);
        let mut param = vec![1.0, 2.0, 3.0];
        let gradients = vec![1.0, 1.0, 1.0];

        adagrad.apply_gradients(0.1, &mut param, &gradients);

        assert!(param[0] < 1.0);
        assert!(param[1] < 2.0);
        assert!(param[2] < 3.0);
    }

    #[test]
    fn test_adagrad_shrinking_steps() {
        let mut adagrad = Adagrad::new(0.1);
        let mut param = vec![10.0];

        adagrad.apply_gradients(0.1, &mut param, &[1.0]);
        let first_step = 10.0 - param[0];

        let before = param[0];
        adagrad.apply_gradients(0.1, &mut param, &[1.0]);
        let second_step = before - param[0];

        // Growing accumulator means shrinking effective steps.
        assert!(second_step < first_step);
    }

    #[test]
    fn test_adagrad_zero_gradient() {
        let mut adagrad = Adagrad::new(0.1);
        let mut param = vec![1.0, 2.0];
        adagrad.apply_gradients(0.1, &mut param, &[0.0, 0.0]);

        assert_eq!(param, vec![1.0, 2.0]);
    }

    #[test]
    fn test_adagrad_reset_state() {
        let mut adagrad = Adagrad::new(0.1);
        let mut param = vec![1.0];
        adagrad.apply_gradients(0.1, &mut param, &[1.0]);
        assert_eq!(adagrad.accumulator().len(), 1);

        adagrad.reset_state();
        assert!(adagrad.accumulator().is_empty());
    }
}
