//! Momentum optimizer.
//!
//! Momentum accelerates gradient descent by accumulating a velocity vector
//! in the direction of persistent reduction in the objective.
//!
//! # Example
//!
//! ```
//! use quantrnn_optimizer::{Momentum, Optimizer};
//!
//! let mut momentum = Momentum::new(0.9, false);
//! let mut weights = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//! momentum.apply_gradients(0.01, &mut weights, &gradients);
//! ```

use crate::{Optimizer, OptimizerConfig};
use serde::{Deserialize, Serialize};

/// Momentum optimizer with optional Nesterov acceleration.
///
/// Updates parameters using the formula:
/// ```text
/// velocity = momentum * velocity + gradient
/// param = param - learning_rate * velocity  (standard)
/// ```
///
/// With Nesterov momentum:
/// ```text
/// velocity = momentum * velocity + gradient
/// param = param - learning_rate * (momentum * velocity + gradient)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Momentum {
    /// Momentum coefficient.
    momentum: f32,
    /// Whether to use Nesterov momentum.
    use_nesterov: bool,
    /// Velocity buffer for momentum.
    velocity: Vec<f32>,
    /// Configuration used to create this optimizer.
    config: OptimizerConfig,
}

impl Momentum {
    /// Creates a new Momentum optimizer with the given parameters.
    pub fn new(momentum: f32, use_nesterov: bool) -> Self {
        Self {
            momentum,
            use_nesterov,
            velocity: Vec::new(),
            config: OptimizerConfig::Momentum {
                momentum,
                use_nesterov,
            },
        }
    }

    /// Returns the current velocity state.
    pub fn velocity(&self) -> &[f32] {
        &self.velocity
    }

    /// Returns whether Nesterov momentum is enabled.
    pub fn is_nesterov(&self) -> bool {
        self.use_nesterov
    }

    /// Resets the optimizer state.
    pub fn reset_state(&mut self) {
        self.velocity.clear();
    }
}

impl Optimizer for Momentum {
    fn apply_gradients(&mut self, learning_rate: f32, param: &mut [f32], gradients: &[f32]) {
        if self.velocity.len() != param.len() {
            self.velocity = vec![0.0; param.len()];
        }

        for (i, (p, g)) in param.iter_mut().zip(gradients.iter()).enumerate() {
            self.velocity[i] = self.momentum * self.velocity[i] + g;

            if self.use_nesterov {
                // Nesterov: look ahead with the velocity
                *p -= learning_rate * (self.momentum * self.velocity[i] + g);
            } else {
                *p -= learning_rate * self.velocity[i];
            }
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
    fn test_momentum_basic_update() {
        let mut momentum = Momentum::new(0.9, false);
        let mut param = vec![1.0, 2.0, 3.0];
        let gradients = vec![1.0, 1.0, 1.0];

        momentum.apply_gradients(0.1, &mut param, &gradients);

        assert!((param[0] - 0.9).abs() < 1e-6);
        assert!((param[1] - 1.9).abs() < 1e-6);
        assert!((param[2] - 2.9).abs() < 1e-6);
    }

    #[test]
    fn test_momentum_accumulation() {
        let mut momentum = Momentum::new(0.9, false);
        let mut param = vec![1.0];
        let gradients = vec![1.0];

        // First update: velocity = 1.0, param = 1.0 - 0.1 * 1.0 = 0.9
        momentum.apply_gradients(0.1, &mut param, &gradients);
        let first_update = 1.0 - param[0];

        // Second update: velocity = 1.9, param = 0.9 - 0.1 * 1.9 = 0.71
        momentum.apply_gradients(0.1, &mut param, &gradients);
        let second_update = 0.9 - param[0];

        assert!(second_update > first_update);
    }

    #[test]
    fn test_momentum_nesterov_larger_first_step() {
        let mut standard = Momentum::new(0.9, false);
        let mut nesterov = Momentum::new(0.9, true);

        let mut param_standard = vec![1.0];
        let mut param_nesterov = vec![1.0];
        let gradients = vec![1.0];

        standard.apply_gradients(0.1, &mut param_standard, &gradients);
        nesterov.apply_gradients(0.1, &mut param_nesterov, &gradients);

        assert!(param_nesterov[0] < param_standard[0]);
        assert!(nesterov.is_nesterov());
        assert!(!standard.is_nesterov());
    }

    #[test]
    fn test_momentum_velocity_decay() {
        let mut momentum = Momentum::new(0.9, false);
        let mut param = vec![0.0];

        momentum.apply_gradients(0.1, &mut param, &[1.0]);
        let velocity_after_grad = momentum.velocity()[0];

        for _ in 0..10 {
            momentum.apply_gradients(0.1, &mut param, &[0.0]);
        }

        assert!(momentum.velocity()[0].abs() < velocity_after_grad.abs());
    }

    #[test]
    fn test_momentum_reset_state() {
        let mut momentum = Momentum::new(0.9, false);
        let mut param = vec![1.0, 2.0];
        momentum.apply_gradients(0.1, &mut param, &[1.0, 1.0]);
        assert_eq!(momentum.velocity().len(), 2);

        momentum.reset_state();
        assert!(momentum.velocity().is_empty());
    }
}
