//! Stochastic Gradient Descent (SGD) optimizer.
//!
//! SGD is a simple optimizer that updates parameters by subtracting
//! the gradient scaled by the learning rate.
//!
//! # Example
//!
//! ```
//! use quantrnn_optimizer::{Optimizer, Sgd};
//!
//! let mut sgd = Sgd::new();
//! let mut weights = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//! sgd.apply_gradients(0.01, &mut weights, &gradients);
//! ```

use crate::{Optimizer, OptimizerConfig};
use serde::{Deserialize, Serialize};

/// Stochastic Gradient Descent optimizer.
///
/// Updates parameters using the formula:
/// `param = param - learning_rate * gradient`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sgd {
    /// Configuration used to create this optimizer.
    config: OptimizerConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Sgd
    }
}

impl Sgd {
    /// Creates a new SGD optimizer.
    pub fn new() -> Self {
        Self {
            config: OptimizerConfig::Sgd,
        }
    }
}

impl Optimizer for Sgd {
    fn apply_gradients(&mut self, learning_rate: f32, param: &mut [f32], gradients: &[f32]) {
        for (p, g) in param.iter_mut().zip(gradients.iter()) {
            *p -= learning_rate * g;
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
    fn test_sgd_basic_update() {
        let mut sgd = Sgd::new();
        let mut param = vec![1.0, 2.0, 3.0];
        let gradients = vec![1.0, 1.0, 1.0];

        sgd.apply_gradients(0.1, &mut param, &gradients);

        assert!((param[0] - 0.9).abs() < 1e-6);
        assert!((param[1] - 1.9).abs() < 1e-6);
        assert!((param[2] - 2.9).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_zero_gradient() {
        let mut sgd = Sgd::new();
        let mut param = vec![1.0, 2.0, 3.0];
        let gradients = vec![0.0, 0.0, 0.0];

        sgd.apply_gradients(0.1, &mut param, &gradients);

        assert_eq!(param, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_sgd_learning_rate_per_call() {
        let mut sgd = Sgd::new();
        let mut param = vec![1.0];
        sgd.apply_gradients(0.1, &mut param, &[1.0]);
        sgd.apply_gradients(0.5, &mut param, &[1.0]);
        assert!((param[0] - 0.4).abs() < 1e-6);
    }
}
