//! Optimizers for quantrnn.
//!
//! This crate provides the optimization algorithms the sequence model can be
//! configured with. The supported set is the variants of [`OptimizerConfig`];
//! resolution by configured name goes through [`OptimizerConfig::from_name`],
//! which fails with a configuration error for any name outside the registry.
//!
//! The learning rate is deliberately not part of the optimizer state: it is
//! passed into every [`Optimizer::apply_gradients`] call, so a caller can
//! drive its own schedule without mutating optimizer internals.
//!
//! # Available Optimizers
//!
//! - [`Sgd`] - Stochastic Gradient Descent
//! - [`Momentum`] - Momentum (optionally Nesterov)
//! - [`Adagrad`] - Adaptive Gradient Algorithm
//! - [`Rmsprop`] - Root Mean Square Propagation
//! - [`Adam`] - Adaptive Moment Estimation
//!
//! # Example
//!
//! ```
//! use quantrnn_optimizer::{create_optimizer, OptimizerConfig};
//!
//! let config = OptimizerConfig::Sgd;
//! let mut optimizer = create_optimizer(&config);
//!
//! let mut weights = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//! optimizer.apply_gradients(0.01, &mut weights, &gradients);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod adagrad;
mod adam;
mod momentum;
mod rmsprop;
mod sgd;

pub use adagrad::Adagrad;
pub use adam::Adam;
pub use momentum::Momentum;
pub use rmsprop::Rmsprop;
pub use sgd::Sgd;

/// Errors that can occur when working with optimizers.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// The configured optimizer name is not in the registry.
    #[error("Unknown optimizer: {0}")]
    UnknownOptimizer(String),

    /// Invalid configuration parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Configuration for the supported optimizer types.
///
/// Learning rates are not stored here; they are passed per update call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptimizerConfig {
    /// Stochastic gradient descent, no hyperparameters.
    Sgd,

    /// Momentum configuration.
    Momentum {
        /// Momentum coefficient.
        momentum: f32,
        /// Whether to use Nesterov momentum.
        use_nesterov: bool,
    },

    /// Adagrad configuration.
    Adagrad {
        /// Initial value for the accumulator.
        initial_accumulator: f32,
    },

    /// RMSprop configuration.
    Rmsprop {
        /// Decay rate for the moving average of squared gradients.
        decay: f32,
        /// Momentum coefficient.
        momentum: f32,
        /// Small constant for numerical stability.
        epsilon: f32,
    },

    /// Adam configuration.
    Adam {
        /// Exponential decay rate for first moment estimates.
        beta1: f32,
        /// Exponential decay rate for second moment estimates.
        beta2: f32,
        /// Small constant for numerical stability.
        epsilon: f32,
    },
}

impl OptimizerConfig {
    /// Returns the name of the optimizer type.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd => "Sgd",
            OptimizerConfig::Momentum { .. } => "Momentum",
            OptimizerConfig::Adagrad { .. } => "Adagrad",
            OptimizerConfig::Rmsprop { .. } => "Rmsprop",
            OptimizerConfig::Adam { .. } => "Adam",
        }
    }

    /// Resolves a configuration from an optimizer name and keyword arguments.
    ///
    /// Names are matched case-insensitively; missing keyword arguments fall
    /// back to the conventional defaults of each rule.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::UnknownOptimizer`] for a name outside the
    /// registry. This is the fatal construction-time configuration error of
    /// the model: it fires before any training or evaluation step runs.
    ///
    /// # Example
    ///
    /// ```
    /// use quantrnn_optimizer::OptimizerConfig;
    /// use std::collections::BTreeMap;
    ///
    /// let config = OptimizerConfig::from_name("adam", &BTreeMap::new()).unwrap();
    /// assert_eq!(config.name(), "Adam");
    ///
    /// assert!(OptimizerConfig::from_name("NotAnOptimizer", &BTreeMap::new()).is_err());
    /// ```
    pub fn from_name(
        name: &str,
        params: &BTreeMap<String, f32>,
    ) -> Result<Self, OptimizerError> {
        let get = |key: &str, default: f32| params.get(key).copied().unwrap_or(default);
        match name.to_lowercase().as_str() {
            "sgd" | "gradientdescent" => Ok(OptimizerConfig::Sgd),
            "momentum" => Ok(OptimizerConfig::Momentum {
                momentum: get("momentum", 0.9),
                use_nesterov: get("use_nesterov", 0.0) != 0.0,
            }),
            "adagrad" => Ok(OptimizerConfig::Adagrad {
                initial_accumulator: get("initial_accumulator_value", 0.1),
            }),
            "rmsprop" => Ok(OptimizerConfig::Rmsprop {
                decay: get("decay", 0.9),
                momentum: get("momentum", 0.0),
                epsilon: get("epsilon", 1e-10),
            }),
            "adam" => Ok(OptimizerConfig::Adam {
                beta1: get("beta1", 0.9),
                beta2: get("beta2", 0.999),
                epsilon: get("epsilon", 1e-8),
            }),
            _ => Err(OptimizerError::UnknownOptimizer(name.to_string())),
        }
    }
}

/// Trait for parameter optimizers.
///
/// An optimizer instance owns the moment state for exactly one parameter
/// tensor; the model keeps one instance per tensor so that flattening and
/// re-slicing parameter vectors is never needed.
pub trait Optimizer: Send {
    /// Applies gradients to update the parameter slice in place.
    ///
    /// # Arguments
    ///
    /// * `learning_rate` - The step size for this update.
    /// * `param` - The parameter values to update (modified in place).
    /// * `gradients` - The gradient values, same length as `param`.
    fn apply_gradients(&mut self, learning_rate: f32, param: &mut [f32], gradients: &[f32]);

    /// Returns the configuration this optimizer was created from.
    fn config(&self) -> &OptimizerConfig;
}

/// Creates a boxed optimizer from the given configuration.
///
/// # Example
///
/// ```
/// use quantrnn_optimizer::{create_optimizer, OptimizerConfig};
///
/// let config = OptimizerConfig::Adam {
///     beta1: 0.9,
///     beta2: 0.999,
///     epsilon: 1e-8,
/// };
/// let optimizer = create_optimizer(&config);
/// assert_eq!(optimizer.config().name(), "Adam");
/// ```
pub fn create_optimizer(config: &OptimizerConfig) -> Box<dyn Optimizer> {
    match *config {
        OptimizerConfig::Sgd => Box::new(Sgd::new()),
        OptimizerConfig::Momentum {
            momentum,
            use_nesterov,
        } => Box::new(Momentum::new(momentum, use_nesterov)),
        OptimizerConfig::Adagrad {
            initial_accumulator,
        } => Box::new(Adagrad::new(initial_accumulator)),
        OptimizerConfig::Rmsprop {
            decay,
            momentum,
            epsilon,
        } => Box::new(Rmsprop::new(decay, momentum, epsilon)),
        OptimizerConfig::Adam {
            beta1,
            beta2,
            epsilon,
        } => Box::new(Adam::new(beta1, beta2, epsilon)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_registry() {
        let empty = BTreeMap::new();
        assert_eq!(
            OptimizerConfig::from_name("sgd", &empty).unwrap().name(),
            "Sgd"
        );
        assert_eq!(
            OptimizerConfig::from_name("GradientDescent", &empty)
                .unwrap()
                .name(),
            "Sgd"
        );
        assert_eq!(
            OptimizerConfig::from_name("Momentum", &empty).unwrap().name(),
            "Momentum"
        );
        assert_eq!(
            OptimizerConfig::from_name("adagrad", &empty).unwrap().name(),
            "Adagrad"
        );
        assert_eq!(
            OptimizerConfig::from_name("RMSProp", &empty).unwrap().name(),
            "Rmsprop"
        );
        assert_eq!(
            OptimizerConfig::from_name("adam", &empty).unwrap().name(),
            "Adam"
        );
    }

    #[test]
    fn test_from_name_unknown_is_fatal() {
        let err = OptimizerConfig::from_name("NotAnOptimizer", &BTreeMap::new());
        match err {
            Err(OptimizerError::UnknownOptimizer(name)) => assert_eq!(name, "NotAnOptimizer"),
            other => panic!("expected UnknownOptimizer, got {:?}", other),
        }
    }

    #[test]
    fn test_from_name_keyword_arguments() {
        let mut params = BTreeMap::new();
        params.insert("momentum".to_string(), 0.95);
        params.insert("use_nesterov".to_string(), 1.0);
        let config = OptimizerConfig::from_name("momentum", &params).unwrap();
        assert_eq!(
            config,
            OptimizerConfig::Momentum {
                momentum: 0.95,
                use_nesterov: true,
            }
        );
    }

    #[test]
    fn test_create_optimizer_all_variants() {
        let configs = [
            OptimizerConfig::Sgd,
            OptimizerConfig::Momentum {
                momentum: 0.9,
                use_nesterov: false,
            },
            OptimizerConfig::Adagrad {
                initial_accumulator: 0.1,
            },
            OptimizerConfig::Rmsprop {
                decay: 0.9,
                momentum: 0.0,
                epsilon: 1e-10,
            },
            OptimizerConfig::Adam {
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-8,
            },
        ];
        for config in &configs {
            let optimizer = create_optimizer(config);
            assert_eq!(optimizer.config(), config);
        }
    }
}
