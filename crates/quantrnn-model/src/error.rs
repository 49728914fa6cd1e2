//! Error types for the quantrnn-model crate.
//!
//! Configuration problems are fatal and surface before any step executes;
//! layer and optimizer failures are wrapped so callers see one error type.

use quantrnn_layers::LayerError;
use quantrnn_optimizer::OptimizerError;
use thiserror::Error;

/// Error type for model construction, stepping, and evaluation.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Invalid hyperparameter combination, rejected before construction.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// A batch violated the shape contract of the model.
    #[error("Batch error: {message}")]
    BatchError {
        /// Description of the batch error
        message: String,
    },

    /// Error raised by a layer component.
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    /// Error raised by the optimizer registry.
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// I/O error while writing the evaluation report.
    #[error("Report I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::ConfigError {
            message: "target_idx out of range".to_string(),
        };
        assert!(err.to_string().contains("Configuration error"));

        let err = ModelError::BatchError {
            message: "expected 5 frames".to_string(),
        };
        assert!(err.to_string().contains("Batch error"));
    }

    #[test]
    fn test_wrapped_errors_convert() {
        let layer = LayerError::ConfigError {
            message: "bad".to_string(),
        };
        let err: ModelError = layer.into();
        assert!(matches!(err, ModelError::Layer(_)));

        let opt = OptimizerError::UnknownOptimizer("NotAnOptimizer".to_string());
        let err: ModelError = opt.into();
        assert!(matches!(err, ModelError::Optimizer(_)));
    }
}
