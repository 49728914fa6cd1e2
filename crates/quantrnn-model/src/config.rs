//! Model configuration.
//!
//! [`ModelConfig`] is the immutable hyperparameter set the model is built
//! from. [`ModelConfig::validate`] checks every precondition up front so that
//! invalid values fail with a configuration error instead of propagating NaNs
//! through training.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Fixed per-feature normalization vectors supplied by configuration.
///
/// Both vectors must be `num_inputs` long; scale entries must be non-zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerConfig {
    /// Per-feature centers subtracted before scaling.
    pub center: Vec<f32>,
    /// Per-feature scales divided out after centering.
    pub scale: Vec<f32>,
}

/// Hyperparameters for the sequence regression model.
///
/// The recurrent cell and the optimizer are configured by name and resolved
/// at model-construction time; unknown names are fatal configuration errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of time steps the stack is unrolled over in one forward pass.
    pub num_unrollings: usize,
    /// Width of each input frame.
    pub num_inputs: usize,
    /// Width of each output/target frame.
    pub num_outputs: usize,
    /// Hidden width of every recurrent layer.
    pub num_hidden: usize,
    /// Number of stacked recurrent layers.
    pub num_layers: usize,
    /// Recurrent cell kind, `"gru"` or `"lstm"`.
    pub rnn_cell: String,
    /// Whether cell inputs are dropped out during training.
    pub input_dropout: bool,
    /// Whether cell outputs (hidden connections) are dropped out.
    pub hidden_dropout: bool,
    /// Whether the LSTM variant's internal candidate is dropped out.
    pub rnn_dropout: bool,
    /// Shared keep probability for all enabled dropout connections.
    pub keep_prob: f32,
    /// Column of the output vector the target-restricted loss is taken over.
    pub target_idx: usize,
    /// Blend weight on the target-column final-step loss.
    pub target_lambda: f32,
    /// Blend weight, within the remainder, on the full final-step loss.
    pub rnn_lambda: f32,
    /// Global gradient-norm bound; 0.0 disables clipping.
    pub max_grad_norm: f32,
    /// Optimizer name, resolved against the registry at construction.
    pub optimizer: String,
    /// Keyword arguments forwarded to the optimizer constructor.
    pub optimizer_params: BTreeMap<String, f32>,
    /// Optional per-feature normalization vectors.
    pub data_scaler: Option<ScalerConfig>,
    /// Whether targets are normalized with the same vectors as inputs.
    pub scale_targets: bool,
    /// Seed for weight initialization and dropout mask streams.
    pub seed: u64,
    /// Whether the evaluation loop prints the verbose per-batch format.
    pub pretty_print_preds: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_unrollings: 5,
            num_inputs: 4,
            num_outputs: 4,
            num_hidden: 16,
            num_layers: 1,
            rnn_cell: "gru".to_string(),
            input_dropout: false,
            hidden_dropout: false,
            rnn_dropout: false,
            keep_prob: 1.0,
            target_idx: 0,
            target_lambda: 0.5,
            rnn_lambda: 0.7,
            max_grad_norm: 5.0,
            optimizer: "sgd".to_string(),
            optimizer_params: BTreeMap::new(),
            data_scaler: None,
            scale_targets: false,
            seed: 42,
            pretty_print_preds: false,
        }
    }
}

impl ModelConfig {
    /// Checks every precondition of the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError::ConfigError`] naming the first violated
    /// field: zero dimensions, an out-of-range `target_idx`, blend weights
    /// or keep probability outside their intervals, a negative gradient-norm
    /// bound, mis-sized or zero-valued scaler vectors, or target scaling
    /// requested without a scaler (or with `num_outputs != num_inputs`).
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.num_unrollings == 0 {
            return Err(Self::config_err("num_unrollings must be at least 1"));
        }
        if self.num_inputs == 0 {
            return Err(Self::config_err("num_inputs must be at least 1"));
        }
        if self.num_outputs == 0 {
            return Err(Self::config_err("num_outputs must be at least 1"));
        }
        if self.num_hidden == 0 {
            return Err(Self::config_err("num_hidden must be at least 1"));
        }
        if self.num_layers == 0 {
            return Err(Self::config_err("num_layers must be at least 1"));
        }
        if self.target_idx >= self.num_outputs {
            return Err(Self::config_err(&format!(
                "target_idx {} out of range for {} outputs",
                self.target_idx, self.num_outputs
            )));
        }
        if !(0.0..=1.0).contains(&self.target_lambda) {
            return Err(Self::config_err(&format!(
                "target_lambda {} outside [0, 1]",
                self.target_lambda
            )));
        }
        if !(0.0..=1.0).contains(&self.rnn_lambda) {
            return Err(Self::config_err(&format!(
                "rnn_lambda {} outside [0, 1]",
                self.rnn_lambda
            )));
        }
        if !(self.keep_prob > 0.0 && self.keep_prob <= 1.0) {
            return Err(Self::config_err(&format!(
                "keep_prob {} outside (0, 1]",
                self.keep_prob
            )));
        }
        if self.max_grad_norm < 0.0 {
            return Err(Self::config_err(&format!(
                "max_grad_norm {} must be non-negative",
                self.max_grad_norm
            )));
        }
        if let Some(scaler) = &self.data_scaler {
            if scaler.center.len() != self.num_inputs || scaler.scale.len() != self.num_inputs {
                return Err(Self::config_err(&format!(
                    "scaler vectors must be {} long, got {} and {}",
                    self.num_inputs,
                    scaler.center.len(),
                    scaler.scale.len()
                )));
            }
            if scaler.scale.iter().any(|&s| s == 0.0) {
                return Err(Self::config_err("scaler scale contains a zero entry"));
            }
        }
        if self.scale_targets {
            if self.data_scaler.is_none() {
                return Err(Self::config_err(
                    "scale_targets requires a configured data_scaler",
                ));
            }
            if self.num_outputs != self.num_inputs {
                return Err(Self::config_err(&format!(
                    "scale_targets requires num_outputs == num_inputs, got {} and {}",
                    self.num_outputs, self.num_inputs
                )));
            }
        }
        Ok(())
    }

    fn config_err(message: &str) -> ModelError {
        ModelError::ConfigError {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ModelConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        for field in ["unrollings", "inputs", "outputs", "hidden", "layers"] {
            let mut config = ModelConfig::default();
            match field {
                "unrollings" => config.num_unrollings = 0,
                "inputs" => config.num_inputs = 0,
                "outputs" => config.num_outputs = 0,
                "hidden" => config.num_hidden = 0,
                _ => config.num_layers = 0,
            }
            assert!(config.validate().is_err(), "{} = 0 accepted", field);
        }
    }

    #[test]
    fn test_target_idx_range() {
        let mut config = ModelConfig::default();
        config.target_idx = config.num_outputs;
        assert!(config.validate().is_err());

        config.target_idx = config.num_outputs - 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lambda_intervals() {
        let mut config = ModelConfig::default();
        config.target_lambda = 1.5;
        assert!(config.validate().is_err());

        let mut config = ModelConfig::default();
        config.rnn_lambda = -0.1;
        assert!(config.validate().is_err());

        let mut config = ModelConfig::default();
        config.target_lambda = 0.0;
        config.rnn_lambda = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_keep_prob_interval() {
        let mut config = ModelConfig::default();
        config.keep_prob = 0.0;
        assert!(config.validate().is_err());

        config.keep_prob = 1.1;
        assert!(config.validate().is_err());

        config.keep_prob = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scaler_vectors_checked() {
        let mut config = ModelConfig::default();
        config.data_scaler = Some(ScalerConfig {
            center: vec![0.0; 3],
            scale: vec![1.0; 4],
        });
        assert!(config.validate().is_err());

        config.data_scaler = Some(ScalerConfig {
            center: vec![0.0; 4],
            scale: vec![1.0, 0.0, 1.0, 1.0],
        });
        assert!(config.validate().is_err());

        config.data_scaler = Some(ScalerConfig {
            center: vec![0.0; 4],
            scale: vec![1.0; 4],
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scale_targets_requirements() {
        let mut config = ModelConfig::default();
        config.scale_targets = true;
        assert!(config.validate().is_err());

        config.data_scaler = Some(ScalerConfig {
            center: vec![0.0; 4],
            scale: vec![1.0; 4],
        });
        assert!(config.validate().is_ok());

        config.num_outputs = 2;
        config.target_idx = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_grad_norm_rejected() {
        let mut config = ModelConfig::default();
        config.max_grad_norm = -1.0;
        assert!(config.validate().is_err());

        config.max_grad_norm = 0.0;
        assert!(config.validate().is_ok());
    }
}
