//! Normalization layers.
//!
//! This module provides [`LayerNorm`], used by the layer-normalization LSTM
//! cell on each gate pre-activation and on the new cell state. One instance
//! is applied at every unrolled time step, so the backward entry point takes
//! the step's input explicitly and accumulates parameter gradients.

use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::tensor::Tensor;

/// Layer Normalization layer.
///
/// Normalizes the input across the feature dimension (last dimension),
/// then applies a learnable affine transformation:
/// `y = (x - mean) / sqrt(var + eps) * gamma + beta`
///
/// # Example
///
/// ```
/// use quantrnn_layers::normalization::LayerNorm;
/// use quantrnn_layers::tensor::Tensor;
///
/// let layer_norm = LayerNorm::new(64);
/// let input = Tensor::ones(&[32, 64]);
/// let output = layer_norm.forward(&input).unwrap();
/// assert_eq!(output.shape(), &[32, 64]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerNorm {
    /// Learnable scale parameter (gamma)
    gamma: Tensor,
    /// Learnable shift parameter (beta)
    beta: Tensor,
    /// Small constant for numerical stability
    eps: f32,
    /// Normalized dimension
    normalized_shape: usize,
    /// Accumulated gradient of gamma
    gamma_grad: Tensor,
    /// Accumulated gradient of beta
    beta_grad: Tensor,
}

impl LayerNorm {
    /// Creates a new Layer Normalization layer.
    pub fn new(normalized_shape: usize) -> Self {
        Self {
            gamma: Tensor::ones(&[normalized_shape]),
            beta: Tensor::zeros(&[normalized_shape]),
            eps: 1e-5,
            normalized_shape,
            gamma_grad: Tensor::zeros(&[normalized_shape]),
            beta_grad: Tensor::zeros(&[normalized_shape]),
        }
    }

    /// Returns the normalized shape.
    pub fn normalized_shape(&self) -> usize {
        self.normalized_shape
    }

    /// Returns a reference to gamma (scale parameter).
    pub fn gamma(&self) -> &Tensor {
        &self.gamma
    }

    /// Returns a reference to beta (shift parameter).
    pub fn beta(&self) -> &Tensor {
        &self.beta
    }

    /// Performs a forward pass.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if the input is not `[batch, normalized_shape]`.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        self.check_input(input)?;

        let batch_size = input.shape()[0];
        let dim = input.shape()[1];

        let mean = input.mean_axis(1);
        let var = input.var_axis(1);

        let mut output = vec![0.0; input.numel()];
        for i in 0..batch_size {
            let mu = mean.data()[i];
            let std = (var.data()[i] + self.eps).sqrt();
            for j in 0..dim {
                let idx = i * dim + j;
                let normalized = (input.data()[idx] - mu) / std;
                output[idx] = self.gamma.data()[j] * normalized + self.beta.data()[j];
            }
        }

        Ok(Tensor::from_data(input.shape(), output))
    }

    /// Backward pass for one application of the shared layer.
    ///
    /// Recomputes the per-row statistics from `input` (the tensor passed to
    /// the matching [`forward`] call), adds gamma/beta gradients into the
    /// accumulators, and returns the gradient with respect to the input.
    ///
    /// [`forward`]: LayerNorm::forward
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if shapes are incompatible.
    pub fn accumulate_backward(
        &mut self,
        input: &Tensor,
        grad: &Tensor,
    ) -> Result<Tensor, LayerError> {
        self.check_input(input)?;
        if grad.shape() != input.shape() {
            return Err(LayerError::ShapeMismatch {
                expected: input.shape().to_vec(),
                actual: grad.shape().to_vec(),
            });
        }

        let batch_size = input.shape()[0];
        let dim = input.shape()[1];
        let n = dim as f32;

        let mean = input.mean_axis(1);
        let var = input.var_axis(1);

        let mut x_norm = vec![0.0; input.numel()];
        let mut std_inv = vec![0.0; batch_size];
        for i in 0..batch_size {
            std_inv[i] = 1.0 / (var.data()[i] + self.eps).sqrt();
            for j in 0..dim {
                let idx = i * dim + j;
                x_norm[idx] = (input.data()[idx] - mean.data()[i]) * std_inv[i];
            }
        }

        // dL/dgamma += sum over batch of grad * x_norm ; dL/dbeta += sum of grad
        let gamma_grad = self.gamma_grad.data_mut();
        for j in 0..dim {
            for i in 0..batch_size {
                let idx = i * dim + j;
                gamma_grad[j] += grad.data()[idx] * x_norm[idx];
            }
        }
        self.beta_grad = self.beta_grad.add(&grad.sum_axis(0));

        let mut input_grad = vec![0.0; input.numel()];
        for i in 0..batch_size {
            let mut dx_norm_sum = 0.0;
            let mut dx_norm_x_norm_sum = 0.0;
            for j in 0..dim {
                let idx = i * dim + j;
                let dx_norm = grad.data()[idx] * self.gamma.data()[j];
                dx_norm_sum += dx_norm;
                dx_norm_x_norm_sum += dx_norm * x_norm[idx];
            }
            for j in 0..dim {
                let idx = i * dim + j;
                let dx_norm = grad.data()[idx] * self.gamma.data()[j];
                input_grad[idx] =
                    std_inv[i] / n * (n * dx_norm - dx_norm_sum - x_norm[idx] * dx_norm_x_norm_sum);
            }
        }

        Ok(Tensor::from_data(input.shape(), input_grad))
    }

    /// Clears the accumulated gradients.
    pub fn zero_grads(&mut self) {
        self.gamma_grad = Tensor::zeros(&[self.normalized_shape]);
        self.beta_grad = Tensor::zeros(&[self.normalized_shape]);
    }

    /// Returns references to the learnable parameters (gamma, beta).
    pub fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.gamma, &self.beta]
    }

    /// Returns mutable references to the learnable parameters.
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.gamma, &mut self.beta]
    }

    /// Returns references to the accumulated gradients, parameter-aligned.
    pub fn grads(&self) -> Vec<&Tensor> {
        vec![&self.gamma_grad, &self.beta_grad]
    }

    /// Returns mutable references to the accumulated gradients.
    pub fn grads_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.gamma_grad, &mut self.beta_grad]
    }

    fn check_input(&self, input: &Tensor) -> Result<(), LayerError> {
        if input.ndim() != 2 {
            return Err(LayerError::ForwardError {
                message: format!("LayerNorm expects 2D input, got {}D", input.ndim()),
            });
        }
        if input.shape()[1] != self.normalized_shape {
            return Err(LayerError::InvalidInputDimension {
                expected: self.normalized_shape,
                actual: input.shape()[1],
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_norm_output_stats() {
        let ln = LayerNorm::new(4);
        let input = Tensor::from_data(&[2, 4], vec![1.0, 2.0, 3.0, 4.0, -1.0, 0.0, 1.0, 2.0]);
        let output = ln.forward(&input).unwrap();

        // Gamma=1, beta=0: each row should be ~zero-mean, ~unit-variance.
        for i in 0..2 {
            let row = &output.data()[i * 4..(i + 1) * 4];
            let mean: f32 = row.iter().sum::<f32>() / 4.0;
            let var: f32 = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / 4.0;
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.0).abs() < 1e-2);
        }
    }

    #[test]
    fn test_layer_norm_invalid_input() {
        let ln = LayerNorm::new(4);
        assert!(ln.forward(&Tensor::zeros(&[2, 3])).is_err());
    }

    #[test]
    fn test_layer_norm_backward_shapes() {
        let mut ln = LayerNorm::new(3);
        ln.zero_grads();
        let input = Tensor::from_data(&[2, 3], vec![0.5, 1.5, -2.0, 3.0, 0.0, 1.0]);
        let grad = Tensor::ones(&[2, 3]);
        let input_grad = ln.accumulate_backward(&input, &grad).unwrap();
        assert_eq!(input_grad.shape(), &[2, 3]);
        assert_eq!(ln.grads()[0].shape(), &[3]);
        assert_eq!(ln.grads()[1].data(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_layer_norm_backward_finite_difference() {
        // Check the input gradient against central differences on a scalar
        // objective sum(LN(x) * w).
        let mut ln = LayerNorm::new(3);
        ln.zero_grads();
        let x = vec![0.3, -1.2, 2.1];
        let w = [0.7, -0.4, 1.3];

        let objective = |ln: &LayerNorm, x: &[f32]| -> f32 {
            let out = ln.forward(&Tensor::from_data(&[1, 3], x.to_vec())).unwrap();
            out.data().iter().zip(w.iter()).map(|(o, wi)| o * wi).sum()
        };

        let grad_out = Tensor::from_data(&[1, 3], w.to_vec());
        let analytic = ln
            .accumulate_backward(&Tensor::from_data(&[1, 3], x.clone()), &grad_out)
            .unwrap();

        let eps = 1e-2;
        for j in 0..3 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[j] += eps;
            xm[j] -= eps;
            let fd = (objective(&ln, &xp) - objective(&ln, &xm)) / (2.0 * eps);
            assert!(
                (fd - analytic.data()[j]).abs() < 5e-2,
                "fd {} vs analytic {}",
                fd,
                analytic.data()[j]
            );
        }
    }
}
