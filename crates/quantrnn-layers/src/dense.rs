//! Dense (fully connected) layer implementation.
//!
//! This module provides the [`Dense`] layer, which performs a linear
//! transformation `y = xW + b`. The sequence model shares one instance
//! across every unrolled time step, so the backward entry point accumulates
//! gradients instead of overwriting them.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::initializer::Initializer;
use crate::tensor::Tensor;

/// A dense (fully connected) neural network layer.
///
/// Performs the transformation `y = xW + b` where:
/// - `x` is the input tensor of shape `[batch_size, in_features]`
/// - `W` is the weight matrix of shape `[in_features, out_features]`
/// - `b` is the bias vector of shape `[out_features]`
///
/// # Example
///
/// ```
/// use quantrnn_layers::dense::Dense;
/// use quantrnn_layers::tensor::Tensor;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let mut rng = StdRng::seed_from_u64(42);
/// let layer = Dense::new(128, 64, &mut rng);
/// let input = Tensor::zeros(&[32, 128]); // batch of 32
/// let output = layer.forward(&input).unwrap();
/// assert_eq!(output.shape(), &[32, 64]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// Weight matrix of shape [in_features, out_features]
    weights: Tensor,
    /// Bias vector of shape [out_features]
    bias: Tensor,
    /// Accumulated gradient of weights
    weights_grad: Tensor,
    /// Accumulated gradient of bias
    bias_grad: Tensor,
    /// Input feature dimension
    in_features: usize,
    /// Output feature dimension
    out_features: usize,
}

impl Dense {
    /// Creates a new dense layer with Glorot-uniform weights and zero bias.
    pub fn new(in_features: usize, out_features: usize, rng: &mut StdRng) -> Self {
        Self::new_with_initializer(
            in_features,
            out_features,
            Initializer::GlorotUniform,
            Initializer::Zeros,
            rng,
        )
    }

    /// Creates a new dense layer with custom initializers.
    pub fn new_with_initializer(
        in_features: usize,
        out_features: usize,
        weight_init: Initializer,
        bias_init: Initializer,
        rng: &mut StdRng,
    ) -> Self {
        Self {
            weights: weight_init.initialize(&[in_features, out_features], rng),
            bias: bias_init.initialize(&[out_features], rng),
            weights_grad: Tensor::zeros(&[in_features, out_features]),
            bias_grad: Tensor::zeros(&[out_features]),
            in_features,
            out_features,
        }
    }

    /// Returns the input feature dimension.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Returns the output feature dimension.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Returns a reference to the weights tensor.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Returns a mutable reference to the weights tensor.
    pub fn weights_mut(&mut self) -> &mut Tensor {
        &mut self.weights
    }

    /// Returns a reference to the bias tensor.
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Performs a forward pass.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if the input is not `[batch, in_features]`.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        if input.ndim() != 2 {
            return Err(LayerError::ForwardError {
                message: format!("Dense expects 2D input, got {}D", input.ndim()),
            });
        }
        if input.shape()[1] != self.in_features {
            return Err(LayerError::InvalidInputDimension {
                expected: self.in_features,
                actual: input.shape()[1],
            });
        }
        Ok(input.matmul(&self.weights).add(&self.bias))
    }

    /// Backward pass for one application of the shared layer.
    ///
    /// Adds this step's weight and bias gradients into the accumulators and
    /// returns the gradient with respect to the input. Call [`zero_grads`]
    /// before the first step of each training pass.
    ///
    /// [`zero_grads`]: Dense::zero_grads
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if `input` or `grad` shapes are incompatible.
    pub fn accumulate_backward(
        &mut self,
        input: &Tensor,
        grad: &Tensor,
    ) -> Result<Tensor, LayerError> {
        if grad.ndim() != 2 || grad.shape()[1] != self.out_features {
            return Err(LayerError::BackwardError {
                message: format!(
                    "Dense backward expects [batch, {}] grad, got {:?}",
                    self.out_features,
                    grad.shape()
                ),
            });
        }
        if input.shape() != [grad.shape()[0], self.in_features] {
            return Err(LayerError::BackwardError {
                message: format!(
                    "Dense backward input {:?} incompatible with grad {:?}",
                    input.shape(),
                    grad.shape()
                ),
            });
        }

        // dL/dW += x^T @ dL/dy ; dL/db += sum_rows(dL/dy)
        self.weights_grad = self.weights_grad.add(&input.transpose().matmul(grad));
        self.bias_grad = self.bias_grad.add(&grad.sum_axis(0));

        // dL/dx = dL/dy @ W^T
        Ok(grad.matmul(&self.weights.transpose()))
    }

    /// Clears the accumulated gradients.
    pub fn zero_grads(&mut self) {
        self.weights_grad = Tensor::zeros(&[self.in_features, self.out_features]);
        self.bias_grad = Tensor::zeros(&[self.out_features]);
    }

    /// Returns references to the learnable parameters (weights, bias).
    pub fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weights, &self.bias]
    }

    /// Returns mutable references to the learnable parameters.
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weights, &mut self.bias]
    }

    /// Returns references to the accumulated gradients, parameter-aligned.
    pub fn grads(&self) -> Vec<&Tensor> {
        vec![&self.weights_grad, &self.bias_grad]
    }

    /// Returns mutable references to the accumulated gradients.
    pub fn grads_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weights_grad, &mut self.bias_grad]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_dense_creation() {
        let layer = Dense::new(64, 32, &mut rng());
        assert_eq!(layer.in_features(), 64);
        assert_eq!(layer.out_features(), 32);
        assert_eq!(layer.weights().shape(), &[64, 32]);
        assert_eq!(layer.bias().shape(), &[32]);
    }

    #[test]
    fn test_dense_forward() {
        let layer = Dense::new(10, 5, &mut rng());
        let input = Tensor::ones(&[3, 10]);
        let output = layer.forward(&input).unwrap();
        assert_eq!(output.shape(), &[3, 5]);
    }

    #[test]
    fn test_dense_forward_invalid_input() {
        let layer = Dense::new(10, 5, &mut rng());
        let input = Tensor::ones(&[3, 20]);
        assert!(layer.forward(&input).is_err());
    }

    #[test]
    fn test_dense_backward_accumulates() {
        let mut layer = Dense::new(4, 2, &mut rng());
        layer.zero_grads();

        let input = Tensor::ones(&[3, 4]);
        let grad = Tensor::ones(&[3, 2]);

        let input_grad = layer.accumulate_backward(&input, &grad).unwrap();
        assert_eq!(input_grad.shape(), &[3, 4]);

        let first_bias = layer.grads()[1].data().to_vec();
        layer.accumulate_backward(&input, &grad).unwrap();
        let second_bias = layer.grads()[1].data().to_vec();

        for (a, b) in first_bias.iter().zip(second_bias.iter()) {
            assert!((b - 2.0 * a).abs() < 1e-5);
        }
    }

    #[test]
    fn test_dense_gradient_values() {
        let mut rng = rng();
        let mut layer = Dense::new_with_initializer(
            2,
            1,
            Initializer::Constant(1.0),
            Initializer::Zeros,
            &mut rng,
        );
        layer.zero_grads();

        let input = Tensor::from_data(&[1, 2], vec![2.0, 3.0]);
        let grad = Tensor::from_data(&[1, 1], vec![1.0]);

        let input_grad = layer.accumulate_backward(&input, &grad).unwrap();
        assert_eq!(layer.grads()[0].data(), &[2.0, 3.0]);
        assert_eq!(layer.grads()[1].data(), &[1.0]);
        assert_eq!(input_grad.data(), &[1.0, 1.0]);
    }
}
