#![allow(clippy::needless_range_loop)]
//! Tensor type for neural network computations.
//!
//! This module provides a small row-major tensor over `Vec<f32>` with the
//! operation set the recurrent layers and their backward passes need.

use serde::{Deserialize, Serialize};

/// A multi-dimensional array for neural network computations.
///
/// Data is stored in row-major order. Most operations are defined for
/// 1D and 2D tensors, which is all the sequence model requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// The shape of the tensor (dimensions)
    shape: Vec<usize>,
    /// The underlying data in row-major order
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new tensor with the given shape, filled with zeros.
    ///
    /// # Example
    ///
    /// ```
    /// use quantrnn_layers::tensor::Tensor;
    ///
    /// let t = Tensor::zeros(&[2, 3]);
    /// assert_eq!(t.shape(), &[2, 3]);
    /// assert_eq!(t.numel(), 6);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; numel],
        }
    }

    /// Creates a new tensor with the given shape, filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![1.0; numel],
        }
    }

    /// Creates a new tensor with the given shape and data.
    ///
    /// # Panics
    ///
    /// Panics if the data length doesn't match the shape.
    pub fn from_data(shape: &[usize], data: Vec<f32>) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "Data length {} doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            numel
        );
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns a reference to the underlying data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns a mutable reference to the underlying data.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Matrix multiplication between two 2D tensors.
    ///
    /// # Panics
    ///
    /// Panics if either operand is not 2D or the inner dimensions don't match.
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "matmul requires 2D tensors");
        assert_eq!(other.ndim(), 2, "matmul requires 2D tensors");
        assert_eq!(
            self.shape[1], other.shape[0],
            "Inner dimensions must match for matmul"
        );

        let m = self.shape[0];
        let k = self.shape[1];
        let n = other.shape[1];

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for l in 0..k {
                let a = self.data[i * k + l];
                if a == 0.0 {
                    continue;
                }
                for j in 0..n {
                    result[i * n + j] += a * other.data[l * n + j];
                }
            }
        }

        Tensor::from_data(&[m, n], result)
    }

    /// Transposes a 2D tensor.
    pub fn transpose(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "transpose requires 2D tensor");
        let m = self.shape[0];
        let n = self.shape[1];

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                result[j * m + i] = self.data[i * n + j];
            }
        }

        Tensor::from_data(&[n, m], result)
    }

    /// Element-wise addition with broadcasting.
    ///
    /// Supports same-shape operands, a one-element scalar operand, and
    /// row broadcasting of a `[n]` vector against a `[m, n]` matrix
    /// (bias addition).
    pub fn add(&self, other: &Tensor) -> Tensor {
        self.broadcast_op(other, "add", |a, b| a + b)
    }

    /// Element-wise subtraction with the same broadcasting rules as [`add`].
    ///
    /// [`add`]: Tensor::add
    pub fn sub(&self, other: &Tensor) -> Tensor {
        self.broadcast_op(other, "sub", |a, b| a - b)
    }

    /// Element-wise multiplication with the same broadcasting rules as [`add`].
    ///
    /// [`add`]: Tensor::add
    pub fn mul(&self, other: &Tensor) -> Tensor {
        self.broadcast_op(other, "mul", |a, b| a * b)
    }

    /// Element-wise division with the same broadcasting rules as [`add`].
    ///
    /// [`add`]: Tensor::add
    pub fn div(&self, other: &Tensor) -> Tensor {
        self.broadcast_op(other, "div", |a, b| a / b)
    }

    fn broadcast_op<F>(&self, other: &Tensor, name: &str, f: F) -> Tensor
    where
        F: Fn(f32, f32) -> f32,
    {
        if self.shape == other.shape {
            let data: Vec<f32> = self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect();
            Tensor::from_data(&self.shape, data)
        } else if other.numel() == 1 {
            let scalar = other.data[0];
            let data: Vec<f32> = self.data.iter().map(|&a| f(a, scalar)).collect();
            Tensor::from_data(&self.shape, data)
        } else if self.ndim() == 2 && other.ndim() == 1 && self.shape[1] == other.shape[0] {
            // Broadcast the vector along rows
            let n = self.shape[1];
            let mut data = vec![0.0; self.numel()];
            for i in 0..self.shape[0] {
                for j in 0..n {
                    data[i * n + j] = f(self.data[i * n + j], other.data[j]);
                }
            }
            Tensor::from_data(&self.shape, data)
        } else {
            panic!(
                "Cannot broadcast {} over shapes {:?} and {:?}",
                name, self.shape, other.shape
            );
        }
    }

    /// Scalar multiplication.
    pub fn scale(&self, scalar: f32) -> Tensor {
        let data: Vec<f32> = self.data.iter().map(|a| a * scalar).collect();
        Tensor::from_data(&self.shape, data)
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Mean of all elements.
    ///
    /// Returns 0.0 for an empty tensor.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            0.0
        } else {
            self.sum() / self.data.len() as f32
        }
    }

    /// Sum along an axis of a 2D tensor.
    pub fn sum_axis(&self, axis: usize) -> Tensor {
        assert_eq!(self.ndim(), 2, "sum_axis only implemented for 2D tensors");
        assert!(axis < 2, "Axis out of bounds");

        let m = self.shape[0];
        let n = self.shape[1];
        if axis == 0 {
            let mut result = vec![0.0; n];
            for i in 0..m {
                for j in 0..n {
                    result[j] += self.data[i * n + j];
                }
            }
            Tensor::from_data(&[n], result)
        } else {
            let result: Vec<f32> = (0..m)
                .map(|i| (0..n).map(|j| self.data[i * n + j]).sum())
                .collect();
            Tensor::from_data(&[m], result)
        }
    }

    /// Mean along an axis of a 2D tensor.
    pub fn mean_axis(&self, axis: usize) -> Tensor {
        let sum = self.sum_axis(axis);
        let count = self.shape[axis] as f32;
        sum.scale(1.0 / count)
    }

    /// Variance along an axis of a 2D tensor.
    pub fn var_axis(&self, axis: usize) -> Tensor {
        assert_eq!(self.ndim(), 2, "var_axis only implemented for 2D tensors");
        let mean = self.mean_axis(axis);
        let m = self.shape[0];
        let n = self.shape[1];
        if axis == 1 {
            let mut result = vec![0.0; m];
            for i in 0..m {
                let mu = mean.data[i];
                for j in 0..n {
                    let diff = self.data[i * n + j] - mu;
                    result[i] += diff * diff;
                }
                result[i] /= n as f32;
            }
            Tensor::from_data(&[m], result)
        } else {
            let mut result = vec![0.0; n];
            for j in 0..n {
                let mu = mean.data[j];
                for i in 0..m {
                    let diff = self.data[i * n + j] - mu;
                    result[j] += diff * diff;
                }
                result[j] /= m as f32;
            }
            Tensor::from_data(&[n], result)
        }
    }

    /// Apply a function element-wise.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        let data: Vec<f32> = self.data.iter().map(|&x| f(x)).collect();
        Tensor::from_data(&self.shape, data)
    }

    /// Element-wise logistic sigmoid.
    pub fn sigmoid(&self) -> Tensor {
        self.map(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Element-wise hyperbolic tangent.
    pub fn tanh(&self) -> Tensor {
        self.map(|v| v.tanh())
    }

    /// Extracts one column of a 2D tensor as a 1D tensor.
    pub fn column(&self, idx: usize) -> Tensor {
        assert_eq!(self.ndim(), 2, "column requires 2D tensor");
        assert!(idx < self.shape[1], "Column index out of bounds");
        let n = self.shape[1];
        let data: Vec<f32> = (0..self.shape[0]).map(|i| self.data[i * n + idx]).collect();
        Tensor::from_data(&[self.shape[0]], data)
    }

    /// Extracts the half-open column range `[start, end)` of a 2D tensor.
    pub fn slice_cols(&self, start: usize, end: usize) -> Tensor {
        assert_eq!(self.ndim(), 2, "slice_cols requires 2D tensor");
        assert!(start <= end && end <= self.shape[1], "Column range out of bounds");
        let m = self.shape[0];
        let n = self.shape[1];
        let width = end - start;
        let mut data = vec![0.0; m * width];
        for i in 0..m {
            data[i * width..(i + 1) * width]
                .copy_from_slice(&self.data[i * n + start..i * n + end]);
        }
        Tensor::from_data(&[m, width], data)
    }

    /// Concatenates two 2D tensors with the same number of rows along columns.
    pub fn concat_cols(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "concat_cols requires 2D tensors");
        assert_eq!(other.ndim(), 2, "concat_cols requires 2D tensors");
        assert_eq!(
            self.shape[0], other.shape[0],
            "Row counts must match for concat_cols"
        );
        let m = self.shape[0];
        let n1 = self.shape[1];
        let n2 = other.shape[1];
        let mut data = vec![0.0; m * (n1 + n2)];
        for i in 0..m {
            data[i * (n1 + n2)..i * (n1 + n2) + n1]
                .copy_from_slice(&self.data[i * n1..(i + 1) * n1]);
            data[i * (n1 + n2) + n1..(i + 1) * (n1 + n2)]
                .copy_from_slice(&other.data[i * n2..(i + 1) * n2]);
        }
        Tensor::from_data(&[m, n1 + n2], data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_creation() {
        let t = Tensor::zeros(&[2, 3]);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.numel(), 6);
        assert!(t.data().iter().all(|&x| x == 0.0));

        let t = Tensor::ones(&[3, 2]);
        assert!(t.data().iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_matmul() {
        let a = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Tensor::from_data(&[3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let c = a.matmul(&b);
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(c.data()[0], 22.0); // 1*1 + 2*3 + 3*5
        assert_eq!(c.data()[1], 28.0); // 1*2 + 2*4 + 3*6
    }

    #[test]
    fn test_transpose() {
        let a = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = a.transpose();
        assert_eq!(b.shape(), &[3, 2]);
        assert_eq!(b.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_add_broadcast() {
        let a = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Tensor::from_data(&[3], vec![10.0, 20.0, 30.0]);
        let c = a.add(&b);
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.data(), &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
    }

    #[test]
    fn test_sub_div_broadcast() {
        let x = Tensor::from_data(&[2, 2], vec![3.0, 8.0, 5.0, 12.0]);
        let center = Tensor::from_data(&[2], vec![1.0, 2.0]);
        let scale = Tensor::from_data(&[2], vec![2.0, 2.0]);
        let scaled = x.sub(&center).div(&scale);
        assert_eq!(scaled.data(), &[1.0, 3.0, 2.0, 5.0]);
    }

    #[test]
    fn test_sum_axis() {
        let a = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let sum0 = a.sum_axis(0);
        assert_eq!(sum0.shape(), &[3]);
        assert_eq!(sum0.data(), &[5.0, 7.0, 9.0]);

        let sum1 = a.sum_axis(1);
        assert_eq!(sum1.shape(), &[2]);
        assert_eq!(sum1.data(), &[6.0, 15.0]);
    }

    #[test]
    fn test_mean() {
        let a = Tensor::from_data(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        assert!((a.mean() - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_column_and_slice_cols() {
        let a = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let c = a.column(1);
        assert_eq!(c.shape(), &[2]);
        assert_eq!(c.data(), &[2.0, 5.0]);

        let s = a.slice_cols(1, 3);
        assert_eq!(s.shape(), &[2, 2]);
        assert_eq!(s.data(), &[2.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn test_concat_cols() {
        let a = Tensor::from_data(&[2, 2], vec![1.0, 2.0, 5.0, 6.0]);
        let b = Tensor::from_data(&[2, 1], vec![3.0, 7.0]);
        let c = a.concat_cols(&b);
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.data(), &[1.0, 2.0, 3.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_sigmoid_tanh() {
        let a = Tensor::zeros(&[1, 2]);
        assert!(a.sigmoid().data().iter().all(|&v| (v - 0.5).abs() < 1e-6));
        assert!(a.tanh().data().iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn test_map() {
        let a = Tensor::from_data(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let b = a.map(|x| x * 2.0);
        assert_eq!(b.data(), &[2.0, 4.0, 6.0, 8.0]);
    }
}
