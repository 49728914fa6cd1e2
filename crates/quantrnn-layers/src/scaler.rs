//! Feature centering and scaling.
//!
//! This module provides the [`FeatureScaler`], a fixed (non-trainable) affine
//! transform applied per feature column before data enters the recurrent
//! stack, and reversed when predictions are reported in raw units.

use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::tensor::Tensor;

/// A fixed per-feature affine transform.
///
/// `center_and_scale` maps `x` to `(x - center) / scale`, broadcasting the
/// two vectors across the feature axis; `reverse` maps back to raw units.
/// Both vectors are set once at construction and never updated by training.
///
/// Zero entries in `scale` make the transform undefined; callers are expected
/// to validate their configuration before constructing a scaler.
///
/// # Example
///
/// ```
/// use quantrnn_layers::scaler::FeatureScaler;
/// use quantrnn_layers::tensor::Tensor;
///
/// let scaler = FeatureScaler::new(vec![1.0, 2.0], vec![2.0, 4.0]).unwrap();
/// let x = Tensor::from_data(&[1, 2], vec![3.0, 10.0]);
/// let scaled = scaler.center_and_scale(&x).unwrap();
/// assert_eq!(scaled.data(), &[1.0, 2.0]);
/// let raw = scaler.reverse(&scaled).unwrap();
/// assert_eq!(raw.data(), &[3.0, 10.0]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    center: Tensor,
    scale: Tensor,
}

impl FeatureScaler {
    /// Creates a scaler from per-feature center and scale vectors.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError::ConfigError`] if the vectors are empty or
    /// their lengths differ.
    pub fn new(center: Vec<f32>, scale: Vec<f32>) -> Result<Self, LayerError> {
        if center.is_empty() || center.len() != scale.len() {
            return Err(LayerError::ConfigError {
                message: format!(
                    "center/scale lengths must match and be non-empty, got {} and {}",
                    center.len(),
                    scale.len()
                ),
            });
        }
        let width = center.len();
        Ok(Self {
            center: Tensor::from_data(&[width], center),
            scale: Tensor::from_data(&[width], scale),
        })
    }

    /// Returns the number of features the scaler covers.
    pub fn width(&self) -> usize {
        self.center.numel()
    }

    /// Applies `(x - center) / scale` across the feature axis.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError::InvalidInputDimension`] if the input's feature
    /// width does not match the scaler's.
    pub fn center_and_scale(&self, x: &Tensor) -> Result<Tensor, LayerError> {
        self.check_width(x)?;
        Ok(x.sub(&self.center).div(&self.scale))
    }

    /// Applies the inverse transform `x * scale + center`.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError::InvalidInputDimension`] if the input's feature
    /// width does not match the scaler's.
    pub fn reverse(&self, x: &Tensor) -> Result<Tensor, LayerError> {
        self.check_width(x)?;
        Ok(x.mul(&self.scale).add(&self.center))
    }

    /// Reverses a single row given as a slice, for raw-unit reporting.
    pub fn reverse_row(&self, row: &[f32]) -> Result<Vec<f32>, LayerError> {
        if row.len() != self.width() {
            return Err(LayerError::InvalidInputDimension {
                expected: self.width(),
                actual: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.scale.data().iter().zip(self.center.data().iter()))
            .map(|(&v, (&s, &c))| v * s + c)
            .collect())
    }

    fn check_width(&self, x: &Tensor) -> Result<(), LayerError> {
        let actual = *x.shape().last().unwrap_or(&0);
        if actual != self.width() {
            return Err(LayerError::InvalidInputDimension {
                expected: self.width(),
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let scaler = FeatureScaler::new(vec![0.5, -1.0, 3.0], vec![2.0, 0.25, 10.0]).unwrap();
        let x = Tensor::from_data(&[2, 3], vec![1.5, 0.0, -4.0, 100.0, 2.5, 0.125]);
        let scaled = scaler.center_and_scale(&x).unwrap();
        let back = scaler.reverse(&scaled).unwrap();
        for (a, b) in x.data().iter().zip(back.data().iter()) {
            assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        assert!(FeatureScaler::new(vec![1.0, 2.0], vec![1.0]).is_err());
        assert!(FeatureScaler::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let scaler = FeatureScaler::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let x = Tensor::zeros(&[2, 3]);
        assert!(scaler.center_and_scale(&x).is_err());
        assert!(scaler.reverse(&x).is_err());
    }

    #[test]
    fn test_reverse_row() {
        let scaler = FeatureScaler::new(vec![1.0, 2.0], vec![2.0, 4.0]).unwrap();
        let raw = scaler.reverse_row(&[1.0, 2.0]).unwrap();
        assert_eq!(raw, vec![3.0, 10.0]);
    }
}
