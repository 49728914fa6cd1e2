//! Seeded inverted-dropout masks.
//!
//! Masks are sampled from a seeded [`StdRng`] so that a configured seed
//! reproduces the same dropout pattern. Kept activations are scaled by the
//! reciprocal of the keep probability, so inference needs no rescaling.

use rand::rngs::StdRng;
use rand::Rng;

use crate::tensor::Tensor;

/// Samples an inverted-dropout mask for the given shape.
///
/// Each element is `1 / keep_prob` with probability `keep_prob` and `0.0`
/// otherwise. A keep probability of 1.0 (or higher) returns an all-ones mask
/// without consuming randomness, which keeps inference and no-drop training
/// passes identical.
pub fn dropout_mask(shape: &[usize], keep_prob: f32, rng: &mut StdRng) -> Tensor {
    if keep_prob >= 1.0 {
        return Tensor::ones(shape);
    }
    let inv = 1.0 / keep_prob;
    let numel: usize = shape.iter().product();
    let data: Vec<f32> = (0..numel)
        .map(|_| {
            if rng.gen::<f32>() < keep_prob {
                inv
            } else {
                0.0
            }
        })
        .collect();
    Tensor::from_data(shape, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_keep_one_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let mask = dropout_mask(&[4, 4], 1.0, &mut rng);
        assert!(mask.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_mask_values() {
        let mut rng = StdRng::seed_from_u64(2);
        let keep = 0.5;
        let mask = dropout_mask(&[64, 64], keep, &mut rng);
        let inv = 1.0 / keep;
        assert!(mask.data().iter().all(|&v| v == 0.0 || (v - inv).abs() < 1e-6));
        // Roughly half the entries survive.
        let kept = mask.data().iter().filter(|&&v| v > 0.0).count();
        assert!(kept > 1500 && kept < 2600, "kept {}", kept);
    }

    #[test]
    fn test_seed_reproducibility() {
        let a = dropout_mask(&[8, 8], 0.7, &mut StdRng::seed_from_u64(99));
        let b = dropout_mask(&[8, 8], 0.7, &mut StdRng::seed_from_u64(99));
        assert_eq!(a.data(), b.data());
    }
}
