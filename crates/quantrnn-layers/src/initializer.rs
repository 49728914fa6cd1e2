//! Weight initialization utilities.
//!
//! Initializers draw from a caller-supplied RNG so that a configured seed
//! reproduces the same parameters on every build.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Supported weight initializers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Initializer {
    /// Glorot/Xavier uniform initialization.
    #[default]
    GlorotUniform,
    /// Glorot/Xavier normal initialization.
    GlorotNormal,
    /// He/Kaiming uniform initialization.
    HeUniform,
    /// Orthogonal-style initialization for recurrent kernels.
    ///
    /// A scaled normal draw; full Gram-Schmidt orthogonalization is not
    /// required for the hidden widths this crate targets.
    Orthogonal,
    /// All zeros.
    Zeros,
    /// All ones.
    Ones,
    /// Constant value.
    Constant(f32),
}

impl Initializer {
    /// Materializes a tensor of the given shape.
    pub fn initialize(&self, shape: &[usize], rng: &mut StdRng) -> Tensor {
        match self {
            Initializer::Zeros => Tensor::zeros(shape),
            Initializer::Ones => Tensor::ones(shape),
            Initializer::Constant(value) => {
                Tensor::from_data(shape, vec![*value; shape.iter().product()])
            }
            Initializer::GlorotUniform => {
                let (fan_in, fan_out) = fan_in_out(shape);
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                uniform(shape, -limit, limit, rng)
            }
            Initializer::GlorotNormal => {
                let (fan_in, fan_out) = fan_in_out(shape);
                let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
                normal(shape, std, rng)
            }
            Initializer::HeUniform => {
                let (fan_in, _) = fan_in_out(shape);
                let limit = (6.0 / fan_in as f32).sqrt();
                uniform(shape, -limit, limit, rng)
            }
            Initializer::Orthogonal => {
                let (fan_in, _) = fan_in_out(shape);
                let std = 1.0 / (fan_in as f32).sqrt();
                normal(shape, std, rng)
            }
        }
    }
}

fn fan_in_out(shape: &[usize]) -> (usize, usize) {
    if shape.len() >= 2 {
        (shape[0], shape[1])
    } else {
        let n = shape.first().copied().unwrap_or(1);
        (n, n)
    }
}

fn uniform(shape: &[usize], lo: f32, hi: f32, rng: &mut StdRng) -> Tensor {
    let numel: usize = shape.iter().product();
    let data: Vec<f32> = (0..numel).map(|_| rng.gen_range(lo..hi)).collect();
    Tensor::from_data(shape, data)
}

fn normal(shape: &[usize], std: f32, rng: &mut StdRng) -> Tensor {
    let numel: usize = shape.iter().product();
    let data: Vec<f32> = (0..numel)
        .map(|_| {
            let z: f32 = rng.sample(StandardNormal);
            z * std
        })
        .collect();
    Tensor::from_data(shape, data)
}
