//! Recurrent layers for quantrnn.
//!
//! This crate provides the numeric substrate and the leaf components of the
//! sequence regression model:
//!
//! - **Tensor**: a small row-major tensor over `Vec<f32>`
//! - **FeatureScaler**: fixed per-feature centering and scaling
//! - **Dense**: the shared per-step linear projection
//! - **LayerNorm**: layer normalization with hand-written backward
//! - **Recurrent cells**: a gated recurrent cell and a layer-normalization
//!   LSTM variant, plus the dropout wrapper and multi-layer stack
//!
//! All backward passes are written by hand; each component exposes its
//! parameters and parameter-aligned gradient accumulators so an optimizer
//! can apply updates tensor by tensor.
//!
//! # Quick Start
//!
//! ```
//! use quantrnn_layers::rnn::{CellKind, DropoutKeeps, RecurrentStack};
//! use quantrnn_layers::tensor::Tensor;
//!
//! let mut stack = RecurrentStack::new(CellKind::Gru, 8, 16, 2, 42).unwrap();
//! let inputs = vec![Tensor::zeros(&[4, 8]); 3]; // 3 steps, batch of 4
//! let (outputs, _cache) = stack
//!     .forward_sequence(&inputs, &DropoutKeeps::none(), false)
//!     .unwrap();
//! assert_eq!(outputs.len(), 3);
//! assert_eq!(outputs[0].shape(), &[4, 16]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod dense;
pub mod dropout;
pub mod error;
pub mod initializer;
pub mod normalization;
pub mod rnn;
pub mod scaler;
pub mod tensor;

pub use dense::Dense;
pub use error::{LayerError, LayerResult};
pub use initializer::Initializer;
pub use normalization::LayerNorm;
pub use rnn::{CellKind, CellState, DropoutKeeps, GruCell, NormLstmCell, RecurrentCell, RecurrentStack};
pub use scaler::FeatureScaler;
pub use tensor::Tensor;
