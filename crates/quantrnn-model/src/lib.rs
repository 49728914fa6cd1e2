//! Sequence regression model and evaluation loop for quantrnn.
//!
//! This crate assembles the pieces from `quantrnn-layers` and
//! `quantrnn-optimizer` into the full model and drives it:
//!
//! - **ModelConfig**: validated hyperparameters, including the optional
//!   normalization vectors and the loss-blend weights
//! - **Batch / BatchSource**: the shape contract and the external batching
//!   collaborator
//! - **SequenceModel**: per-frame scaling, shared recurrent stack unrolled
//!   over the sequence, shared per-step projection, the blended
//!   multi-horizon loss, backpropagation through time, global-norm gradient
//!   clipping, and per-tensor optimizer states
//! - **predict / PerfByDate**: the sequential evaluation pass with per-date
//!   MSE aggregation, the two console prediction formats, and the report
//!   file
//!
//! # Quick Start
//!
//! ```
//! use quantrnn_model::{ModelConfig, SequenceModel};
//!
//! let config = ModelConfig::default();
//! let model = SequenceModel::new(config).unwrap();
//! assert!(!model.parameters().is_empty());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod batch;
pub mod config;
pub mod error;
pub mod model;
pub mod predict;

pub use batch::{Batch, BatchSource, RowAttribs};
pub use config::{ModelConfig, ScalerConfig};
pub use error::{ModelError, ModelResult};
pub use model::{SequenceModel, StepOutput};
pub use predict::{predict, PerfByDate};
