//! Example applications for quantrnn.
//!
//! This crate contains example binaries demonstrating the sequence model:
//!
//! - `predict_demo` - trains a small model on synthetic feature sequences
//!   and runs the prediction/evaluation pass over them
//!
//! # Running Examples
//!
//! ```bash
//! # Compact per-batch output plus a report file
//! cargo run -p quantrnn-examples --bin predict_demo -- --report /tmp/mse.txt
//!
//! # Verbose per-batch output
//! cargo run -p quantrnn-examples --bin predict_demo -- --pretty
//! ```

// This crate is primarily for examples, no lib code needed.
