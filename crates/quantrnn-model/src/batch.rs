//! Batch structures and the external batch-source contract.
//!
//! Batches are produced outside this crate; the model consumes their shape
//! contract only, and the evaluation loop reads the per-row attributes for
//! grouping and printing.

use chrono::NaiveDate;

use quantrnn_layers::Tensor;

/// Attributes attached to one batch row.
///
/// Only the evaluation loop reads these; the model itself never does.
#[derive(Debug, Clone)]
pub struct RowAttribs {
    /// Grouping key (e.g. a ticker symbol).
    pub key: String,
    /// Date the error aggregation is keyed by.
    pub date: NaiveDate,
}

/// One unrolled batch of input and target frames.
///
/// `inputs` holds `num_unrollings` frames of shape `[rows, num_inputs]`,
/// `targets` the matching `[rows, num_outputs]` frames, and `attribs` one
/// entry per row.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Input frames, oldest step first.
    pub inputs: Vec<Tensor>,
    /// Target frames, aligned with `inputs`.
    pub targets: Vec<Tensor>,
    /// Per-row attributes.
    pub attribs: Vec<RowAttribs>,
}

impl Batch {
    /// Returns the number of rows in the batch, 0 when it has no frames.
    pub fn rows(&self) -> usize {
        self.inputs.first().map(|f| f.shape()[0]).unwrap_or(0)
    }

    /// Returns the first row's grouping key, if any.
    pub fn key(&self) -> Option<&str> {
        self.attribs.first().map(|a| a.key.as_str())
    }

    /// Returns the first row's date, if any.
    pub fn date(&self) -> Option<NaiveDate> {
        self.attribs.first().map(|a| a.date)
    }
}

/// The external batching collaborator the evaluation loop drives.
///
/// Implementations own reading, caching, and any feature scaling applied
/// before data reaches the model; `raw_features` undoes that scaling for
/// pretty-printing.
pub trait BatchSource {
    /// Number of batches one full pass yields.
    fn num_batches(&self) -> usize;

    /// Produces the next batch of the pass.
    fn next_batch(&mut self) -> Batch;

    /// Maps a scaled feature vector of `batch`'s row `row` back to raw units.
    fn raw_features(&self, batch: &Batch, row: usize, scaled: &[f32]) -> Vec<f32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_batch_accessors() {
        let batch = Batch {
            inputs: vec![Tensor::zeros(&[2, 3])],
            targets: vec![Tensor::zeros(&[2, 3])],
            attribs: vec![
                RowAttribs {
                    key: "ABC".to_string(),
                    date: date("2020-01-01"),
                },
                RowAttribs {
                    key: "XYZ".to_string(),
                    date: date("2020-01-01"),
                },
            ],
        };
        assert_eq!(batch.rows(), 2);
        assert_eq!(batch.key(), Some("ABC"));
        assert_eq!(batch.date(), Some(date("2020-01-01")));
    }

    #[test]
    fn test_empty_batch() {
        let batch = Batch {
            inputs: Vec::new(),
            targets: Vec::new(),
            attribs: Vec::new(),
        };
        assert_eq!(batch.rows(), 0);
        assert!(batch.key().is_none());
        assert!(batch.date().is_none());
    }
}
