//! The prediction/evaluation loop.
//!
//! Drives a strictly sequential pass over a [`BatchSource`], scores every
//! batch with an inference step, folds the target-column MSE into
//! [`PerfByDate`], prints one of the two per-batch prediction formats, and
//! optionally writes the per-date report file at the end.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;

use crate::batch::{Batch, BatchSource};
use crate::error::ModelError;
use crate::model::SequenceModel;

const SEPARATOR: &str = "--------------------------------";

/// Per-date loss aggregation built incrementally over one evaluation pass.
///
/// Dates iterate in ascending order; the total mean is taken over every
/// individual scalar loss, not over the per-date means.
#[derive(Debug, Default)]
pub struct PerfByDate {
    by_date: BTreeMap<NaiveDate, Vec<f32>>,
}

impl PerfByDate {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one scalar loss under the given date.
    pub fn record(&mut self, date: NaiveDate, mse: f32) {
        self.by_date.entry(date).or_default().push(mse);
    }

    /// Returns true when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    /// Total number of recorded losses across all dates.
    pub fn count(&self) -> usize {
        self.by_date.values().map(|v| v.len()).sum()
    }

    /// Ascending per-date summaries as `(date, mean, count)`.
    pub fn date_means(&self) -> impl Iterator<Item = (NaiveDate, f32, usize)> + '_ {
        self.by_date.iter().map(|(date, losses)| {
            let mean = losses.iter().sum::<f32>() / losses.len() as f32;
            (*date, mean, losses.len())
        })
    }

    /// Mean over every individual recorded loss; 0.0 when empty.
    pub fn total_mean(&self) -> f32 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        let sum: f32 = self.by_date.values().flatten().sum();
        sum / count as f32
    }

    /// Writes the report: one `"<date> <mean> <count>"` line per date in
    /// ascending order, then the `"Total <mean>"` line.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the writer.
    pub fn write_report<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        for (date, mean, count) in self.date_means() {
            writeln!(w, "{} {:.6} {}", date, mean, count)?;
        }
        writeln!(w, "Total {:.6}", self.total_mean())
    }
}

/// Runs the evaluation pass.
///
/// Batch N+1 is not requested until batch N has been scored and folded into
/// the aggregator. Per-batch output goes to stdout in the compact format, or
/// in the verbose format when the model was configured with
/// `pretty_print_preds`; when `mse_outfile` is given the per-date report is
/// written there after the pass.
///
/// # Errors
///
/// Returns a [`ModelError`] if a batch violates the model's shape contract,
/// lacks row attributes, or the report file cannot be written.
pub fn predict<S: BatchSource + ?Sized>(
    model: &mut SequenceModel,
    batches: &mut S,
    mse_outfile: Option<&Path>,
) -> Result<PerfByDate, ModelError> {
    let pretty = model.config().pretty_print_preds;
    let num_batches = batches.num_batches();
    let mut perfs = PerfByDate::new();

    for i in 0..num_batches {
        let batch = batches.next_batch();
        let out = model.step(&batch)?;
        let attr = batch
            .attribs
            .first()
            .ok_or_else(|| ModelError::BatchError {
                message: "batch has no row attributes".to_string(),
            })?;
        perfs.record(attr.date, out.mse_target_column);
        tracing::debug!(
            batch = i,
            date = %attr.date,
            mse = out.mse_target_column,
            "scored batch"
        );

        let width = out.predictions.shape()[1];
        let pred_row = batches.raw_features(&batch, 0, &out.predictions.data()[..width]);
        if pretty {
            let input_rows: Vec<Vec<f32>> = batch
                .inputs
                .iter()
                .map(|f| batches.raw_features(&batch, 0, &f.data()[..f.shape()[1]]))
                .collect();
            let last_target = batch.targets.last().ok_or_else(|| ModelError::BatchError {
                message: "batch has no target frames".to_string(),
            })?;
            let target_row =
                batches.raw_features(&batch, 0, &last_target.data()[..last_target.shape()[1]]);
            println!(
                "{}",
                format_verbose(attr.date, &attr.key, &input_rows, &pred_row, &target_row)
            );
        } else {
            println!("{}", format_compact(attr.date, &attr.key, &pred_row));
        }
    }

    if let Some(path) = mse_outfile {
        let mut file = File::create(path)?;
        perfs.write_report(&mut file)?;
    }
    tracing::info!(
        batches = num_batches,
        total_mse = perfs.total_mean(),
        "evaluation pass finished"
    );
    Ok(perfs)
}

/// One line per batch: date, key, then the output vector at three decimals.
fn format_compact(date: NaiveDate, key: &str, values: &[f32]) -> String {
    let vals: Vec<String> = values.iter().map(|v| format!("{:.3}", v)).collect();
    format!("{} {} {}", date, key, vals.join(" "))
}

/// Multi-line per batch: header, every historical input step oldest first,
/// the output and target rows, then a separator. Vectors print at two
/// decimals.
fn format_verbose(
    date: NaiveDate,
    key: &str,
    inputs: &[Vec<f32>],
    output: &[f32],
    target: &[f32],
) -> String {
    let mut s = format!("{} {}\n", date, key);
    let u = inputs.len();
    for (i, row) in inputs.iter().enumerate() {
        s.push_str(&format_vector(&format!("input[t-{}]", u - i), row));
        s.push('\n');
    }
    s.push_str(&format_vector("output[t]", output));
    s.push('\n');
    s.push_str(&format_vector("target[t]", target));
    s.push('\n');
    s.push_str(SEPARATOR);
    s
}

fn format_vector(name: &str, values: &[f32]) -> String {
    let vals: Vec<String> = values.iter().map(|v| format!("{:.2}", v)).collect();
    format!("{}: {}", name, vals.join(" "))
}
