//! End-to-end demo of the sequence regression model.
//!
//! Generates synthetic fixed-width feature sequences for a handful of
//! tickers, trains a small stacked recurrent model on them, then runs the
//! prediction/evaluation pass with per-date MSE aggregation.

use std::path::PathBuf;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use quantrnn_layers::Tensor;
use quantrnn_model::{
    predict, Batch, BatchSource, ModelConfig, RowAttribs, ScalerConfig, SequenceModel,
};

#[derive(Parser, Debug)]
#[command(name = "predict_demo")]
#[command(about = "Train and evaluate a recurrent sequence regression model on synthetic data")]
struct Args {
    /// Number of evaluation batches to generate.
    #[arg(long, default_value_t = 12)]
    num_batches: usize,

    /// Unroll length of the recurrent stack.
    #[arg(long, default_value_t = 5)]
    unrollings: usize,

    /// Feature width (inputs and outputs share it here).
    #[arg(long, default_value_t = 4)]
    features: usize,

    /// Hidden width of every recurrent layer.
    #[arg(long, default_value_t = 16)]
    hidden: usize,

    /// Number of stacked layers.
    #[arg(long, default_value_t = 2)]
    layers: usize,

    /// Recurrent cell kind: gru or lstm.
    #[arg(long, default_value = "gru")]
    cell: String,

    /// Optimizer name from the registry.
    #[arg(long, default_value = "adam")]
    optimizer: String,

    /// Training steps before evaluation.
    #[arg(long, default_value_t = 200)]
    train_steps: usize,

    /// Learning rate for the training steps.
    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Print the verbose multi-line prediction format.
    #[arg(long)]
    pretty: bool,

    /// Optional path for the per-date MSE report.
    #[arg(long)]
    report: Option<PathBuf>,
}

/// In-memory batch source over pre-generated sequences.
///
/// Features reach the model in scaled space; `raw_features` maps them back
/// to the raw units the scaler vectors describe.
struct SyntheticSource {
    batches: Vec<Batch>,
    next: usize,
    scaler: ScalerConfig,
}

impl SyntheticSource {
    fn generate(num_batches: usize, unrollings: usize, features: usize, seed: u64) -> Self {
        let scaler = ScalerConfig {
            center: vec![100.0; features],
            scale: vec![10.0; features],
        };
        let keys = ["AAA", "BBB", "CCC"];
        let start: chrono::NaiveDate = "2020-01-01".parse().expect("static date");
        let mut rng = StdRng::seed_from_u64(seed);

        let batches = (0..num_batches)
            .map(|b| {
                // One scaled random-walk sequence of U+1 steps; inputs are
                // steps 0..U, targets the steps one ahead.
                let mut walk = vec![vec![0.0f32; features]];
                for _ in 0..unrollings {
                    let prev = walk.last().expect("walk is never empty").clone();
                    let step: Vec<f32> = prev
                        .iter()
                        .map(|v| v * 0.9 + rng.gen_range(-0.1..0.1))
                        .collect();
                    walk.push(step);
                }
                let frame = |row: &[f32]| Tensor::from_data(&[1, features], row.to_vec());
                Batch {
                    inputs: walk[..unrollings].iter().map(|r| frame(r)).collect(),
                    targets: walk[1..].iter().map(|r| frame(r)).collect(),
                    attribs: vec![RowAttribs {
                        key: keys[b % keys.len()].to_string(),
                        date: start + chrono::Days::new((b / keys.len()) as u64),
                    }],
                }
            })
            .collect();

        Self {
            batches,
            next: 0,
            scaler,
        }
    }
}

impl BatchSource for SyntheticSource {
    fn num_batches(&self) -> usize {
        self.batches.len()
    }

    fn next_batch(&mut self) -> Batch {
        let batch = self.batches[self.next % self.batches.len()].clone();
        self.next += 1;
        batch
    }

    fn raw_features(&self, _batch: &Batch, _row: usize, scaled: &[f32]) -> Vec<f32> {
        scaled
            .iter()
            .zip(self.scaler.scale.iter().zip(self.scaler.center.iter()))
            .map(|(&v, (&s, &c))| v * s + c)
            .collect()
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    let mut source = SyntheticSource::generate(
        args.num_batches,
        args.unrollings,
        args.features,
        args.seed,
    );

    let config = ModelConfig {
        num_unrollings: args.unrollings,
        num_inputs: args.features,
        num_outputs: args.features,
        num_hidden: args.hidden,
        num_layers: args.layers,
        rnn_cell: args.cell.clone(),
        hidden_dropout: true,
        keep_prob: 0.9,
        target_idx: 0,
        target_lambda: 0.5,
        rnn_lambda: 0.7,
        max_grad_norm: 5.0,
        optimizer: args.optimizer.clone(),
        data_scaler: Some(source.scaler.clone()),
        scale_targets: true,
        seed: args.seed,
        pretty_print_preds: args.pretty,
        ..ModelConfig::default()
    };
    let mut model = SequenceModel::new(config)?;

    println!("Training for {} steps...", args.train_steps);
    for step in 0..args.train_steps {
        let batch = &source.batches[step % source.batches.len()];
        let out = model.train_step(batch, args.learning_rate)?;
        if step % 50 == 0 || step + 1 == args.train_steps {
            println!(
                "  step {:4}  loss {:.6}  grad_norm {:.4}",
                step, out.loss, out.grad_norm
            );
        }
    }

    println!("Predictions:");
    let perfs = predict(&mut model, &mut source, args.report.as_deref())?;
    println!(
        "Scored {} batches over {} dates, total MSE {:.6}",
        perfs.count(),
        perfs.date_means().count(),
        perfs.total_mean()
    );
    if let Some(path) = &args.report {
        println!("Report written to {}", path.display());
    }
    Ok(())
}
