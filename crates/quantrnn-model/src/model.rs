//! The stacked recurrent sequence regression model.
//!
//! [`SequenceModel`] owns the full forward pass (per-frame scaling, shared
//! recurrent stack unrolled over the sequence, shared linear projection at
//! every step), the three mean-squared-error quantities and their blend,
//! backpropagation through time, global-norm gradient clipping, and the
//! per-parameter-tensor optimizer states.
//!
//! The model has two externally visible modes, selected per invocation and
//! never stored: [`SequenceModel::train_step`] runs forward + backward +
//! update, [`SequenceModel::step`] runs forward only with all dropout
//! disabled and mutates nothing.

use rand::rngs::StdRng;
use rand::SeedableRng;

use quantrnn_layers::rnn::StackCache;
use quantrnn_layers::{CellKind, Dense, DropoutKeeps, FeatureScaler, RecurrentStack, Tensor};
use quantrnn_optimizer::{create_optimizer, Optimizer, OptimizerConfig};

use crate::batch::Batch;
use crate::config::ModelConfig;
use crate::error::ModelError;

/// Read-only outputs of one step.
///
/// Losses are computed in scaled space (against the possibly-scaled
/// targets); `predictions` and `outputs` are mapped back to raw target units
/// when target scaling is configured. This asymmetry is deliberate and
/// matches the training objective.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Final-step prediction frame, de-normalized when targets are scaled.
    pub predictions: Tensor,
    /// All per-step output frames, de-normalized like `predictions`.
    pub outputs: Vec<Tensor>,
    /// Final-step output in scaled space.
    pub last_output: Tensor,
    /// Final-step target in scaled space.
    pub last_target: Tensor,
    /// Target column of `last_output`, shape `[rows]`.
    pub target_column_output: Tensor,
    /// Target column of `last_target`, shape `[rows]`.
    pub target_column_target: Tensor,
    /// MSE over all steps' outputs vs. targets.
    pub mse_all_steps: f32,
    /// MSE over the final step only.
    pub mse_last_step: f32,
    /// MSE over the final step's target column only.
    pub mse_target_column: f32,
    /// The blended training loss.
    pub loss: f32,
    /// Pre-clip global gradient norm; 0.0 at inference or when clipping is
    /// disabled.
    pub grad_norm: f32,
}

/// Intermediates of one unrolled forward pass.
struct ForwardPass {
    /// Projected output frames in scaled space.
    outputs: Vec<Tensor>,
    /// Targets after optional scaling.
    scaled_targets: Vec<Tensor>,
    /// Top-layer hidden outputs fed to the projection.
    hidden: Vec<Tensor>,
    cache: StackCache,
    rows: usize,
}

/// The sequence regression model.
pub struct SequenceModel {
    config: ModelConfig,
    scaler: Option<FeatureScaler>,
    stack: RecurrentStack,
    projection: Dense,
    optimizers: Vec<Box<dyn Optimizer>>,
}

impl SequenceModel {
    /// Builds the model from a validated configuration.
    ///
    /// Parameters are created once here and mutated only by training
    /// updates. The cell kind and the optimizer are resolved by name; both
    /// lookups fail with a configuration error before any step can run.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] for an invalid configuration, an unknown
    /// cell kind, or an unknown optimizer name.
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let kind = CellKind::from_name(&config.rnn_cell)?;
        let opt_config = OptimizerConfig::from_name(&config.optimizer, &config.optimizer_params)?;

        let scaler = match &config.data_scaler {
            Some(s) => Some(FeatureScaler::new(s.center.clone(), s.scale.clone())?),
            None => None,
        };

        let stack = RecurrentStack::new(
            kind,
            config.num_inputs,
            config.num_hidden,
            config.num_layers,
            config.seed,
        )?;
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
        let projection = Dense::new(config.num_hidden, config.num_outputs, &mut rng);

        // One optimizer state per parameter tensor, in parameter order.
        let num_tensors = stack.parameters().len() + projection.parameters().len();
        let optimizers = (0..num_tensors)
            .map(|_| create_optimizer(&opt_config))
            .collect();

        tracing::info!(
            cell = %config.rnn_cell,
            optimizer = opt_config.name(),
            num_layers = config.num_layers,
            num_hidden = config.num_hidden,
            num_unrollings = config.num_unrollings,
            "built sequence model"
        );

        Ok(Self {
            config,
            scaler,
            stack,
            projection,
            optimizers,
        })
    }

    /// Returns the configuration the model was built from.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Returns all trainable parameters, stack layers first, projection last.
    pub fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.stack.parameters();
        params.extend(self.projection.parameters());
        params
    }

    /// Returns mutable references to all trainable parameters.
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.stack.parameters_mut();
        params.extend(self.projection.parameters_mut());
        params
    }

    /// Inference step: forward pass only, dropout disabled, no mutation.
    ///
    /// The evaluation loop consumes `mse_target_column` and `predictions`
    /// from the returned [`StepOutput`].
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] if the batch violates the shape contract.
    pub fn step(&mut self, batch: &Batch) -> Result<StepOutput, ModelError> {
        let pass = self.forward(batch, false)?;
        self.finish_output(pass, 0.0)
    }

    /// Training step: forward, backward through time, clip, update.
    ///
    /// The learning rate is an explicit argument so callers can drive their
    /// own schedule; the model never stores it.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] if the batch violates the shape contract or
    /// a backward pass rejects its cached shapes.
    pub fn train_step(
        &mut self,
        batch: &Batch,
        learning_rate: f32,
    ) -> Result<StepOutput, ModelError> {
        self.stack.zero_grads();
        self.projection.zero_grads();

        let pass = self.forward(batch, true)?;
        let d_outputs = self.loss_gradients(&pass);

        let mut d_hidden = Vec::with_capacity(pass.outputs.len());
        for (h, d_out) in pass.hidden.iter().zip(d_outputs.iter()) {
            d_hidden.push(self.projection.accumulate_backward(h, d_out)?);
        }
        self.stack.backward_sequence(&pass.cache, &d_hidden)?;

        let grad_norm = self.clip_gradients();
        self.apply_updates(learning_rate);

        let output = self.finish_output(pass, grad_norm)?;
        tracing::debug!(
            loss = output.loss,
            grad_norm = output.grad_norm,
            "train step"
        );
        Ok(output)
    }

    /// Checks the batch against the configured shape contract.
    fn check_batch(&self, batch: &Batch) -> Result<usize, ModelError> {
        let u = self.config.num_unrollings;
        if batch.inputs.len() != u || batch.targets.len() != u {
            return Err(ModelError::BatchError {
                message: format!(
                    "expected {} input and target frames, got {} and {}",
                    u,
                    batch.inputs.len(),
                    batch.targets.len()
                ),
            });
        }
        let rows = batch.rows();
        if rows == 0 {
            return Err(ModelError::BatchError {
                message: "batch has no rows".to_string(),
            });
        }
        for frame in &batch.inputs {
            if frame.shape() != [rows, self.config.num_inputs] {
                return Err(ModelError::BatchError {
                    message: format!(
                        "input frame shape {:?}, expected [{}, {}]",
                        frame.shape(),
                        rows,
                        self.config.num_inputs
                    ),
                });
            }
        }
        for frame in &batch.targets {
            if frame.shape() != [rows, self.config.num_outputs] {
                return Err(ModelError::BatchError {
                    message: format!(
                        "target frame shape {:?}, expected [{}, {}]",
                        frame.shape(),
                        rows,
                        self.config.num_outputs
                    ),
                });
            }
        }
        Ok(rows)
    }

    /// Dropout keep probabilities for one invocation; inference disables all.
    fn keeps(&self, training: bool) -> DropoutKeeps {
        if !training {
            return DropoutKeeps::none();
        }
        let kp = self.config.keep_prob;
        DropoutKeeps {
            input: if self.config.input_dropout { kp } else { 1.0 },
            output: if self.config.hidden_dropout { kp } else { 1.0 },
            recurrent: if self.config.rnn_dropout { kp } else { 1.0 },
        }
    }

    /// One unrolled forward pass over the batch.
    fn forward(&mut self, batch: &Batch, training: bool) -> Result<ForwardPass, ModelError> {
        let rows = self.check_batch(batch)?;

        let scaled_inputs: Vec<Tensor> = match &self.scaler {
            Some(s) => batch
                .inputs
                .iter()
                .map(|f| s.center_and_scale(f))
                .collect::<Result<_, _>>()?,
            None => batch.inputs.clone(),
        };
        let scaled_targets: Vec<Tensor> = match &self.scaler {
            Some(s) if self.config.scale_targets => batch
                .targets
                .iter()
                .map(|f| s.center_and_scale(f))
                .collect::<Result<_, _>>()?,
            _ => batch.targets.clone(),
        };

        let keeps = self.keeps(training);
        let (hidden, cache) = self
            .stack
            .forward_sequence(&scaled_inputs, &keeps, training)?;
        let outputs: Vec<Tensor> = hidden
            .iter()
            .map(|h| self.projection.forward(h))
            .collect::<Result<_, _>>()?;

        Ok(ForwardPass {
            outputs,
            scaled_targets,
            hidden,
            cache,
            rows,
        })
    }

    /// Gradients of the blended loss with respect to each step's output.
    ///
    /// `loss = p1 * mse_col + (1 - p1) * (p2 * mse_last + (1 - p2) * mse_all)`
    /// where every MSE is a mean over its own element count, so the per-step
    /// gradient is `2 * weight * diff / count` with the final step carrying
    /// the two extra terms.
    fn loss_gradients(&self, pass: &ForwardPass) -> Vec<Tensor> {
        let u = pass.outputs.len();
        let rows = pass.rows;
        let o_width = self.config.num_outputs;
        let k = self.config.target_idx;
        let p1 = self.config.target_lambda;
        let p2 = self.config.rnn_lambda;

        let all_count = (u * rows * o_width) as f32;
        let last_count = (rows * o_width) as f32;
        let col_count = rows as f32;
        let w_all = (1.0 - p1) * (1.0 - p2);
        let w_last = (1.0 - p1) * p2;

        let mut d_outputs = Vec::with_capacity(u);
        for (t, (out, tgt)) in pass
            .outputs
            .iter()
            .zip(pass.scaled_targets.iter())
            .enumerate()
        {
            let diff = out.sub(tgt);
            let mut d = diff.scale(2.0 * w_all / all_count);
            if t == u - 1 {
                d = d.add(&diff.scale(2.0 * w_last / last_count));
                let col_factor = 2.0 * p1 / col_count;
                let diff_data = diff.data().to_vec();
                let data = d.data_mut();
                for r in 0..rows {
                    data[r * o_width + k] += col_factor * diff_data[r * o_width + k];
                }
            }
            d_outputs.push(d);
        }
        d_outputs
    }

    /// Global-norm clipping over every accumulated gradient tensor.
    ///
    /// Returns the pre-clip global norm as the observable metric, or a
    /// constant 0.0 when clipping is disabled.
    fn clip_gradients(&mut self) -> f32 {
        if self.config.max_grad_norm <= 0.0 {
            return 0.0;
        }

        let mut sq_sum = 0.0f32;
        for g in self.stack.grads() {
            sq_sum += g.data().iter().map(|v| v * v).sum::<f32>();
        }
        for g in self.projection.grads() {
            sq_sum += g.data().iter().map(|v| v * v).sum::<f32>();
        }
        let global_norm = sq_sum.sqrt();

        if global_norm > self.config.max_grad_norm {
            let factor = self.config.max_grad_norm / global_norm;
            for g in self.stack.grads_mut() {
                for v in g.data_mut() {
                    *v *= factor;
                }
            }
            for g in self.projection.grads_mut() {
                for v in g.data_mut() {
                    *v *= factor;
                }
            }
        }
        global_norm
    }

    /// Applies the accumulated gradients through the per-tensor optimizers.
    fn apply_updates(&mut self, learning_rate: f32) {
        let grad_data: Vec<Vec<f32>> = self
            .stack
            .grads()
            .iter()
            .map(|g| g.data().to_vec())
            .chain(self.projection.grads().iter().map(|g| g.data().to_vec()))
            .collect();

        let mut params = self.stack.parameters_mut();
        params.extend(self.projection.parameters_mut());
        for ((param, grads), opt) in params
            .into_iter()
            .zip(grad_data.iter())
            .zip(self.optimizers.iter_mut())
        {
            opt.apply_gradients(learning_rate, param.data_mut(), grads);
        }
    }

    /// Computes the MSE quantities and assembles the read-only surface.
    fn finish_output(&self, pass: ForwardPass, grad_norm: f32) -> Result<StepOutput, ModelError> {
        let last_output = pass
            .outputs
            .last()
            .cloned()
            .ok_or_else(|| ModelError::BatchError {
                message: "forward pass produced no output frames".to_string(),
            })?;
        let last_target = pass
            .scaled_targets
            .last()
            .cloned()
            .ok_or_else(|| ModelError::BatchError {
                message: "forward pass produced no target frames".to_string(),
            })?;

        let mut sq_sum = 0.0f32;
        let mut count = 0usize;
        for (out, tgt) in pass.outputs.iter().zip(pass.scaled_targets.iter()) {
            sq_sum += out.sub(tgt).map(|v| v * v).sum();
            count += out.numel();
        }
        let mse_all_steps = sq_sum / count as f32;
        let mse_last_step = last_output.sub(&last_target).map(|v| v * v).mean();

        let k = self.config.target_idx;
        let target_column_output = last_output.column(k);
        let target_column_target = last_target.column(k);
        let mse_target_column = target_column_output
            .sub(&target_column_target)
            .map(|v| v * v)
            .mean();

        let p1 = self.config.target_lambda;
        let p2 = self.config.rnn_lambda;
        let loss =
            p1 * mse_target_column + (1.0 - p1) * (p2 * mse_last_step + (1.0 - p2) * mse_all_steps);

        let outputs: Vec<Tensor> = match &self.scaler {
            Some(s) if self.config.scale_targets => pass
                .outputs
                .iter()
                .map(|o| s.reverse(o))
                .collect::<Result<_, _>>()?,
            _ => pass.outputs,
        };
        let predictions = outputs
            .last()
            .cloned()
            .ok_or_else(|| ModelError::BatchError {
                message: "forward pass produced no output frames".to_string(),
            })?;

        Ok(StepOutput {
            predictions,
            outputs,
            last_output,
            last_target,
            target_column_output,
            target_column_target,
            mse_all_steps,
            mse_last_step,
            mse_target_column,
            loss,
            grad_norm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::RowAttribs;
    use crate::config::ScalerConfig;
    use rand::Rng;

    fn synthetic_batch(u: usize, rows: usize, inputs: usize, outputs: usize, seed: u64) -> Batch {
        let mut rng = StdRng::seed_from_u64(seed);
        let frame = |rng: &mut StdRng, r: usize, w: usize| {
            let data: Vec<f32> = (0..r * w).map(|_| rng.gen_range(-1.0..1.0)).collect();
            Tensor::from_data(&[r, w], data)
        };
        Batch {
            inputs: (0..u).map(|_| frame(&mut rng, rows, inputs)).collect(),
            targets: (0..u).map(|_| frame(&mut rng, rows, outputs)).collect(),
            attribs: (0..rows)
                .map(|r| RowAttribs {
                    key: format!("K{}", r),
                    date: "2020-01-01".parse().unwrap(),
                })
                .collect(),
        }
    }

    fn small_config() -> ModelConfig {
        ModelConfig {
            num_unrollings: 3,
            num_inputs: 2,
            num_outputs: 2,
            num_hidden: 8,
            num_layers: 1,
            max_grad_norm: 0.0,
            ..ModelConfig::default()
        }
    }

    fn param_data(model: &SequenceModel) -> Vec<Vec<f32>> {
        model.parameters().iter().map(|p| p.data().to_vec()).collect()
    }

    fn delta_norm(before: &[Vec<f32>], model: &SequenceModel) -> f32 {
        let mut sq = 0.0f32;
        for (b, a) in before.iter().zip(model.parameters().iter()) {
            for (x, y) in b.iter().zip(a.data().iter()) {
                sq += (x - y) * (x - y);
            }
        }
        sq.sqrt()
    }

    #[test]
    fn test_unknown_optimizer_fails_at_construction() {
        let config = ModelConfig {
            optimizer: "NotAnOptimizer".to_string(),
            ..small_config()
        };
        match SequenceModel::new(config) {
            Err(ModelError::Optimizer(_)) => {}
            other => panic!("expected optimizer error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unknown_cell_kind_fails_at_construction() {
        let config = ModelConfig {
            rnn_cell: "vanilla".to_string(),
            ..small_config()
        };
        match SequenceModel::new(config) {
            Err(ModelError::Layer(_)) => {}
            other => panic!("expected layer config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_step_output_shapes() {
        let config = small_config();
        let mut model = SequenceModel::new(config).unwrap();
        let batch = synthetic_batch(3, 4, 2, 2, 7);
        let out = model.step(&batch).unwrap();

        assert_eq!(out.outputs.len(), 3);
        for frame in &out.outputs {
            assert_eq!(frame.shape(), &[4, 2]);
        }
        assert_eq!(out.predictions.shape(), &[4, 2]);
        assert_eq!(out.target_column_output.shape(), &[4]);
        assert_eq!(out.grad_norm, 0.0);
    }

    #[test]
    fn test_batch_shape_mismatch_rejected() {
        let mut model = SequenceModel::new(small_config()).unwrap();

        let wrong_frames = synthetic_batch(2, 4, 2, 2, 7);
        assert!(matches!(
            model.step(&wrong_frames),
            Err(ModelError::BatchError { .. })
        ));

        let wrong_width = synthetic_batch(3, 4, 3, 2, 7);
        assert!(matches!(
            model.step(&wrong_width),
            Err(ModelError::BatchError { .. })
        ));
    }

    #[test]
    fn test_loss_blend_boundaries() {
        let batch = synthetic_batch(3, 4, 2, 2, 11);

        let mut model = SequenceModel::new(ModelConfig {
            target_lambda: 1.0,
            rnn_lambda: 0.3,
            ..small_config()
        })
        .unwrap();
        let out = model.step(&batch).unwrap();
        assert_eq!(out.loss, out.mse_target_column);

        let mut model = SequenceModel::new(ModelConfig {
            target_lambda: 0.0,
            rnn_lambda: 1.0,
            ..small_config()
        })
        .unwrap();
        let out = model.step(&batch).unwrap();
        assert_eq!(out.loss, out.mse_last_step);

        let mut model = SequenceModel::new(ModelConfig {
            target_lambda: 0.0,
            rnn_lambda: 0.0,
            ..small_config()
        })
        .unwrap();
        let out = model.step(&batch).unwrap();
        assert_eq!(out.loss, out.mse_all_steps);
    }

    #[test]
    fn test_grad_norm_metric_zero_when_clipping_disabled() {
        let mut model = SequenceModel::new(ModelConfig {
            max_grad_norm: 0.0,
            ..small_config()
        })
        .unwrap();
        let batch = synthetic_batch(3, 4, 2, 2, 13);
        for _ in 0..3 {
            let out = model.train_step(&batch, 0.01).unwrap();
            assert_eq!(out.grad_norm, 0.0);
        }
    }

    #[test]
    fn test_clipping_bounds_update_norm() {
        // With plain SGD and lr = 1.0 the parameter delta equals the
        // (possibly clipped) gradient vector.
        let bound = 1e-3;
        let mut model = SequenceModel::new(ModelConfig {
            max_grad_norm: bound,
            ..small_config()
        })
        .unwrap();
        let batch = synthetic_batch(3, 4, 2, 2, 17);

        let before = param_data(&model);
        let out = model.train_step(&batch, 1.0).unwrap();
        let moved = delta_norm(&before, &model);

        assert!(out.grad_norm > bound, "pre-clip norm {} too small", out.grad_norm);
        assert!(moved <= bound * 1.01, "post-clip norm {} exceeds {}", moved, bound);
    }

    #[test]
    fn test_no_clip_below_bound() {
        let mut clipped = SequenceModel::new(ModelConfig {
            max_grad_norm: 1e9,
            ..small_config()
        })
        .unwrap();
        let mut unclipped = SequenceModel::new(ModelConfig {
            max_grad_norm: 0.0,
            ..small_config()
        })
        .unwrap();
        let batch = synthetic_batch(3, 4, 2, 2, 19);

        clipped.train_step(&batch, 0.05).unwrap();
        unclipped.train_step(&batch, 0.05).unwrap();

        for (a, b) in clipped.parameters().iter().zip(unclipped.parameters().iter()) {
            for (x, y) in a.data().iter().zip(b.data().iter()) {
                assert!((x - y).abs() < 1e-7, "{} vs {}", x, y);
            }
        }
    }

    #[test]
    fn test_projection_shared_across_steps() {
        // The projection bias is the last parameter tensor; shifting one of
        // its entries must shift that output column identically at every
        // unrolled step.
        let mut model = SequenceModel::new(small_config()).unwrap();
        let batch = synthetic_batch(3, 2, 2, 2, 23);
        let base = model.step(&batch).unwrap();

        let delta = 0.25f32;
        {
            let mut params = model.parameters_mut();
            let bias = params.last_mut().unwrap();
            bias.data_mut()[1] += delta;
        }
        let shifted = model.step(&batch).unwrap();

        for (before, after) in base.outputs.iter().zip(shifted.outputs.iter()) {
            for r in 0..2 {
                let b = before.data();
                let a = after.data();
                assert!((a[r * 2] - b[r * 2]).abs() < 1e-6);
                assert!((a[r * 2 + 1] - b[r * 2 + 1] - delta).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_inference_mutates_nothing() {
        let mut model = SequenceModel::new(small_config()).unwrap();
        let batch = synthetic_batch(3, 4, 2, 2, 29);

        let before = param_data(&model);
        let first = model.step(&batch).unwrap();
        let second = model.step(&batch).unwrap();

        assert_eq!(delta_norm(&before, &model), 0.0);
        for (a, b) in first.outputs.iter().zip(second.outputs.iter()) {
            assert_eq!(a.data(), b.data());
        }
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut model = SequenceModel::new(ModelConfig {
            max_grad_norm: 5.0,
            ..small_config()
        })
        .unwrap();
        let batch = synthetic_batch(3, 4, 2, 2, 31);

        let first = model.train_step(&batch, 0.05).unwrap().loss;
        let mut last = first;
        for _ in 0..60 {
            last = model.train_step(&batch, 0.05).unwrap().loss;
        }
        assert!(last < first, "loss {} did not drop below {}", last, first);
    }

    #[test]
    fn test_predictions_denormalized_when_targets_scaled() {
        let config = ModelConfig {
            data_scaler: Some(ScalerConfig {
                center: vec![0.5, -1.0],
                scale: vec![2.0, 4.0],
            }),
            scale_targets: true,
            ..small_config()
        };
        let mut model = SequenceModel::new(config).unwrap();
        let batch = synthetic_batch(3, 2, 2, 2, 37);
        let out = model.step(&batch).unwrap();

        let scaled = out.last_output.data();
        let raw = out.predictions.data();
        for r in 0..2 {
            assert!((raw[r * 2] - (scaled[r * 2] * 2.0 + 0.5)).abs() < 1e-5);
            assert!((raw[r * 2 + 1] - (scaled[r * 2 + 1] * 4.0 - 1.0)).abs() < 1e-5);
        }
    }

    #[test]
    fn test_lstm_cell_trains() {
        let mut model = SequenceModel::new(ModelConfig {
            rnn_cell: "lstm".to_string(),
            max_grad_norm: 5.0,
            ..small_config()
        })
        .unwrap();
        let batch = synthetic_batch(3, 2, 2, 2, 41);

        let first = model.train_step(&batch, 0.05).unwrap().loss;
        let mut last = first;
        for _ in 0..40 {
            last = model.train_step(&batch, 0.05).unwrap().loss;
        }
        assert!(last < first, "loss {} did not drop below {}", last, first);
    }
}
