//! Recurrent cells and the multi-layer recurrent stack.
//!
//! Two cell kinds are supported: a gated recurrent cell ([`GruCell`]) and a
//! layer-normalization LSTM variant ([`NormLstmCell`]) that applies dropout
//! internally on its candidate activation. Both are wrapped by
//! [`RecurrentLayer`], which adds external input/output dropout, and stacked
//! by [`RecurrentStack`], which unrolls the layers over a sequence while
//! carrying per-layer state across the steps of a single call.
//!
//! Every cell carries hand-written backward passes; gradients accumulate in
//! per-parameter buffers in the same order as `parameters()`.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dropout::dropout_mask;
use crate::error::LayerError;
use crate::initializer::Initializer;
use crate::normalization::LayerNorm;
use crate::tensor::Tensor;

/// The supported recurrent cell kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// Gated recurrent cell.
    Gru,
    /// Layer-normalization LSTM variant with internal recurrent dropout.
    NormLstm,
}

impl CellKind {
    /// Resolves a cell kind from its configured name.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError::ConfigError`] for any name other than
    /// `"gru"` or `"lstm"` (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, LayerError> {
        match name.to_lowercase().as_str() {
            "gru" => Ok(CellKind::Gru),
            "lstm" => Ok(CellKind::NormLstm),
            _ => Err(LayerError::ConfigError {
                message: format!("Unknown recurrent cell kind: {}", name),
            }),
        }
    }
}

/// Recurrent state carried between the steps of one unrolled sequence.
#[derive(Debug, Clone)]
pub struct CellState {
    /// Hidden state `[batch, hidden]`.
    pub h: Tensor,
    /// Cell state `[batch, hidden]`, present for LSTM-family cells only.
    pub c: Option<Tensor>,
}

/// Dropout keep probabilities for the three connection classes.
#[derive(Debug, Clone, Copy)]
pub struct DropoutKeeps {
    /// Keep probability for cell inputs.
    pub input: f32,
    /// Keep probability for cell outputs (hidden connections).
    pub output: f32,
    /// Keep probability for the LSTM variant's internal candidate.
    pub recurrent: f32,
}

impl DropoutKeeps {
    /// Keep probabilities that disable all dropout (inference mode).
    pub fn none() -> Self {
        Self {
            input: 1.0,
            output: 1.0,
            recurrent: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// GRU
// ---------------------------------------------------------------------------

/// Cached per-step values for the GRU backward pass.
#[derive(Debug, Clone)]
pub struct GruCache {
    x: Tensor,
    h_prev: Tensor,
    r: Tensor,
    z: Tensor,
    h_tilde: Tensor,
}

/// Standard gated recurrent cell.
///
/// One step computes:
/// - `r = sigmoid(x W_rx + h W_rh + b_r)` (reset gate)
/// - `z = sigmoid(x W_zx + h W_zh + b_z)` (update gate)
/// - `h_tilde = tanh(x W_hx + (r * h) W_hh + b_h)` (candidate)
/// - `h_new = (1 - z) * h + z * h_tilde`
#[derive(Debug, Clone)]
pub struct GruCell {
    input_dim: usize,
    hidden_dim: usize,
    w_r_x: Tensor,
    w_r_h: Tensor,
    b_r: Tensor,
    w_z_x: Tensor,
    w_z_h: Tensor,
    b_z: Tensor,
    w_h_x: Tensor,
    w_h_h: Tensor,
    b_h: Tensor,
    grads: Vec<Tensor>,
}

impl GruCell {
    /// Creates a new GRU cell with He-uniform input kernels, orthogonal
    /// recurrent kernels, and zero biases.
    pub fn new(input_dim: usize, hidden_dim: usize, rng: &mut StdRng) -> Self {
        let input_init = Initializer::HeUniform;
        let recurrent_init = Initializer::Orthogonal;
        let grads = vec![
            Tensor::zeros(&[input_dim, hidden_dim]),
            Tensor::zeros(&[hidden_dim, hidden_dim]),
            Tensor::zeros(&[hidden_dim]),
            Tensor::zeros(&[input_dim, hidden_dim]),
            Tensor::zeros(&[hidden_dim, hidden_dim]),
            Tensor::zeros(&[hidden_dim]),
            Tensor::zeros(&[input_dim, hidden_dim]),
            Tensor::zeros(&[hidden_dim, hidden_dim]),
            Tensor::zeros(&[hidden_dim]),
        ];
        Self {
            input_dim,
            hidden_dim,
            w_r_x: input_init.initialize(&[input_dim, hidden_dim], rng),
            w_r_h: recurrent_init.initialize(&[hidden_dim, hidden_dim], rng),
            b_r: Tensor::zeros(&[hidden_dim]),
            w_z_x: input_init.initialize(&[input_dim, hidden_dim], rng),
            w_z_h: recurrent_init.initialize(&[hidden_dim, hidden_dim], rng),
            b_z: Tensor::zeros(&[hidden_dim]),
            w_h_x: input_init.initialize(&[input_dim, hidden_dim], rng),
            w_h_h: recurrent_init.initialize(&[hidden_dim, hidden_dim], rng),
            b_h: Tensor::zeros(&[hidden_dim]),
            grads,
        }
    }

    /// Returns the input dimension.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Returns the hidden dimension.
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Computes one step.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if `x` is not `[batch, input_dim]`.
    pub fn forward_step(
        &self,
        x: &Tensor,
        h_prev: &Tensor,
    ) -> Result<(Tensor, GruCache), LayerError> {
        if x.ndim() != 2 || x.shape()[1] != self.input_dim {
            return Err(LayerError::InvalidInputDimension {
                expected: self.input_dim,
                actual: *x.shape().last().unwrap_or(&0),
            });
        }

        let r = x
            .matmul(&self.w_r_x)
            .add(&h_prev.matmul(&self.w_r_h))
            .add(&self.b_r)
            .sigmoid();
        let z = x
            .matmul(&self.w_z_x)
            .add(&h_prev.matmul(&self.w_z_h))
            .add(&self.b_z)
            .sigmoid();
        let rh = r.mul(h_prev);
        let h_tilde = x
            .matmul(&self.w_h_x)
            .add(&rh.matmul(&self.w_h_h))
            .add(&self.b_h)
            .tanh();

        // h_new = (1 - z) * h_prev + z * h_tilde
        let one_minus_z = z.map(|v| 1.0 - v);
        let h_new = one_minus_z.mul(h_prev).add(&z.mul(&h_tilde));

        let cache = GruCache {
            x: x.clone(),
            h_prev: h_prev.clone(),
            r,
            z,
            h_tilde,
        };
        Ok((h_new, cache))
    }

    /// Backward pass for one step.
    ///
    /// `dh` is the gradient with respect to this step's new hidden state.
    /// Parameter gradients accumulate internally; the returned pair is
    /// `(dx, dh_prev)`.
    pub fn backward_step(&mut self, cache: &GruCache, dh: &Tensor) -> (Tensor, Tensor) {
        let GruCache {
            x,
            h_prev,
            r,
            z,
            h_tilde,
        } = cache;

        let one_minus_z = z.map(|v| 1.0 - v);

        let dz = dh.mul(&h_tilde.sub(h_prev));
        let dh_tilde = dh.mul(z);
        let mut dh_prev = dh.mul(&one_minus_z);

        // Candidate branch
        let da_h = dh_tilde.mul(&h_tilde.map(|v| 1.0 - v * v));
        let rh = r.mul(h_prev);
        let d_rh = da_h.matmul(&self.w_h_h.transpose());
        let dr = d_rh.mul(h_prev);
        dh_prev = dh_prev.add(&d_rh.mul(r));

        // Gate pre-activations
        let da_z = dz.mul(z).mul(&one_minus_z);
        let da_r = dr.mul(r).mul(&r.map(|v| 1.0 - v));

        // Parameter gradients, ordered as parameters(): r, z, h groups
        let xt = x.transpose();
        let ht = h_prev.transpose();
        self.grads[0] = self.grads[0].add(&xt.matmul(&da_r));
        self.grads[1] = self.grads[1].add(&ht.matmul(&da_r));
        self.grads[2] = self.grads[2].add(&da_r.sum_axis(0));
        self.grads[3] = self.grads[3].add(&xt.matmul(&da_z));
        self.grads[4] = self.grads[4].add(&ht.matmul(&da_z));
        self.grads[5] = self.grads[5].add(&da_z.sum_axis(0));
        self.grads[6] = self.grads[6].add(&xt.matmul(&da_h));
        self.grads[7] = self.grads[7].add(&rh.transpose().matmul(&da_h));
        self.grads[8] = self.grads[8].add(&da_h.sum_axis(0));

        dh_prev = dh_prev
            .add(&da_z.matmul(&self.w_z_h.transpose()))
            .add(&da_r.matmul(&self.w_r_h.transpose()));
        let dx = da_h
            .matmul(&self.w_h_x.transpose())
            .add(&da_z.matmul(&self.w_z_x.transpose()))
            .add(&da_r.matmul(&self.w_r_x.transpose()));

        (dx, dh_prev)
    }

    /// Clears the accumulated gradients.
    pub fn zero_grads(&mut self) {
        for g in &mut self.grads {
            *g = Tensor::zeros(g.shape());
        }
    }

    /// Returns all parameters in gradient order.
    pub fn parameters(&self) -> Vec<&Tensor> {
        vec![
            &self.w_r_x, &self.w_r_h, &self.b_r, &self.w_z_x, &self.w_z_h, &self.b_z,
            &self.w_h_x, &self.w_h_h, &self.b_h,
        ]
    }

    /// Returns mutable references to all parameters in gradient order.
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![
            &mut self.w_r_x, &mut self.w_r_h, &mut self.b_r, &mut self.w_z_x, &mut self.w_z_h,
            &mut self.b_z, &mut self.w_h_x, &mut self.w_h_h, &mut self.b_h,
        ]
    }

    /// Returns references to the accumulated gradients, parameter-aligned.
    pub fn grads(&self) -> Vec<&Tensor> {
        self.grads.iter().collect()
    }

    /// Returns mutable references to the accumulated gradients.
    pub fn grads_mut(&mut self) -> Vec<&mut Tensor> {
        self.grads.iter_mut().collect()
    }
}

// ---------------------------------------------------------------------------
// Layer-normalization LSTM variant
// ---------------------------------------------------------------------------

/// Cached per-step values for the LSTM backward pass.
#[derive(Debug, Clone)]
pub struct NormLstmCache {
    x: Tensor,
    h_prev: Tensor,
    c_prev: Tensor,
    a_i: Tensor,
    a_j: Tensor,
    a_f: Tensor,
    a_o: Tensor,
    i: Tensor,
    f: Tensor,
    o: Tensor,
    g0: Tensor,
    mask: Tensor,
    c_new: Tensor,
    tanh_c: Tensor,
}

/// LSTM cell with per-gate layer normalization and internal recurrent
/// dropout on the candidate activation.
///
/// One step computes a single kernel product over `[x, h]`, splits it into
/// the `i, j, f, o` gate pre-activations, layer-normalizes each, then:
/// - `g = dropout(tanh(ln_j), recurrent_keep)`
/// - `c_new = c * sigmoid(ln_f + forget_bias) + sigmoid(ln_i) * g`
/// - `h_new = tanh(ln_c(c_new)) * sigmoid(ln_o)`
///
/// The kernel has no bias; the layer-norm shift parameters play that role.
#[derive(Debug)]
pub struct NormLstmCell {
    input_dim: usize,
    hidden_dim: usize,
    forget_bias: f32,
    kernel: Tensor,
    kernel_grad: Tensor,
    ln_i: LayerNorm,
    ln_j: LayerNorm,
    ln_f: LayerNorm,
    ln_o: LayerNorm,
    ln_c: LayerNorm,
    rng: StdRng,
}

impl NormLstmCell {
    /// Creates a new cell; `seed` drives both weight init and the internal
    /// recurrent-dropout mask stream.
    pub fn new(input_dim: usize, hidden_dim: usize, seed: u64, rng: &mut StdRng) -> Self {
        let kernel =
            Initializer::GlorotUniform.initialize(&[input_dim + hidden_dim, 4 * hidden_dim], rng);
        Self {
            input_dim,
            hidden_dim,
            forget_bias: 1.0,
            kernel_grad: Tensor::zeros(&[input_dim + hidden_dim, 4 * hidden_dim]),
            kernel,
            ln_i: LayerNorm::new(hidden_dim),
            ln_j: LayerNorm::new(hidden_dim),
            ln_f: LayerNorm::new(hidden_dim),
            ln_o: LayerNorm::new(hidden_dim),
            ln_c: LayerNorm::new(hidden_dim),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Returns the input dimension.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Returns the hidden dimension.
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Computes one step.
    ///
    /// `recurrent_keep` is the keep probability for the internal candidate
    /// dropout; it only takes effect while `training` is true.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if `x` is not `[batch, input_dim]`.
    pub fn forward_step(
        &mut self,
        x: &Tensor,
        h_prev: &Tensor,
        c_prev: &Tensor,
        recurrent_keep: f32,
        training: bool,
    ) -> Result<(Tensor, Tensor, NormLstmCache), LayerError> {
        if x.ndim() != 2 || x.shape()[1] != self.input_dim {
            return Err(LayerError::InvalidInputDimension {
                expected: self.input_dim,
                actual: *x.shape().last().unwrap_or(&0),
            });
        }

        let batch = x.shape()[0];
        let h = self.hidden_dim;

        let concat = x.concat_cols(h_prev);
        let lin = concat.matmul(&self.kernel);
        let a_i = lin.slice_cols(0, h);
        let a_j = lin.slice_cols(h, 2 * h);
        let a_f = lin.slice_cols(2 * h, 3 * h);
        let a_o = lin.slice_cols(3 * h, 4 * h);

        let i = self.ln_i.forward(&a_i)?.sigmoid();
        let g0 = self.ln_j.forward(&a_j)?.tanh();
        let fb = self.forget_bias;
        let f = self.ln_f.forward(&a_f)?.map(|v| 1.0 / (1.0 + (-(v + fb)).exp()));
        let o = self.ln_o.forward(&a_o)?.sigmoid();

        let mask = if training && recurrent_keep < 1.0 {
            dropout_mask(&[batch, h], recurrent_keep, &mut self.rng)
        } else {
            Tensor::ones(&[batch, h])
        };
        let g = g0.mul(&mask);

        let c_new = c_prev.mul(&f).add(&i.mul(&g));
        let tanh_c = self.ln_c.forward(&c_new)?.tanh();
        let h_new = tanh_c.mul(&o);

        let cache = NormLstmCache {
            x: x.clone(),
            h_prev: h_prev.clone(),
            c_prev: c_prev.clone(),
            a_i,
            a_j,
            a_f,
            a_o,
            i,
            f,
            o,
            g0,
            mask,
            c_new: c_new.clone(),
            tanh_c,
        };
        Ok((h_new, c_new, cache))
    }

    /// Backward pass for one step.
    ///
    /// `dh` is the gradient with respect to the new hidden state, `dc` the
    /// gradient flowing into the new cell state from the following step.
    /// Returns `(dx, dh_prev, dc_prev)`.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if an internal layer-norm backward rejects
    /// its input shape.
    pub fn backward_step(
        &mut self,
        cache: &NormLstmCache,
        dh: &Tensor,
        dc: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor, Tensor), LayerError> {
        let do_ = dh.mul(&cache.tanh_c);
        let d_tanh = dh.mul(&cache.o);
        let d_ln_c_out = d_tanh.mul(&cache.tanh_c.map(|v| 1.0 - v * v));

        let mut dc_new = self.ln_c.accumulate_backward(&cache.c_new, &d_ln_c_out)?;
        if let Some(dc) = dc {
            dc_new = dc_new.add(dc);
        }

        let df = dc_new.mul(&cache.c_prev);
        let dc_prev = dc_new.mul(&cache.f);
        let g = cache.g0.mul(&cache.mask);
        let di = dc_new.mul(&g);
        let dg0 = dc_new.mul(&cache.i).mul(&cache.mask);

        let d_ln_j_out = dg0.mul(&cache.g0.map(|v| 1.0 - v * v));
        let d_ln_i_out = di.mul(&cache.i).mul(&cache.i.map(|v| 1.0 - v));
        let d_ln_f_out = df.mul(&cache.f).mul(&cache.f.map(|v| 1.0 - v));
        let d_ln_o_out = do_.mul(&cache.o).mul(&cache.o.map(|v| 1.0 - v));

        let da_i = self.ln_i.accumulate_backward(&cache.a_i, &d_ln_i_out)?;
        let da_j = self.ln_j.accumulate_backward(&cache.a_j, &d_ln_j_out)?;
        let da_f = self.ln_f.accumulate_backward(&cache.a_f, &d_ln_f_out)?;
        let da_o = self.ln_o.accumulate_backward(&cache.a_o, &d_ln_o_out)?;

        let da = da_i.concat_cols(&da_j).concat_cols(&da_f).concat_cols(&da_o);
        let concat = cache.x.concat_cols(&cache.h_prev);
        self.kernel_grad = self.kernel_grad.add(&concat.transpose().matmul(&da));

        let d_concat = da.matmul(&self.kernel.transpose());
        let dx = d_concat.slice_cols(0, self.input_dim);
        let dh_prev = d_concat.slice_cols(self.input_dim, self.input_dim + self.hidden_dim);

        Ok((dx, dh_prev, dc_prev))
    }

    /// Clears the accumulated gradients.
    pub fn zero_grads(&mut self) {
        self.kernel_grad = Tensor::zeros(&[self.input_dim + self.hidden_dim, 4 * self.hidden_dim]);
        self.ln_i.zero_grads();
        self.ln_j.zero_grads();
        self.ln_f.zero_grads();
        self.ln_o.zero_grads();
        self.ln_c.zero_grads();
    }

    /// Returns all parameters in gradient order.
    pub fn parameters(&self) -> Vec<&Tensor> {
        let mut params = vec![&self.kernel];
        params.extend(self.ln_i.parameters());
        params.extend(self.ln_j.parameters());
        params.extend(self.ln_f.parameters());
        params.extend(self.ln_o.parameters());
        params.extend(self.ln_c.parameters());
        params
    }

    /// Returns mutable references to all parameters in gradient order.
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = vec![&mut self.kernel];
        params.extend(self.ln_i.parameters_mut());
        params.extend(self.ln_j.parameters_mut());
        params.extend(self.ln_f.parameters_mut());
        params.extend(self.ln_o.parameters_mut());
        params.extend(self.ln_c.parameters_mut());
        params
    }

    /// Returns references to the accumulated gradients, parameter-aligned.
    pub fn grads(&self) -> Vec<&Tensor> {
        let mut grads = vec![&self.kernel_grad];
        grads.extend(self.ln_i.grads());
        grads.extend(self.ln_j.grads());
        grads.extend(self.ln_f.grads());
        grads.extend(self.ln_o.grads());
        grads.extend(self.ln_c.grads());
        grads
    }

    /// Returns mutable references to the accumulated gradients.
    pub fn grads_mut(&mut self) -> Vec<&mut Tensor> {
        let mut grads = vec![&mut self.kernel_grad];
        grads.extend(self.ln_i.grads_mut());
        grads.extend(self.ln_j.grads_mut());
        grads.extend(self.ln_f.grads_mut());
        grads.extend(self.ln_o.grads_mut());
        grads.extend(self.ln_c.grads_mut());
        grads
    }
}

// ---------------------------------------------------------------------------
// Cell dispatch, dropout wrapper, stack
// ---------------------------------------------------------------------------

/// A recurrent cell of either supported kind.
#[derive(Debug)]
pub enum RecurrentCell {
    /// Gated recurrent cell.
    Gru(GruCell),
    /// Layer-normalization LSTM variant.
    NormLstm(NormLstmCell),
}

/// Per-step cache for either cell kind.
#[derive(Debug, Clone)]
pub enum CellCache {
    /// GRU cache.
    Gru(GruCache),
    /// LSTM cache.
    NormLstm(NormLstmCache),
}

impl RecurrentCell {
    /// Constructs a cell of the requested kind (the cell factory).
    pub fn new(
        kind: CellKind,
        input_dim: usize,
        hidden_dim: usize,
        seed: u64,
        rng: &mut StdRng,
    ) -> Self {
        match kind {
            CellKind::Gru => RecurrentCell::Gru(GruCell::new(input_dim, hidden_dim, rng)),
            CellKind::NormLstm => {
                RecurrentCell::NormLstm(NormLstmCell::new(input_dim, hidden_dim, seed, rng))
            }
        }
    }

    /// Returns the hidden dimension.
    pub fn hidden_dim(&self) -> usize {
        match self {
            RecurrentCell::Gru(cell) => cell.hidden_dim(),
            RecurrentCell::NormLstm(cell) => cell.hidden_dim(),
        }
    }

    /// Returns the zero state for a batch of the given size.
    pub fn zero_state(&self, batch: usize) -> CellState {
        let h = Tensor::zeros(&[batch, self.hidden_dim()]);
        let c = match self {
            RecurrentCell::Gru(_) => None,
            RecurrentCell::NormLstm(_) => Some(Tensor::zeros(&[batch, self.hidden_dim()])),
        };
        CellState { h, c }
    }

    fn forward_step(
        &mut self,
        x: &Tensor,
        state: &CellState,
        recurrent_keep: f32,
        training: bool,
    ) -> Result<(CellState, CellCache), LayerError> {
        match self {
            RecurrentCell::Gru(cell) => {
                let (h, cache) = cell.forward_step(x, &state.h)?;
                Ok((CellState { h, c: None }, CellCache::Gru(cache)))
            }
            RecurrentCell::NormLstm(cell) => {
                let c_prev = state.c.as_ref().ok_or_else(|| LayerError::ForwardError {
                    message: "LSTM state is missing its cell component".to_string(),
                })?;
                let (h, c, cache) =
                    cell.forward_step(x, &state.h, c_prev, recurrent_keep, training)?;
                Ok((CellState { h, c: Some(c) }, CellCache::NormLstm(cache)))
            }
        }
    }

    fn backward_step(
        &mut self,
        cache: &CellCache,
        dh: &Tensor,
        dc: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor, Option<Tensor>), LayerError> {
        match (self, cache) {
            (RecurrentCell::Gru(cell), CellCache::Gru(cache)) => {
                let (dx, dh_prev) = cell.backward_step(cache, dh);
                Ok((dx, dh_prev, None))
            }
            (RecurrentCell::NormLstm(cell), CellCache::NormLstm(cache)) => {
                let (dx, dh_prev, dc_prev) = cell.backward_step(cache, dh, dc)?;
                Ok((dx, dh_prev, Some(dc_prev)))
            }
            _ => Err(LayerError::BackwardError {
                message: "Cell cache kind does not match cell kind".to_string(),
            }),
        }
    }

    /// Clears the accumulated gradients.
    pub fn zero_grads(&mut self) {
        match self {
            RecurrentCell::Gru(cell) => cell.zero_grads(),
            RecurrentCell::NormLstm(cell) => cell.zero_grads(),
        }
    }

    /// Returns all parameters in gradient order.
    pub fn parameters(&self) -> Vec<&Tensor> {
        match self {
            RecurrentCell::Gru(cell) => cell.parameters(),
            RecurrentCell::NormLstm(cell) => cell.parameters(),
        }
    }

    /// Returns mutable references to all parameters in gradient order.
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        match self {
            RecurrentCell::Gru(cell) => cell.parameters_mut(),
            RecurrentCell::NormLstm(cell) => cell.parameters_mut(),
        }
    }

    /// Returns references to the accumulated gradients, parameter-aligned.
    pub fn grads(&self) -> Vec<&Tensor> {
        match self {
            RecurrentCell::Gru(cell) => cell.grads(),
            RecurrentCell::NormLstm(cell) => cell.grads(),
        }
    }

    /// Returns mutable references to the accumulated gradients.
    pub fn grads_mut(&mut self) -> Vec<&mut Tensor> {
        match self {
            RecurrentCell::Gru(cell) => cell.grads_mut(),
            RecurrentCell::NormLstm(cell) => cell.grads_mut(),
        }
    }
}

/// Per-step cache for one wrapped layer.
#[derive(Debug, Clone)]
pub struct LayerStepCache {
    in_mask: Tensor,
    out_mask: Tensor,
    cell: CellCache,
}

/// A recurrent cell wrapped with external input/output dropout.
///
/// The dropped output is what flows upward to the next layer (and to the
/// projection); the undropped hidden state is what flows forward in time.
#[derive(Debug)]
pub struct RecurrentLayer {
    cell: RecurrentCell,
    rng: StdRng,
}

impl RecurrentLayer {
    /// Wraps a cell; `seed` drives the layer's dropout mask stream.
    pub fn new(cell: RecurrentCell, seed: u64) -> Self {
        Self {
            cell,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Returns the zero state for a batch of the given size.
    pub fn zero_state(&self, batch: usize) -> CellState {
        self.cell.zero_state(batch)
    }

    /// One wrapped step: input dropout, cell step, output dropout.
    pub fn forward_step(
        &mut self,
        x: &Tensor,
        state: &CellState,
        keeps: &DropoutKeeps,
        training: bool,
    ) -> Result<(Tensor, CellState, LayerStepCache), LayerError> {
        let (in_mask, out_mask) = if training {
            (
                dropout_mask(x.shape(), keeps.input, &mut self.rng),
                dropout_mask(&[x.shape()[0], self.cell.hidden_dim()], keeps.output, &mut self.rng),
            )
        } else {
            (
                Tensor::ones(x.shape()),
                Tensor::ones(&[x.shape()[0], self.cell.hidden_dim()]),
            )
        };

        let dropped_in = x.mul(&in_mask);
        let (new_state, cell_cache) =
            self.cell
                .forward_step(&dropped_in, state, keeps.recurrent, training)?;
        let output = new_state.h.mul(&out_mask);

        let cache = LayerStepCache {
            in_mask,
            out_mask,
            cell: cell_cache,
        };
        Ok((output, new_state, cache))
    }

    /// One wrapped backward step.
    ///
    /// `d_output` is the gradient arriving through this step's (dropped)
    /// output, `d_state_h`/`d_state_c` the gradients carried back from the
    /// following time step. Returns `(dx, dh_prev, dc_prev)`.
    pub fn backward_step(
        &mut self,
        cache: &LayerStepCache,
        d_output: &Tensor,
        d_state_h: &Tensor,
        d_state_c: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor, Option<Tensor>), LayerError> {
        let dh_total = d_output.mul(&cache.out_mask).add(d_state_h);
        let (dx_cell, dh_prev, dc_prev) = self.cell.backward_step(&cache.cell, &dh_total, d_state_c)?;
        Ok((dx_cell.mul(&cache.in_mask), dh_prev, dc_prev))
    }
}

/// Caches for one unrolled forward pass: `steps[t][l]`.
#[derive(Debug, Default)]
pub struct StackCache {
    steps: Vec<Vec<LayerStepCache>>,
}

/// A stack of wrapped recurrent layers unrolled over a sequence.
///
/// Per-layer state is carried across the steps of one `forward_sequence`
/// call and never across calls: every call starts from the zero state.
#[derive(Debug)]
pub struct RecurrentStack {
    layers: Vec<RecurrentLayer>,
    input_dim: usize,
    hidden_dim: usize,
}

impl RecurrentStack {
    /// Builds `num_layers` cells of the given kind; the first layer reads
    /// `input_dim`-wide frames, the rest read the hidden width.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError::ConfigError`] if `num_layers` is zero.
    pub fn new(
        kind: CellKind,
        input_dim: usize,
        hidden_dim: usize,
        num_layers: usize,
        seed: u64,
    ) -> Result<Self, LayerError> {
        if num_layers == 0 {
            return Err(LayerError::ConfigError {
                message: "Recurrent stack needs at least one layer".to_string(),
            });
        }
        let mut init_rng = StdRng::seed_from_u64(seed);
        let layers = (0..num_layers)
            .map(|l| {
                let in_dim = if l == 0 { input_dim } else { hidden_dim };
                let cell_seed = seed.wrapping_add(l as u64).wrapping_mul(0x9e37_79b9);
                let cell = RecurrentCell::new(kind, in_dim, hidden_dim, cell_seed, &mut init_rng);
                RecurrentLayer::new(cell, cell_seed.wrapping_add(1))
            })
            .collect();
        Ok(Self {
            layers,
            input_dim,
            hidden_dim,
        })
    }

    /// Returns the input frame width.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Returns the hidden width.
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Returns the number of stacked layers.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Unrolls the stack over `inputs`, carrying per-layer state across
    /// steps. Returns the top layer's (dropped) output at every step plus
    /// the caches the backward sweep needs.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if the sequence is empty or a frame has the
    /// wrong width.
    pub fn forward_sequence(
        &mut self,
        inputs: &[Tensor],
        keeps: &DropoutKeeps,
        training: bool,
    ) -> Result<(Vec<Tensor>, StackCache), LayerError> {
        if inputs.is_empty() {
            return Err(LayerError::ForwardError {
                message: "Empty input sequence".to_string(),
            });
        }
        let batch = inputs[0].shape()[0];
        let mut states: Vec<CellState> =
            self.layers.iter().map(|l| l.zero_state(batch)).collect();

        let mut outputs = Vec::with_capacity(inputs.len());
        let mut cache = StackCache::default();
        for frame in inputs {
            let mut x = frame.clone();
            let mut step_caches = Vec::with_capacity(self.layers.len());
            for (l, layer) in self.layers.iter_mut().enumerate() {
                let (out, new_state, step_cache) =
                    layer.forward_step(&x, &states[l], keeps, training)?;
                states[l] = new_state;
                step_caches.push(step_cache);
                x = out;
            }
            cache.steps.push(step_caches);
            outputs.push(x);
        }
        Ok((outputs, cache))
    }

    /// Reverse sweep over one unrolled pass.
    ///
    /// `d_outputs[t]` is the gradient with respect to the top layer's output
    /// at step `t`. Parameter gradients accumulate inside the cells.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if `d_outputs` does not match the cached
    /// unroll length.
    pub fn backward_sequence(
        &mut self,
        cache: &StackCache,
        d_outputs: &[Tensor],
    ) -> Result<(), LayerError> {
        if d_outputs.len() != cache.steps.len() {
            return Err(LayerError::BackwardError {
                message: format!(
                    "Expected {} output grads, got {}",
                    cache.steps.len(),
                    d_outputs.len()
                ),
            });
        }
        if cache.steps.is_empty() {
            return Ok(());
        }

        let batch = d_outputs[0].shape()[0];
        let num_layers = self.layers.len();
        let mut d_h: Vec<Tensor> = (0..num_layers)
            .map(|_| Tensor::zeros(&[batch, self.hidden_dim]))
            .collect();
        let mut d_c: Vec<Option<Tensor>> = vec![None; num_layers];

        for t in (0..cache.steps.len()).rev() {
            let mut grad = d_outputs[t].clone();
            for l in (0..num_layers).rev() {
                let (dx, dh_prev, dc_prev) = self.layers[l].backward_step(
                    &cache.steps[t][l],
                    &grad,
                    &d_h[l],
                    d_c[l].as_ref(),
                )?;
                d_h[l] = dh_prev;
                d_c[l] = dc_prev;
                grad = dx;
            }
        }
        Ok(())
    }

    /// Clears the accumulated gradients of every cell.
    pub fn zero_grads(&mut self) {
        for layer in &mut self.layers {
            layer.cell.zero_grads();
        }
    }

    /// Returns all parameters, layer by layer, in gradient order.
    pub fn parameters(&self) -> Vec<&Tensor> {
        self.layers.iter().flat_map(|l| l.cell.parameters()).collect()
    }

    /// Returns mutable references to all parameters.
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.layers
            .iter_mut()
            .flat_map(|l| l.cell.parameters_mut())
            .collect()
    }

    /// Returns references to the accumulated gradients, parameter-aligned.
    pub fn grads(&self) -> Vec<&Tensor> {
        self.layers.iter().flat_map(|l| l.cell.grads()).collect()
    }

    /// Returns mutable references to the accumulated gradients.
    pub fn grads_mut(&mut self) -> Vec<&mut Tensor> {
        self.layers.iter_mut().flat_map(|l| l.cell.grads_mut()).collect()
    }
}
