use crate::backprop::{Backprop, Layer};
use crate::check::{has_shape, Dim};
use crate::config::LayerConfig;
use crate::error::{check_drop_rate, LayerError, Result};
use crate::ops::{CpuOps, DropoutMask, Ops};
use crate::optim::{Optimizer, ParamKey, ParamKind};
use crate::tensors::{Ten64, Tensor, WithGrad};
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Source of layer ids, used as optimizer keys.
static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(0);

/// The trainable parameters of an [`Affine`] layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineParams {
    /// Shape `(nO, nI)`.
    pub weights: WithGrad<Ten64>,
    /// Shape `(nO,)`.
    pub bias: WithGrad<Ten64>,
}

/// Dense affine transform `output = input · Wᵀ + b`.
///
/// Parameters live in a shared store so that backward values can outlive the
/// borrow of the layer and still update it; reads and optimizer writes are
/// serialized by the store's lock.
#[derive(Debug)]
pub struct Affine<O = CpuOps> {
    id: u64,
    n_in: usize,
    n_out: usize,
    params: Arc<RwLock<AffineParams>>,
    ops: Arc<O>,
}

impl<O: Ops> Affine<O> {
    /// Builds an `n_in → n_out` layer with Xavier-uniform weights and zero bias.
    ///
    /// # Errors
    /// Fails if either width is zero.
    pub fn new(n_in: usize, n_out: usize, ops: Arc<O>) -> Result<Self> {
        Self::from_config(&LayerConfig::new(n_in, n_out), ops)
    }

    /// Builds a layer as described by `config`.
    ///
    /// # Errors
    /// Fails if the config does not validate or the weights cannot be drawn.
    pub fn from_config(config: &LayerConfig, ops: Arc<O>) -> Result<Self> {
        let config = config.clone().validated()?;
        let weights = config.init_weights()?;
        let bias = Tensor::zeros(vec![config.n_out]);
        Self::with_params(weights, bias, ops)
    }

    /// Builds a layer from explicit parameters.
    ///
    /// # Errors
    /// Returns [`LayerError::Shape`] unless `weights` is `(nO, nI)` and `bias`
    /// is `(nO,)` with non-zero widths.
    pub fn with_params(weights: Ten64, bias: Ten64, ops: Arc<O>) -> Result<Self> {
        has_shape("Affine::with_params", &weights, &[Dim::free("nO"), Dim::free("nI")])?;
        let (n_out, n_in) = (weights.rows(), weights.cols());
        has_shape("Affine::with_params", &bias, &[Dim::fixed("nO", n_out)])?;
        if n_in == 0 || n_out == 0 {
            return Err(LayerError::Config(format!(
                "affine widths must be non-zero, got nI={n_in} nO={n_out}"
            )));
        }

        let id = NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("created affine layer {id} ({n_in} -> {n_out})");
        Ok(Self {
            id,
            n_in,
            n_out,
            params: Arc::new(RwLock::new(AffineParams {
                weights: WithGrad::new(weights),
                bias: WithGrad::new(bias),
            })),
            ops,
        })
    }

    /// Process-unique id, used to key optimizer state.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// A copy of the current weights, biases and accumulated gradients.
    ///
    /// # Errors
    /// Returns [`LayerError::PoisonedParams`] if a writer panicked.
    pub fn params(&self) -> Result<AffineParams> {
        Ok(read_params(&self.params)?.clone())
    }

    /// Computes `input · Wᵀ + b` with the current parameters.
    fn forward(&self, input: &Ten64) -> Result<Ten64> {
        let params = read_params(&self.params)?;
        let mut output = self.ops.matmul_transposed_b(input, &params.weights.value);
        add_bias(&mut output, &params.bias.value);
        Ok(output)
    }

    fn check_input(&self, op: &'static str, input: &Ten64) -> Result<()> {
        has_shape(op, input, &[Dim::free("nB"), Dim::fixed("nI", self.n_in)])?;
        Ok(())
    }
}

impl<O: Ops> Layer for Affine<O> {
    type Backprop = AffineBackprop<O>;

    fn n_in(&self) -> usize {
        self.n_in
    }

    fn n_out(&self) -> usize {
        self.n_out
    }

    fn predict(&self, input: &Ten64) -> Result<Ten64> {
        self.check_input("Affine::predict", input)?;
        log::trace!("affine {} predict on {:?}", self.id, input.shape);
        self.forward(input)
    }

    fn begin_update(&self, input: &Ten64, drop: f64) -> Result<(Ten64, Self::Backprop)> {
        self.check_input("Affine::begin_update", input)?;
        check_drop_rate(drop)?;
        log::trace!("affine {} begin_update on {:?} (drop={drop})", self.id, input.shape);

        let mut output = self.forward(input)?;
        let mask = self.ops.dropout(&mut output, drop);

        let backprop = AffineBackprop {
            layer: self.id,
            n_out: self.n_out,
            input: input.clone(),
            mask,
            params: Arc::clone(&self.params),
            ops: Arc::clone(&self.ops),
        };
        Ok((output, backprop))
    }
}

/// Backward value of one [`Affine::begin_update`] call.
#[derive(Debug)]
pub struct AffineBackprop<O = CpuOps> {
    layer: u64,
    n_out: usize,
    input: Ten64,
    mask: DropoutMask,
    params: Arc<RwLock<AffineParams>>,
    ops: Arc<O>,
}

impl<O: Ops> Backprop for AffineBackprop<O> {
    fn apply(self, gradient: &Ten64, optimizer: &mut dyn Optimizer) -> Result<Ten64> {
        has_shape(
            "Affine::finish_update",
            gradient,
            &[Dim::fixed("nB", self.input.rows()), Dim::fixed("nO", self.n_out)],
        )?;
        log::trace!("affine {} backward on {:?}", self.layer, gradient.shape);

        let d_out = self.mask.backward(gradient);
        let d_weights = self.ops.matmul_transposed_a(&d_out, &self.input);
        let d_bias = column_sums(&d_out);

        let mut params = write_params(&self.params)?;
        // input gradient uses the weights this step started from
        let d_input = self.ops.matmul(&d_out, &params.weights.value);

        accumulate(&mut params.weights.grad, &d_weights);
        accumulate(&mut params.bias.grad, &d_bias);

        optimizer.step(
            ParamKey {
                layer: self.layer,
                param: ParamKind::Weights,
            },
            &mut params.weights,
        )?;
        optimizer.step(
            ParamKey {
                layer: self.layer,
                param: ParamKind::Bias,
            },
            &mut params.bias,
        )?;

        Ok(d_input)
    }
}

fn read_params(params: &RwLock<AffineParams>) -> Result<RwLockReadGuard<'_, AffineParams>> {
    params.read().map_err(|_| {
        log::warn!("affine parameter store poisoned");
        LayerError::PoisonedParams
    })
}

fn write_params(params: &RwLock<AffineParams>) -> Result<RwLockWriteGuard<'_, AffineParams>> {
    params.write().map_err(|_| {
        log::warn!("affine parameter store poisoned");
        LayerError::PoisonedParams
    })
}

/// Adds `bias` to every row of `output`.
fn add_bias(output: &mut Ten64, bias: &Ten64) {
    let cols = bias.len();
    for row in output.data.chunks_mut(cols) {
        for (v, b) in row.iter_mut().zip(&bias.data) {
            *v += b;
        }
    }
}

/// Sums a `(nB, nO)` tensor over the batch into an `(nO,)` tensor.
fn column_sums(x: &Ten64) -> Ten64 {
    let cols = x.cols();
    let mut sums = vec![0.0; cols];
    for row in x.data.chunks(cols) {
        for (acc, v) in sums.iter_mut().zip(row) {
            *acc += v;
        }
    }
    Tensor::new(vec![cols], sums)
}

fn accumulate(grad: &mut Ten64, delta: &Ten64) {
    debug_assert_eq!(grad.shape, delta.shape, "gradient accumulation shape mismatch");
    for (g, d) in grad.data.iter_mut().zip(&delta.data) {
        *g += d;
    }
}
