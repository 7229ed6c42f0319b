use super::affine::Affine;
use crate::backprop::{Backprop, Layer};
use crate::check::{has_shape, Dim};
use crate::config::LayerConfig;
use crate::error::{check_drop_rate, Result};
use crate::ops::{CpuOps, DropoutMask, Ops};
use crate::optim::Optimizer;
use crate::tensors::Ten64;
use std::sync::Arc;

/// A rectified layer: `output = max(0, inner(input))`, followed by dropout
/// while training.
///
/// `ReLu` owns its inner layer (an [`Affine`] by default) and delegates to it;
/// anything implementing [`Layer`] can be wrapped the same way.
///
/// # Example
///
/// ```rust
/// use relu_dense::backprop::{Backprop, Layer};
/// use relu_dense::layers::ReLu;
/// use relu_dense::ops::CpuOps;
/// use relu_dense::optim::Sgd;
/// use relu_dense::tensor;
/// use std::sync::Arc;
///
/// let layer = ReLu::new(3, 2, Arc::new(CpuOps::new())).unwrap();
/// let (out, back) = layer.begin_update(&tensor!([[1.0, -1.0, 2.0]]), 0.0).unwrap();
/// assert!(out.is_non_negative());
/// let d_input = back.apply(&tensor!([[1.0, 1.0]]), &mut Sgd::new(0.1)).unwrap();
/// assert_eq!(d_input.shape, vec![1, 3]);
/// ```
#[derive(Debug)]
pub struct ReLu<L = Affine, O = CpuOps> {
    inner: L,
    ops: Arc<O>,
    drop: f64,
}

impl<O: Ops> ReLu<Affine<O>, O> {
    /// Builds an `n_in → n_out` rectified dense layer.
    ///
    /// # Errors
    /// Fails if either width is zero.
    pub fn new(n_in: usize, n_out: usize, ops: Arc<O>) -> Result<Self> {
        let affine = Affine::new(n_in, n_out, Arc::clone(&ops))?;
        Ok(Self::wrap(affine, ops))
    }

    /// Builds a rectified dense layer from `config`, keeping its `drop` as
    /// the default rate for [`ReLu::begin_update_default`].
    ///
    /// # Errors
    /// Fails if the config does not validate.
    pub fn from_config(config: &LayerConfig, ops: Arc<O>) -> Result<Self> {
        let affine = Affine::from_config(config, Arc::clone(&ops))?;
        Ok(Self {
            inner: affine,
            ops,
            drop: config.drop,
        })
    }

    /// Builds a rectified dense layer from explicit `(nO, nI)` weights and `(nO,)` bias.
    ///
    /// # Errors
    /// Returns a shape error if the parameters disagree.
    pub fn with_params(weights: Ten64, bias: Ten64, ops: Arc<O>) -> Result<Self> {
        let affine = Affine::with_params(weights, bias, Arc::clone(&ops))?;
        Ok(Self::wrap(affine, ops))
    }
}

impl<L: Layer, O: Ops> ReLu<L, O> {
    /// Wraps an existing layer.
    pub const fn wrap(inner: L, ops: Arc<O>) -> Self {
        Self {
            inner,
            ops,
            drop: 0.0,
        }
    }

    /// The wrapped layer.
    pub const fn inner(&self) -> &L {
        &self.inner
    }

    /// Default dropout rate used by [`ReLu::begin_update_default`].
    pub const fn default_drop(&self) -> f64 {
        self.drop
    }

    /// [`Layer::begin_update`] with the layer's configured dropout rate.
    ///
    /// # Errors
    /// As [`Layer::begin_update`].
    pub fn begin_update_default(&self, input: &Ten64) -> Result<(Ten64, ReluBackprop<L::Backprop, O>)> {
        self.begin_update(input, self.drop)
    }

    fn check_input(&self, op: &'static str, input: &Ten64) -> Result<()> {
        has_shape(op, input, &[Dim::free("nB"), Dim::fixed("nI", self.inner.n_in())])?;
        Ok(())
    }
}

impl<L: Layer, O: Ops> Layer for ReLu<L, O> {
    type Backprop = ReluBackprop<L::Backprop, O>;

    fn n_in(&self) -> usize {
        self.inner.n_in()
    }

    fn n_out(&self) -> usize {
        self.inner.n_out()
    }

    fn predict(&self, input: &Ten64) -> Result<Ten64> {
        self.check_input("ReLu::predict", input)?;
        log::trace!("relu predict on {:?}", input.shape);

        let affine_output = self.inner.predict(input)?;
        Ok(self.ops.relu(&affine_output))
    }

    fn begin_update(&self, input: &Ten64, drop: f64) -> Result<(Ten64, Self::Backprop)> {
        self.check_input("ReLu::begin_update", input)?;
        check_drop_rate(drop)?;
        log::trace!("relu begin_update on {:?} (drop={drop})", input.shape);

        // dropout happens once, after the rectifier
        let (affine_output, inner) = self.inner.begin_update(input, 0.0)?;
        let rectified = self.ops.relu(&affine_output);

        let mut output = rectified.clone();
        let mask = self.ops.dropout(&mut output, drop);

        let backprop = ReluBackprop {
            inner,
            rectified,
            mask,
            ops: Arc::clone(&self.ops),
        };
        Ok((output, backprop))
    }
}

/// Backward value of one [`ReLu::begin_update`] call.
///
/// Holds the pre-dropout rectified output (the rectifier's derivative mask),
/// the dropout mask, and the inner layer's backward value.
#[derive(Debug)]
pub struct ReluBackprop<B, O = CpuOps> {
    inner: B,
    rectified: Ten64,
    mask: DropoutMask,
    ops: Arc<O>,
}

impl<B, O> ReluBackprop<B, O> {
    /// The rectified forward output, before dropout.
    pub const fn rectified(&self) -> &Ten64 {
        &self.rectified
    }

    pub const fn dropout_mask(&self) -> &DropoutMask {
        &self.mask
    }
}

impl<B: Backprop, O: Ops> Backprop for ReluBackprop<B, O> {
    fn apply(self, gradient: &Ten64, optimizer: &mut dyn Optimizer) -> Result<Ten64> {
        has_shape(
            "ReLu::finish_update",
            gradient,
            &[
                Dim::fixed("nB", self.rectified.rows()),
                Dim::fixed("nO", self.rectified.cols()),
            ],
        )?;
        log::trace!("relu backward on {:?}", gradient.shape);

        let mut d_rectified = self.mask.backward(gradient);
        self.ops.backprop_relu_inplace(&mut d_rectified, &self.rectified);
        self.inner.apply(&d_rectified, optimizer)
    }
}
