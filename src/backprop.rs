//! The forward/backward contract every layer follows.
//!
//! ## Autograd Pattern
//!
//! 1. **Prediction** (`predict`) computes an output and keeps nothing.
//! 2. **Training forward** (`begin_update`) computes the output and returns a
//!    backward value holding only what *that* call needs.
//! 3. **Backward** (`Backprop::apply`) consumes the backward value: it
//!    accumulates parameter gradients, runs the optimizer over them, and
//!    returns the gradient for the previous layer.
//!
//! Because `apply` takes `self` by value, a backward value can be used at most
//! once. Independent `begin_update` calls produce independent backward values;
//! the only state they share is the layer's parameter store.
//!
//! ## Composition
//!
//! [`Chain`] stacks two layers. Its backward value runs the second layer's
//! backward first and feeds the result into the first layer's backward.

use crate::error::{LayerError, Result};
use crate::optim::Optimizer;
use crate::tensors::Ten64;

/// The backward half of one training forward pass.
pub trait Backprop {
    /// Propagates `gradient` (shaped like the forward output) back through
    /// the layer and returns the gradient with respect to its input.
    ///
    /// `gradient` is never modified.
    ///
    /// # Errors
    /// - [`LayerError::Shape`] if `gradient` does not match the forward output.
    /// - Whatever the optimizer or parameter store reports, unchanged.
    fn apply(self, gradient: &Ten64, optimizer: &mut dyn Optimizer) -> Result<Ten64>;
}

/// A differentiable layer mapping `(nB, nI)` batches to `(nB, nO)` batches.
pub trait Layer {
    type Backprop: Backprop;

    /// Declared input width `nI`.
    fn n_in(&self) -> usize;

    /// Declared output width `nO`.
    fn n_out(&self) -> usize;

    /// Inference-only forward pass.
    ///
    /// # Errors
    /// Returns [`LayerError::Shape`] if `input` is not `(nB, nI)`.
    fn predict(&self, input: &Ten64) -> Result<Ten64>;

    /// Training forward pass with dropout rate `drop` in `[0, 1)`.
    ///
    /// # Errors
    /// Returns [`LayerError::Shape`] if `input` is not `(nB, nI)` and
    /// [`LayerError::InvalidDropRate`] if `drop` is out of range.
    fn begin_update(&self, input: &Ten64, drop: f64) -> Result<(Ten64, Self::Backprop)>;
}

/// Two layers applied one after the other.
#[derive(Debug)]
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A: Layer, B: Layer> Chain<A, B> {
    /// Joins `first` and `second`.
    ///
    /// # Errors
    /// Returns [`LayerError::Config`] if `first`'s output width differs from
    /// `second`'s input width.
    pub fn new(first: A, second: B) -> Result<Self> {
        if first.n_out() != second.n_in() {
            return Err(LayerError::Config(format!(
                "cannot chain a layer with nO={} into a layer with nI={}",
                first.n_out(),
                second.n_in()
            )));
        }
        Ok(Self { first, second })
    }
}

impl<A: Layer, B: Layer> Layer for Chain<A, B> {
    type Backprop = ChainBackprop<A::Backprop, B::Backprop>;

    fn n_in(&self) -> usize {
        self.first.n_in()
    }

    fn n_out(&self) -> usize {
        self.second.n_out()
    }

    fn predict(&self, input: &Ten64) -> Result<Ten64> {
        let hidden = self.first.predict(input)?;
        self.second.predict(&hidden)
    }

    fn begin_update(&self, input: &Ten64, drop: f64) -> Result<(Ten64, Self::Backprop)> {
        let (hidden, first) = self.first.begin_update(input, drop)?;
        let (output, second) = self.second.begin_update(&hidden, drop)?;
        Ok((output, ChainBackprop { first, second }))
    }
}

/// Backward value of a [`Chain`].
#[derive(Debug)]
pub struct ChainBackprop<A, B> {
    first: A,
    second: B,
}

impl<A: Backprop, B: Backprop> Backprop for ChainBackprop<A, B> {
    fn apply(self, gradient: &Ten64, optimizer: &mut dyn Optimizer) -> Result<Ten64> {
        let hidden = self.second.apply(gradient, optimizer)?;
        self.first.apply(&hidden, optimizer)
    }
}
