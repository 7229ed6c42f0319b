//! Optimizers invoked by a layer's backward pass.
//!
//! The affine backward accumulates `dW`/`db` into the parameter store and then
//! hands each parameter to the optimizer. An optimizer applies its update in
//! place and resets the gradient slot, so the next backward pass starts from
//! zero.
//!
//! [`Accumulate`] performs no update at all: gradients keep summing across
//! backward passes until a real optimizer is run over them.

use crate::error::{LayerError, Result};
use crate::ops::cpu;
use crate::tensors::{Ten64, WithGrad};
use std::collections::HashMap;

/// Which parameter of a layer is being updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Weights,
    Bias,
}

/// Identifies one parameter tensor across calls, for optimizers with state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamKey {
    /// The owning layer's [`id`](crate::layers::Affine::id).
    pub layer: u64,
    pub param: ParamKind,
}

/// Applies a parameter update given the accumulated gradient.
pub trait Optimizer {
    /// Updates `param.value` from `param.grad`, then zeroes `param.grad`.
    ///
    /// Called for the weights and then the bias of a layer, after both
    /// gradients were accumulated. If a step fails, earlier steps of the same
    /// backward pass stay applied and the accumulated gradients stay in the
    /// store.
    ///
    /// # Errors
    /// Implementations report their own failures as [`LayerError::Optimizer`].
    fn step(&mut self, key: ParamKey, param: &mut WithGrad<Ten64>) -> Result<()>;
}

/// Leaves parameters untouched and lets gradients accumulate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Accumulate;

impl Optimizer for Accumulate {
    fn step(&mut self, _key: ParamKey, _param: &mut WithGrad<Ten64>) -> Result<()> {
        Ok(())
    }
}

/// Plain stochastic gradient descent: `w -= lr * dw`.
#[derive(Debug, Clone, Copy)]
pub struct Sgd {
    lr: f64,
}

impl Sgd {
    pub const fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, key: ParamKey, param: &mut WithGrad<Ten64>) -> Result<()> {
        log::debug!("sgd step on {key:?} (lr={})", self.lr);
        cpu::sgd(param, self.lr);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Moments {
    m: Vec<f64>,
    v: Vec<f64>,
    t: i32,
}

/// Adam with per-parameter moment estimates.
///
/// Defaults: `beta1 = 0.9`, `beta2 = 0.999`, `eps = 1e-8`.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    state: HashMap<ParamKey, Moments>,
}

impl Adam {
    pub fn new(lr: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            state: HashMap::new(),
        }
    }

    /// Overrides the moment decay rates.
    #[must_use]
    pub const fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    /// Number of steps taken for `key` so far.
    pub fn steps(&self, key: ParamKey) -> i32 {
        self.state.get(&key).map_or(0, |s| s.t)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, key: ParamKey, param: &mut WithGrad<Ten64>) -> Result<()> {
        let len = param.value.len();
        let moments = self.state.entry(key).or_insert_with(|| Moments {
            m: vec![0.0; len],
            v: vec![0.0; len],
            t: 0,
        });
        if moments.m.len() != len {
            return Err(LayerError::Optimizer(format!(
                "adam state for {key:?} holds {} moments but the parameter has {len} elements",
                moments.m.len()
            )));
        }

        moments.t += 1;
        log::debug!("adam step {} on {key:?}", moments.t);
        cpu::adam(
            param,
            &mut moments.m,
            &mut moments.v,
            moments.t,
            self.lr,
            self.beta1,
            self.beta2,
            self.eps,
        );
        Ok(())
    }
}
