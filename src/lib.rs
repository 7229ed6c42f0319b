//! relu_dense: a rectified dense layer with explicit backward passes.
//!
//! A layer exposes two forward paths. `predict` computes an output and keeps
//! nothing; `begin_update` computes the same output (plus dropout) and returns
//! a backward value that, when applied to the output gradient, accumulates
//! parameter gradients, runs an optimizer over them, and hands back the
//! gradient for the previous layer.
//!
//! # Modules
//!
//! - [`tensors`]: Row-major tensors and gradient slots.
//! - [`check`]: Shape contracts checked at every call boundary.
//! - [`backprop`]: The `Layer` / `Backprop` contract and layer chaining.
//! - [`layers`]: `Affine` and `ReLu`.
//! - [`ops`]: The operation set layers compute with (CPU, `rayon`).
//! - [`optim`]: SGD, Adam and gradient accumulation.
//! - [`config`]: JSON layer configs and weight initialisation.
//! - [`error`]: `LayerError` and `ShapeContractError`.
//!
//! # Example
//!
//! ```rust
//! use relu_dense::backprop::{Backprop, Layer};
//! use relu_dense::layers::ReLu;
//! use relu_dense::ops::CpuOps;
//! use relu_dense::optim::Sgd;
//! use relu_dense::tensor;
//! use std::sync::Arc;
//!
//! let ops = Arc::new(CpuOps::with_seed(0));
//! let layer = ReLu::with_params(
//!     tensor!([[0.5, 1.0, 0.0], [1.0, 0.0, 1.0]]),
//!     tensor!([0.0, 0.0]),
//!     ops,
//! )?;
//!
//! let x = tensor!([[1.0, -1.0, 2.0]]);
//! assert_eq!(layer.predict(&x)?, tensor!([[0.0, 3.0]]));
//!
//! let (_, back) = layer.begin_update(&x, 0.0)?;
//! let d_input = back.apply(&tensor!([[1.0, 1.0]]), &mut Sgd::new(0.01))?;
//! assert_eq!(d_input, tensor!([[1.0, 0.0, 1.0]]));
//! # Ok::<(), relu_dense::error::LayerError>(())
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::many_single_char_names,
    clippy::cast_precision_loss,
    clippy::similar_names,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]
#![deny(unsafe_code)]

pub mod backprop;
pub mod check;
pub mod config;
pub mod error;
pub mod layers;
pub mod ops;
pub mod optim;
pub mod tensors;

pub use backprop::{Backprop, Chain, Layer};
pub use error::{LayerError, Result, ShapeContractError};
pub use layers::{Affine, ReLu};
pub use tensors::{Ten64, Tensor, WithGrad};
