//! # Operation Set
//!
//! Layers never touch tensor data directly for the heavy lifting; they go
//! through an [`Ops`] implementation shared between the affine transform and
//! the rectifier wrapped around it.
//!
//! ## Submodules
//!
//! - [`cpu`]: Multi-threaded CPU kernels and the default [`CpuOps`]
//!
//! ## Contract
//!
//! - Every operation preserves the shape of its tensor argument.
//! - `*_inplace` variants overwrite their first argument; the plain variants
//!   allocate a fresh tensor and leave their inputs untouched.
//! - Dropout is applied in place and hands back a [`DropoutMask`] that undoes
//!   its effect on the incoming gradient.
//!
//! Shape checks belong to the callers (see [`crate::check`]); kernels only
//! `debug_assert!` their preconditions.
//!
//! ## Adding an Operation
//!
//! 1. Implement the kernel in [`cpu`]
//! 2. Expose it on the [`Ops`] trait
//! 3. Check shapes in the layer that calls it

use crate::tensors::Ten64;

pub mod cpu;
pub use self::cpu::CpuOps;

/// The tensor operations a layer consumes.
pub trait Ops: Send + Sync {
    /// `a · b` for `a: (m, k)` and `b: (k, n)`.
    fn matmul(&self, a: &Ten64, b: &Ten64) -> Ten64;

    /// `a · bᵀ` for `a: (m, k)` and `b: (n, k)`.
    fn matmul_transposed_b(&self, a: &Ten64, b: &Ten64) -> Ten64;

    /// `aᵀ · b` for `a: (k, m)` and `b: (k, n)`.
    fn matmul_transposed_a(&self, a: &Ten64, b: &Ten64) -> Ten64;

    /// Rectifies `x` in place: `x = max(0, x)`.
    fn relu_inplace(&self, x: &mut Ten64);

    /// Zeroes `gradient` wherever `output` (the rectified forward value) is not positive.
    fn backprop_relu_inplace(&self, gradient: &mut Ten64, output: &Ten64);

    /// Zeroes elements of `x` with probability `rate` and rescales survivors
    /// by `1 / (1 - rate)`.
    ///
    /// A `rate` of `0` leaves `x` alone and returns [`DropoutMask::identity`].
    fn dropout(&self, x: &mut Ten64, rate: f64) -> DropoutMask;

    /// Out-of-place rectifier; `x` is not modified.
    fn relu(&self, x: &Ten64) -> Ten64 {
        let mut out = x.clone();
        self.relu_inplace(&mut out);
        out
    }

    /// Out-of-place rectifier backward; `gradient` is not modified.
    fn backprop_relu(&self, gradient: &Ten64, output: &Ten64) -> Ten64 {
        let mut out = gradient.clone();
        self.backprop_relu_inplace(&mut out, output);
        out
    }
}

/// The scaled keep-mask produced by one dropout call.
///
/// Kept elements carry `1 / (1 - rate)`, dropped ones `0`. Applying the mask
/// to the output gradient is the whole dropout backward pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DropoutMask {
    scale: Option<Vec<f64>>,
}

impl DropoutMask {
    /// The mask of a zero-rate dropout: every element kept, no rescaling.
    pub const fn identity() -> Self {
        Self { scale: None }
    }

    pub(crate) const fn from_scale(scale: Vec<f64>) -> Self {
        Self { scale: Some(scale) }
    }

    /// `true` if this mask leaves gradients unchanged.
    pub const fn is_identity(&self) -> bool {
        self.scale.is_none()
    }

    /// Per-element scale factors, `None` for the identity mask.
    pub fn scale(&self) -> Option<&[f64]> {
        self.scale.as_deref()
    }

    /// Undoes dropout on `gradient`, returning a fresh tensor.
    ///
    /// # Panics
    /// Panics in debug builds if `gradient` has a different element count
    /// than the tensor the mask was drawn for.
    pub fn backward(&self, gradient: &Ten64) -> Ten64 {
        match &self.scale {
            None => gradient.clone(),
            Some(scale) => {
                debug_assert_eq!(scale.len(), gradient.len(), "dropout mask length mismatch");
                let mut out = gradient.clone();
                cpu::scale_inplace(&mut out, scale);
                out
            }
        }
    }
}
