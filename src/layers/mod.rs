//! Dense layers.
//!
//! - [`Affine`]: `input · Wᵀ + b`, owning the trainable parameters
//! - [`ReLu`]: an inner layer (usually [`Affine`]) followed by `max(0, x)`
//!   and dropout

mod affine;
pub use self::affine::{Affine, AffineBackprop, AffineParams};

mod relu;
pub use self::relu::{ReLu, ReluBackprop};
