//! Shape contracts checked at the top of every public layer operation.
//!
//! A contract is a list of [`Dim`]s. Free dimensions (like the batch size on
//! the way in) accept any size; fixed dimensions must match exactly. A tensor
//! of the wrong rank never satisfies a contract, so a `(nB, nI)` contract
//! rejects 1-D inputs instead of broadcasting them.
//!
//! ```rust
//! use relu_dense::check::{has_shape, Dim};
//! use relu_dense::tensor;
//!
//! let x = tensor!([[1.0, 2.0, 3.0]]);
//! assert!(has_shape("predict", &x, &[Dim::free("nB"), Dim::fixed("nI", 3)]).is_ok());
//! assert!(has_shape("predict", &x, &[Dim::free("nB"), Dim::fixed("nI", 2)]).is_err());
//! ```

use crate::error::ShapeContractError;
use crate::tensors::Tensor;
use core::fmt;

/// One named dimension of a shape contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dim {
    pub name: &'static str,
    pub size: Option<usize>,
}

impl Dim {
    /// A dimension that accepts any size.
    pub const fn free(name: &'static str) -> Self {
        Self { name, size: None }
    }

    /// A dimension that must have exactly `size` elements.
    pub const fn fixed(name: &'static str, size: usize) -> Self {
        Self {
            name,
            size: Some(size),
        }
    }

    fn accepts(&self, got: usize) -> bool {
        self.size.is_none_or(|want| want == got)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.size {
            Some(size) => write!(f, "{}={size}", self.name),
            None => f.write_str(self.name),
        }
    }
}

/// The full expected shape, kept on the error for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapePattern(pub Vec<Dim>);

impl fmt::Display for ShapePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str(")")
    }
}

/// Checks `tensor` against `pattern` on behalf of operation `op`.
///
/// # Errors
/// Returns [`ShapeContractError`] if the rank differs or any fixed dimension
/// does not match.
pub fn has_shape<T>(
    op: &'static str,
    tensor: &Tensor<T>,
    pattern: &[Dim],
) -> Result<(), ShapeContractError> {
    let fits = tensor.shape.len() == pattern.len()
        && pattern
            .iter()
            .zip(&tensor.shape)
            .all(|(dim, &got)| dim.accepts(got));

    if fits {
        Ok(())
    } else {
        Err(ShapeContractError {
            op,
            expected: ShapePattern(pattern.to_vec()),
            got: tensor.shape.clone(),
        })
    }
}
