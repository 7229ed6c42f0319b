//! Row-major batch tensors and gradient slots.
//!
//! # Core Tensor Utilities
//!
//! Layers exchange [`Ten64`] values: a flat `Vec<f64>` plus a shape. Inside a
//! layer the shapes are two dimensional, `(nB, nI)` on the way in and
//! `(nB, nO)` on the way out, and they are checked at every call boundary
//! (see [`crate::check`]).
//!
//! ## Design Highlights
//! - `Tensor<T>` stores its shape as a `Vec<usize>`; data is row-major
//! - `WithGrad<T>` pairs a parameter with its accumulated gradient
//! - The `tensor!` macro builds `f64` tensors from nested literals
//!
//! ## Limitations
//! - Row-major only
//! - No broadcasting, slicing, or views
//!
//! ## Example
//!
//! ```rust
//! use relu_dense::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape, vec![2, 3]);
//! assert_eq!(t.row(1), &[4.0, 5.0, 6.0]);
//! ```

/// Represents an N-dimensional tensor with a shape and flat row-major data.
///
/// - `shape` defines the structure, e.g., `[2, 3]` for a 2×3 matrix.
/// - `data` holds the flattened content in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

/// The tensor type every layer in this crate works with.
pub type Ten64 = Tensor<f64>;

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Size of the leading (batch) dimension, `0` for scalars.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Size of the trailing (feature) dimension of a 2-D tensor.
    ///
    /// For 1-D tensors this is the length; scalars report `1`.
    pub fn cols(&self) -> usize {
        self.shape.last().copied().unwrap_or(1)
    }

    /// Borrows row `i` of a 2-D tensor.
    ///
    /// # Panics
    /// Panics if `i` is out of bounds.
    pub fn row(&self, i: usize) -> &[T] {
        let cols = self.cols();
        &self.data[i * cols..(i + 1) * cols]
    }
}

impl<T: Clone + Default> Tensor<T> {
    /// Creates a tensor of the given shape filled with `T::default()`.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![T::default(); len],
        }
    }

    /// Creates a default-filled tensor with the shape of `self`.
    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.shape.clone())
    }
}

impl Ten64 {
    /// `true` if no element is negative (`NaN`s count as negative).
    pub fn is_non_negative(&self) -> bool {
        self.data.iter().all(|&x| x >= 0.0)
    }
}

/// A parameter together with the gradient accumulated for it.
///
/// The gradient is added to by backward passes and reset by the optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct WithGrad<T> {
    pub value: T,
    pub grad: T,
}

impl<T: Clone + Default> WithGrad<Tensor<T>> {
    /// Wraps `value` with a zeroed gradient of the same shape.
    pub fn new(value: Tensor<T>) -> Self {
        let grad = value.zeros_like();
        Self { value, grad }
    }

    /// Resets the gradient to zero.
    pub fn zero_grad(&mut self) {
        self.grad.data.fill(T::default());
    }
}

/// Defines an `f64` tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use relu_dense::tensor;
/// let t = tensor!([[1.0, -2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// assert_eq!(t.data, vec![1.0, -2.0, 3.0, 4.0]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($lit:literal) => {
        $crate::tensors::Tensor::<f64>::new(::std::vec::Vec::<usize>::new(), vec![$lit as f64])
    };

    ([ $( $lit:literal ),+ $(,)? ]) => {{
        let data: ::std::vec::Vec<f64> = vec![ $( $lit as f64 ),+ ];
        $crate::tensors::Tensor::<f64>::new(vec![data.len()], data)
    }};

    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!($inner) ),+ ];
        let first_shape = children[0].shape.clone();
        assert!(children.iter().all(|c| c.shape == first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data = ::std::vec::Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::<f64>::new(shape, data)
    }};
}
