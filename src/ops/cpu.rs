//! Parallel CPU backend tensor operations
//!
//! # CPU Backend
//!
//! The default operation set. Row-level work is spread over threads with
//! [`rayon`](https://docs.rs/rayon); every output element is still produced by
//! one sequential reduction, so results are bit-identical between runs.
//!
//! ## Implemented Ops
//!
//! - `matmul` (+ transposed variants): dense products used by the affine layer
//! - `relu_inplace` / `backprop_relu_inplace`: rectifier forward and backward
//! - `dropout_mask` / `scale_inplace`: inverted dropout
//! - `sgd` / `adam`: in-place parameter updates used by [`crate::optim`]

use super::{DropoutMask, Ops};
use crate::tensors::{Ten64, Tensor, WithGrad};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::{Mutex, PoisonError};

/// CPU operation set.
///
/// Owns the random source used for dropout masks. The generator sits behind a
/// mutex so one `CpuOps` can be shared by layers running on several threads.
#[derive(Debug)]
pub struct CpuOps {
    rng: Mutex<StdRng>,
}

impl CpuOps {
    /// Creates an operation set seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Creates an operation set whose dropout masks are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for CpuOps {
    fn default() -> Self {
        Self::new()
    }
}

impl Ops for CpuOps {
    fn matmul(&self, a: &Ten64, b: &Ten64) -> Ten64 {
        matmul(a, b)
    }

    fn matmul_transposed_b(&self, a: &Ten64, b: &Ten64) -> Ten64 {
        matmul_transposed_b(a, b)
    }

    fn matmul_transposed_a(&self, a: &Ten64, b: &Ten64) -> Ten64 {
        matmul_transposed_a(a, b)
    }

    fn relu_inplace(&self, x: &mut Ten64) {
        relu_inplace(x);
    }

    fn backprop_relu_inplace(&self, gradient: &mut Ten64, output: &Ten64) {
        backprop_relu_inplace(gradient, output);
    }

    fn dropout(&self, x: &mut Ten64, rate: f64) -> DropoutMask {
        debug_assert!((0.0..1.0).contains(&rate), "dropout rate {rate} outside [0, 1)");
        if rate <= 0.0 {
            return DropoutMask::identity();
        }
        // a poisoned generator is still a valid generator
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let scale = dropout_mask(&mut *rng, x.len(), rate);
        drop(rng);

        scale_inplace(x, &scale);
        DropoutMask::from_scale(scale)
    }
}

/// Performs a matrix multiplication `C = A × B` on two 2D tensors (`A: m×k`, `B: k×n`).
///
/// # Panics
/// Panics if the inner dimensions of `A` and `B` do not match.
pub fn matmul(a: &Ten64, b: &Ten64) -> Ten64 {
    let (m, k) = (a.rows(), a.cols());
    let n = b.cols();
    assert_eq!(k, b.rows(), "matmul shape mismatch");

    let mut out = vec![0.0; m * n];
    out.par_chunks_mut(n.max(1)).enumerate().for_each(|(i, row)| {
        let a_row = &a.data[i * k..(i + 1) * k];
        for (j, slot) in row.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (l, &x) in a_row.iter().enumerate() {
                sum += x * b.data[l * n + j];
            }
            *slot = sum;
        }
    });

    Tensor::new(vec![m, n], out)
}

/// Computes `A × Bᵀ` for `A: m×k` and `B: n×k` without materialising the transpose.
///
/// # Panics
/// Panics if the trailing dimensions differ.
pub fn matmul_transposed_b(a: &Ten64, b: &Ten64) -> Ten64 {
    let (m, k) = (a.rows(), a.cols());
    let n = b.rows();
    assert_eq!(k, b.cols(), "matmul shape mismatch");

    let mut out = vec![0.0; m * n];
    out.par_chunks_mut(n.max(1)).enumerate().for_each(|(i, row)| {
        let a_row = &a.data[i * k..(i + 1) * k];
        for (j, slot) in row.iter_mut().enumerate() {
            let b_row = &b.data[j * k..(j + 1) * k];
            *slot = a_row.iter().zip(b_row).map(|(x, y)| x * y).sum();
        }
    });

    Tensor::new(vec![m, n], out)
}

/// Computes `Aᵀ × B` for `A: k×m` and `B: k×n`.
///
/// # Panics
/// Panics if the leading dimensions differ.
pub fn matmul_transposed_a(a: &Ten64, b: &Ten64) -> Ten64 {
    let (k, m) = (a.rows(), a.cols());
    let n = b.cols();
    assert_eq!(k, b.rows(), "matmul shape mismatch");

    let mut out = vec![0.0; m * n];
    out.par_chunks_mut(n.max(1)).enumerate().for_each(|(i, row)| {
        for (j, slot) in row.iter_mut().enumerate() {
            let mut sum = 0.0;
            for l in 0..k {
                sum += a.data[l * m + i] * b.data[l * n + j];
            }
            *slot = sum;
        }
    });

    Tensor::new(vec![m, n], out)
}

/// Applies `max(0, x)` element-wise in place.
pub fn relu_inplace(x: &mut Ten64) {
    x.data.par_iter_mut().for_each(|v| {
        if *v <= 0.0 {
            *v = 0.0;
        }
    });
}

/// Passes gradients only where the rectified forward output is positive.
pub fn backprop_relu_inplace(gradient: &mut Ten64, output: &Ten64) {
    debug_assert_eq!(gradient.shape, output.shape, "relu backward shape mismatch");
    gradient
        .data
        .par_iter_mut()
        .zip(output.data.par_iter())
        .for_each(|(g, &y)| {
            if y <= 0.0 {
                *g = 0.0;
            }
        });
}

/// Draws an inverted-dropout mask of `len` elements.
///
/// Each element survives with probability `1 - rate` and then carries
/// `1 / (1 - rate)`; dropped elements carry `0`.
pub fn dropout_mask<R: Rng + ?Sized>(rng: &mut R, len: usize, rate: f64) -> Vec<f64> {
    let keep = 1.0 / (1.0 - rate);
    (0..len)
        .map(|_| if rng.random::<f64>() >= rate { keep } else { 0.0 })
        .collect()
}

/// Multiplies `x` element-wise by `scale`.
pub fn scale_inplace(x: &mut Ten64, scale: &[f64]) {
    x.data
        .par_iter_mut()
        .zip(scale.par_iter())
        .for_each(|(v, &s)| *v *= s);
}

/// Performs one step of stochastic gradient descent (SGD) on the given parameter tensor.
///
/// # Formula
/// $$ w := w - \\text{lr} \\cdot \\frac{\\partial L}{\\partial w} $$
///
/// # Behavior
/// - Updates `w.value` in-place
/// - Zeros out `w.grad` after update (gradient reset step)
pub fn sgd(w: &mut WithGrad<Ten64>, lr: f64) {
    for (param, grad) in w.value.data.iter_mut().zip(&w.grad.data) {
        *param -= lr * *grad;
    }
    w.zero_grad();
}

/// Performs one step of Adam optimization on the given parameter tensor.
///
/// # Arguments
/// - `w`: Tensor with gradient to be updated
/// - `m`, `v`: First and second moment estimates (same length as `w`)
/// - `t`: Current timestep (1-based)
/// - `lr`, `beta1`, `beta2`, `eps`: Hyperparameters
#[allow(clippy::too_many_arguments)]
pub fn adam(
    w: &mut WithGrad<Ten64>,
    m: &mut [f64],
    v: &mut [f64],
    t: i32,
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
) {
    let correction1 = 1.0 - beta1.powi(t);
    let correction2 = 1.0 - beta2.powi(t);

    for ((param, grad), (m_val, v_val)) in w
        .value
        .data
        .iter_mut()
        .zip(&w.grad.data)
        .zip(m.iter_mut().zip(v.iter_mut()))
    {
        *m_val = beta1 * *m_val + (1.0 - beta1) * *grad;
        *v_val = beta2 * *v_val + (1.0 - beta2) * (*grad * *grad);

        let m_hat = *m_val / correction1;
        let v_hat = *v_val / correction2;

        *param -= lr * m_hat / (v_hat.sqrt() + eps);
    }

    w.zero_grad();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor;

    #[test]
    fn matmul_forward_matches_hand_computation() {
        let a = tensor!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let b = tensor!([[7.0, 8.0], [9.0, 10.0], [11.0, 12.0]]);

        let out = matmul(&a, &b);

        assert_eq!(out.shape, vec![2, 2]);
        assert_eq!(out.data, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn transposed_products_agree_with_plain_matmul() {
        let a = tensor!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let w = tensor!([[1.0, 0.0, -1.0], [2.0, 1.0, 0.5]]);
        let w_t = tensor!([[1.0, 2.0], [0.0, 1.0], [-1.0, 0.5]]);
        assert_eq!(matmul_transposed_b(&a, &w), matmul(&a, &w_t));

        let g = tensor!([[1.0, -1.0], [0.5, 2.0]]);
        assert_eq!(matmul_transposed_a(&g, &a), matmul(&tensor!([[1.0, 0.5], [-1.0, 2.0]]), &a));
    }

    #[test]
    #[should_panic(expected = "matmul shape mismatch")]
    fn matmul_panics_on_invalid_shape() {
        let a = Tensor::new(vec![2, 3], vec![1.0; 6]);
        let b = Tensor::new(vec![4, 2], vec![1.0; 8]);
        let _ = matmul(&a, &b);
    }

    #[test]
    fn relu_forward_and_backward() {
        let mut x = tensor!([-1.0, 0.0, 1.0, 2.0]);
        relu_inplace(&mut x);
        assert_eq!(x.data, vec![0.0, 0.0, 1.0, 2.0]);

        let mut grad = tensor!([1.0, 1.0, 1.0, 1.0]);
        backprop_relu_inplace(&mut grad, &x);
        assert_eq!(grad.data, vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn relu_keeps_negative_zero_out_of_output() {
        let mut x = tensor!([-0.0, -3.5]);
        relu_inplace(&mut x);
        assert!(x.data.iter().all(|v| v.to_bits() == 0.0f64.to_bits()));
    }

    #[test]
    fn zero_rate_dropout_is_identity() {
        let ops = CpuOps::with_seed(7);
        let mut x = tensor!([[1.0, -2.0, 3.0]]);
        let mask = ops.dropout(&mut x, 0.0);
        assert!(mask.is_identity());
        assert_eq!(x, tensor!([[1.0, -2.0, 3.0]]));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside [0, 1)")]
    fn dropout_rejects_nan_rate() {
        let ops = CpuOps::with_seed(1);
        let mut x = Tensor::new(vec![2, 2], vec![1.0; 4]);
        let _ = ops.dropout(&mut x, f64::NAN);
    }

    #[test]
    fn dropout_rescales_survivors() {
        let ops = CpuOps::with_seed(11);
        let mut x = Tensor::new(vec![10, 10], vec![1.0; 100]);
        let mask = ops.dropout(&mut x, 0.5);

        let scale = mask.scale().unwrap();
        for (&v, &s) in x.data.iter().zip(scale) {
            assert!(s == 0.0 || s == 2.0);
            assert_eq!(v, s);
        }
        assert!(x.data.iter().any(|&v| v == 0.0));
        assert!(x.data.iter().any(|&v| v == 2.0));
    }

    #[test]
    fn seeded_dropout_is_reproducible() {
        let mut a = Tensor::new(vec![4, 4], vec![1.0; 16]);
        let mut b = a.clone();
        CpuOps::with_seed(3).dropout(&mut a, 0.3);
        CpuOps::with_seed(3).dropout(&mut b, 0.3);
        assert_eq!(a, b);
    }

    #[test]
    fn sgd_updates_parameters_and_zeros_gradients() {
        let mut w = WithGrad::new(tensor!([10.0, 20.0, 30.0]));
        w.grad = tensor!([1.0, 2.0, 3.0]);

        sgd(&mut w, 0.5);

        assert_eq!(w.value.data, vec![9.5, 19.0, 28.5]);
        assert!(w.grad.data.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn adam_first_step_moves_by_learning_rate() {
        let mut w = WithGrad::new(tensor!([1.0, -1.0]));
        w.grad = tensor!([0.5, -2.0]);
        let (mut m, mut v) = (vec![0.0; 2], vec![0.0; 2]);

        adam(&mut w, &mut m, &mut v, 1, 0.1, 0.9, 0.999, 1e-8);

        // bias-corrected first step is lr * sign(g)
        assert!((w.value.data[0] - 0.9).abs() < 1e-6);
        assert!((w.value.data[1] + 0.9).abs() < 1e-6);
        assert!(w.grad.data.iter().all(|&g| g == 0.0));
    }
}
