use relu_dense::tensor;
use relu_dense::tensors::{Tensor, WithGrad};

#[test]
fn test_tensor_creation() {
    let t = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(t.shape, vec![2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!((t.rows(), t.cols(), t.rank()), (2, 2, 2));
}

#[test]
fn test_tensor_shape_mismatch_panics() {
    let result = std::panic::catch_unwind(|| {
        Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0]);
    });
    assert!(result.is_err());
}

#[test]
fn test_tensor_macro() {
    let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
    assert_eq!(t.shape, vec![2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_tensor_macro_negative_and_integer_literals() {
    let t = tensor!([[1, -1, 2]]);
    assert_eq!(t.shape, vec![1, 3]);
    assert_eq!(t.data, vec![1.0, -1.0, 2.0]);
}

#[test]
#[should_panic(expected = "ragged tensor literal")]
fn test_tensor_macro_rejects_ragged_rows() {
    let _ = tensor!([[1.0, 2.0], [3.0]]);
}

#[test]
fn test_rows_borrow_row_major_slices() {
    let t = tensor!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    assert_eq!(t.row(0), &[1.0, 2.0, 3.0]);
    assert_eq!(t.row(1), &[4.0, 5.0, 6.0]);
}

#[test]
fn test_with_grad_starts_at_zero() {
    let mut w = WithGrad::new(tensor!([[1.0, 2.0]]));
    assert_eq!(w.grad, Tensor::zeros(vec![1, 2]));
    w.grad.data[1] = 3.0;
    w.zero_grad();
    assert!(w.grad.data.iter().all(|&g| g == 0.0));
}

#[test]
fn test_non_negative() {
    assert!(tensor!([0.0, 1.0]).is_non_negative());
    assert!(!tensor!([0.0, -1.0]).is_non_negative());
    assert!(!Tensor::new(vec![1], vec![f64::NAN]).is_non_negative());
}
