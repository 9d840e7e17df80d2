//! Conversions between the matrix types used in the crate.
//!
//! Models and residuals use `ndarray`, the bounded optimizer computes its
//! gradient with `faer`, and the SVD / pseudo-inverse code as well as the
//! `levenberg-marquardt` backend work on `nalgebra` matrices.

use faer::{Col, Mat};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

// === ndarray <-> faer ===

pub fn ndarray_to_faer(arr: &Array2<f64>) -> Mat<f64> {
    Mat::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

pub fn ndarray_vec_to_faer(arr: &Array1<f64>) -> Col<f64> {
    Col::from_fn(arr.len(), |i| arr[i])
}

pub fn faer_vec_to_ndarray(col: &Col<f64>) -> Array1<f64> {
    Array1::from_shape_fn(col.nrows(), |i| *col.get(i))
}

// === ndarray <-> nalgebra ===

pub fn ndarray_to_nalgebra(arr: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(arr.nrows(), arr.ncols(), |i, j| arr[[i, j]])
}

pub fn nalgebra_to_ndarray(mat: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

pub fn ndarray_vec_to_nalgebra(arr: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(arr.len(), arr.iter().copied())
}

pub fn nalgebra_vec_to_ndarray(vec: &DVector<f64>) -> Array1<f64> {
    Array1::from_iter(vec.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_faer_round_trip() {
        let arr = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let mat = ndarray_to_faer(&arr);
        assert_eq!(mat.nrows(), 2);
        assert_eq!(mat.ncols(), 3);
        assert_eq!(*mat.get(1, 2), 6.0);

        let v = array![1.5, -2.5];
        assert_eq!(faer_vec_to_ndarray(&ndarray_vec_to_faer(&v)), v);
    }

    #[test]
    fn test_nalgebra_round_trip() {
        let arr = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let mat = ndarray_to_nalgebra(&arr);
        assert_eq!(mat[(2, 1)], 6.0);
        assert_eq!(nalgebra_to_ndarray(&mat), arr);

        let v = array![0.5, 1.5, 2.5];
        assert_eq!(nalgebra_vec_to_ndarray(&ndarray_vec_to_nalgebra(&v)), v);
    }

    #[test]
    fn test_empty_vectors() {
        let empty = Array1::<f64>::zeros(0);
        assert_eq!(nalgebra_vec_to_ndarray(&ndarray_vec_to_nalgebra(&empty)).len(), 0);
        assert_eq!(faer_vec_to_ndarray(&ndarray_vec_to_faer(&empty)).len(), 0);
    }
}
