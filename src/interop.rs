//! Conversions between this crate's numeric types and `ndarray` arrays.
//!
//! Enabled with the `ndarray` feature. [`Matrix`] maps to `Array2` row by row; [`Tensor`] maps to
//! `ArrayD` with the same multi-index, so `tensor.get(&[i, j, k]) == array[[i, j, k]]`.

use crate::error::{Error, Result};
use crate::numeric::{Matrix, Tensor, Vector};
use ndarray::{Array1, Array2, ArrayD, Dimension, IxDyn};

impl From<&Vector> for Array1<f64> {
    fn from(v: &Vector) -> Self {
        Array1::from(v.as_slice().to_vec())
    }
}

impl From<Array1<f64>> for Vector {
    fn from(a: Array1<f64>) -> Self {
        a.iter().copied().collect()
    }
}

impl From<&Matrix> for Array2<f64> {
    fn from(m: &Matrix) -> Self {
        Array2::from_shape_fn((m.rows(), m.cols()), |(r, c)| m[(r, c)])
    }
}

impl From<&Array2<f64>> for Matrix {
    fn from(a: &Array2<f64>) -> Self {
        let mut out = Matrix::new(a.nrows(), a.ncols());
        for ((r, c), &v) in a.indexed_iter() {
            out[(r, c)] = v;
        }
        out
    }
}

impl From<&Tensor> for ArrayD<f64> {
    fn from(t: &Tensor) -> Self {
        let values = t.as_slice();
        let strides = t.strides();
        ArrayD::from_shape_fn(IxDyn(t.dims()), |index| {
            let offset: usize = (0..index.ndim()).map(|i| index[i] * strides[i]).sum();
            values[offset]
        })
    }
}

impl TryFrom<&ArrayD<f64>> for Tensor {
    type Error = Error;

    /// # Errors
    /// [`Error::ConstructionInvariant`] for a zero-dimensional array.
    fn try_from(a: &ArrayD<f64>) -> Result<Self> {
        // Reversing the axes walks the array first-dim-fastest, which is tensor storage order.
        let data: Vec<f64> = a.t().iter().copied().collect();
        Tensor::from_vec(data, a.shape())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_matrix_round_trip() {
        let m = Matrix::from_rows([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        let a = Array2::from(&m);
        assert_eq!(a, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(Matrix::from(&a).as_slice(), m.as_slice());
    }

    #[test]
    fn test_vector_round_trip() {
        let v = Vector::from(vec![1.5, -2.0]);
        let a = Array1::from(&v);
        assert_eq!(a, array![1.5, -2.0]);
        assert_eq!(Vector::from(a), v);
    }

    #[test]
    fn test_tensor_keeps_multi_index() {
        let t = Tensor::from_vec((0..24).map(f64::from).collect(), &[2, 3, 4]).unwrap();
        let a = ArrayD::from(&t);
        assert_eq!(a.shape(), &[2, 3, 4]);
        assert_eq!(a[[1, 2, 3]], t.get(&[1, 2, 3]).unwrap());
        assert_eq!(a[[1, 0, 2]], t.get(&[1, 0, 2]).unwrap());

        let back = Tensor::try_from(&a).unwrap();
        assert_eq!(back.as_slice(), t.as_slice());
        assert_eq!(back.dims(), t.dims());
    }

    #[test]
    fn test_scalar_array_is_rejected() {
        let a = ArrayD::from_elem(IxDyn(&[]), 1.0);
        assert!(matches!(
            Tensor::try_from(&a),
            Err(Error::ConstructionInvariant(_))
        ));
    }
}
