//! N-dimensional strided views over numeric buffers.
//!
//! A tensor never owns storage independently: [`TensorBase<S>`] is a shape (`dims` plus derived
//! `strides`) laid over some storage `S`. The three storages used across the crate are aliased
//! as [`Tensor`] (owned [`Vector`]), [`TensorView`] (`&[f64]`) and [`TensorViewMut`]
//! (`&mut [f64]`).
//!
//! The first dimension varies fastest: `strides[0] = 1`, `strides[i] = strides[i-1] * dims[i-1]`.

use crate::error::{Error, Result};
use crate::numeric::vector::{write_values, Vector};
use std::fmt;

/// Dims-plus-strides shape over storage `S`.
///
/// Invariant: `dims` is non-empty and `product(dims) == storage length`.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorBase<S> {
    data: S,
    dims: Vec<usize>,
    strides: Vec<usize>,
}

/// Tensor owning its buffer.
pub type Tensor = TensorBase<Vector>;
/// Read-only tensor view.
pub type TensorView<'a> = TensorBase<&'a [f64]>;
/// Mutable tensor view; writes land in the borrowed buffer.
pub type TensorViewMut<'a> = TensorBase<&'a mut [f64]>;

/// Number of elements described by `dims`.
pub fn count_elements(dims: &[usize]) -> usize {
    dims.iter().product()
}

fn strides_for(dims: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(dims.len());
    let mut step = 1;
    for &d in dims {
        strides.push(step);
        step *= d;
    }
    strides
}

fn check_shape(dims: &[usize], len: usize) -> Result<()> {
    if dims.is_empty() {
        return Err(Error::ConstructionInvariant(
            "a tensor needs at least one dimension".to_string(),
        ));
    }
    let count = count_elements(dims);
    if count != len {
        return Err(Error::ConstructionInvariant(format!(
            "dims {:?} describe {} elements but the buffer holds {}",
            dims, count, len
        )));
    }
    Ok(())
}

impl<S: AsRef<[f64]>> TensorBase<S> {
    /// Lays `dims` over `data`.
    ///
    /// # Errors
    /// [`Error::ConstructionInvariant`] if `dims` is empty or its product differs from the
    /// buffer length.
    ///
    /// # Example
    /// ```rust
    /// use layerwise::numeric::{Tensor, TensorView};
    ///
    /// let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    /// let t = TensorView::new(&values[..], &[3, 2]).unwrap();
    /// assert_eq!(t.get(&[2, 1]).unwrap(), 6.0);
    /// assert!(Tensor::from_vec(vec![1.0; 5], &[2, 3]).is_err());
    /// ```
    pub fn new(data: S, dims: &[usize]) -> Result<Self> {
        check_shape(dims, data.as_ref().len())?;
        Ok(Self {
            data,
            dims: dims.to_vec(),
            strides: strides_for(dims),
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Size of the trailing dimension.
    pub fn last_dim(&self) -> usize {
        self.dims[self.dims.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.data.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[f64] {
        self.data.as_ref()
    }

    pub fn into_inner(self) -> S {
        self.data
    }

    /// Flat buffer index of a multi-index.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the arity differs from `ndim()` or a coordinate is out of
    /// range.
    pub fn index_of(&self, position: &[usize]) -> Result<usize> {
        if position.len() != self.dims.len() {
            return Err(Error::shape(
                "tensor index arity",
                self.dims.len(),
                position.len(),
            ));
        }
        let mut flat = 0;
        for ((&p, &d), &s) in position.iter().zip(&self.dims).zip(&self.strides) {
            if p >= d {
                return Err(Error::dims("tensor index", &self.dims, position));
            }
            flat += p * s;
        }
        Ok(flat)
    }

    pub fn get(&self, position: &[usize]) -> Result<f64> {
        let i = self.index_of(position)?;
        Ok(self.as_slice()[i])
    }

    pub fn view(&self) -> TensorView<'_> {
        TensorBase {
            data: self.data.as_ref(),
            dims: self.dims.clone(),
            strides: self.strides.clone(),
        }
    }

    /// Copies the elements into an owned tensor of the same shape.
    pub fn to_tensor(&self) -> Tensor {
        TensorBase {
            data: Vector::from(self.as_slice()),
            dims: self.dims.clone(),
            strides: self.strides.clone(),
        }
    }

    /// Re-lays the same storage under new dims with the same element count.
    pub fn reshape(self, dims: &[usize]) -> Result<Self> {
        TensorBase::new(self.data, dims)
    }

    /// Zero-copy views of each slice along the trailing dimension.
    ///
    /// Slice `i` holds every element whose last coordinate is `i` and has the leading dims.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the tensor has fewer than two dimensions.
    pub fn split_last(&self) -> Result<Vec<TensorView<'_>>> {
        let lower = self.lower_dims("split_last")?;
        let step = count_elements(&lower);
        Ok(chunks(self.as_slice(), step, self.last_dim())
            .map(|chunk| TensorBase {
                data: chunk,
                dims: lower.clone(),
                strides: strides_for(&lower),
            })
            .collect())
    }

    fn lower_dims(&self, context: &'static str) -> Result<Vec<usize>> {
        if self.dims.len() < 2 {
            return Err(Error::shape(context, "at least 2 dimensions", self.dims.len()));
        }
        Ok(self.dims[..self.dims.len() - 1].to_vec())
    }
}

fn chunks(data: &[f64], step: usize, count: usize) -> impl Iterator<Item = &[f64]> {
    (0..count).map(move |i| &data[i * step..(i + 1) * step])
}

impl<S: AsRef<[f64]> + AsMut<[f64]>> TensorBase<S> {
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        self.data.as_mut()
    }

    /// Writes `value` at a multi-index.
    pub fn set(&mut self, position: &[usize], value: f64) -> Result<()> {
        let i = self.index_of(position)?;
        self.as_mut_slice()[i] = value;
        Ok(())
    }

    pub fn fill(&mut self, value: f64) {
        self.as_mut_slice().fill(value);
    }

    pub fn view_mut(&mut self) -> TensorViewMut<'_> {
        TensorBase {
            data: self.data.as_mut(),
            dims: self.dims.clone(),
            strides: self.strides.clone(),
        }
    }

    /// Mutable counterpart of [`split_last`](Self::split_last).
    pub fn split_last_mut(&mut self) -> Result<Vec<TensorViewMut<'_>>> {
        let lower = self.lower_dims("split_last_mut")?;
        let step = count_elements(&lower);
        let strides = strides_for(&lower);
        let count = self.last_dim();
        let mut rest = self.data.as_mut();
        let mut slices = Vec::with_capacity(count);
        for _ in 0..count {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(step);
            slices.push(TensorBase {
                data: head,
                dims: lower.clone(),
                strides: strides.clone(),
            });
            rest = tail;
        }
        Ok(slices)
    }
}

impl Tensor {
    /// Zero-filled tensor.
    pub fn zeros(dims: &[usize]) -> Result<Self> {
        Self::new(Vector::zeros(count_elements(dims)), dims)
    }

    pub fn from_vec(values: Vec<f64>, dims: &[usize]) -> Result<Self> {
        Self::new(Vector::from(values), dims)
    }
}

impl<S: AsRef<[f64]>> AsRef<[f64]> for TensorBase<S> {
    fn as_ref(&self) -> &[f64] {
        self.data.as_ref()
    }
}

impl<S: AsMut<[f64]>> AsMut<[f64]> for TensorBase<S> {
    fn as_mut(&mut self) -> &mut [f64] {
        self.data.as_mut()
    }
}

impl<S: AsRef<[f64]>> fmt::Display for TensorBase<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ", self.dims)?;
        write_values(f, self.as_slice())
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::Tensor;
    use crate::numeric::vector::Vector;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct TensorRepr {
        dims: Vec<usize>,
        data: Vector,
    }

    impl Serialize for Tensor {
        fn serialize<Se: Serializer>(&self, serializer: Se) -> Result<Se::Ok, Se::Error> {
            TensorRepr {
                dims: self.dims.clone(),
                data: self.data.clone(),
            }
            .serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Tensor {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let repr = TensorRepr::deserialize(deserializer)?;
            Tensor::new(repr.data, &repr.dims).map_err(serde::de::Error::custom)
        }
    }
}
