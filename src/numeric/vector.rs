//! One-dimensional numeric buffers.
//!
//! [`Vector`] owns its storage. Sub-range views are plain borrowed slices (`&[f64]` /
//! `&mut [f64]`), so a view always aliases the buffer it was taken from and mutation through a
//! mutable view is visible in the owner. All arithmetic lives on [`VectorOps`], which is
//! implemented for `[f64]` and therefore available on owned buffers, views, matrix rows and
//! tensor slices alike.

use crate::error::{Error, Result};
use crate::numeric::matrix::Matrix;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// An owned, growable buffer of `f64` values.
///
/// Dereferences to `[f64]`, so indexing (`v[i]`, `v[i] = x`), `fill`, `fill_with`, `iter` and
/// every [`VectorOps`] method work directly on it.
///
/// # Example
/// ```rust
/// use layerwise::numeric::{Vector, VectorOps};
///
/// let mut v = Vector::from(vec![1.0, 2.0, 3.0]);
/// v.scale(2.0);
/// assert_eq!(v.as_slice(), &[2.0, 4.0, 6.0]);
/// assert_eq!(v.dot(&[1.0, 0.0, 1.0]).unwrap(), 8.0);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Vector(Vec<f64>);

impl Vector {
    /// Creates a zero-filled buffer of length `len`.
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    /// Creates a buffer where element `i` is `f(i)`.
    pub fn from_fn(len: usize, f: impl FnMut(usize) -> f64) -> Self {
        Self((0..len).map(f).collect())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Returns a read-only view of `len` elements starting at `offset`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `offset + len` exceeds the buffer length.
    pub fn view(&self, offset: usize, len: usize) -> Result<&[f64]> {
        check_range(self.0.len(), offset, len)?;
        Ok(&self.0[offset..offset + len])
    }

    /// Returns a mutable view of `len` elements starting at `offset`.
    ///
    /// Writes through the view land in this buffer.
    pub fn view_mut(&mut self, offset: usize, len: usize) -> Result<&mut [f64]> {
        check_range(self.0.len(), offset, len)?;
        Ok(&mut self.0[offset..offset + len])
    }

    /// Outer product `a ⊗ b`: a `a.len() × b.len()` matrix with `m[(i, j)] = a[i] * b[j]`.
    pub fn outer_product(a: &[f64], b: &[f64]) -> Matrix {
        let mut out = Matrix::new(a.len(), b.len());
        for (i, &ai) in a.iter().enumerate() {
            for (dst, &bj) in out.row_mut(i).iter_mut().zip(b) {
                *dst = ai * bj;
            }
        }
        out
    }
}

fn check_range(len: usize, offset: usize, count: usize) -> Result<()> {
    match offset.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::shape(
            "vector view",
            format!("offset + length <= {}", len),
            format!("{} + {}", offset, count),
        )),
    }
}

impl Deref for Vector {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl DerefMut for Vector {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.0
    }
}

impl AsRef<[f64]> for Vector {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

impl AsMut<[f64]> for Vector {
    fn as_mut(&mut self) -> &mut [f64] {
        &mut self.0
    }
}

impl From<Vec<f64>> for Vector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl From<&[f64]> for Vector {
    fn from(values: &[f64]) -> Self {
        Self(values.to_vec())
    }
}

impl From<Vector> for Vec<f64> {
    fn from(v: Vector) -> Self {
        v.0
    }
}

impl FromIterator<f64> for Vector {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_values(f, &self.0)
    }
}

pub(crate) fn write_values(f: &mut fmt::Formatter<'_>, values: &[f64]) -> fmt::Result {
    write!(f, "[")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{:.3}", v)?;
    }
    write!(f, "]")
}

/// Arithmetic over numeric buffers and views.
///
/// Binary operations fail with [`Error::ShapeMismatch`] when operand lengths differ.
pub trait VectorOps {
    /// Multiplies every element by `s`.
    fn scale(&mut self, s: f64);

    /// Adds `s` to every element.
    fn add_scalar(&mut self, s: f64);

    /// Element-wise `self[i] += other[i]`.
    fn add(&mut self, other: &[f64]) -> Result<()>;

    /// Element-wise `self[i] += s * other[i]`.
    fn add_scaled(&mut self, other: &[f64], s: f64) -> Result<()>;

    fn dot(&self, other: &[f64]) -> Result<f64>;

    fn squared_magnitude(&self) -> f64;

    fn squared_distance(&self, other: &[f64]) -> Result<f64>;

    /// Sum of absolute element-wise differences.
    fn error_against(&self, other: &[f64]) -> Result<f64>;

    /// Sum of all elements.
    fn reduce(&self) -> f64;

    /// Index of the largest element; the first one wins ties. `None` when empty.
    fn max_index(&self) -> Option<usize>;

    /// Returns a new buffer with `f` applied to every element.
    fn map<F: Fn(f64) -> f64>(&self, f: F) -> Vector;

    /// Copies `values` into `self` starting at `start`, clipped to the remaining length.
    ///
    /// Returns the number of elements written.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `start` is not a valid index.
    fn write_at(&mut self, start: usize, values: &[f64]) -> Result<usize>;
}

fn same_len(context: &'static str, a: &[f64], b: &[f64]) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::shape(context, a.len(), b.len()));
    }
    Ok(())
}

impl VectorOps for [f64] {
    fn scale(&mut self, s: f64) {
        self.iter_mut().for_each(|x| *x *= s);
    }

    fn add_scalar(&mut self, s: f64) {
        self.iter_mut().for_each(|x| *x += s);
    }

    fn add(&mut self, other: &[f64]) -> Result<()> {
        same_len("add", self, other)?;
        self.iter_mut().zip(other).for_each(|(x, &o)| *x += o);
        Ok(())
    }

    fn add_scaled(&mut self, other: &[f64], s: f64) -> Result<()> {
        same_len("add_scaled", self, other)?;
        self.iter_mut().zip(other).for_each(|(x, &o)| *x += s * o);
        Ok(())
    }

    fn dot(&self, other: &[f64]) -> Result<f64> {
        same_len("dot", self, other)?;
        Ok(self.iter().zip(other).map(|(a, b)| a * b).sum())
    }

    fn squared_magnitude(&self) -> f64 {
        self.iter().map(|x| x * x).sum()
    }

    fn squared_distance(&self, other: &[f64]) -> Result<f64> {
        same_len("squared_distance", self, other)?;
        Ok(self
            .iter()
            .zip(other)
            .map(|(a, b)| (a - b) * (a - b))
            .sum())
    }

    fn error_against(&self, other: &[f64]) -> Result<f64> {
        same_len("error_against", self, other)?;
        Ok(self.iter().zip(other).map(|(a, b)| (a - b).abs()).sum())
    }

    fn reduce(&self) -> f64 {
        self.iter().sum()
    }

    fn max_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &v) in self.iter().enumerate() {
            match best {
                Some((_, b)) if v <= b => {}
                _ => best = Some((i, v)),
            }
        }
        best.map(|(i, _)| i)
    }

    fn map<F: Fn(f64) -> f64>(&self, f: F) -> Vector {
        self.iter().map(|&x| f(x)).collect()
    }

    fn write_at(&mut self, start: usize, values: &[f64]) -> Result<usize> {
        if start >= self.len() {
            return Err(Error::shape(
                "write_at",
                format!("start index < {}", self.len()),
                start,
            ));
        }
        let count = values.len().min(self.len() - start);
        self[start..start + count].copy_from_slice(&values[..count]);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_view_aliases_owner() {
        let mut v = Vector::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        {
            let view = v.view_mut(1, 3).unwrap();
            view.scale(10.0);
        }
        assert_eq!(v.as_slice(), &[1.0, 20.0, 30.0, 40.0, 5.0]);
        assert_eq!(v.view(3, 2).unwrap(), &[40.0, 5.0]);
    }

    #[test]
    fn test_view_out_of_range() {
        let v = Vector::zeros(4);
        assert!(matches!(v.view(2, 3), Err(Error::ShapeMismatch { .. })));
        assert!(v.view(usize::MAX, 2).is_err());
        assert!(v.view(4, 0).is_ok());
    }

    #[test]
    fn test_fill_and_fill_with() {
        let mut v = Vector::zeros(3);
        v.fill(2.5);
        assert_eq!(v.as_slice(), &[2.5, 2.5, 2.5]);
        let mut n = 0.0;
        v.fill_with(|| {
            n += 1.0;
            n
        });
        assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_add_scaled() {
        let mut v = Vector::from(vec![1.0, 1.0]);
        v.add_scaled(&[2.0, -4.0], 0.5).unwrap();
        assert_eq!(v.as_slice(), &[2.0, -1.0]);
    }

    #[test]
    fn test_binary_ops_reject_mismatched_sizes() {
        let mut v = Vector::zeros(3);
        let other = [1.0, 2.0];
        assert!(v.add_scaled(&other, 1.0).is_err());
        assert!(v.add(&other).is_err());
        assert!(v.dot(&other).is_err());
        assert!(v.squared_distance(&other).is_err());
        assert!(v.error_against(&other).is_err());
    }

    #[test]
    fn test_magnitude_distance_reduce() {
        let v = Vector::from(vec![3.0, 4.0]);
        assert_eq!(v.squared_magnitude(), 25.0);
        assert_eq!(v.squared_distance(&[0.0, 1.0]).unwrap(), 18.0);
        assert_eq!(v.reduce(), 7.0);
        assert_eq!(v.error_against(&[1.0, 6.0]).unwrap(), 4.0);
    }

    #[test]
    fn test_max_index_first_wins_ties() {
        let v = Vector::from(vec![1.0, 5.0, 5.0, -2.0]);
        assert_eq!(v.max_index(), Some(1));
        assert_eq!(Vector::zeros(0).max_index(), None);
    }

    #[test]
    fn test_map_returns_new_buffer() {
        let v = Vector::from(vec![1.0, -2.0]);
        let m = v.map(|x| x * x);
        assert_eq!(m.as_slice(), &[1.0, 4.0]);
        assert_eq!(v.as_slice(), &[1.0, -2.0]);
    }

    #[test]
    fn test_write_at_clips() {
        let mut v = Vector::zeros(4);
        let written = v.write_at(2, &[7.0, 8.0, 9.0]).unwrap();
        assert_eq!(written, 2);
        assert_eq!(v.as_slice(), &[0.0, 0.0, 7.0, 8.0]);
        assert!(v.write_at(4, &[1.0]).is_err());
    }

    #[test]
    fn test_outer_product() {
        let m = Vector::outer_product(&[1.0, 2.0], &[3.0, 4.0, 5.0]);
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.row(1), &[6.0, 8.0, 10.0]);
    }

    #[test]
    fn test_display_three_decimals() {
        let v = Vector::from(vec![0.1, 2.0, -0.0126]);
        assert_eq!(v.to_string(), "[0.100,2.000,-0.013]");
    }

    #[test]
    fn test_ops_on_borrowed_slice() {
        let mut backing = vec![1.0, 2.0, 3.0, 4.0];
        let tail = &mut backing[2..];
        tail.add_scalar(1.0);
        assert_eq!(backing, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_transparent() {
        let v = Vector::from(vec![1.5, -2.0]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "[1.5,-2.0]");
        let back: Vector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    proptest! {
        #[test]
        fn prop_dot_is_symmetric(pairs in prop::collection::vec((-1e3f64..1e3, -1e3f64..1e3), 0..32)) {
            let (a, b): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let ab = a.dot(&b).unwrap();
            let ba = b.dot(&a).unwrap();
            prop_assert!((ab - ba).abs() <= 1e-9 * (1.0 + ab.abs()));
        }

        #[test]
        fn prop_squared_distance_matches_difference(pairs in prop::collection::vec((-1e3f64..1e3, -1e3f64..1e3), 0..32)) {
            let (a, b): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let mut diff = Vector::from(a.clone());
            diff.add_scaled(&b, -1.0).unwrap();
            let expected = diff.squared_magnitude();
            assert_abs_diff_eq!(a.squared_distance(&b).unwrap(), expected, epsilon = 1e-6 * (1.0 + expected));
        }
    }
}
