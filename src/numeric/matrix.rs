//! Dense row-major matrices with per-column metadata.
//!
//! A [`Matrix`] keeps its elements in one contiguous row-major block; [`Matrix::row`] and
//! [`Matrix::row_mut`] hand out slice views into it, while [`Matrix::column`] materializes a
//! fresh [`Vector`] since columns are not contiguous.
//!
//! Each column carries a [`ColumnMeta`]: a continuous column has an empty value enumeration,
//! a nominal column stores zero-based enumeration indices as `f64`. The sentinel
//! [`UNKNOWN_VALUE`] marks a missing element and is skipped by the column statistics.

use crate::error::{Error, Result};
use crate::numeric::vector::{write_values, Vector, VectorOps};
use rand::{Rng, RngCore};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Marker for elements whose value is not known.
pub const UNKNOWN_VALUE: f64 = -1e308;

/// Name and value enumeration of a single matrix column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnMeta {
    name: String,
    values: Vec<String>,
}

impl ColumnMeta {
    /// A continuous (real-valued) column.
    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    /// A nominal column whose elements index into `values`.
    pub fn nominal(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_continuous(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of enumerated values; `0` for continuous columns.
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn value_name(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn value_index(&self, value: &str) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }

    /// Returns the index of `value`, appending it to the enumeration if it is new.
    pub fn find_or_create_value(&mut self, value: &str) -> usize {
        match self.value_index(value) {
            Some(i) => i,
            None => {
                self.values.push(value.to_string());
                self.values.len() - 1
            }
        }
    }
}

/// A rectangular region of a matrix: top-left corner plus extent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Block {
    pub fn new(row: usize, col: usize, rows: usize, cols: usize) -> Self {
        Self {
            row,
            col,
            rows,
            cols,
        }
    }

    fn fits(&self, rows: usize, cols: usize) -> bool {
        self.row + self.rows <= rows && self.col + self.cols <= cols
    }
}

/// Dense `f64` matrix stored row-major.
///
/// # Example
/// ```rust
/// use layerwise::numeric::Matrix;
///
/// let m = Matrix::deserialize(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
/// assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
/// assert_eq!(m.column(2).as_slice(), &[3.0, 6.0]);
/// assert_eq!(m.serialize().unwrap().as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
    columns: Vec<ColumnMeta>,
}

impl Matrix {
    /// Creates a zero-filled `rows × cols` matrix of continuous columns.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
            columns: vec![ColumnMeta::default(); cols],
        }
    }

    /// Creates an empty matrix (zero rows) with the given column metadata.
    pub fn with_columns(columns: Vec<ColumnMeta>) -> Self {
        Self {
            data: Vec::new(),
            rows: 0,
            cols: columns.len(),
            columns,
        }
    }

    /// Builds a matrix from rows of equal length.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the rows are ragged.
    pub fn from_rows<I, R>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[f64]>,
    {
        let mut data = Vec::new();
        let mut count = 0;
        let mut cols = None;
        for row in rows {
            let row = row.as_ref();
            match cols {
                None => cols = Some(row.len()),
                Some(c) if c != row.len() => {
                    return Err(Error::shape("from_rows", format!("{} columns", c), row.len()))
                }
                Some(_) => {}
            }
            data.extend_from_slice(row);
            count += 1;
        }
        let cols = cols.unwrap_or(0);
        Ok(Self {
            data,
            rows: count,
            cols,
            columns: vec![ColumnMeta::default(); cols],
        })
    }

    /// Unpacks the first `rows * cols` values of `values` row by row into a new matrix.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `values` holds fewer than `rows * cols` elements.
    pub fn deserialize(values: &[f64], rows: usize, cols: usize) -> Result<Self> {
        let needed = rows * cols;
        if values.len() < needed {
            return Err(Error::shape(
                "deserialize",
                format!("at least {} values for {}x{}", needed, rows, cols),
                values.len(),
            ));
        }
        let mut out = Self::new(rows, cols);
        out.data.copy_from_slice(&values[..needed]);
        Ok(out)
    }

    /// Concatenates the rows into a single buffer.
    ///
    /// # Errors
    /// [`Error::InvalidState`] if the matrix has zero rows or zero columns.
    pub fn serialize(&self) -> Result<Vector> {
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::InvalidState(format!(
                "cannot serialize a {}x{} matrix",
                self.rows, self.cols
            )));
        }
        Ok(Vector::from(self.data.clone()))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// All elements, row-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// View of row `r`.
    ///
    /// # Panics
    /// Panics if `r >= self.rows()`.
    pub fn row(&self, r: usize) -> &[f64] {
        assert!(r < self.rows, "row {} out of range for {} rows", r, self.rows);
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Mutable view of row `r`.
    ///
    /// # Panics
    /// Panics if `r >= self.rows()`.
    pub fn row_mut(&mut self, r: usize) -> &mut [f64] {
        assert!(r < self.rows, "row {} out of range for {} rows", r, self.rows);
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Iterates over row views.
    pub fn row_iter(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // chunks_exact(0) panics; a zero-column matrix has no elements anyway.
        self.data.chunks_exact(self.cols.max(1))
    }

    /// Copies column `c` into a new buffer.
    ///
    /// # Panics
    /// Panics if `c >= self.cols()`.
    pub fn column(&self, c: usize) -> Vector {
        assert!(c < self.cols, "column {} out of range for {} columns", c, self.cols);
        self.row_iter().map(|row| row[c]).collect()
    }

    pub fn set_row(&mut self, r: usize, values: &[f64]) -> Result<()> {
        if values.len() != self.cols {
            return Err(Error::shape("set_row", self.cols, values.len()));
        }
        self.row_mut(r).copy_from_slice(values);
        Ok(())
    }

    pub fn set_column(&mut self, c: usize, values: &[f64]) -> Result<()> {
        if values.len() != self.rows {
            return Err(Error::shape("set_column", self.rows, values.len()));
        }
        assert!(c < self.cols, "column {} out of range for {} columns", c, self.cols);
        for (r, &v) in values.iter().enumerate() {
            self.data[r * self.cols + c] = v;
        }
        Ok(())
    }

    /// Appends a row to the bottom of the matrix.
    pub fn push_row(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.cols {
            return Err(Error::shape("push_row", self.cols, values.len()));
        }
        self.data.extend_from_slice(values);
        self.rows += 1;
        Ok(())
    }

    /// Metadata of column `c`.
    ///
    /// # Panics
    /// Panics if `c >= self.cols()`.
    pub fn column_meta(&self, c: usize) -> &ColumnMeta {
        assert!(c < self.cols, "column {} out of range for {} columns", c, self.cols);
        &self.columns[c]
    }

    /// # Panics
    /// Panics if `c >= self.cols()`.
    pub fn column_meta_mut(&mut self, c: usize) -> &mut ColumnMeta {
        assert!(c < self.cols, "column {} out of range for {} columns", c, self.cols);
        &mut self.columns[c]
    }

    pub fn column_name(&self, c: usize) -> &str {
        self.columns[c].name()
    }

    /// Number of enumerated values in column `c`; `0` means continuous.
    pub fn value_count(&self, c: usize) -> usize {
        self.columns[c].value_count()
    }

    pub fn find_or_create_value(&mut self, c: usize, value: &str) -> usize {
        self.columns[c].find_or_create_value(value)
    }

    fn known(&self, c: usize) -> impl Iterator<Item = f64> + '_ {
        self.row_iter()
            .map(move |row| row[c])
            .filter(|&v| v != UNKNOWN_VALUE)
    }

    /// Mean of the known elements of column `c`, or [`UNKNOWN_VALUE`] if there are none.
    pub fn column_mean(&self, c: usize) -> f64 {
        let (sum, count) = self.known(c).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if count == 0 {
            UNKNOWN_VALUE
        } else {
            sum / count as f64
        }
    }

    /// Smallest known element of column `c`, or [`UNKNOWN_VALUE`] if there are none.
    pub fn column_min(&self, c: usize) -> f64 {
        self.known(c).reduce(f64::min).unwrap_or(UNKNOWN_VALUE)
    }

    /// Largest known element of column `c`, or [`UNKNOWN_VALUE`] if there are none.
    pub fn column_max(&self, c: usize) -> f64 {
        self.known(c).reduce(f64::max).unwrap_or(UNKNOWN_VALUE)
    }

    /// Most frequent known element of column `c`; among equally frequent values the one seen
    /// first wins. [`UNKNOWN_VALUE`] if the column has no known elements.
    pub fn most_common_value(&self, c: usize) -> f64 {
        let mut counts: Vec<(f64, usize)> = Vec::new();
        for v in self.known(c) {
            match counts.iter_mut().find(|(value, _)| *value == v) {
                Some((_, n)) => *n += 1,
                None => counts.push((v, 1)),
            }
        }
        let mut best: Option<(f64, usize)> = None;
        for (value, n) in counts {
            if best.map_or(true, |(_, b)| n > b) {
                best = Some((value, n));
            }
        }
        best.map_or(UNKNOWN_VALUE, |(value, _)| value)
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub fn fill_with(&mut self, f: impl FnMut() -> f64) {
        self.data.fill_with(f);
    }

    pub fn scale(&mut self, s: f64) {
        self.data.scale(s);
    }

    /// Element-wise `self += s * other`.
    pub fn add_scaled(&mut self, other: &Matrix, s: f64) -> Result<()> {
        self.check_same_size("add_scaled", other)?;
        self.data.add_scaled(&other.data, s)
    }

    /// Sum of absolute element-wise differences.
    pub fn error_against(&self, other: &Matrix) -> Result<f64> {
        self.check_same_size("error_against", other)?;
        self.data.error_against(&other.data)
    }

    fn check_same_size(&self, context: &'static str, other: &Matrix) -> Result<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(Error::shape(
                context,
                format!("{}x{}", self.rows, self.cols),
                format!("{}x{}", other.rows, other.cols),
            ));
        }
        Ok(())
    }

    /// Fails unless `other` has the same column count and the same enumeration size per column.
    pub fn check_compatibility(&self, other: &Matrix) -> Result<()> {
        if self.cols != other.cols {
            return Err(Error::shape("check_compatibility", self.cols, other.cols));
        }
        for (c, (a, b)) in self.columns.iter().zip(&other.columns).enumerate() {
            if a.value_count() != b.value_count() {
                return Err(Error::shape(
                    "check_compatibility",
                    format!("{} values in column {}", a.value_count(), c),
                    b.value_count(),
                ));
            }
        }
        Ok(())
    }

    /// Zeroes the matrix and writes ones on the main diagonal.
    pub fn set_to_identity(&mut self) {
        self.fill(0.0);
        for i in 0..self.rows.min(self.cols) {
            self[(i, i)] = 1.0;
        }
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::new(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out[(c, r)] = self[(r, c)];
            }
        }
        out
    }

    /// Computes `op(a) · op(b)` where `op` optionally transposes its argument.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the inner dimensions differ.
    pub fn multiply(a: &Matrix, b: &Matrix, transpose_a: bool, transpose_b: bool) -> Result<Matrix> {
        let (a_rows, a_inner) = if transpose_a {
            (a.cols, a.rows)
        } else {
            (a.rows, a.cols)
        };
        let (b_inner, b_cols) = if transpose_b {
            (b.cols, b.rows)
        } else {
            (b.rows, b.cols)
        };
        if a_inner != b_inner {
            return Err(Error::shape("multiply", format!("inner dimension {}", a_inner), b_inner));
        }
        let lhs = |i: usize, k: usize| if transpose_a { a[(k, i)] } else { a[(i, k)] };
        let rhs = |k: usize, j: usize| if transpose_b { b[(j, k)] } else { b[(k, j)] };
        let mut out = Matrix::new(a_rows, b_cols);
        for i in 0..a_rows {
            for j in 0..b_cols {
                out[(i, j)] = (0..a_inner).map(|k| lhs(i, k) * rhs(k, j)).sum();
            }
        }
        Ok(out)
    }

    /// Matrix-vector product `self · x`.
    pub fn multiply_vector(&self, x: &[f64]) -> Result<Vector> {
        if x.len() != self.cols {
            return Err(Error::shape("multiply_vector", self.cols, x.len()));
        }
        self.row_iter().map(|row| row.dot(x)).collect()
    }

    /// Transposed matrix-vector product `selfᵀ · x`.
    pub fn transpose_multiply_vector(&self, x: &[f64]) -> Result<Vector> {
        if x.len() != self.rows {
            return Err(Error::shape("transpose_multiply_vector", self.rows, x.len()));
        }
        let mut out = Vector::zeros(self.cols);
        for (row, &xi) in self.row_iter().zip(x) {
            out.add_scaled(row, xi)?;
        }
        Ok(out)
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (lo, hi) = (a.min(b), a.max(b));
        let cols = self.cols;
        let (head, tail) = self.data.split_at_mut(hi * cols);
        head[lo * cols..(lo + 1) * cols].swap_with_slice(&mut tail[..cols]);
    }

    /// Swaps two columns together with their metadata.
    ///
    /// # Panics
    /// Panics if `a` or `b` is not below `self.cols()`.
    pub fn swap_columns(&mut self, a: usize, b: usize) {
        assert!(
            a < self.cols && b < self.cols,
            "columns ({}, {}) out of range for {} columns",
            a,
            b,
            self.cols
        );
        for r in 0..self.rows {
            self.data.swap(r * self.cols + a, r * self.cols + b);
        }
        self.columns.swap(a, b);
    }

    /// Copies the `block` region of `src` (data and column metadata) into this matrix with its
    /// top-left corner at `(dest_row, dest_col)`.
    pub fn copy_block(
        &mut self,
        dest_row: usize,
        dest_col: usize,
        src: &Matrix,
        block: Block,
    ) -> Result<()> {
        if !Block::new(dest_row, dest_col, block.rows, block.cols).fits(self.rows, self.cols) {
            return Err(Error::shape(
                "copy_block destination",
                format!("{}x{}", self.rows, self.cols),
                format!("{:?} at ({}, {})", block, dest_row, dest_col),
            ));
        }
        if !block.fits(src.rows, src.cols) {
            return Err(Error::shape(
                "copy_block source",
                format!("{}x{}", src.rows, src.cols),
                format!("{:?}", block),
            ));
        }
        for i in 0..block.cols {
            self.columns[dest_col + i] = src.columns[block.col + i].clone();
        }
        for i in 0..block.rows {
            let from = &src.row(block.row + i)[block.col..block.col + block.cols];
            self.row_mut(dest_row + i)[dest_col..dest_col + block.cols].copy_from_slice(from);
        }
        Ok(())
    }

    /// Returns a copy of the `block` region as a new matrix.
    pub fn sub_matrix(&self, block: Block) -> Result<Matrix> {
        let mut out = Matrix::new(block.rows, block.cols);
        out.copy_block(0, 0, self, block)?;
        Ok(out)
    }

    /// Returns a copy of rows `[start, end)`.
    pub fn duplicate_rows(&self, start: usize, end: usize) -> Result<Matrix> {
        if start > end {
            return Err(Error::InvalidParameter(format!(
                "row range start {} is past end {}",
                start, end
            )));
        }
        self.sub_matrix(Block::new(start, 0, end - start, self.cols))
    }

    /// Expands a single nominal column into one-hot rows.
    ///
    /// Row `i` of the result has a `1.0` at column `round(self[(i, 0)])`; the result has
    /// `max + 1` columns.
    pub fn to_one_hot(&self) -> Result<Matrix> {
        if self.cols != 1 {
            return Err(Error::shape("to_one_hot", "1 column", self.cols));
        }
        let mut indices = Vec::with_capacity(self.rows);
        for &v in &self.data {
            let rounded = v.round();
            if !(0.0..=(u32::MAX as f64)).contains(&rounded) {
                return Err(Error::InvalidParameter(format!(
                    "cannot one-hot encode value {}",
                    v
                )));
            }
            indices.push(rounded as usize);
        }
        let width = indices.iter().max().map_or(0, |&m| m + 1);
        let mut out = Matrix::new(self.rows, width);
        for (r, &i) in indices.iter().enumerate() {
            out[(r, i)] = 1.0;
        }
        Ok(out)
    }

    /// Stable sort of the rows by the values in column `c`.
    pub fn sort_by_column(&mut self, c: usize, ascending: bool) {
        assert!(c < self.cols, "column {} out of range for {} columns", c, self.cols);
        let mut order: Vec<usize> = (0..self.rows).collect();
        order.sort_by(|&a, &b| {
            let ord = self.data[a * self.cols + c]
                .partial_cmp(&self.data[b * self.cols + c])
                .unwrap_or(Ordering::Equal);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        let mut data = Vec::with_capacity(self.data.len());
        for r in order {
            data.extend_from_slice(self.row(r));
        }
        self.data = data;
    }

    /// Randomly permutes the rows (Fisher-Yates).
    pub fn shuffle_rows(&mut self, rng: &mut dyn RngCore) {
        for i in (2..=self.rows).rev() {
            let r = rng.gen_range(0..i);
            self.swap_rows(i - 1, r);
        }
    }

    /// Applies the same random row permutation to every matrix in `matrices`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the matrices differ in row count.
    pub fn shuffle_together(matrices: &mut [&mut Matrix], rng: &mut dyn RngCore) -> Result<()> {
        let Some(rows) = matrices.first().map(|m| m.rows) else {
            return Ok(());
        };
        if let Some(m) = matrices.iter().find(|m| m.rows != rows) {
            return Err(Error::shape("shuffle_together", rows, m.rows));
        }
        for i in (2..=rows).rev() {
            let r = rng.gen_range(0..i);
            for m in matrices.iter_mut() {
                m.swap_rows(i - 1, r);
            }
        }
        Ok(())
    }
}

impl AsRef<[f64]> for Matrix {
    fn as_ref(&self) -> &[f64] {
        &self.data
    }
}

impl AsMut<[f64]> for Matrix {
    fn as_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        assert!(r < self.rows && c < self.cols, "index ({}, {}) out of range", r, c);
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        assert!(r < self.rows && c < self.cols, "index ({}, {}) out of range", r, c);
        &mut self.data[r * self.cols + c]
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.row_iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write_values(f, row)?;
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::{ColumnMeta, Matrix};
    use crate::error::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct MatrixRepr {
        data: Vec<f64>,
        rows: usize,
        cols: usize,
        columns: Vec<ColumnMeta>,
    }

    impl TryFrom<MatrixRepr> for Matrix {
        type Error = Error;

        fn try_from(repr: MatrixRepr) -> Result<Self, Error> {
            if repr.data.len() != repr.rows * repr.cols {
                return Err(Error::ConstructionInvariant(format!(
                    "{} values for a {}x{} matrix",
                    repr.data.len(),
                    repr.rows,
                    repr.cols
                )));
            }
            if repr.columns.len() != repr.cols {
                return Err(Error::ConstructionInvariant(format!(
                    "{} column descriptions for {} columns",
                    repr.columns.len(),
                    repr.cols
                )));
            }
            Ok(Matrix {
                data: repr.data,
                rows: repr.rows,
                cols: repr.cols,
                columns: repr.columns,
            })
        }
    }

    impl Serialize for Matrix {
        fn serialize<Se: Serializer>(&self, serializer: Se) -> Result<Se::Ok, Se::Error> {
            MatrixRepr {
                data: self.data.clone(),
                rows: self.rows,
                cols: self.cols,
                columns: self.columns.clone(),
            }
            .serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Matrix {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let repr = MatrixRepr::deserialize(deserializer)?;
            Matrix::try_from(repr).map_err(serde::de::Error::custom)
        }
    }
}
