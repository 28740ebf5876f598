//! Dense numeric primitives: buffers, matrices, strided tensors and the kernels built on them.

pub mod convolution;
pub mod matrix;
pub mod svd;
pub mod tensor;
pub mod vector;

pub use convolution::{convolve, convolve_per_filter, convolve_per_layer};
pub use matrix::{Block, ColumnMeta, Matrix, UNKNOWN_VALUE};
pub use svd::{Svd, SvdOptions, PSEUDO_INVERSE_THRESHOLD};
pub use tensor::{count_elements, Tensor, TensorBase, TensorView, TensorViewMut};
pub use vector::{Vector, VectorOps};
