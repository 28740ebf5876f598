//! Generic N-dimensional convolution over [`TensorBase`] storages.
//!
//! All three entry points **add** into `output`; callers zero it first when they want a fresh
//! result. Out-of-range input positions are skipped, which is equivalent to zero padding.
//!
//! Padding is symmetric per dimension:
//! ```text
//! padding[i] = (stride * (output[i] - 1) + filter[i] - input[i]) / 2
//! ```
//! truncated toward zero, and it may be negative (a cropping convolution).

use crate::error::{Error, Result};
use crate::numeric::tensor::{TensorBase, TensorView, TensorViewMut};

/// Convolves `input` with `filter`, adding the result into `output`.
///
/// With `flip_filter` the kernel is traversed backwards in every dimension (true convolution);
/// without it the operation is cross-correlation.
///
/// # Errors
/// * [`Error::ShapeMismatch`] if the three tensors do not share the same number of dimensions
/// * [`Error::InvalidParameter`] if `stride` is zero
///
/// # Example
/// ```rust
/// use layerwise::numeric::{convolve, Tensor};
///
/// let input = Tensor::from_vec(vec![2.0, 3.0, 1.0, 0.0, 1.0], &[5]).unwrap();
/// let kernel = Tensor::from_vec(vec![1.0, 0.0, 2.0], &[3]).unwrap();
/// let mut output = Tensor::zeros(&[7]).unwrap();
/// convolve(&input, &kernel, &mut output, true, 1).unwrap();
/// assert_eq!(output.as_slice(), &[2.0, 3.0, 5.0, 6.0, 3.0, 0.0, 2.0]);
/// ```
pub fn convolve<A, B, C>(
    input: &TensorBase<A>,
    filter: &TensorBase<B>,
    output: &mut TensorBase<C>,
    flip_filter: bool,
    stride: usize,
) -> Result<()>
where
    A: AsRef<[f64]>,
    B: AsRef<[f64]>,
    C: AsRef<[f64]> + AsMut<[f64]>,
{
    let n = input.ndim();
    if filter.ndim() != n || output.ndim() != n {
        return Err(Error::shape(
            "convolve",
            format!("{} dimensions everywhere", n),
            format!("filter {:?}, output {:?}", filter.dims(), output.dims()),
        ));
    }
    if stride == 0 {
        return Err(Error::InvalidParameter(
            "convolution stride must be at least 1".to_string(),
        ));
    }
    if output.is_empty() || filter.is_empty() || input.is_empty() {
        return Ok(());
    }

    let in_dims = input.dims();
    let f_dims = filter.dims();
    let out_dims = output.dims().to_vec();
    let out_strides = output.strides().to_vec();
    let in_strides = input.strides();
    let f_strides = filter.strides();
    let step = stride as i64;

    let padding: Vec<i64> = (0..n)
        .map(|i| (step * (out_dims[i] as i64 - 1) + f_dims[i] as i64 - in_dims[i] as i64) / 2)
        .collect();

    let src = input.as_slice();
    let kernel = filter.as_slice();
    let tail = kernel.len() - 1;
    let dst = output.as_mut_slice();

    let zeros = vec![0; n];
    let mut outer = vec![0; n];
    let mut origin = vec![0i64; n];
    let mut lo = vec![0; n];
    let mut hi = vec![0; n];
    let mut inner = vec![0; n];

    loop {
        let mut overlaps = true;
        for i in 0..n {
            let base = outer[i] as i64 * step - padding[i];
            let start = (-base).max(0);
            let end = (in_dims[i] as i64 - base).min(f_dims[i] as i64);
            if start >= end {
                overlaps = false;
                break;
            }
            origin[i] = base;
            lo[i] = start as usize;
            hi[i] = end as usize;
        }

        if overlaps {
            let mut sum = 0.0;
            inner.copy_from_slice(&lo);
            loop {
                let mut ip = 0;
                let mut fp = 0;
                for i in 0..n {
                    ip += (origin[i] + inner[i] as i64) as usize * in_strides[i];
                    fp += inner[i] * f_strides[i];
                }
                let k = if flip_filter { tail - fp } else { fp };
                sum += src[ip] * kernel[k];
                if !advance(&mut inner, &lo, &hi) {
                    break;
                }
            }
            let op: usize = outer.iter().zip(&out_strides).map(|(o, s)| o * s).sum();
            dst[op] += sum;
        }

        if !advance(&mut outer, &zeros, &out_dims) {
            return Ok(());
        }
    }
}

// Odometer step with the first dimension fastest. Returns false after the last position.
fn advance(index: &mut [usize], lo: &[usize], hi: &[usize]) -> bool {
    for i in 0..index.len() {
        index[i] += 1;
        if index[i] < hi[i] {
            return true;
        }
        index[i] = lo[i];
    }
    false
}

/// Convolves a single-channel input against every filter of a bank.
///
/// `input` has a trailing dimension of 1. `filter` and `output` share a trailing filter-count
/// dimension; slice `k` of `output` receives `input ⊛ filter[k]`.
pub fn convolve_per_filter<A, B, C>(
    input: &TensorBase<A>,
    filter: &TensorBase<B>,
    output: &mut TensorBase<C>,
    flip_filter: bool,
    stride: usize,
) -> Result<()>
where
    A: AsRef<[f64]>,
    B: AsRef<[f64]>,
    C: AsRef<[f64]> + AsMut<[f64]>,
{
    check_bank("convolve_per_filter", input, filter, output)?;
    if input.last_dim() != 1 {
        return Err(Error::shape(
            "convolve_per_filter input channels",
            1,
            input.last_dim(),
        ));
    }
    if filter.last_dim() != output.last_dim() {
        return Err(Error::shape(
            "convolve_per_filter filter count",
            output.last_dim(),
            filter.last_dim(),
        ));
    }
    let channel = drop_last(input.view())?;
    let filters = filter.split_last()?;
    for (kernel, mut target) in filters.iter().zip(output.split_last_mut()?) {
        convolve(&channel, kernel, &mut target, flip_filter, stride)?;
    }
    Ok(())
}

/// Convolves each input channel with the matching filter channel and sums the results into a
/// single-channel output.
///
/// `input` and `filter` share a trailing channel dimension; `output` has a trailing dimension
/// of 1.
pub fn convolve_per_layer<A, B, C>(
    input: &TensorBase<A>,
    filter: &TensorBase<B>,
    output: &mut TensorBase<C>,
    flip_filter: bool,
    stride: usize,
) -> Result<()>
where
    A: AsRef<[f64]>,
    B: AsRef<[f64]>,
    C: AsRef<[f64]> + AsMut<[f64]>,
{
    check_bank("convolve_per_layer", input, filter, output)?;
    if input.last_dim() != filter.last_dim() {
        return Err(Error::shape(
            "convolve_per_layer channels",
            input.last_dim(),
            filter.last_dim(),
        ));
    }
    if output.last_dim() != 1 {
        return Err(Error::shape(
            "convolve_per_layer output channels",
            1,
            output.last_dim(),
        ));
    }
    let mut target = drop_last_mut(output.view_mut())?;
    for (channel, kernel) in input.split_last()?.iter().zip(filter.split_last()?.iter()) {
        convolve(channel, kernel, &mut target, flip_filter, stride)?;
    }
    Ok(())
}

fn check_bank<A, B, C>(
    context: &'static str,
    input: &TensorBase<A>,
    filter: &TensorBase<B>,
    output: &TensorBase<C>,
) -> Result<()>
where
    A: AsRef<[f64]>,
    B: AsRef<[f64]>,
    C: AsRef<[f64]>,
{
    let n = input.ndim();
    if n < 2 || filter.ndim() != n || output.ndim() != n {
        return Err(Error::shape(
            context,
            "matching dimension counts of at least 2",
            format!(
                "input {:?}, filter {:?}, output {:?}",
                input.dims(),
                filter.dims(),
                output.dims()
            ),
        ));
    }
    Ok(())
}

fn drop_last(view: TensorView<'_>) -> Result<TensorView<'_>> {
    let dims = view.dims()[..view.ndim() - 1].to_vec();
    view.reshape(&dims)
}

fn drop_last_mut(view: TensorViewMut<'_>) -> Result<TensorViewMut<'_>> {
    let dims = view.dims()[..view.ndim() - 1].to_vec();
    view.reshape(&dims)
}
