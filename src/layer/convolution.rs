use super::{check_input, ConnectedParams, Layer, LayerKind, Params, ParamsMut, Signals};
use crate::error::{Error, Result};
use crate::numeric::{
    convolve, convolve_per_filter, convolve_per_layer, count_elements, Tensor, TensorView,
    TensorViewMut, Vector, VectorOps,
};
use crate::optimizer::Optimizer;
use rand::RngCore;
use std::any::Any;

/// Convolution against a learnable filter bank, plus one bias per output channel.
///
/// The input, filter and output dims are normalized to a common dimensionality (at least 2) by
/// appending size-1 dimensions, so `[4, 4]` against a `[3, 3, 2]` bank reads as a
/// single-channel `[4, 4, 1]` input. The trailing dimension is the channel axis.
///
/// Two evaluation paths exist:
/// * single-channel input (trailing dim 1): every filter slice is convolved against the input
///   and lands in the matching output channel
/// * multi-channel input: one joint N-dimensional convolution of the whole input against the
///   whole filter
#[derive(Clone, Debug)]
pub struct ConvolutionLayer {
    input_dims: Vec<usize>,
    filter_dims: Vec<usize>,
    output_dims: Vec<usize>,
    params: ConnectedParams<Tensor>,
    signals: Signals,
}

fn normalize(dims: &[usize], rank: usize) -> Vec<usize> {
    let mut out = dims.to_vec();
    out.resize(rank, 1);
    out
}

impl ConvolutionLayer {
    /// # Errors
    /// [`Error::ConstructionInvariant`] if any dims list is empty or holds a zero, or if a
    /// single-channel input is paired with a filter count that differs from the output channel
    /// count.
    ///
    /// # Example
    /// ```rust
    /// use layerwise::layer::{ConvolutionLayer, Layer};
    ///
    /// let layer = ConvolutionLayer::new(&[4, 4], &[3, 3, 2], &[4, 4, 2]).unwrap();
    /// assert_eq!(layer.input_dims(), &[4, 4, 1]);
    /// assert_eq!(layer.inputs(), 16);
    /// assert_eq!(layer.outputs(), 32);
    /// assert_eq!(layer.parameter_count(), 18 + 2);
    /// ```
    pub fn new(input_dims: &[usize], filter_dims: &[usize], output_dims: &[usize]) -> Result<Self> {
        for dims in [input_dims, filter_dims, output_dims] {
            if dims.is_empty() || dims.contains(&0) {
                return Err(Error::ConstructionInvariant(format!(
                    "convolution dims must be non-empty and positive, got {:?}",
                    dims
                )));
            }
        }
        let rank = input_dims
            .len()
            .max(filter_dims.len())
            .max(output_dims.len())
            .max(2);
        let input_dims = normalize(input_dims, rank);
        let filter_dims = normalize(filter_dims, rank);
        let output_dims = normalize(output_dims, rank);

        let channels = output_dims[rank - 1];
        if input_dims[rank - 1] == 1 && filter_dims[rank - 1] != channels {
            return Err(Error::ConstructionInvariant(format!(
                "{} filters cannot feed {} output channels",
                filter_dims[rank - 1],
                channels
            )));
        }

        let outputs = count_elements(&output_dims);
        Ok(Self {
            params: ConnectedParams::new(Tensor::zeros(&filter_dims)?, channels),
            signals: Signals::new(outputs),
            input_dims,
            filter_dims,
            output_dims,
        })
    }

    pub fn input_dims(&self) -> &[usize] {
        &self.input_dims
    }

    pub fn filter_dims(&self) -> &[usize] {
        &self.filter_dims
    }

    pub fn output_dims(&self) -> &[usize] {
        &self.output_dims
    }

    pub fn weights(&self) -> &Tensor {
        self.params.weights()
    }

    pub fn bias(&self) -> &[f64] {
        self.params.bias()
    }

    pub fn weights_gradient(&self) -> &Tensor {
        self.params.weights_gradient()
    }

    pub fn bias_gradient(&self) -> &[f64] {
        self.params.bias_gradient()
    }

    /// Replaces the filter bank, re-laid under the layer's filter dims. Counts as
    /// initialization.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the element count differs from the filter's.
    pub fn set_weights(&mut self, filter: Tensor) -> Result<()> {
        let expected = count_elements(&self.filter_dims);
        if filter.len() != expected {
            return Err(Error::dims("convolution filter", &self.filter_dims, filter.dims()));
        }
        self.params.weights = filter.reshape(&self.filter_dims)?;
        self.params.initialized = true;
        Ok(())
    }

    /// # Errors
    /// [`Error::ShapeMismatch`] unless there is one bias per output channel.
    pub fn set_bias(&mut self, bias: Vector) -> Result<()> {
        let channels = self.params.bias().len();
        if bias.len() != channels {
            return Err(Error::shape("convolution bias", channels, bias.len()));
        }
        self.params.bias = bias;
        Ok(())
    }

    fn single_channel(&self) -> bool {
        self.input_dims[self.input_dims.len() - 1] == 1
    }
}

impl Layer for ConvolutionLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Convolution
    }

    fn inputs(&self) -> usize {
        count_elements(&self.input_dims)
    }

    fn outputs(&self) -> usize {
        self.signals.activation.len()
    }

    fn initialize(&mut self, rng: &mut dyn RngCore) {
        let scale = (1.0 / count_elements(&self.filter_dims) as f64).max(0.01);
        self.params.randomize(rng, scale);
    }

    fn is_initialized(&self) -> bool {
        self.params.is_initialized()
    }

    fn activate(&mut self, input: &[f64]) -> Result<&[f64]> {
        check_input("convolution activate", self.inputs(), input)?;
        let single_channel = self.single_channel();
        let input = TensorView::new(input, &self.input_dims)?;

        self.signals.activation.fill(0.0);
        let mut out = TensorViewMut::new(&mut self.signals.activation[..], &self.output_dims)?;
        if single_channel {
            convolve_per_filter(&input, &self.params.weights, &mut out, false, 1)?;
        } else {
            convolve(&input, &self.params.weights, &mut out, false, 1)?;
        }
        for (mut channel, &b) in out.split_last_mut()?.into_iter().zip(self.params.bias.iter()) {
            channel.as_mut_slice().add_scalar(b);
        }
        Ok(&self.signals.activation)
    }

    fn activation(&self) -> &[f64] {
        &self.signals.activation
    }

    fn blame(&self) -> &[f64] {
        &self.signals.blame
    }

    fn set_blame(&mut self, blame: Vector) -> Result<()> {
        self.signals.set_blame(blame)
    }

    fn back_propagate(&self) -> Result<Vector> {
        let blame = TensorView::new(&self.signals.blame[..], &self.output_dims)?;
        let mut result = Tensor::zeros(&self.input_dims)?;
        if self.single_channel() {
            convolve_per_layer(&blame, &self.params.weights, &mut result, true, 1)?;
        } else {
            convolve(&blame, &self.params.weights, &mut result, true, 1)?;
        }
        Ok(result.into_inner())
    }

    fn update_gradient(&mut self, input: &[f64]) -> Result<()> {
        check_input("convolution update_gradient", self.inputs(), input)?;
        let single_channel = self.single_channel();
        let input = TensorView::new(input, &self.input_dims)?;
        let blame = TensorView::new(&self.signals.blame[..], &self.output_dims)?;

        let mut gradient = self.params.weights_gradient.view_mut();
        if single_channel {
            convolve_per_filter(&input, &blame, &mut gradient, false, 1)?;
        } else {
            convolve(&input, &blame, &mut gradient, false, 1)?;
        }
        for (g, channel) in self
            .params
            .bias_gradient
            .iter_mut()
            .zip(blame.split_last()?)
        {
            *g += channel.as_slice().reduce();
        }
        Ok(())
    }

    fn apply_gradient(&mut self, optimizer: &dyn Optimizer) {
        self.params.apply(optimizer);
    }

    fn parameters(&self) -> Option<Params<'_>> {
        Some(self.params.params())
    }

    fn parameters_mut(&mut self) -> Option<ParamsMut<'_>> {
        Some(self.params.params_mut())
    }

    fn box_clone(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::Sgd;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TOLERANCE: f64 = 1e-4;

    fn assert_close(got: &[f64], expected: &[f64], tolerance: f64) {
        assert_eq!(got.len(), expected.len());
        for (i, (g, e)) in got.iter().zip(expected).enumerate() {
            assert!((g - e).abs() < tolerance, "index {}: {} vs {}", i, g, e);
        }
    }

    fn ramp_input() -> Vec<f64> {
        (0..16).map(|i| i as f64 * 0.1).collect()
    }

    fn fixture() -> ConvolutionLayer {
        let mut layer = ConvolutionLayer::new(&[4, 4], &[3, 3, 2], &[4, 4, 2]).unwrap();
        let filter: Vec<f64> = (1..=9)
            .map(|i| i as f64 * 0.01)
            .chain((11..=19).map(|i| i as f64 * 0.01))
            .collect();
        layer
            .set_weights(Tensor::from_vec(filter, &[3, 3, 2]).unwrap())
            .unwrap();
        layer.set_bias(Vector::from(vec![0.0, 0.1])).unwrap();
        layer
    }

    fn fixture_blame() -> Vector {
        let mut blame = Vector::zeros(32);
        for (i, v) in [
            (5, 0.397),
            (6, 0.252),
            (9, 0.017),
            (10, -0.128),
            (21, -0.553),
            (22, -0.788),
            (25, -1.293),
            (26, -1.528),
        ] {
            blame[i] = v;
        }
        blame
    }

    #[test]
    fn test_activate() {
        let mut layer = fixture();
        let out = layer.activate(&ramp_input()).unwrap();
        assert_close(
            out,
            &[
                0.083, 0.139, 0.178, 0.121, 0.198, 0.303, 0.348, 0.225, 0.33, 0.483, 0.528, 0.333,
                0.181, 0.253, 0.274, 0.163, 0.283, 0.419, 0.518, 0.401, 0.568, 0.853, 0.988,
                0.715, 0.94, 1.393, 1.528, 1.063, 0.701, 1.013, 1.094, 0.763,
            ],
            TOLERANCE,
        );
    }

    #[test]
    fn test_activate_does_not_accumulate() {
        let mut layer = fixture();
        let first = layer.activate(&ramp_input()).unwrap().to_vec();
        let second = layer.activate(&ramp_input()).unwrap().to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_update_gradient_and_apply() {
        let mut layer = fixture();
        let input = ramp_input();
        layer.activate(&input).unwrap();
        layer.set_blame(fixture_blame()).unwrap();
        layer.update_gradient(&input).unwrap();

        assert_close(
            layer.weights_gradient().as_slice(),
            &[
                -0.032, 0.0218, 0.0756, 0.1832, 0.237, 0.2908, 0.3984, 0.4522, 0.506, -1.36,
                -1.7762, -2.1924, -3.0248, -3.441, -3.8572, -4.6896, -5.1058, -5.522,
            ],
            TOLERANCE,
        );
        assert_close(layer.bias_gradient(), &[0.538, -4.162], TOLERANCE);

        layer.apply_gradient(&Sgd::new(0.01));
        assert_close(
            layer.weights().as_slice(),
            &[
                0.00968, 0.020218, 0.030756, 0.041832, 0.05237, 0.062908, 0.073984, 0.084522,
                0.09506, 0.0964, 0.102238, 0.108076, 0.109752, 0.11559, 0.121428, 0.123104,
                0.128942, 0.13478,
            ],
            1e-5,
        );
    }

    #[test]
    fn test_bias_gradient_accumulates() {
        let mut layer = fixture();
        let input = ramp_input();
        layer.set_blame(fixture_blame()).unwrap();
        layer.update_gradient(&input).unwrap();
        layer.update_gradient(&input).unwrap();
        assert_close(layer.bias_gradient(), &[1.076, -8.324], TOLERANCE);
    }

    #[test]
    fn test_back_propagate_single_channel_is_adjoint() {
        // <blame, conv(x)> == <back_propagate(blame), x> when the bias is zero
        let mut layer = fixture();
        layer.set_bias(Vector::zeros(2)).unwrap();
        let input = ramp_input();
        let forward = layer.activate(&input).unwrap().to_vec();
        let blame = fixture_blame();
        layer.set_blame(blame.clone()).unwrap();
        let previous = layer.back_propagate().unwrap();
        assert_eq!(previous.len(), 16);
        let lhs = blame.dot(&forward).unwrap();
        let rhs = previous.dot(&input).unwrap();
        assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-9);
    }

    #[test]
    fn test_multi_channel_joint_path() {
        let mut layer = ConvolutionLayer::new(&[4, 4, 3], &[3, 3, 3], &[4, 4, 1]).unwrap();
        layer.initialize(&mut StdRng::seed_from_u64(11));
        layer.set_bias(Vector::zeros(1)).unwrap();
        let input: Vec<f64> = (0..48).map(|i| (i as f64 * 0.37).sin()).collect();
        let forward = layer.activate(&input).unwrap().to_vec();
        assert_eq!(forward.len(), 16);

        let blame = Vector::from_fn(16, |i| (i as f64 * 0.11).cos());
        layer.set_blame(blame.clone()).unwrap();
        let previous = layer.back_propagate().unwrap();
        assert_eq!(previous.len(), 48);
        let lhs = blame.dot(&forward).unwrap();
        let rhs = previous.dot(&input).unwrap();
        assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-9);

        layer.update_gradient(&input).unwrap();
        assert_abs_diff_eq!(layer.bias_gradient()[0], blame.reduce(), epsilon = 1e-12);
        // d(<blame, conv(x)>)/dW is the weight gradient
        let w = layer.weights().as_slice().to_vec();
        let g = layer.weights_gradient().as_slice().to_vec();
        assert_abs_diff_eq!(w.dot(&g).unwrap(), lhs, epsilon = 1e-9);
    }

    #[test]
    fn test_construction_rejects_bad_dims() {
        assert!(ConvolutionLayer::new(&[], &[3], &[4]).is_err());
        assert!(ConvolutionLayer::new(&[4, 0], &[3, 3], &[4, 4]).is_err());
        assert!(matches!(
            ConvolutionLayer::new(&[4, 4], &[3, 3, 2], &[4, 4, 3]),
            Err(Error::ConstructionInvariant(_))
        ));
    }

    #[test]
    fn test_one_dimensional_layer() {
        let mut layer = ConvolutionLayer::new(&[5], &[3], &[7]).unwrap();
        assert_eq!(layer.filter_dims(), &[3, 1]);
        layer
            .set_weights(Tensor::from_vec(vec![1.0, 0.0, 2.0], &[3]).unwrap())
            .unwrap();
        let out = layer.activate(&[2.0, 3.0, 1.0, 0.0, 1.0]).unwrap();
        // forward pass is cross-correlation: no kernel flip
        assert_close(out, &[4.0, 6.0, 4.0, 3.0, 3.0, 0.0, 1.0], 1e-12);
    }

    #[test]
    fn test_setters_validate() {
        let mut layer = fixture();
        assert!(layer.set_weights(Tensor::zeros(&[3, 3]).unwrap()).is_err());
        assert!(layer.set_bias(Vector::zeros(3)).is_err());
        assert!(layer.activate(&[0.0; 15]).is_err());
    }

    #[test]
    fn test_initialize() {
        let mut layer = ConvolutionLayer::new(&[4, 4], &[3, 3, 2], &[4, 4, 2]).unwrap();
        assert!(!layer.is_initialized());
        layer.initialize(&mut StdRng::seed_from_u64(5));
        assert!(layer.is_initialized());
        assert!(layer.weights().as_slice().iter().any(|&w| w != 0.0));
        assert_eq!(layer.topology_string(), "[CONVOLUTION: 16->32, Weights=20]");
    }
}
