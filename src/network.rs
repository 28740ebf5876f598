//! Layer pipelines: forward activation, the backward blame chain, gradient accumulation and
//! weight updates.

use crate::error::{Error, Result};
use crate::layer::{Layer, LayerKind};
use crate::loss::{Loss, SquaredError};
use crate::numeric::Vector;
use crate::optimizer::Sgd;
use log::debug;
use rand::RngCore;

/// Where a network is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkState {
    /// No layers yet, or at least one learnable layer has not been initialized.
    Uninitialized,
    /// Every layer is ready for a forward pass; none has run since initialization.
    Initialized,
    /// A forward pass has run, so blame and gradients can be computed.
    Ready,
}

/// An ordered pipeline of layers trained with [`Sgd`].
///
/// Layer `i + 1` consumes the activation of layer `i`; the sizes are checked when a layer is
/// added. Cloning deep-copies every layer.
///
/// # Example
/// ```rust
/// use layerwise::layer::{LinearLayer, TanhLayer};
/// use layerwise::network::{Network, NetworkState};
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let mut network = Network::builder()
///     .learning_rate(0.05)
///     .layer(LinearLayer::new(2, 3))
///     .layer(TanhLayer::new(3))
///     .layer(LinearLayer::new(3, 1))
///     .build()
///     .unwrap();
/// network.initialize(&mut StdRng::seed_from_u64(0));
/// network.refine(&[0.5, -0.5], &[1.0]).unwrap();
/// assert_eq!(network.state(), NetworkState::Ready);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    optimizer: Sgd,
    forward_done: bool,
}

impl Network {
    pub fn new(optimizer: Sgd) -> Self {
        Self {
            layers: Vec::new(),
            optimizer,
            forward_done: false,
        }
    }

    pub fn builder() -> NetworkBuilder {
        NetworkBuilder::default()
    }

    /// Appends a layer.
    ///
    /// # Errors
    /// [`Error::ConstructionInvariant`] if the layer's input size differs from the previous
    /// layer's output size.
    pub fn add_layer<L: Layer + 'static>(&mut self, layer: L) -> Result<()> {
        self.add_boxed_layer(Box::new(layer))
    }

    pub fn add_boxed_layer(&mut self, layer: Box<dyn Layer>) -> Result<()> {
        if let Some(last) = self.layers.last() {
            if last.outputs() != layer.inputs() {
                return Err(Error::ConstructionInvariant(format!(
                    "layer {} expects {} inputs but the previous layer produces {}",
                    layer.topology_string(),
                    layer.inputs(),
                    last.outputs()
                )));
            }
        }
        debug!("Layer {}) {}", self.layers.len(), layer.topology_string());
        self.layers.push(layer);
        self.forward_done = false;
        Ok(())
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, index: usize) -> Option<&dyn Layer> {
        self.layers.get(index).map(|l| l.as_ref())
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut dyn Layer> {
        match self.layers.get_mut(index) {
            Some(l) => Some(l.as_mut()),
            None => None,
        }
    }

    /// Typed access to layer `index`; `None` if out of range or of another type.
    pub fn layer_as<T: Layer + 'static>(&self, index: usize) -> Option<&T> {
        self.layers.get(index)?.as_any().downcast_ref::<T>()
    }

    pub fn layer_as_mut<T: Layer + 'static>(&mut self, index: usize) -> Option<&mut T> {
        self.layers.get_mut(index)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn optimizer(&self) -> &Sgd {
        &self.optimizer
    }

    pub fn set_optimizer(&mut self, optimizer: Sgd) {
        self.optimizer = optimizer;
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.optimizer = Sgd::new(learning_rate).with_momentum(self.optimizer.momentum());
    }

    pub fn set_momentum(&mut self, momentum: f64) {
        self.optimizer = self.optimizer.with_momentum(momentum);
    }

    /// Randomizes every learnable layer and clears their gradients.
    pub fn initialize(&mut self, rng: &mut dyn RngCore) {
        for layer in &mut self.layers {
            layer.initialize(rng);
        }
        self.forward_done = false;
    }

    pub fn state(&self) -> NetworkState {
        if self.layers.is_empty() || !self.layers.iter().all(|l| l.is_initialized()) {
            NetworkState::Uninitialized
        } else if self.forward_done {
            NetworkState::Ready
        } else {
            NetworkState::Initialized
        }
    }

    /// A single linear layer; such a network can be fitted in closed form.
    pub fn is_linear_network(&self) -> bool {
        self.layers.len() == 1 && self.layers[0].kind() == LayerKind::Linear
    }

    /// One line per layer, `index) [KIND: in->out, Weights=n]`.
    pub fn topology(&self) -> String {
        self.layers
            .iter()
            .enumerate()
            .map(|(i, l)| format!("{}) {}", i, l.topology_string()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn inputs(&self) -> usize {
        self.layers.first().map_or(0, |l| l.inputs())
    }

    pub fn outputs(&self) -> usize {
        self.layers.last().map_or(0, |l| l.outputs())
    }

    /// Forward pass; returns the last layer's activation.
    ///
    /// # Errors
    /// * [`Error::InvalidState`] if there are no layers or a layer is uninitialized
    /// * [`Error::ShapeMismatch`] if `input` has the wrong length
    pub fn predict(&mut self, input: &[f64]) -> Result<&[f64]> {
        if let Some(i) = self.layers.iter().position(|l| !l.is_initialized()) {
            return Err(Error::InvalidState(format!("layer {} is not initialized", i)));
        }
        let (first, rest) = self
            .layers
            .split_first_mut()
            .ok_or_else(|| Error::InvalidState("this network has no layers".to_string()))?;
        let mut previous = first.activate(input)?;
        for layer in rest {
            previous = layer.activate(previous)?;
        }
        self.forward_done = true;
        Ok(previous)
    }

    /// Seeds the last layer with `target - prediction` and walks the blame back to layer 0.
    ///
    /// # Errors
    /// * [`Error::InvalidState`] if there are no layers or no forward pass has run
    /// * [`Error::ShapeMismatch`] if `target` has the wrong length
    pub fn back_propagate(&mut self, target: &[f64]) -> Result<()> {
        let last = self.check_forward("back_propagate")?;
        if target.len() != self.layers[last].outputs() {
            return Err(Error::shape(
                "back_propagate target",
                self.layers[last].outputs(),
                target.len(),
            ));
        }
        let blame = SquaredError.blame(self.layers[last].activation(), target)?;
        self.layers[last].set_blame(Vector::from(blame))?;
        for i in (1..=last).rev() {
            let blame = self.layers[i].back_propagate()?;
            self.layers[i - 1].set_blame(blame)?;
        }
        Ok(())
    }

    /// Accumulates every layer's gradient; layer 0 sees `input`, later layers see their
    /// predecessor's activation. Weights are untouched.
    pub fn update_gradient(&mut self, input: &[f64]) -> Result<()> {
        self.check_forward("update_gradient")?;
        let (first, rest) = self
            .layers
            .split_first_mut()
            .ok_or_else(|| Error::InvalidState("this network has no layers".to_string()))?;
        first.update_gradient(input)?;
        let mut previous = first.activation();
        for layer in rest {
            layer.update_gradient(previous)?;
            previous = layer.activation();
        }
        Ok(())
    }

    /// Applies the optimizer to every layer's accumulated gradient.
    pub fn update_weights(&mut self) {
        for layer in &mut self.layers {
            layer.apply_gradient(&self.optimizer);
        }
    }

    /// One full step on a single example: predict, back-propagate, accumulate, apply.
    pub fn refine(&mut self, input: &[f64], target: &[f64]) -> Result<()> {
        self.predict(input)?;
        self.back_propagate(target)?;
        self.update_gradient(input)?;
        self.update_weights();
        Ok(())
    }

    fn check_forward(&self, context: &str) -> Result<usize> {
        if self.layers.is_empty() {
            return Err(Error::InvalidState(format!(
                "{} on a network with no layers",
                context
            )));
        }
        if !self.forward_done {
            return Err(Error::InvalidState(format!("{} before predict", context)));
        }
        Ok(self.layers.len() - 1)
    }
}

/// Fluent construction of a [`Network`].
#[derive(Debug)]
pub struct NetworkBuilder {
    learning_rate: f64,
    momentum: f64,
    layers: Vec<Box<dyn Layer>>,
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        let sgd = Sgd::default();
        Self {
            learning_rate: sgd.learning_rate(),
            momentum: sgd.momentum(),
            layers: Vec::new(),
        }
    }
}

impl NetworkBuilder {
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn layer<L: Layer + 'static>(mut self, layer: L) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    /// # Errors
    /// * [`Error::InvalidParameter`] for an unusable learning rate or momentum
    /// * [`Error::ConstructionInvariant`] if adjacent layer sizes disagree
    pub fn build(self) -> Result<Network> {
        let optimizer = Sgd::new(self.learning_rate).with_momentum(self.momentum);
        optimizer.validate()?;
        let mut network = Network::new(optimizer);
        for layer in self.layers {
            network.add_boxed_layer(layer)?;
        }
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{
        ConvolutionLayer, LeakyRectifierLayer, LinearLayer, MaxPooling2DLayer, TanhLayer,
    };
    use crate::numeric::{Matrix, Tensor};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TOLERANCE: f64 = 1e-6;

    fn assert_close(got: &[f64], expected: &[f64]) {
        assert_eq!(got.len(), expected.len());
        for (i, (g, e)) in got.iter().zip(expected).enumerate() {
            assert!((g - e).abs() < TOLERANCE, "index {}: {} vs {}", i, g, e);
        }
    }

    fn sparse(len: usize, entries: &[(usize, f64)]) -> Vec<f64> {
        let mut out = vec![0.0; len];
        for &(i, v) in entries {
            out[i] = v;
        }
        out
    }

    fn hundredths(range: std::ops::RangeInclusive<i32>) -> impl Iterator<Item = f64> {
        range.map(|i| f64::from(i) * 0.01)
    }

    fn debug_network() -> Network {
        let mut first = ConvolutionLayer::new(&[4, 4], &[3, 3, 1], &[4, 4, 1]).unwrap();
        first
            .set_weights(Tensor::from_vec(hundredths(1..=9).collect(), &[3, 3, 1]).unwrap())
            .unwrap();
        first.set_bias(Vector::from(vec![0.0])).unwrap();

        let mut second = ConvolutionLayer::new(&[4, 4], &[3, 3, 2], &[4, 4, 2]).unwrap();
        let filter = hundredths(11..=19).chain(hundredths(21..=29)).collect();
        second
            .set_weights(Tensor::from_vec(filter, &[3, 3, 2]).unwrap())
            .unwrap();
        second.set_bias(Vector::from(vec![0.1, 0.2])).unwrap();

        Network::builder()
            .learning_rate(0.01)
            .momentum(0.0)
            .layer(first)
            .layer(second)
            .layer(LeakyRectifierLayer::new(32))
            .layer(MaxPooling2DLayer::new(&[4, 4, 2]).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_debug_network_single_step() {
        let mut network = debug_network();
        let input: Vec<f64> = (0..16).map(|i| f64::from(i) * 0.1).collect();
        let target = [0.7, 0.6, 0.5, 0.4, 0.3, 0.2, 0.1, 0.0];
        network.refine(&input, &target).unwrap();

        let first = network.layer_as::<ConvolutionLayer>(0).unwrap();
        assert_close(
            first.activation(),
            &[
                0.083, 0.139, 0.178, 0.121, 0.198, 0.303, 0.348, 0.225, 0.33, 0.483, 0.528, 0.333,
                0.181, 0.253, 0.274, 0.163,
            ],
        );
        assert_close(
            first.blame(),
            &[
                -0.1021612, -0.2424868, -0.2526264, -0.1485652, -0.2912204, -0.6655076,
                -0.6947076, -0.3948608, -0.3290468, -0.7531076, -0.7823076, -0.4446344,
                -0.2285932, -0.5069644, -0.5260248, -0.2907052,
            ],
        );
        assert_close(
            first.weights().as_slice(),
            &[
                -0.0127731944,
                -0.0109769472,
                0.0017403532,
                -0.0035582312,
                -0.005801104,
                0.0112854192,
                0.0259183208,
                0.0248525472,
                0.0427923164,
            ],
        );
        assert_close(first.bias(), &[-0.0665352]);

        let second_activation = [
            0.2279, 0.31527, 0.32242, 0.24273, 0.35738, 0.52116, 0.52342, 0.36627, 0.37058,
            0.53488, 0.52774, 0.36507, 0.27002, 0.37003, 0.36238, 0.26085, 0.4002, 0.54017,
            0.55382, 0.42993, 0.61098, 0.88016, 0.88922, 0.63957, 0.64538, 0.92468, 0.91874,
            0.65217, 0.49472, 0.67493, 0.66578, 0.49065,
        ];
        let second_blame = sparse(
            32,
            &[
                (5, 0.17884),
                (6, 0.07658),
                (9, -0.03488),
                (10, -0.12774),
                (21, -0.58016),
                (22, -0.68922),
                (25, -0.82468),
                (26, -0.91874),
            ],
        );
        let second = network.layer_as::<ConvolutionLayer>(1).unwrap();
        assert_close(second.activation(), &second_activation);
        assert_close(second.blame(), &second_blame);
        assert_close(
            second.weights().as_slice(),
            &[
                0.1097987688,
                0.1198346784,
                0.1300021996,
                0.1398540524,
                0.149965446,
                0.1601851276,
                0.1705737384,
                0.1808298856,
                0.1908954992,
                0.2041438028,
                0.2122707704,
                0.2231963076,
                0.2296039884,
                0.237009478,
                0.2490165836,
                0.2609394564,
                0.2689549576,
                0.2808844832,
            ],
        );
        assert_close(second.bias(), &[0.100928, 0.169872]);

        let leaky = network.layer(2).unwrap();
        assert_close(leaky.activation(), &second_activation);
        assert_close(leaky.blame(), &second_blame);

        let pool = network.layer(3).unwrap();
        assert_close(
            pool.activation(),
            &[0.52116, 0.52342, 0.53488, 0.52774, 0.88016, 0.88922, 0.92468, 0.91874],
        );
        assert_close(
            pool.blame(),
            &[0.17884, 0.07658, -0.03488, -0.12774, -0.58016, -0.68922, -0.82468, -0.91874],
        );
    }

    #[test]
    fn test_empty_network_fails() {
        let mut network = Network::default();
        assert!(matches!(network.predict(&[1.0]), Err(Error::InvalidState(_))));
        assert!(matches!(
            network.back_propagate(&[1.0]),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(network.state(), NetworkState::Uninitialized);
    }

    #[test]
    fn test_add_layer_checks_sizes() {
        let mut network = Network::new(Sgd::new(0.1));
        network.add_layer(LinearLayer::new(3, 4)).unwrap();
        let err = network.add_layer(TanhLayer::new(5)).unwrap_err();
        assert!(matches!(err, Error::ConstructionInvariant(_)));
        assert_eq!(network.len(), 1);
        assert!(Network::builder()
            .layer(LinearLayer::new(2, 2))
            .layer(LinearLayer::new(3, 1))
            .build()
            .is_err());
    }

    #[test]
    fn test_builder_rejects_bad_learning_rate() {
        let result = Network::builder().learning_rate(f64::INFINITY).build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_state_machine() {
        let mut network = Network::builder()
            .layer(LinearLayer::new(2, 1))
            .build()
            .unwrap();
        assert_eq!(network.state(), NetworkState::Uninitialized);
        assert!(matches!(network.predict(&[1.0, 2.0]), Err(Error::InvalidState(_))));

        network.initialize(&mut StdRng::seed_from_u64(9));
        assert_eq!(network.state(), NetworkState::Initialized);
        assert!(matches!(
            network.back_propagate(&[1.0]),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            network.update_gradient(&[1.0, 2.0]),
            Err(Error::InvalidState(_))
        ));

        network.predict(&[1.0, 2.0]).unwrap();
        assert_eq!(network.state(), NetworkState::Ready);
        assert!(matches!(
            network.back_propagate(&[1.0, 2.0]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_refine_reduces_error() {
        let mut network = Network::builder()
            .learning_rate(0.05)
            .layer(LinearLayer::new(2, 3))
            .layer(TanhLayer::new(3))
            .layer(LinearLayer::new(3, 1))
            .build()
            .unwrap();
        network.initialize(&mut StdRng::seed_from_u64(17));
        let x = [0.3, -0.8];
        let y = [0.5];
        let before = (network.predict(&x).unwrap()[0] - y[0]).abs();
        for _ in 0..200 {
            network.refine(&x, &y).unwrap();
        }
        let after = (network.predict(&x).unwrap()[0] - y[0]).abs();
        assert!(after < before);
        assert!(after < 1e-3, "error after training {}", after);
    }

    #[test]
    fn test_update_gradient_leaves_weights() {
        let mut network = debug_network();
        let input: Vec<f64> = (0..16).map(|i| f64::from(i) * 0.1).collect();
        network.predict(&input).unwrap();
        network.back_propagate(&[0.0; 8]).unwrap();
        network.update_gradient(&input).unwrap();
        let first = network.layer_as::<ConvolutionLayer>(0).unwrap();
        assert_close(first.weights().as_slice(), &hundredths(1..=9).collect::<Vec<_>>());
        assert!(first.weights_gradient().as_slice().iter().any(|&g| g != 0.0));
    }

    #[test]
    fn test_clone_is_deep() {
        let mut network = Network::builder()
            .layer(LinearLayer::new(2, 1))
            .build()
            .unwrap();
        network.initialize(&mut StdRng::seed_from_u64(1));
        let copy = network.clone();
        network
            .layer_as_mut::<LinearLayer>(0)
            .unwrap()
            .set_weights(Matrix::from_rows([[5.0, 5.0]]).unwrap())
            .unwrap();
        let copied = copy.layer_as::<LinearLayer>(0).unwrap();
        assert_ne!(copied.weights().row(0), &[5.0, 5.0]);
    }

    #[test]
    fn test_typed_access_and_topology() {
        let network = debug_network();
        assert!(network.layer_as::<LinearLayer>(0).is_none());
        assert!(network.layer_as::<MaxPooling2DLayer>(3).is_some());
        assert!(network.layer(4).is_none());
        assert!(!network.is_linear_network());
        assert_eq!(
            network.topology().lines().next(),
            Some("0) [CONVOLUTION: 16->16, Weights=10]")
        );
        assert_eq!(network.inputs(), 16);
        assert_eq!(network.outputs(), 8);

        let linear = Network::builder()
            .layer(LinearLayer::new(3, 2))
            .build()
            .unwrap();
        assert!(linear.is_linear_network());
    }

    #[test]
    fn test_learning_rate_and_momentum_setters() {
        let mut network = Network::default();
        network.set_momentum(0.9);
        network.set_learning_rate(0.5);
        assert_eq!(network.optimizer().learning_rate(), 0.5);
        assert_eq!(network.optimizer().momentum(), 0.9);
    }
}
