//! Layers: the stateful computation nodes a [`Network`](crate::network::Network) chains
//! together.
//!
//! Every layer owns an `activation` buffer (written by [`Layer::activate`]) and a `blame` buffer
//! (set by its successor, or by the network for the last layer). Learnable layers additionally
//! hold a [`ConnectedParams`] with weights, bias and their gradient accumulators.
//!
//! One training step for a layer is:
//! 1. [`activate`](Layer::activate) with its input
//! 2. receive blame through [`set_blame`](Layer::set_blame)
//! 3. [`back_propagate`](Layer::back_propagate) to produce the predecessor's blame
//! 4. [`update_gradient`](Layer::update_gradient) with the same input
//! 5. after a batch, [`apply_gradient`](Layer::apply_gradient)

mod activation;
mod convolution;
mod linear;
mod pooling;

pub use activation::{LeakyRectifierLayer, TanhLayer};
pub use convolution::ConvolutionLayer;
pub use linear::LinearLayer;
pub use pooling::MaxPooling2DLayer;

use crate::error::{Error, Result};
use crate::numeric::Vector;
use crate::optimizer::Optimizer;
use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use std::any::Any;
use std::fmt;

/// Variant tag reported in topology strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Linear,
    Tanh,
    LeakyRectifier,
    Convolution,
    MaxPooling2D,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Linear => "LINEAR",
            LayerKind::Tanh => "TANH",
            LayerKind::LeakyRectifier => "LEAKY_RECTIFIER",
            LayerKind::Convolution => "CONVOLUTION",
            LayerKind::MaxPooling2D => "MAX_POOLING_2D",
        };
        f.write_str(name)
    }
}

/// Read-only access to a learnable layer's parameters, flattened.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    pub weights: &'a [f64],
    pub bias: &'a [f64],
    pub weights_gradient: &'a [f64],
    pub bias_gradient: &'a [f64],
}

/// Mutable access to a learnable layer's parameters, flattened.
#[derive(Debug)]
pub struct ParamsMut<'a> {
    pub weights: &'a mut [f64],
    pub bias: &'a mut [f64],
    pub weights_gradient: &'a mut [f64],
    pub bias_gradient: &'a mut [f64],
}

/// A node in a layer pipeline.
///
/// The trait is object-safe; networks store `Box<dyn Layer>`. Layers that learn nothing keep
/// the default no-op implementations of the gradient methods.
pub trait Layer: fmt::Debug + Send + Sync {
    fn kind(&self) -> LayerKind;

    /// Flattened input length.
    fn inputs(&self) -> usize;

    /// Flattened output length.
    fn outputs(&self) -> usize;

    /// Randomizes learnable parameters and zeroes the gradient accumulators.
    fn initialize(&mut self, _rng: &mut dyn RngCore) {}

    /// Whether the layer may run a forward pass.
    fn is_initialized(&self) -> bool {
        true
    }

    /// Forward pass. Writes and returns the activation.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `input.len() != self.inputs()`.
    fn activate(&mut self, input: &[f64]) -> Result<&[f64]>;

    /// Activation from the most recent forward pass.
    fn activation(&self) -> &[f64];

    fn blame(&self) -> &[f64];

    /// Replaces the blame buffer.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `blame.len() != self.outputs()`.
    fn set_blame(&mut self, blame: Vector) -> Result<()>;

    /// Converts this layer's blame into the blame for its predecessor (length `inputs()`).
    fn back_propagate(&self) -> Result<Vector>;

    /// Accumulates the parameter gradient for `input` and the current blame.
    fn update_gradient(&mut self, _input: &[f64]) -> Result<()> {
        Ok(())
    }

    /// Moves the parameters along the accumulated gradient.
    fn apply_gradient(&mut self, _optimizer: &dyn Optimizer) {}

    fn parameters(&self) -> Option<Params<'_>> {
        None
    }

    fn parameters_mut(&mut self) -> Option<ParamsMut<'_>> {
        None
    }

    /// Number of learnable values (weights plus bias).
    fn parameter_count(&self) -> usize {
        self.parameters()
            .map_or(0, |p| p.weights.len() + p.bias.len())
    }

    /// Deep copy behind a fresh box.
    fn box_clone(&self) -> Box<dyn Layer>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// One-line summary, `[KIND: inputs->outputs, Weights=count]`.
    fn topology_string(&self) -> String {
        format!(
            "[{}: {}->{}, Weights={}]",
            self.kind(),
            self.inputs(),
            self.outputs(),
            self.parameter_count()
        )
    }
}

impl Clone for Box<dyn Layer> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Activation and blame buffers every layer carries.
#[derive(Clone, Debug, PartialEq)]
struct Signals {
    activation: Vector,
    blame: Vector,
}

impl Signals {
    fn new(outputs: usize) -> Self {
        Self {
            activation: Vector::zeros(outputs),
            blame: Vector::zeros(outputs),
        }
    }

    fn set_blame(&mut self, blame: Vector) -> Result<()> {
        if blame.len() != self.blame.len() {
            return Err(Error::shape("set_blame", self.blame.len(), blame.len()));
        }
        self.blame = blame;
        Ok(())
    }
}

fn check_input(context: &'static str, expected: usize, input: &[f64]) -> Result<()> {
    if input.len() != expected {
        return Err(Error::shape(context, expected, input.len()));
    }
    Ok(())
}

/// Learnable state shared by connected layers: weights of storage `W`, a bias vector and their
/// gradient accumulators.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectedParams<W> {
    weights: W,
    bias: Vector,
    weights_gradient: W,
    bias_gradient: Vector,
    initialized: bool,
}

impl<W> ConnectedParams<W>
where
    W: AsRef<[f64]> + AsMut<[f64]> + Clone,
{
    /// Zeroed parameters shaped like `weights` with `bias_len` bias terms.
    pub fn new(mut weights: W, bias_len: usize) -> Self {
        weights.as_mut().fill(0.0);
        Self {
            weights_gradient: weights.clone(),
            weights,
            bias: Vector::zeros(bias_len),
            bias_gradient: Vector::zeros(bias_len),
            initialized: false,
        }
    }

    pub fn weights(&self) -> &W {
        &self.weights
    }

    pub fn bias(&self) -> &[f64] {
        &self.bias
    }

    pub fn weights_gradient(&self) -> &W {
        &self.weights_gradient
    }

    pub fn bias_gradient(&self) -> &[f64] {
        &self.bias_gradient
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Fills weights and bias with `scale`-scaled standard normal samples and zeroes the
    /// gradients.
    fn randomize(&mut self, rng: &mut dyn RngCore, scale: f64) {
        for v in self
            .weights
            .as_mut()
            .iter_mut()
            .chain(self.bias.iter_mut())
        {
            *v = scale * rng.sample::<f64, _>(StandardNormal);
        }
        self.reset_gradient();
        self.initialized = true;
    }

    fn reset_gradient(&mut self) {
        self.weights_gradient.as_mut().fill(0.0);
        self.bias_gradient.fill(0.0);
    }

    fn apply(&mut self, optimizer: &dyn Optimizer) {
        optimizer.step(self.weights.as_mut(), self.weights_gradient.as_mut());
        optimizer.step(&mut self.bias, &mut self.bias_gradient);
    }

    fn params(&self) -> Params<'_> {
        Params {
            weights: self.weights.as_ref(),
            bias: &self.bias,
            weights_gradient: self.weights_gradient.as_ref(),
            bias_gradient: &self.bias_gradient,
        }
    }

    fn params_mut(&mut self) -> ParamsMut<'_> {
        ParamsMut {
            weights: self.weights.as_mut(),
            bias: &mut self.bias,
            weights_gradient: self.weights_gradient.as_mut(),
            bias_gradient: &mut self.bias_gradient,
        }
    }
}
