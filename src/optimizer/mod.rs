use crate::error::{Error, Result};
use crate::numeric::VectorOps;
use std::fmt::Debug;

/// Trait for gradient-based update rules.
///
/// Optimizers are responsible for moving parameters along their accumulated gradient. Training
/// logic ([`Network`](crate::network::Network), [`Trainer`](crate::trainer::Trainer)) is
/// decoupled from the update rule, so any layer can be paired with any optimizer. The trait is
/// object-safe: layers receive it as `&dyn Optimizer`.
///
/// Gradients in this crate point in the *ascent* direction of `-½·SSE` (blame is
/// `target - prediction`), so an update adds the scaled gradient.
///
/// # Example
/// ```rust
/// use layerwise::optimizer::{Optimizer, Sgd};
///
/// let sgd = Sgd::new(0.5).with_momentum(0.25);
/// let mut weights = vec![1.0, 2.0];
/// let mut gradient = vec![2.0, -4.0];
/// sgd.step(&mut weights, &mut gradient);
/// assert_eq!(weights, vec![2.0, 0.0]);
/// assert_eq!(gradient, vec![0.5, -1.0]);
/// ```
pub trait Optimizer: Debug + Send + Sync {
    /// Applies one update to `params` from `gradient`, then decays `gradient` for the next
    /// accumulation window.
    fn step(&self, params: &mut [f64], gradient: &mut [f64]);
}

/// Stochastic Gradient Descent with momentum.
///
/// Update rule, applied after every accumulation window:
/// ```text
/// w ← w + η · g
/// g ← μ · g
/// ```
/// where `η` is the learning rate and `μ` the momentum. The gradient accumulator doubles as the
/// velocity: with `μ = 0` it resets to zero after every apply, otherwise its decayed value
/// carries into the next window.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sgd {
    learning_rate: f64,
    momentum: f64,
}

impl Sgd {
    /// Creates an optimizer with the given learning rate and no momentum.
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            momentum: 0.0,
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    /// Returns the current learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    /// Checks that both hyperparameters are usable.
    ///
    /// # Errors
    /// [`Error::InvalidParameter`] if either value is not finite or negative.
    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "learning rate must be finite and non-negative, got {}",
                self.learning_rate
            )));
        }
        if !self.momentum.is_finite() || self.momentum < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "momentum must be finite and non-negative, got {}",
                self.momentum
            )));
        }
        Ok(())
    }
}

impl Default for Sgd {
    fn default() -> Self {
        Self::new(0.0001)
    }
}

impl Optimizer for Sgd {
    fn step(&self, params: &mut [f64], gradient: &mut [f64]) {
        for (w, g) in params.iter_mut().zip(gradient.iter()) {
            *w += self.learning_rate * g;
        }
        gradient.scale(self.momentum);
    }
}
