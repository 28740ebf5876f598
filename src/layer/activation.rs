use super::{check_input, Layer, LayerKind, Signals};
use crate::error::Result;
use crate::numeric::{Vector, VectorOps};
use std::any::Any;

/// Slope of the leaky rectifier for negative inputs.
const LEAK: f64 = 0.01;

/// Element-wise hyperbolic tangent.
#[derive(Clone, Debug)]
pub struct TanhLayer {
    signals: Signals,
}

impl TanhLayer {
    pub fn new(size: usize) -> Self {
        Self {
            signals: Signals::new(size),
        }
    }
}

impl Layer for TanhLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Tanh
    }

    fn inputs(&self) -> usize {
        self.signals.activation.len()
    }

    fn outputs(&self) -> usize {
        self.signals.activation.len()
    }

    fn activate(&mut self, input: &[f64]) -> Result<&[f64]> {
        check_input("tanh activate", self.inputs(), input)?;
        self.signals.activation = input.map(f64::tanh);
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
        Ok(self
            .signals
            .blame
            .iter()
            .zip(self.signals.activation.iter())
            .map(|(b, a)| b * (1.0 - a * a))
            .collect())
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

/// Leaky rectified linear unit: `x` for `x >= 0`, `0.01·x` otherwise.
///
/// The derivative used during backpropagation is read off the stored activation: `1` where it
/// is positive, `0.01` where it is negative and exactly `0` where it is zero.
#[derive(Clone, Debug)]
pub struct LeakyRectifierLayer {
    signals: Signals,
}

impl LeakyRectifierLayer {
    pub fn new(size: usize) -> Self {
        Self {
            signals: Signals::new(size),
        }
    }
}

impl Layer for LeakyRectifierLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::LeakyRectifier
    }

    fn inputs(&self) -> usize {
        self.signals.activation.len()
    }

    fn outputs(&self) -> usize {
        self.signals.activation.len()
    }

    fn activate(&mut self, input: &[f64]) -> Result<&[f64]> {
        check_input("leaky rectifier activate", self.inputs(), input)?;
        self.signals.activation = input.map(|x| if x >= 0.0 { x } else { LEAK * x });
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
        Ok(self
            .signals
            .blame
            .iter()
            .zip(self.signals.activation.iter())
            .map(|(&b, &a)| {
                if a > 0.0 {
                    b
                } else if a < 0.0 {
                    LEAK * b
                } else {
                    0.0
                }
            })
            .collect())
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
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_tanh_forward_and_backward() {
        let mut layer = TanhLayer::new(3);
        let out = layer.activate(&[0.0, 1.0, -2.0]).unwrap().to_vec();
        assert_abs_diff_eq!(out[1], 1.0f64.tanh(), epsilon = 1e-12);
        layer.set_blame(Vector::from(vec![1.0, 1.0, 2.0])).unwrap();
        let back = layer.back_propagate().unwrap();
        assert_abs_diff_eq!(back[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(back[1], 1.0 - out[1] * out[1], epsilon = 1e-12);
        assert_abs_diff_eq!(back[2], 2.0 * (1.0 - out[2] * out[2]), epsilon = 1e-12);
    }

    #[test]
    fn test_leaky_rectifier_forward() {
        let mut layer = LeakyRectifierLayer::new(3);
        let out = layer.activate(&[2.0, -3.0, 0.0]).unwrap();
        assert_abs_diff_eq!(out[0], 2.0);
        assert_abs_diff_eq!(out[1], -0.03, epsilon = 1e-12);
        assert_abs_diff_eq!(out[2], 0.0);
    }

    #[test]
    fn test_leaky_rectifier_boundary_policy() {
        let mut layer = LeakyRectifierLayer::new(3);
        layer.activate(&[2.0, -3.0, 0.0]).unwrap();
        layer.set_blame(Vector::from(vec![5.0, 5.0, 5.0])).unwrap();
        let back = layer.back_propagate().unwrap();
        assert_abs_diff_eq!(back[0], 5.0);
        assert_abs_diff_eq!(back[1], 0.05, epsilon = 1e-12);
        assert_eq!(back[2], 0.0);
    }

    #[test]
    fn test_activation_layers_learn_nothing() {
        let mut layer = TanhLayer::new(2);
        assert!(layer.is_initialized());
        assert!(layer.parameters().is_none());
        assert!(layer.update_gradient(&[1.0, 2.0]).is_ok());
        assert_eq!(layer.topology_string(), "[TANH: 2->2, Weights=0]");
        assert!(layer.activate(&[1.0]).is_err());
    }
}
