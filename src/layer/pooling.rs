use super::{check_input, Layer, LayerKind, Signals};
use crate::error::{Error, Result};
use crate::numeric::{count_elements, Vector};
use std::any::Any;

/// 2×2 max pooling over the first two dims of a 3-dimensional input.
///
/// For input dims `[w, h, c]` the output is `[w/2, h/2, c]`. Each output element remembers which
/// of its four block positions won, and [`back_propagate`](Layer::back_propagate) routes blame
/// only to that position. Positions are compared in the order `(2i,2j)`, `(2i+1,2j)`,
/// `(2i,2j+1)`, `(2i+1,2j+1)`; ties go to the earlier one.
#[derive(Clone, Debug)]
pub struct MaxPooling2DLayer {
    input_dims: [usize; 3],
    output_dims: [usize; 3],
    signals: Signals,
    winners: Option<Vec<usize>>,
}

impl MaxPooling2DLayer {
    /// # Errors
    /// [`Error::ConstructionInvariant`] unless `input_dims` has exactly 3 entries and the first
    /// two are even.
    pub fn new(input_dims: &[usize]) -> Result<Self> {
        let &[w, h, c] = input_dims else {
            return Err(Error::ConstructionInvariant(format!(
                "max pooling needs 3 input dims, got {:?}",
                input_dims
            )));
        };
        if w % 2 != 0 || h % 2 != 0 {
            return Err(Error::ConstructionInvariant(format!(
                "the first two pooling dims must be even, got {:?}",
                input_dims
            )));
        }
        let output_dims = [w / 2, h / 2, c];
        Ok(Self {
            input_dims: [w, h, c],
            output_dims,
            signals: Signals::new(count_elements(&output_dims)),
            winners: None,
        })
    }

    pub fn input_dims(&self) -> &[usize] {
        &self.input_dims
    }

    pub fn output_dims(&self) -> &[usize] {
        &self.output_dims
    }
}

impl Layer for MaxPooling2DLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::MaxPooling2D
    }

    fn inputs(&self) -> usize {
        count_elements(&self.input_dims)
    }

    fn outputs(&self) -> usize {
        self.signals.activation.len()
    }

    fn activate(&mut self, input: &[f64]) -> Result<&[f64]> {
        check_input("max pooling activate", self.inputs(), input)?;
        let [w, h, _] = self.input_dims;
        let [ow, oh, oc] = self.output_dims;
        let mut winners = Vec::with_capacity(self.outputs());
        let activation = &mut self.signals.activation;

        for k in 0..oc {
            for j in 0..oh {
                for i in 0..ow {
                    let corner = 2 * i + 2 * j * w + k * w * h;
                    let block = [corner, corner + 1, corner + w, corner + w + 1];
                    let mut best = block[0];
                    for &p in &block[1..] {
                        if input[p] > input[best] {
                            best = p;
                        }
                    }
                    activation[i + j * ow + k * ow * oh] = input[best];
                    winners.push(best);
                }
            }
        }

        self.winners = Some(winners);
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

    /// # Errors
    /// [`Error::InvalidState`] if no forward pass has run yet.
    fn back_propagate(&self) -> Result<Vector> {
        let winners = self.winners.as_ref().ok_or_else(|| {
            Error::InvalidState("max pooling back_propagate before activate".to_string())
        })?;
        let mut result = Vector::zeros(self.inputs());
        for (&p, &b) in winners.iter().zip(self.signals.blame.iter()) {
            result[p] = b;
        }
        Ok(result)
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
