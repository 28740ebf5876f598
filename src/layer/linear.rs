use super::{check_input, ConnectedParams, Layer, LayerKind, Params, ParamsMut, Signals};
use crate::error::{Error, Result};
use crate::numeric::{Matrix, Vector, VectorOps};
use crate::optimizer::Optimizer;
use crate::regularizers::Regularization;
use log::debug;
use rand::RngCore;
use std::any::Any;

/// Fully connected affine layer: `activation = W·x + b`.
///
/// `W` is an `outputs × inputs` matrix. Besides gradient training it can be fitted in closed
/// form with [`ordinary_least_squares`](Self::ordinary_least_squares).
///
/// # Example
/// ```rust
/// use layerwise::layer::{Layer, LinearLayer};
/// use layerwise::numeric::{Matrix, Vector};
///
/// let mut layer = LinearLayer::new(3, 2);
/// layer
///     .set_weights(Matrix::from_rows([[1.0, 2.0, 3.0], [2.0, 1.0, 0.0]]).unwrap())
///     .unwrap();
/// layer.set_bias(Vector::from(vec![1.0, 5.0])).unwrap();
/// assert_eq!(layer.activate(&[0.0, 1.0, 2.0]).unwrap(), &[9.0, 6.0]);
/// ```
#[derive(Clone, Debug)]
pub struct LinearLayer {
    params: ConnectedParams<Matrix>,
    signals: Signals,
    regularization: Regularization,
}

impl LinearLayer {
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            params: ConnectedParams::new(Matrix::new(outputs, inputs), outputs),
            signals: Signals::new(outputs),
            regularization: Regularization::None,
        }
    }

    pub fn with_regularization(mut self, regularization: Regularization) -> Self {
        self.regularization = regularization;
        self
    }

    pub fn regularization(&self) -> Regularization {
        self.regularization
    }

    pub fn set_regularization(&mut self, regularization: Regularization) {
        self.regularization = regularization;
    }

    pub fn weights(&self) -> &Matrix {
        self.params.weights()
    }

    pub fn bias(&self) -> &[f64] {
        self.params.bias()
    }

    pub fn weights_gradient(&self) -> &Matrix {
        self.params.weights_gradient()
    }

    pub fn bias_gradient(&self) -> &[f64] {
        self.params.bias_gradient()
    }

    /// Replaces the weight matrix. Counts as initialization.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] unless `weights` is `outputs × inputs`.
    pub fn set_weights(&mut self, weights: Matrix) -> Result<()> {
        let current = self.params.weights();
        if weights.rows() != current.rows() || weights.cols() != current.cols() {
            return Err(Error::shape(
                "linear weights",
                format!("{}x{}", current.rows(), current.cols()),
                format!("{}x{}", weights.rows(), weights.cols()),
            ));
        }
        self.params.weights = weights;
        self.params.initialized = true;
        Ok(())
    }

    pub fn set_bias(&mut self, bias: Vector) -> Result<()> {
        if bias.len() != self.outputs() {
            return Err(Error::shape("linear bias", self.outputs(), bias.len()));
        }
        self.params.bias = bias;
        Ok(())
    }

    /// Fits weights and bias in closed form to map the rows of `x` onto the rows of `y`.
    ///
    /// With centered rows `x̃ = x - x̄` and `ỹ = y - ȳ`:
    /// ```text
    /// W = (Σ ỹ ⊗ x̃) · pinv(Σ x̃ ⊗ x̃)
    /// b = ȳ - W·x̄
    /// ```
    ///
    /// # Errors
    /// * [`Error::ShapeMismatch`] if the column counts do not match the layer or the row counts
    ///   differ
    /// * [`Error::InvalidState`] if there are no rows
    pub fn ordinary_least_squares(&mut self, x: &Matrix, y: &Matrix) -> Result<()> {
        if x.cols() != self.inputs() {
            return Err(Error::shape("ordinary_least_squares features", self.inputs(), x.cols()));
        }
        if y.cols() != self.outputs() {
            return Err(Error::shape("ordinary_least_squares labels", self.outputs(), y.cols()));
        }
        if x.rows() != y.rows() {
            return Err(Error::shape("ordinary_least_squares rows", x.rows(), y.rows()));
        }
        if x.rows() == 0 {
            return Err(Error::InvalidState(
                "ordinary least squares needs at least one row".to_string(),
            ));
        }
        debug!(
            "Fitting {}x{} linear layer on {} rows",
            self.outputs(),
            self.inputs(),
            x.rows()
        );

        let mean_x: Vector = (0..x.cols()).map(|c| x.column_mean(c)).collect();
        let mean_y: Vector = (0..y.cols()).map(|c| y.column_mean(c)).collect();

        let mut cross = Matrix::new(y.cols(), x.cols());
        let mut spread = Matrix::new(x.cols(), x.cols());
        for (xr, yr) in x.row_iter().zip(y.row_iter()) {
            let dx: Vector = xr.iter().zip(mean_x.iter()).map(|(v, m)| v - m).collect();
            let dy: Vector = yr.iter().zip(mean_y.iter()).map(|(v, m)| v - m).collect();
            cross.add_scaled(&Vector::outer_product(&dy, &dx), 1.0)?;
            spread.add_scaled(&Vector::outer_product(&dx, &dx), 1.0)?;
        }

        let weights = Matrix::multiply(&cross, &spread.pseudo_inverse()?, false, false)?;
        let mut bias = mean_y;
        bias.add_scaled(&weights.multiply_vector(&mean_x)?, -1.0)?;

        self.params.weights = weights;
        self.params.bias = bias;
        self.params.reset_gradient();
        self.params.initialized = true;
        Ok(())
    }
}

impl Layer for LinearLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Linear
    }

    fn inputs(&self) -> usize {
        self.params.weights().cols()
    }

    fn outputs(&self) -> usize {
        self.params.weights().rows()
    }

    fn initialize(&mut self, rng: &mut dyn RngCore) {
        let scale = 1.0 / self.inputs().max(1) as f64;
        self.params.randomize(rng, scale);
    }

    fn is_initialized(&self) -> bool {
        self.params.is_initialized()
    }

    fn activate(&mut self, input: &[f64]) -> Result<&[f64]> {
        check_input("linear activate", self.inputs(), input)?;
        let mut out = self.params.weights.multiply_vector(input)?;
        out.add(&self.params.bias)?;
        self.signals.activation = out;
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
        self.params
            .weights
            .transpose_multiply_vector(&self.signals.blame)
    }

    fn update_gradient(&mut self, input: &[f64]) -> Result<()> {
        check_input("linear update_gradient", self.inputs(), input)?;
        let blame = &self.signals.blame;
        let gradient = &mut self.params.weights_gradient;
        for (r, &b) in blame.iter().enumerate() {
            gradient.row_mut(r).add_scaled(input, b)?;
        }
        self.regularization
            .apply(self.params.weights.as_slice(), gradient.as_mut_slice());
        self.params.bias_gradient.add(blame)?;
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
