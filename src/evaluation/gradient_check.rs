//! Finite-difference verification of backpropagated gradients.

use crate::error::{Error, Result};
use crate::layer::LayerKind;
use crate::loss::{Loss, SquaredError};
use crate::network::Network;
use crate::numeric::Matrix;
use log::{info, warn};

/// Outcome of checking one learnable layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerGradientReport {
    pub layer: usize,
    pub kind: LayerKind,
    /// Weights plus bias values compared.
    pub checked: usize,
    pub max_abs_difference: f64,
    pub mismatches: usize,
}

impl LayerGradientReport {
    fn new(layer: usize, kind: LayerKind) -> Self {
        Self {
            layer,
            kind,
            checked: 0,
            max_abs_difference: 0.0,
            mismatches: 0,
        }
    }

    fn record(&mut self, analytic: f64, numeric: f64, tolerance: f64) {
        let difference = (analytic - numeric).abs();
        self.checked += 1;
        self.max_abs_difference = self.max_abs_difference.max(difference);
        if difference > tolerance * numeric.abs().max(1.0) {
            self.mismatches += 1;
        }
    }

    pub fn passed(&self) -> bool {
        self.mismatches == 0
    }
}

#[derive(Clone, Copy, Debug)]
enum Slot {
    Weights,
    Bias,
}

/// Compares every learnable value's accumulated gradient with a central-difference estimate of
/// `-½·∂SSE/∂w`, `(SSE(w-δ) - SSE(w+δ)) / 4δ`.
///
/// A difference counts as a mismatch when it exceeds `tolerance · max(1, |estimate|)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientChecker {
    delta: f64,
    tolerance: f64,
}

impl Default for GradientChecker {
    fn default() -> Self {
        Self {
            delta: 1e-4,
            tolerance: 1e-4,
        }
    }
}

impl GradientChecker {
    /// # Errors
    /// [`Error::InvalidParameter`] unless both values are finite and positive.
    pub fn new(delta: f64, tolerance: f64) -> Result<Self> {
        for (name, value) in [("delta", delta), ("tolerance", tolerance)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "gradient check {} must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(Self { delta, tolerance })
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Accumulates the analytic gradient of every learnable layer over all rows, then checks each
    /// weight and bias value against its finite-difference estimate.
    ///
    /// Weights are restored after every perturbation and gradient accumulators are left zeroed.
    ///
    /// # Errors
    /// * [`Error::ShapeMismatch`] if the row counts differ or rows do not fit the network
    /// * [`Error::InvalidState`] for empty data or an uninitialized network
    pub fn check(
        &self,
        network: &mut Network,
        features: &Matrix,
        labels: &Matrix,
    ) -> Result<Vec<LayerGradientReport>> {
        if features.rows() != labels.rows() {
            return Err(Error::shape("gradient check labels", features.rows(), labels.rows()));
        }
        if features.rows() == 0 {
            return Err(Error::InvalidState("gradient check needs at least one row".to_string()));
        }
        let learnable: Vec<usize> = network
            .layers()
            .iter()
            .enumerate()
            .filter(|(_, l)| l.parameters().is_some())
            .map(|(i, _)| i)
            .collect();

        for &i in &learnable {
            zero_gradients(network, i);
        }
        for r in 0..features.rows() {
            network.predict(features.row(r))?;
            network.back_propagate(labels.row(r))?;
            network.update_gradient(features.row(r))?;
        }
        let analytic: Vec<(Vec<f64>, Vec<f64>)> = learnable
            .iter()
            .filter_map(|&i| network.layers()[i].parameters())
            .map(|p| (p.weights_gradient.to_vec(), p.bias_gradient.to_vec()))
            .collect();

        let mut reports = Vec::with_capacity(learnable.len());
        for (&i, (weights, bias)) in learnable.iter().zip(analytic) {
            let mut report = LayerGradientReport::new(i, network.layers()[i].kind());
            for (slot, gradient) in [(Slot::Weights, weights), (Slot::Bias, bias)] {
                for (j, &g) in gradient.iter().enumerate() {
                    let estimate = self.estimate(network, i, slot, j, features, labels)?;
                    report.record(g, estimate, self.tolerance);
                }
            }
            if report.passed() {
                info!(
                    "Layer {} {}: {} gradients agree, max difference {:e}",
                    i, report.kind, report.checked, report.max_abs_difference
                );
            } else {
                warn!(
                    "Layer {} {}: {} of {} gradients disagree, max difference {:e}",
                    i, report.kind, report.mismatches, report.checked, report.max_abs_difference
                );
            }
            reports.push(report);
        }

        for &i in &learnable {
            zero_gradients(network, i);
        }
        Ok(reports)
    }

    fn estimate(
        &self,
        network: &mut Network,
        layer: usize,
        slot: Slot,
        index: usize,
        features: &Matrix,
        labels: &Matrix,
    ) -> Result<f64> {
        let saved = slot_mut(network, layer, slot)?[index];
        slot_mut(network, layer, slot)?[index] = saved - self.delta;
        let minus = sum_squared_error(network, features, labels);
        slot_mut(network, layer, slot)?[index] = saved + self.delta;
        let plus = sum_squared_error(network, features, labels);
        slot_mut(network, layer, slot)?[index] = saved;
        Ok((minus? - plus?) / (4.0 * self.delta))
    }
}

fn slot_mut(network: &mut Network, layer: usize, slot: Slot) -> Result<&mut [f64]> {
    let params = network
        .layer_mut(layer)
        .and_then(|l| l.parameters_mut())
        .ok_or_else(|| Error::InvalidState(format!("layer {} has no parameters", layer)))?;
    Ok(match slot {
        Slot::Weights => params.weights,
        Slot::Bias => params.bias,
    })
}

fn zero_gradients(network: &mut Network, layer: usize) {
    if let Some(params) = network.layer_mut(layer).and_then(|l| l.parameters_mut()) {
        params.weights_gradient.fill(0.0);
        params.bias_gradient.fill(0.0);
    }
}

fn sum_squared_error(network: &mut Network, features: &Matrix, labels: &Matrix) -> Result<f64> {
    let mut sse = 0.0;
    for r in 0..features.rows() {
        let prediction = network.predict(features.row(r))?;
        sse += SquaredError.loss(prediction, labels.row(r))?;
    }
    Ok(sse)
}
