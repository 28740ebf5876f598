use crate::error::{Error, Result};

/// A trait for loss functions driving backpropagation.
///
/// Implementors must define:
/// - How to compute the scalar loss value (for logging/metrics).
/// - How to compute the blame for the last layer: the error signal pointing from the
///   prediction toward the target.
///
/// Blame is what [`Network::back_propagate`](crate::network::Network::back_propagate) seeds the
/// last layer with.
pub trait Loss {
    /// Computes the scalar loss value.
    fn loss(&self, prediction: &[f64], target: &[f64]) -> Result<f64>;

    /// Computes the blame vector for `prediction` against `target`.
    fn blame(&self, prediction: &[f64], target: &[f64]) -> Result<Vec<f64>>;
}

fn check_lengths(context: &'static str, prediction: &[f64], target: &[f64]) -> Result<()> {
    if prediction.len() != target.len() {
        return Err(Error::shape(context, target.len(), prediction.len()));
    }
    Ok(())
}

/// Sum-squared error: `L = Σ(target_i - pred_i)^2`
///
/// Blame: `target - pred`, i.e. `-½·∂L/∂pred`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SquaredError;

impl Loss for SquaredError {
    fn loss(&self, prediction: &[f64], target: &[f64]) -> Result<f64> {
        check_lengths("squared error", prediction, target)?;
        Ok(prediction
            .iter()
            .zip(target)
            .map(|(p, t)| (t - p) * (t - p))
            .sum())
    }

    fn blame(&self, prediction: &[f64], target: &[f64]) -> Result<Vec<f64>> {
        check_lengths("squared error blame", prediction, target)?;
        Ok(prediction.iter().zip(target).map(|(p, t)| t - p).collect())
    }
}

/// Absolute error: `L = Σ|target_i - pred_i|`
///
/// Blame: `sign(target - pred)` (zero where they agree).
#[derive(Clone, Copy, Debug, Default)]
pub struct AbsoluteError;

impl Loss for AbsoluteError {
    fn loss(&self, prediction: &[f64], target: &[f64]) -> Result<f64> {
        check_lengths("absolute error", prediction, target)?;
        Ok(prediction.iter().zip(target).map(|(p, t)| (t - p).abs()).sum())
    }

    fn blame(&self, prediction: &[f64], target: &[f64]) -> Result<Vec<f64>> {
        check_lengths("absolute error blame", prediction, target)?;
        Ok(prediction
            .iter()
            .zip(target)
            .map(|(p, t)| {
                let d = t - p;
                if d == 0.0 {
                    0.0
                } else {
                    d.signum()
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_error() {
        let pred = [3.0, 5.0];
        let target = [1.0, 2.0];
        // (3-1)^2 + (5-2)^2 = 13
        assert!((SquaredError.loss(&pred, &target).unwrap() - 13.0).abs() < 1e-12);
        assert_eq!(SquaredError.blame(&pred, &target).unwrap(), vec![-2.0, -3.0]);
    }

    #[test]
    fn test_absolute_error() {
        let pred = [3.0, -1.0, 2.0];
        let target = [1.0, 2.0, 2.0];
        assert!((AbsoluteError.loss(&pred, &target).unwrap() - 5.0).abs() < 1e-12);
        assert_eq!(
            AbsoluteError.blame(&pred, &target).unwrap(),
            vec![-1.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_length_mismatch() {
        let err = SquaredError.loss(&[1.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert!(AbsoluteError.blame(&[1.0, 2.0], &[1.0]).is_err());
    }
}
