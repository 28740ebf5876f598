//! Scoring a trained [`Learner`] against labelled rows.

pub mod gradient_check;

pub use gradient_check::{GradientChecker, LayerGradientReport};

use crate::error::{Error, Result};
use crate::learner::Learner;
use crate::numeric::{Matrix, VectorOps};

fn check_rows(features: &Matrix, labels: &Matrix) -> Result<()> {
    if features.rows() != labels.rows() {
        return Err(Error::shape("evaluation labels", features.rows(), labels.rows()));
    }
    Ok(())
}

/// Sum over all rows of the squared distance between prediction and label.
///
/// # Errors
/// [`Error::ShapeMismatch`] if the row counts differ or a prediction has the wrong width.
pub fn sum_squared_error<L: Learner + ?Sized>(
    learner: &mut L,
    features: &Matrix,
    labels: &Matrix,
) -> Result<f64> {
    check_rows(features, labels)?;
    let mut sse = 0.0;
    for r in 0..features.rows() {
        let prediction = learner.predict(features.row(r))?;
        sse += prediction.squared_distance(labels.row(r))?;
    }
    Ok(sse)
}

/// Number of rows whose predicted class differs from the labelled class.
///
/// With one label column the class is the value itself; with several (one-hot) it is the index
/// of the largest entry.
pub fn count_misclassifications<L: Learner + ?Sized>(
    learner: &mut L,
    features: &Matrix,
    labels: &Matrix,
) -> Result<usize> {
    check_rows(features, labels)?;
    let mut misses = 0;
    for r in 0..features.rows() {
        let prediction = learner.predict(features.row(r))?;
        let label = labels.row(r);
        if prediction.len() != label.len() {
            return Err(Error::shape("prediction width", label.len(), prediction.len()));
        }
        let hit = if label.len() == 1 {
            prediction[0] == label[0]
        } else {
            prediction.max_index() == label.max_index()
        };
        if !hit {
            misses += 1;
        }
    }
    Ok(misses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::BaselineLearner;
    use crate::numeric::Vector;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    /// Echoes its input as the prediction.
    struct Echo;

    impl Learner for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn train(&mut self, _: &Matrix, _: &Matrix, _: &mut dyn RngCore) -> Result<()> {
            Ok(())
        }

        fn predict(&mut self, input: &[f64]) -> Result<Vector> {
            Ok(Vector::from(input))
        }
    }

    #[test]
    fn test_sum_squared_error() {
        let features = Matrix::from_rows([[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let labels = Matrix::from_rows([[1.0, 0.0], [0.0, 4.0]]).unwrap();
        assert_eq!(sum_squared_error(&mut Echo, &features, &labels).unwrap(), 13.0);
    }

    #[test]
    fn test_count_misclassifications_one_hot() {
        let features = Matrix::from_rows([[0.1, 0.9], [0.8, 0.2], [0.4, 0.6]]).unwrap();
        let labels = Matrix::from_rows([[0.0, 1.0], [0.0, 1.0], [0.0, 1.0]]).unwrap();
        assert_eq!(count_misclassifications(&mut Echo, &features, &labels).unwrap(), 1);
    }

    #[test]
    fn test_count_misclassifications_class_column() {
        let features = Matrix::new(5, 1);
        let labels = Matrix::from_rows([[1.0], [1.0], [2.0], [1.0], [0.0]]).unwrap();
        let mut baseline = BaselineLearner::new();
        baseline
            .train(&features, &labels, &mut StdRng::seed_from_u64(0))
            .unwrap();
        // A continuous label column predicts its mean, 1.0.
        assert_eq!(count_misclassifications(&mut baseline, &features, &labels).unwrap(), 2);
    }

    #[test]
    fn test_row_mismatch() {
        let features = Matrix::new(2, 1);
        let labels = Matrix::new(3, 1);
        assert!(sum_squared_error(&mut Echo, &features, &labels).is_err());
        assert!(count_misclassifications(&mut Echo, &features, &labels).is_err());
    }
}
