//! Error types shared by every numeric, layer and network operation.

use std::fmt;

/// Error type for numeric and layer operations.
///
/// Every variant is a local, fail-fast contract violation: nothing in the crate retries.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Operand sizes disagree (buffers, matrices, tensors, layer inputs).
    ShapeMismatch {
        context: &'static str,
        expected: String,
        got: String,
    },
    /// Operation is not valid in the current lifecycle state.
    InvalidState(String),
    /// A value could not be constructed because its structural invariant does not hold.
    ConstructionInvariant(String),
    /// The SVD iteration cap was reached before singular value `index` converged.
    NonConvergence { iterations: usize, index: usize },
    /// Invalid hyperparameter or argument value.
    InvalidParameter(String),
}

impl Error {
    pub(crate) fn shape(
        context: &'static str,
        expected: impl fmt::Display,
        got: impl fmt::Display,
    ) -> Self {
        Error::ShapeMismatch {
            context,
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    pub(crate) fn dims(context: &'static str, expected: &[usize], got: &[usize]) -> Self {
        Error::ShapeMismatch {
            context,
            expected: format!("{:?}", expected),
            got: format!("{:?}", got),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ShapeMismatch {
                context,
                expected,
                got,
            } => {
                write!(f, "Shape mismatch in {}: expected {}, got {}", context, expected, got)
            }
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::ConstructionInvariant(msg) => {
                write!(f, "Construction invariant violated: {}", msg)
            }
            Error::NonConvergence { iterations, index } => write!(
                f,
                "Numeric non-convergence: singular value {} did not converge after {} iterations",
                index, iterations
            ),
            Error::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_shape_mismatch() {
        let err = Error::shape("dot", 3, 4);
        let msg = err.to_string();
        assert!(msg.contains("Shape mismatch"));
        assert!(msg.contains("dot"));
        assert!(msg.contains("expected 3, got 4"));
    }

    #[test]
    fn test_error_display_dims() {
        let err = Error::dims("convolve", &[4, 4, 1], &[4, 4]);
        assert!(err.to_string().contains("[4, 4, 1]"));
    }

    #[test]
    fn test_error_display_invalid_state() {
        let err = Error::InvalidState("network has no layers".to_string());
        assert!(err.to_string().contains("Invalid state"));
    }

    #[test]
    fn test_error_display_construction_invariant() {
        let err = Error::ConstructionInvariant("dims product 6 != length 5".to_string());
        assert!(err.to_string().contains("Construction invariant"));
    }

    #[test]
    fn test_error_display_non_convergence() {
        let err = Error::NonConvergence {
            iterations: 80,
            index: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("non-convergence"));
        assert!(msg.contains("80"));
    }

    #[test]
    fn test_error_display_invalid_parameter() {
        let err = Error::InvalidParameter("stride must be positive".to_string());
        assert!(err.to_string().contains("Invalid parameter"));
    }

    #[test]
    fn test_error_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&Error::InvalidState("x".into()));
    }
}
