//! Weight penalties folded into a layer's gradient.

/// Penalty applied to every weight while a layer accumulates its gradient.
///
/// Gradients here ascend `-½·SSE`, so a penalty pulls each weight toward zero by *adding*
/// a term of the opposite sign:
/// * `L1(λ)` adds `-sign(w)·λ`
/// * `L2(λ)` adds `-w·λ`
///
/// Bias terms are never penalized.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Regularization {
    #[default]
    None,
    L1(f64),
    L2(f64),
}

impl Regularization {
    /// Adds the penalty gradient for `weights` into `gradient`.
    pub fn apply(&self, weights: &[f64], gradient: &mut [f64]) {
        match *self {
            Regularization::None => {}
            Regularization::L1(lambda) => {
                for (g, &w) in gradient.iter_mut().zip(weights) {
                    *g -= sign(w) * lambda;
                }
            }
            Regularization::L2(lambda) => {
                for (g, &w) in gradient.iter_mut().zip(weights) {
                    *g -= w * lambda;
                }
            }
        }
    }
}

// f64::signum maps 0.0 to 1.0; the penalty needs 0 at 0.
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
