//! # layerwise
//!
//! A from-scratch numerical learning engine: dense vectors, matrices and strided N-dimensional
//! tensors, an SVD-based pseudoinverse, generic N-dimensional convolution, and a layer pipeline
//! that runs forward activation and backpropagation.
//!
//! ## Core Design Principles
//!
//! - **Explicit state**: the RNG and the optimizer are passed in; there are no globals.
//! - **Fail fast**: every shape or lifecycle violation returns an [`Error`] naming the
//!   mismatched sizes.
//! - **Borrowed views**: sub-ranges of buffers and tensors are slices, so aliasing rules are
//!   checked at compile time.
//!
//! ## Quick Start
//!
//! ```rust
//! use layerwise::layer::{LinearLayer, TanhLayer};
//! use layerwise::network::Network;
//! use layerwise::numeric::Matrix;
//! use layerwise::optimizer::Sgd;
//! use layerwise::trainer::{Trainer, TrainingMode};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let features = Matrix::from_rows([[0.0, 1.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]).unwrap();
//! let labels = Matrix::from_rows([[0.5], [0.5], [0.9], [0.1]]).unwrap();
//!
//! let mut network = Network::builder()
//!     .layer(LinearLayer::new(2, 3))
//!     .layer(TanhLayer::new(3))
//!     .layer(LinearLayer::new(3, 1))
//!     .build()
//!     .unwrap();
//!
//! let trainer = Trainer::builder(Sgd::new(0.05))
//!     .mode(TrainingMode::Stochastic)
//!     .max_epochs(50)
//!     .build()
//!     .unwrap();
//! let history = trainer
//!     .fit(&mut network, &features, &labels, &mut StdRng::seed_from_u64(7))
//!     .unwrap();
//! assert_eq!(history.len(), 50);
//! let prediction = network.predict(&[1.0, 1.0]).unwrap();
//! assert_eq!(prediction.len(), 1);
//! ```
//!
//! ## Module Structure
//!
//! - `numeric`: `Vector`, `Matrix` (with SVD and pseudoinverse), `Tensor` and convolution
//! - `layer`: the `Layer` trait and its linear, activation, convolution and pooling variants
//! - `network`: layer pipelines that predict, back-propagate, accumulate and apply
//! - `loss`: squared and absolute error with their blame signals
//! - `optimizer`: SGD with momentum
//! - `regularizers`: L1 / L2 weight penalties for linear layers
//! - `trainer`: stochastic, mini-batch, batch and closed-form training loops
//! - `learner`: the `Learner` trait, a baseline learner, a network learner and the
//!   unsupervised generative network
//! - `evaluation`: error metrics and the finite-difference gradient checker
//! - `interop`: `ndarray` conversions (feature `ndarray`)

pub mod error;
pub mod evaluation;
#[cfg(feature = "ndarray")]
pub mod interop;
pub mod layer;
pub mod learner;
pub mod loss;
pub mod network;
pub mod numeric;
pub mod optimizer;
pub mod regularizers;
pub mod trainer;

pub use error::{Error, Result};
pub use layer::{Layer, LayerKind};
pub use learner::{BaselineLearner, GenerativeNetwork, Learner, NetworkLearner};
pub use network::{Network, NetworkBuilder, NetworkState};
pub use numeric::{Matrix, Tensor, Vector, VectorOps};
pub use optimizer::{Optimizer, Sgd};
pub use trainer::{Trainer, TrainerBuilder, TrainingMode};
