// trainer/mod.rs
use crate::{
    error::{Error, Result},
    layer::LinearLayer,
    loss::{Loss, SquaredError},
    network::{Network, NetworkState},
    numeric::Matrix,
    optimizer::Sgd,
};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::RngCore;

/// How many rows contribute to the gradient before each weight update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrainingMode {
    /// Update after every row.
    #[default]
    Stochastic,
    /// Update after every `batch_size` rows.
    MiniBatch,
    /// Update once per epoch, after all rows.
    Batch,
    /// Closed-form least squares on a single-linear-layer network; no epochs.
    Linear,
}

// --- Main structure (immutable after build) ---
#[derive(Clone, Debug)]
pub struct Trainer {
    pub(crate) batch_size: usize,
    pub(crate) max_epochs: usize,
    pub(crate) mode: TrainingMode,
    pub(crate) shuffle: bool,
    pub(crate) optimizer: Sgd,
}

// --- Builder ---
#[derive(Clone, Debug)]
pub struct TrainerBuilder {
    batch_size: usize,
    max_epochs: usize,
    mode: TrainingMode,
    shuffle: bool,
    optimizer: Sgd,
}

impl TrainerBuilder {
    pub fn new(optimizer: Sgd) -> Self {
        Self {
            batch_size: 32,
            max_epochs: 1000,
            mode: TrainingMode::default(),
            shuffle: true,
            optimizer,
        }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn max_epochs(mut self, epochs: usize) -> Self {
        self.max_epochs = epochs;
        self
    }

    pub fn mode(mut self, mode: TrainingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether row order is reshuffled at the start of every epoch.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// # Errors
    /// [`Error::InvalidParameter`] for a zero mini-batch size or an unusable optimizer.
    pub fn build(self) -> Result<Trainer> {
        self.optimizer.validate()?;
        if self.mode == TrainingMode::MiniBatch && self.batch_size == 0 {
            return Err(Error::InvalidParameter(
                "mini-batch size must be positive".to_string(),
            ));
        }
        Ok(Trainer {
            batch_size: self.batch_size,
            max_epochs: self.max_epochs,
            mode: self.mode,
            shuffle: self.shuffle,
            optimizer: self.optimizer,
        })
    }
}

impl Trainer {
    pub fn builder(optimizer: Sgd) -> TrainerBuilder {
        TrainerBuilder::new(optimizer)
    }

    pub fn mode(&self) -> TrainingMode {
        self.mode
    }

    pub fn max_epochs(&self) -> usize {
        self.max_epochs
    }

    pub fn optimizer(&self) -> &Sgd {
        &self.optimizer
    }

    /// Trains `network` on the rows of `features` against the rows of `labels`.
    ///
    /// The trainer's optimizer replaces the network's. A network that is not yet initialized is
    /// initialized from `rng` first. Returns the sum-squared error of every epoch, measured while
    /// the epoch ran; in [`TrainingMode::Linear`] it holds the single post-fit error.
    ///
    /// # Errors
    /// * [`Error::ShapeMismatch`] if the row counts differ, or columns do not match the network
    /// * [`Error::InvalidState`] for empty data, or `Linear` mode on anything but a single
    ///   linear layer
    pub fn fit(
        &self,
        network: &mut Network,
        features: &Matrix,
        labels: &Matrix,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>> {
        if features.rows() != labels.rows() {
            return Err(Error::shape("fit labels", features.rows(), labels.rows()));
        }
        let n_total = features.rows();
        if n_total == 0 {
            return Err(Error::InvalidState("no training rows".to_string()));
        }
        network.set_optimizer(self.optimizer);

        if self.mode == TrainingMode::Linear {
            return self.fit_linear(network, features, labels);
        }
        if network.state() == NetworkState::Uninitialized {
            network.initialize(rng);
        }

        let batch = match self.mode {
            TrainingMode::MiniBatch => self.batch_size,
            TrainingMode::Batch => n_total,
            _ => 1,
        };
        let mut order: Vec<usize> = (0..n_total).collect();
        let mut history = Vec::with_capacity(self.max_epochs);

        for epoch in 0..self.max_epochs {
            if self.shuffle {
                order.shuffle(rng);
            }
            let mut total_loss = 0.0;
            for chunk in order.chunks(batch) {
                for &r in chunk {
                    let (x, y) = (features.row(r), labels.row(r));
                    let prediction = network.predict(x)?;
                    total_loss += SquaredError.loss(prediction, y)?;
                    network.back_propagate(y)?;
                    network.update_gradient(x)?;
                }
                network.update_weights();
            }
            info!("Epoch {}: sse = {}", epoch, total_loss);
            history.push(total_loss);
        }
        debug!("Trained {} epochs with {:?}", self.max_epochs, self.mode);

        Ok(history)
    }

    fn fit_linear(
        &self,
        network: &mut Network,
        features: &Matrix,
        labels: &Matrix,
    ) -> Result<Vec<f64>> {
        if !network.is_linear_network() {
            return Err(Error::InvalidState(
                "linear training needs a network of exactly one linear layer".to_string(),
            ));
        }
        let layer = network
            .layer_as_mut::<LinearLayer>(0)
            .ok_or_else(|| Error::InvalidState("layer 0 is not a LinearLayer".to_string()))?;
        layer.ordinary_least_squares(features, labels)?;

        let mut total_loss = 0.0;
        for r in 0..features.rows() {
            let prediction = network.predict(features.row(r))?;
            total_loss += SquaredError.loss(prediction, labels.row(r))?;
        }
        info!("Least squares fit: sse = {}", total_loss);
        Ok(vec![total_loss])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Layer, TanhLayer};
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn line_data(rows: usize) -> (Matrix, Matrix) {
        let xs: Vec<[f64; 1]> = (0..rows).map(|i| [i as f64 / rows as f64]).collect();
        let ys: Vec<[f64; 1]> = xs.iter().map(|x| [2.0 * x[0] + 1.0]).collect();
        (Matrix::from_rows(xs).unwrap(), Matrix::from_rows(ys).unwrap())
    }

    fn linear_network() -> Network {
        Network::builder()
            .layer(LinearLayer::new(1, 1))
            .build()
            .unwrap()
    }

    #[test]
    fn test_linear_mode_solves_exactly() {
        let (x, y) = line_data(10);
        let trainer = Trainer::builder(Sgd::default())
            .mode(TrainingMode::Linear)
            .build()
            .unwrap();
        let mut network = linear_network();
        let history = trainer
            .fit(&mut network, &x, &y, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_abs_diff_eq!(history[0], 0.0, epsilon = 1e-12);
        let layer = network.layer_as::<LinearLayer>(0).unwrap();
        assert_abs_diff_eq!(layer.weights()[(0, 0)], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(layer.bias()[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_linear_mode_rejects_deep_network() {
        let (x, y) = line_data(4);
        let trainer = Trainer::builder(Sgd::default())
            .mode(TrainingMode::Linear)
            .build()
            .unwrap();
        let mut network = Network::builder()
            .layer(LinearLayer::new(1, 1))
            .layer(TanhLayer::new(1))
            .build()
            .unwrap();
        let result = trainer.fit(&mut network, &x, &y, &mut StdRng::seed_from_u64(0));
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_stochastic_training_reduces_error() {
        let (x, y) = line_data(20);
        let trainer = Trainer::builder(Sgd::new(0.05))
            .max_epochs(300)
            .build()
            .unwrap();
        let mut network = linear_network();
        let mut rng = StdRng::seed_from_u64(3);
        let history = trainer.fit(&mut network, &x, &y, &mut rng).unwrap();
        assert_eq!(history.len(), 300);
        assert!(history[299] < history[0]);
        assert!(history[299] < 1e-3, "final sse {}", history[299]);
    }

    #[test]
    fn test_batch_modes_reduce_error() {
        let mut rng = StdRng::seed_from_u64(11);
        let rows: Vec<[f64; 2]> = (0..32).map(|_| [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)]).collect();
        let x = Matrix::from_rows(&rows).unwrap();
        let y = Matrix::from_rows(rows.iter().map(|r| [(r[0] - 0.5 * r[1]).tanh()])).unwrap();

        for (mode, lr) in [(TrainingMode::MiniBatch, 0.02), (TrainingMode::Batch, 0.005)] {
            let trainer = Trainer::builder(Sgd::new(lr).with_momentum(0.5))
                .mode(mode)
                .batch_size(8)
                .max_epochs(200)
                .build()
                .unwrap();
            let mut network = Network::builder()
                .layer(LinearLayer::new(2, 4))
                .layer(TanhLayer::new(4))
                .layer(LinearLayer::new(4, 1))
                .build()
                .unwrap();
            let history = trainer.fit(&mut network, &x, &y, &mut rng).unwrap();
            assert!(
                history[199] < history[0] * 0.5,
                "{:?}: {} -> {}",
                mode,
                history[0],
                history[199]
            );
            assert!(network.layer(0).unwrap().is_initialized());
        }
    }

    #[test]
    fn test_fit_rejects_bad_data() {
        let trainer = Trainer::builder(Sgd::default()).build().unwrap();
        let mut network = linear_network();
        let mut rng = StdRng::seed_from_u64(0);
        let (x, _) = line_data(3);
        let (_, y) = line_data(4);
        assert!(matches!(
            trainer.fit(&mut network, &x, &y, &mut rng),
            Err(Error::ShapeMismatch { .. })
        ));
        let empty = Matrix::new(0, 1);
        assert!(matches!(
            trainer.fit(&mut network, &empty, &empty, &mut rng),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_builder_validation() {
        assert!(Trainer::builder(Sgd::default())
            .mode(TrainingMode::MiniBatch)
            .batch_size(0)
            .build()
            .is_err());
        assert!(Trainer::builder(Sgd::new(-1.0)).build().is_err());
        let trainer = Trainer::builder(Sgd::new(0.3)).max_epochs(7).build().unwrap();
        assert_eq!(trainer.max_epochs(), 7);
        assert_eq!(trainer.mode(), TrainingMode::Stochastic);
        assert_eq!(trainer.optimizer().learning_rate(), 0.3);
    }
}
