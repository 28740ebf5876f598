//! The supervised-learning seam shared by evaluation code: anything that can be trained on a
//! feature matrix and asked for a prediction.

use crate::error::{Error, Result};
use crate::loss::{Loss, SquaredError};
use crate::network::{Network, NetworkState};
use crate::numeric::{Matrix, Vector, VectorOps};
use crate::trainer::Trainer;
use log::{debug, info};
use rand::{Rng, RngCore};

/// A supervised learner over rows of a [`Matrix`].
pub trait Learner {
    fn name(&self) -> &str;

    /// Fits the learner to `features` (one example per row) and `labels` (matching rows).
    fn train(&mut self, features: &Matrix, labels: &Matrix, rng: &mut dyn RngCore) -> Result<()>;

    /// Predicts the label row for one feature row.
    fn predict(&mut self, input: &[f64]) -> Result<Vector>;
}

/// Ignores the features: predicts the mean of each continuous label column and the most common
/// value of each nominal one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BaselineLearner {
    labels: Option<Vector>,
}

impl BaselineLearner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Learner for BaselineLearner {
    fn name(&self) -> &str {
        "baseline"
    }

    fn train(&mut self, features: &Matrix, labels: &Matrix, _rng: &mut dyn RngCore) -> Result<()> {
        if features.rows() != labels.rows() {
            return Err(Error::shape("baseline labels", features.rows(), labels.rows()));
        }
        let values: Vector = (0..labels.cols())
            .map(|c| {
                if labels.column_meta(c).is_continuous() {
                    labels.column_mean(c)
                } else {
                    labels.most_common_value(c)
                }
            })
            .collect();
        debug!("Baseline label {}", values);
        self.labels = Some(values);
        Ok(())
    }

    fn predict(&mut self, _input: &[f64]) -> Result<Vector> {
        self.labels
            .clone()
            .ok_or_else(|| Error::InvalidState("baseline predict before train".to_string()))
    }
}

/// A [`Network`] trained by a [`Trainer`].
#[derive(Clone, Debug)]
pub struct NetworkLearner {
    network: Network,
    trainer: Trainer,
}

impl NetworkLearner {
    pub fn new(network: Network, trainer: Trainer) -> Self {
        Self { network, trainer }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn into_network(self) -> Network {
        self.network
    }
}

impl Learner for NetworkLearner {
    fn name(&self) -> &str {
        "neural network"
    }

    fn train(&mut self, features: &Matrix, labels: &Matrix, rng: &mut dyn RngCore) -> Result<()> {
        self.trainer.fit(&mut self.network, features, labels, rng)?;
        Ok(())
    }

    fn predict(&mut self, input: &[f64]) -> Result<Vector> {
        self.network.predict(input).map(Vector::from)
    }
}

/// Learns a latent description of every observation row without labels.
///
/// Each observation row is a `width × height` image with `channels` interleaved values per pixel
/// (pixel `(p, q)` starts at `channels · (width·q + p)`). The network maps
/// `[p / width, q / height, latent...]` to that pixel's channels. Training samples random
/// `(row, p, q)` triples, updates the network weights as usual and moves the row's latent
/// vector along the blame that reaches the network input.
#[derive(Clone, Debug)]
pub struct GenerativeNetwork {
    network: Network,
    width: usize,
    height: usize,
    state: Matrix,
    state_gradient: Vector,
    epochs: usize,
    samples_per_epoch: usize,
    decay: f64,
}

impl GenerativeNetwork {
    /// Wraps `network`, whose input is two pixel coordinates followed by the latent vector, with
    /// one zeroed latent row per training row.
    ///
    /// # Errors
    /// [`Error::ConstructionInvariant`] if the network has fewer than three inputs or the image
    /// is empty.
    pub fn new(network: Network, width: usize, height: usize, training_rows: usize) -> Result<Self> {
        if network.inputs() < 3 {
            return Err(Error::ConstructionInvariant(format!(
                "a generative network needs 2 coordinates plus at least one latent input, got {} inputs",
                network.inputs()
            )));
        }
        if width == 0 || height == 0 {
            return Err(Error::ConstructionInvariant(format!(
                "empty {}x{} image",
                width, height
            )));
        }
        let degrees_of_freedom = network.inputs() - 2;
        Ok(Self {
            network,
            width,
            height,
            state: Matrix::new(training_rows, degrees_of_freedom),
            state_gradient: Vector::zeros(degrees_of_freedom),
            epochs: 10,
            samples_per_epoch: 10_000,
            decay: 0.75,
        })
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_samples_per_epoch(mut self, samples: usize) -> Self {
        self.samples_per_epoch = samples;
        self
    }

    /// Factor applied to the learning rate after every epoch.
    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    pub fn degrees_of_freedom(&self) -> usize {
        self.state.cols()
    }

    /// Latent vectors, one row per training row.
    pub fn state(&self) -> &Matrix {
        &self.state
    }

    pub fn set_state(&mut self, state: Matrix) -> Result<()> {
        if state.cols() != self.degrees_of_freedom() {
            return Err(Error::shape("latent state columns", self.degrees_of_freedom(), state.cols()));
        }
        self.state = state;
        Ok(())
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    fn channels(&self, observations: &Matrix) -> Result<usize> {
        let pixels = self.width * self.height;
        let channels = self.network.outputs();
        if observations.cols() != pixels * channels {
            return Err(Error::shape(
                "observation columns",
                format!("{} pixels x {} channels", pixels, channels),
                observations.cols(),
            ));
        }
        if observations.rows() != self.state.rows() {
            return Err(Error::shape("observation rows", self.state.rows(), observations.rows()));
        }
        Ok(channels)
    }

    fn feature(&self, row: usize, p: usize, q: usize) -> Vector {
        let mut feature = Vector::zeros(2 + self.degrees_of_freedom());
        feature[0] = p as f64 / self.width as f64;
        feature[1] = q as f64 / self.height as f64;
        feature[2..].copy_from_slice(self.state.row(row));
        feature
    }

    /// Trains the network and the latent state on `observations` from a zeroed state.
    ///
    /// The network is initialized from `rng` if needed. The learning rate is multiplied by the
    /// decay after every epoch and stays decayed afterwards. Returns each epoch's summed squared
    /// error over the sampled pixels.
    ///
    /// # Errors
    /// * [`Error::ShapeMismatch`] if the observation shape does not fit the image, the network
    ///   outputs or the number of latent rows
    /// * [`Error::InvalidState`] if there are no observation rows
    pub fn train_unsupervised(
        &mut self,
        observations: &Matrix,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>> {
        let channels = self.channels(observations)?;
        if observations.rows() == 0 {
            return Err(Error::InvalidState("no observation rows".to_string()));
        }
        if self.network.state() == NetworkState::Uninitialized {
            self.network.initialize(rng);
        }
        self.state.fill(0.0);
        self.state_gradient.fill(0.0);

        let mut history = Vec::with_capacity(self.epochs);
        for epoch in 0..self.epochs {
            let mut total_loss = 0.0;
            for _ in 0..self.samples_per_epoch {
                let row = rng.gen_range(0..observations.rows());
                let p = rng.gen_range(0..self.width);
                let q = rng.gen_range(0..self.height);
                let feature = self.feature(row, p, q);
                let start = channels * (self.width * q + p);
                let label = &observations.row(row)[start..start + channels];

                let prediction = self.network.predict(&feature)?;
                total_loss += SquaredError.loss(prediction, label)?;
                self.network.back_propagate(label)?;
                self.network.update_gradient(&feature)?;
                let input_blame = self
                    .network
                    .layer(0)
                    .ok_or_else(|| Error::InvalidState("network has no layers".to_string()))?
                    .back_propagate()?;
                self.state_gradient.add(&input_blame[2..])?;

                self.network.update_weights();
                let optimizer = *self.network.optimizer();
                self.state
                    .row_mut(row)
                    .add_scaled(&self.state_gradient, optimizer.learning_rate())?;
                self.state_gradient.scale(optimizer.momentum());
            }
            let learning_rate = self.network.optimizer().learning_rate();
            self.network.set_learning_rate(learning_rate * self.decay);
            info!("Generative epoch {}: sse = {}", epoch, total_loss);
            history.push(total_loss);
        }
        debug!("Trained {} latent rows", self.state.rows());
        Ok(history)
    }

    /// Renders a full observation row from a latent vector.
    pub fn render(&mut self, latent: &[f64]) -> Result<Vector> {
        if latent.len() != self.degrees_of_freedom() {
            return Err(Error::shape("latent vector", self.degrees_of_freedom(), latent.len()));
        }
        let channels = self.network.outputs();
        let mut out = Vector::zeros(self.width * self.height * channels);
        let mut feature = Vector::zeros(2 + latent.len());
        feature[2..].copy_from_slice(latent);
        for q in 0..self.height {
            for p in 0..self.width {
                feature[0] = p as f64 / self.width as f64;
                feature[1] = q as f64 / self.height as f64;
                let start = channels * (self.width * q + p);
                out[start..start + channels].copy_from_slice(self.network.predict(&feature)?);
            }
        }
        Ok(out)
    }

    /// Squared error between every observation row and its rendering from the matching latent row.
    pub fn reconstruction_error(&mut self, observations: &Matrix) -> Result<f64> {
        self.channels(observations)?;
        let mut sse = 0.0;
        for r in 0..observations.rows() {
            let latent = self.state.row(r).to_vec();
            sse += self.render(&latent)?.squared_distance(observations.row(r))?;
        }
        Ok(sse)
    }
}
