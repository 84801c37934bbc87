use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::layers::lstm_cell::LSTMCellGradients;
use crate::models::lstm_network::{LSTMNetwork, SequenceCache};
use crate::optimizers::{Optimizer, OptimizerConfig};
use crate::training::{create_trainer, TrainingConfig, TrainingReport};
use crate::utils::make_rng;
use crate::windowing::Window;

/// Architecture and optimizer of a [`ForecastModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Steps per input window.
    pub lookback: usize,
    pub hidden_size: usize,
    /// Number of stacked LSTM layers.
    pub num_layers: usize,
    /// Width of the dense layer between the recurrent stack and the output.
    pub dense_size: usize,
    pub optimizer: OptimizerConfig,
    /// Fixes weight initialisation and shuffling when set.
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            lookback: 60,
            hidden_size: 50,
            num_layers: 2,
            dense_size: 25,
            optimizer: OptimizerConfig::default(),
            seed: None,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("lookback", self.lookback),
            ("hidden_size", self.hidden_size),
            ("num_layers", self.num_layers),
            ("dense_size", self.dense_size),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ForecastError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        let lr = self.optimizer.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(ForecastError::InvalidConfig(format!("learning rate {} must be positive", lr)));
        }
        Ok(())
    }
}

/// Values kept from a forward pass for the backward pass.
#[derive(Clone, Debug)]
pub struct ForwardCache {
    sequence: SequenceCache,
    recurrent_out: Array2<f64>,
    dense_out: Array2<f64>,
}

/// Gradients for every parameter of a [`ForecastModel`].
#[derive(Clone, Debug)]
pub struct ModelGradients {
    pub recurrent: Vec<LSTMCellGradients>,
    pub dense: LinearGradients,
    pub output: LinearGradients,
}

impl ModelGradients {
    pub fn accumulate(&mut self, other: &ModelGradients) {
        for (total, step) in self.recurrent.iter_mut().zip(&other.recurrent) {
            total.accumulate(step);
        }
        self.dense.accumulate(&other.dense);
        self.output.accumulate(&other.output);
    }

    pub fn scale(&mut self, factor: f64) {
        for grads in &mut self.recurrent {
            grads.scale(factor);
        }
        self.dense.scale(factor);
        self.output.scale(factor);
    }

    /// Clips each gradient matrix to `max_norm` (Frobenius norm).
    pub fn clip(&mut self, max_norm: f64) {
        let recurrent = self.recurrent.iter_mut().flat_map(|g| g.matrices_mut());
        let dense = self.dense.matrices_mut().into_iter().chain(self.output.matrices_mut());
        for matrix in recurrent.chain(dense) {
            let norm = matrix.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm > max_norm {
                *matrix *= max_norm / norm;
            }
        }
    }
}

/// Sequence-to-value regressor: stacked LSTM layers, the last hidden state
/// of the top layer feeding two dense layers that narrow to one scalar.
///
/// Inputs and outputs are in scaled units; callers invert the scaling.
#[derive(Clone, Debug)]
pub struct ForecastModel {
    config: ModelConfig,
    recurrent: LSTMNetwork,
    dense: LinearLayer,
    output: LinearLayer,
}

impl ForecastModel {
    /// Creates a freshly initialised model.
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = make_rng(config.seed);

        let recurrent = LSTMNetwork::new(1, config.hidden_size, config.num_layers, &mut rng);
        let dense = LinearLayer::new(config.hidden_size, config.dense_size, &mut rng);
        let output = LinearLayer::new(config.dense_size, 1, &mut rng);

        Ok(ForecastModel {
            config,
            recurrent,
            dense,
            output,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn lookback(&self) -> usize {
        self.config.lookback
    }

    pub fn num_parameters(&self) -> usize {
        self.recurrent.num_parameters() + self.dense.num_parameters() + self.output.num_parameters()
    }

    pub fn forward_with_cache(&self, window: &[f64]) -> Result<(Array2<f64>, ForwardCache)> {
        if window.len() != self.config.lookback {
            return Err(ForecastError::WindowLength {
                expected: self.config.lookback,
                found: window.len(),
            });
        }

        let sequence: Vec<Array2<f64>> = window.iter().map(|&v| Array2::from_elem((1, 1), v)).collect();
        let (recurrent_out, sequence) = self.recurrent.forward_sequence(&sequence);
        let dense_out = self.dense.forward(&recurrent_out);
        let output = self.output.forward(&dense_out);

        Ok((
            output,
            ForwardCache {
                sequence,
                recurrent_out,
                dense_out,
            },
        ))
    }

    pub fn backward(&self, d_output: &Array2<f64>, cache: &ForwardCache) -> ModelGradients {
        let (output, d_dense) = self.output.backward(&cache.dense_out, d_output);
        let (dense, d_recurrent) = self.dense.backward(&cache.recurrent_out, &d_dense);
        let recurrent = self.recurrent.backward_sequence(&d_recurrent, &cache.sequence);

        ModelGradients {
            recurrent,
            dense,
            output,
        }
    }

    pub fn zero_gradients(&self) -> ModelGradients {
        ModelGradients {
            recurrent: self.recurrent.zero_gradients(),
            dense: self.dense.zero_gradients(),
            output: self.output.zero_gradients(),
        }
    }

    pub fn apply_gradients<O: Optimizer + ?Sized>(&mut self, gradients: &ModelGradients, optimizer: &mut O) {
        self.recurrent.update_parameters(&gradients.recurrent, optimizer);
        self.dense.update_parameters(&gradients.dense, optimizer, "dense");
        self.output.update_parameters(&gradients.output, optimizer, "output");
    }

    pub fn predict_one(&self, window: &[f64]) -> Result<f64> {
        let (output, _) = self.forward_with_cache(window)?;
        Ok(output[[0, 0]])
    }

    /// One scaled prediction per window.
    pub fn predict<I>(&self, windows: I) -> Result<Vec<f64>>
    where
        I: IntoIterator,
        I::Item: AsRef<[f64]>,
    {
        windows
            .into_iter()
            .enumerate()
            .map(|(index, window)| {
                let value = self.predict_one(window.as_ref())?;
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(ForecastError::NonFinite { index })
                }
            })
            .collect()
    }

    /// Trains on every window with MSE loss and the configured optimizer.
    pub fn fit(&mut self, windows: &[Window<'_>], training: &TrainingConfig) -> Result<TrainingReport> {
        let mut trainer = create_trainer(&self.config, training.clone())?;
        let mut rng = make_rng(self.config.seed.map(|seed| seed.wrapping_add(1)));
        trainer.train(self, windows, &mut rng)
    }

    /// Hands the model off for prediction only.
    pub fn freeze(self) -> FrozenModel {
        FrozenModel { model: self }
    }
}

/// A trained model that can only predict.
#[derive(Clone, Debug)]
pub struct FrozenModel {
    model: ForecastModel,
}

impl FrozenModel {
    pub fn lookback(&self) -> usize {
        self.model.lookback()
    }

    pub fn predict_one(&self, window: &[f64]) -> Result<f64> {
        let value = self.model.predict_one(window)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ForecastError::NonFinite { index: 0 })
        }
    }

    pub fn predict<I>(&self, windows: I) -> Result<Vec<f64>>
    where
        I: IntoIterator,
        I::Item: AsRef<[f64]>,
    {
        self.model.predict(windows)
    }
}
