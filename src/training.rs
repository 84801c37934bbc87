use log::{debug, info};
use ndarray::arr2;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{ForecastError, Result};
use crate::loss::{LossFunction, MSELoss};
use crate::models::forecast_model::{ForecastModel, ModelConfig};
use crate::optimizers::Optimizer;
use crate::windowing::Window;

/// Configuration for training hyperparameters
///
/// Defaults to a single epoch with one window per update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    /// Reshuffle the windows before every epoch.
    pub shuffle: bool,
    /// Per-matrix gradient norm limit.
    pub clip_gradient: Option<f64>,
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 1,
            batch_size: 1,
            shuffle: true,
            clip_gradient: Some(5.0),
            log_every: 1,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(ForecastError::InvalidConfig("epochs must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::InvalidConfig("batch_size must be positive".to_string()));
        }
        if let Some(clip) = self.clip_gradient {
            if !(clip > 0.0) {
                return Err(ForecastError::InvalidConfig(format!("clip_gradient {} must be positive", clip)));
            }
        }
        Ok(())
    }
}

/// Training metrics tracked during training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub time_elapsed: f64,
}

/// Summary of a finished training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: usize,
    pub samples: usize,
    pub final_loss: f64,
    pub history: Vec<TrainingMetrics>,
}

/// Mini-batch trainer for a [`ForecastModel`] with configurable loss and optimizer
pub struct Trainer<L: LossFunction, O: Optimizer> {
    pub loss_function: L,
    pub optimizer: O,
    pub config: TrainingConfig,
    pub metrics_history: Vec<TrainingMetrics>,
}

impl<L: LossFunction, O: Optimizer> Trainer<L, O> {
    pub fn new(loss_function: L, optimizer: O) -> Self {
        Trainer {
            loss_function,
            optimizer,
            config: TrainingConfig::default(),
            metrics_history: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// One parameter update from the mean gradient of `batch`.
    ///
    /// Returns the mean loss of the batch before the update.
    pub fn train_batch(&mut self, model: &mut ForecastModel, batch: &[Window<'_>]) -> Result<f64> {
        let mut total_gradients = model.zero_gradients();
        let mut total_loss = 0.0;

        for window in batch {
            let (output, cache) = model.forward_with_cache(window.input)?;
            let target = arr2(&[[window.target]]);

            total_loss += self.loss_function.compute_loss(&output, &target);
            let d_output = self.loss_function.compute_gradient(&output, &target);
            total_gradients.accumulate(&model.backward(&d_output, &cache));
        }

        let n = batch.len().max(1) as f64;
        total_gradients.scale(1.0 / n);

        if let Some(clip_value) = self.config.clip_gradient {
            total_gradients.clip(clip_value);
        }

        model.apply_gradients(&total_gradients, &mut self.optimizer);

        Ok(total_loss / n)
    }

    /// Runs `config.epochs` passes over `windows`.
    pub fn train<R: Rng + ?Sized>(&mut self, model: &mut ForecastModel, windows: &[Window<'_>], rng: &mut R) -> Result<TrainingReport> {
        self.config.validate()?;
        if windows.is_empty() {
            return Err(ForecastError::InsufficientHistory { required: 1, available: 0 });
        }

        info!(
            "Training on {} windows for {} epoch(s), batch size {}",
            windows.len(),
            self.config.epochs,
            self.config.batch_size
        );

        let mut order: Vec<usize> = (0..windows.len()).collect();
        let mut batch = Vec::with_capacity(self.config.batch_size);

        for epoch in 0..self.config.epochs {
            let start_time = Instant::now();
            if self.config.shuffle {
                order.shuffle(rng);
            }

            let mut epoch_loss = 0.0;
            for (batch_index, chunk) in order.chunks(self.config.batch_size).enumerate() {
                batch.clear();
                batch.extend(chunk.iter().map(|&i| windows[i]));

                let loss = self.train_batch(model, &batch)?;
                if !loss.is_finite() {
                    return Err(ForecastError::NonFinite {
                        index: batch_index * self.config.batch_size,
                    });
                }
                epoch_loss += loss * chunk.len() as f64;
            }
            epoch_loss /= windows.len() as f64;

            let metrics = TrainingMetrics {
                epoch,
                train_loss: epoch_loss,
                time_elapsed: start_time.elapsed().as_secs_f64(),
            };

            if self.config.log_every > 0 && epoch % self.config.log_every == 0 {
                info!(
                    "Epoch {}: Train Loss: {:.6}, Time: {:.2}s",
                    epoch, metrics.train_loss, metrics.time_elapsed
                );
            }
            self.metrics_history.push(metrics);
        }

        let final_loss = self.metrics_history.last().map(|m| m.train_loss).unwrap_or(f64::NAN);
        debug!("Training completed, final loss {:.6}", final_loss);

        Ok(TrainingReport {
            epochs: self.config.epochs,
            samples: windows.len(),
            final_loss,
            history: self.metrics_history.clone(),
        })
    }

    /// Mean loss over `windows` without updating the model.
    pub fn evaluate(&self, model: &ForecastModel, windows: &[Window<'_>]) -> Result<f64> {
        if windows.is_empty() {
            return Ok(0.0);
        }

        let mut total_loss = 0.0;
        for window in windows {
            let (output, _) = model.forward_with_cache(window.input)?;
            total_loss += self.loss_function.compute_loss(&output, &arr2(&[[window.target]]));
        }
        Ok(total_loss / windows.len() as f64)
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }
}

/// Trainer with MSE loss and the optimizer named in `model`.
pub fn create_trainer(model: &ModelConfig, training: TrainingConfig) -> Result<Trainer<MSELoss, Box<dyn Optimizer + Send>>> {
    training.validate()?;
    Ok(Trainer::new(MSELoss, model.optimizer.build()).with_config(training))
}
