use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        (**self).update(param_id, param, gradient)
    }
}

/// Optimizer selection as it appears in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OptimizerConfig {
    Sgd { learning_rate: f64 },
    Adam { learning_rate: f64 },
    Rmsprop { learning_rate: f64 },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam { learning_rate: 0.001 }
    }
}

impl OptimizerConfig {
    pub fn learning_rate(&self) -> f64 {
        match *self {
            OptimizerConfig::Sgd { learning_rate }
            | OptimizerConfig::Adam { learning_rate }
            | OptimizerConfig::Rmsprop { learning_rate } => learning_rate,
        }
    }

    pub fn build(&self) -> Box<dyn Optimizer + Send> {
        match *self {
            OptimizerConfig::Sgd { learning_rate } => Box::new(SGD::new(learning_rate)),
            OptimizerConfig::Adam { learning_rate } => Box::new(Adam::new(learning_rate)),
            OptimizerConfig::Rmsprop { learning_rate } => Box::new(RMSprop::new(learning_rate)),
        }
    }
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        param.scaled_add(-self.learning_rate, gradient);
    }
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected with the step count of each parameter.
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    state: HashMap<String, AdamState>,
}

struct AdamState {
    t: i32,
    m: Array2<f64>,
    v: Array2<f64>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-7)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            state: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let state = self
            .state
            .entry(param_id.to_string())
            .or_insert_with(|| AdamState {
                t: 0,
                m: Array2::zeros(param.raw_dim()),
                v: Array2::zeros(param.raw_dim()),
            });
        state.t += 1;

        state.m = self.beta1 * &state.m + (1.0 - self.beta1) * gradient;
        state.v = self.beta2 * &state.v + (1.0 - self.beta2) * &(gradient * gradient);

        let m_hat = &state.m / (1.0 - self.beta1.powi(state.t));
        let v_hat = &state.v / (1.0 - self.beta2.powi(state.t));

        let update = self.learning_rate * m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon);
        *param -= &update;
    }
}

/// RMSprop: v_t = αv_{t-1} + (1-α)g_t²
///          θ_t = θ_{t-1} - η * g_t / (√v_t + ε)
pub struct RMSprop {
    learning_rate: f64,
    alpha: f64,
    epsilon: f64,
    v: HashMap<String, Array2<f64>>,
}

impl RMSprop {
    pub fn new(learning_rate: f64) -> Self {
        RMSprop::with_params(learning_rate, 0.9, 1e-7)
    }

    pub fn with_params(learning_rate: f64, alpha: f64, epsilon: f64) -> Self {
        RMSprop {
            learning_rate,
            alpha,
            epsilon,
            v: HashMap::new(),
        }
    }
}

impl Optimizer for RMSprop {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let v_t = self
            .v
            .entry(param_id.to_string())
            .or_insert_with(|| Array2::zeros(param.raw_dim()));

        *v_t = self.alpha * &*v_t + (1.0 - self.alpha) * &(gradient * gradient);

        let update = self.learning_rate * gradient / (v_t.mapv(f64::sqrt) + self.epsilon);
        *param -= &update;
    }
}
