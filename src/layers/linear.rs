use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::optimizers::Optimizer;

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

impl LinearGradients {
    pub fn accumulate(&mut self, other: &LinearGradients) {
        self.weight += &other.weight;
        self.bias += &other.bias;
    }

    pub fn scale(&mut self, factor: f64) {
        self.weight *= factor;
        self.bias *= factor;
    }

    pub fn matrices_mut(&mut self) -> [&mut Array2<f64>; 2] {
        [&mut self.weight, &mut self.bias]
    }
}

/// A fully connected (dense) layer with linear activation
///
/// Performs `output = weight @ input + bias` where weight has shape
/// (output_size, input_size) and bias has shape (output_size, 1).
/// The layer keeps no per-call state; callers hold on to the input for
/// the backward pass.
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
    pub input_size: usize,
    pub output_size: usize,
}

impl LinearLayer {
    /// Create a new linear layer with Xavier/Glorot uniform initialization
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        let weight = Array2::random_using((output_size, input_size), Uniform::new(-limit, limit), rng);
        let bias = Array2::zeros((output_size, 1));

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    /// Forward pass: input of shape (input_size, batch) to (output_size, batch)
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        &self.weight.dot(input) + &self.bias
    }

    /// Backward pass given the input seen in `forward`.
    ///
    /// Returns the parameter gradients and the gradient w.r.t. the input.
    pub fn backward(&self, input: &Array2<f64>, grad_output: &Array2<f64>) -> (LinearGradients, Array2<f64>) {
        let gradients = LinearGradients {
            weight: grad_output.dot(&input.t()),
            bias: grad_output.sum_axis(ndarray::Axis(1)).insert_axis(ndarray::Axis(1)),
        };
        let input_grad = self.weight.t().dot(grad_output);

        (gradients, input_grad)
    }

    pub fn update_parameters<O: Optimizer + ?Sized>(&mut self, gradients: &LinearGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    pub fn zero_gradients(&self) -> LinearGradients {
        LinearGradients {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}
