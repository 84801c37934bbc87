use ndarray::{s, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::optimizers::Optimizer;
use crate::utils::sigmoid;

/// Holds gradients for all LSTM cell parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LSTMCellGradients {
    pub w_ih: Array2<f64>,
    pub w_hh: Array2<f64>,
    pub b_ih: Array2<f64>,
    pub b_hh: Array2<f64>,
}

impl LSTMCellGradients {
    pub fn accumulate(&mut self, other: &LSTMCellGradients) {
        self.w_ih += &other.w_ih;
        self.w_hh += &other.w_hh;
        self.b_ih += &other.b_ih;
        self.b_hh += &other.b_hh;
    }

    pub fn scale(&mut self, factor: f64) {
        self.w_ih *= factor;
        self.w_hh *= factor;
        self.b_ih *= factor;
        self.b_hh *= factor;
    }

    pub fn matrices_mut(&mut self) -> [&mut Array2<f64>; 4] {
        [&mut self.w_ih, &mut self.w_hh, &mut self.b_ih, &mut self.b_hh]
    }
}

/// Caches intermediate values during forward pass for efficient backward computation
#[derive(Clone, Debug)]
pub struct LSTMCellCache {
    pub input: Array2<f64>,
    pub hx: Array2<f64>,
    pub cx: Array2<f64>,
    pub input_gate: Array2<f64>,
    pub forget_gate: Array2<f64>,
    pub cell_gate: Array2<f64>,
    pub output_gate: Array2<f64>,
    pub cy: Array2<f64>,
}

/// LSTM cell with trainable parameters
///
/// - i_t = σ(W_xi * x_t + W_hi * h_t-1 + b_i)
/// - f_t = σ(W_xf * x_t + W_hf * h_t-1 + b_f)
/// - g_t = tanh(W_xg * x_t + W_hg * h_t-1 + b_g)
/// - o_t = σ(W_xo * x_t + W_ho * h_t-1 + b_o)
/// - c_t = f_t ⊙ c_t-1 + i_t ⊙ g_t
/// - h_t = o_t ⊙ tanh(c_t)
#[derive(Clone, Debug)]
pub struct LSTMCell {
    pub w_ih: Array2<f64>, // (4*hidden_size, input_size)
    pub w_hh: Array2<f64>, // (4*hidden_size, hidden_size)
    pub b_ih: Array2<f64>, // (4*hidden_size, 1)
    pub b_hh: Array2<f64>, // (4*hidden_size, 1)
    pub input_size: usize,
    pub hidden_size: usize,
}

impl LSTMCell {
    /// Uniform(-0.1, 0.1) weights, zero biases except the forget gate,
    /// which starts at 1 so early gradients are not forgotten.
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let dist = Uniform::new(-0.1, 0.1);

        let w_ih = Array2::random_using((4 * hidden_size, input_size), dist, rng);
        let w_hh = Array2::random_using((4 * hidden_size, hidden_size), dist, rng);
        let mut b_ih = Array2::zeros((4 * hidden_size, 1));
        let b_hh = Array2::zeros((4 * hidden_size, 1));
        b_ih.slice_mut(s![hidden_size..2 * hidden_size, ..]).fill(1.0);

        LSTMCell {
            w_ih,
            w_hh,
            b_ih,
            b_hh,
            input_size,
            hidden_size,
        }
    }

    pub fn forward(&self, input: &Array2<f64>, hx: &Array2<f64>, cx: &Array2<f64>) -> (Array2<f64>, Array2<f64>, LSTMCellCache) {
        let h = self.hidden_size;

        // [input_gate, forget_gate, cell_gate, output_gate] in one product
        let gates = &self.w_ih.dot(input) + &self.b_ih + &self.w_hh.dot(hx) + &self.b_hh;

        let input_gate = gates.slice(s![0..h, ..]).map(|&x| sigmoid(x));
        let forget_gate = gates.slice(s![h..2 * h, ..]).map(|&x| sigmoid(x));
        let cell_gate = gates.slice(s![2 * h..3 * h, ..]).map(|&x| x.tanh());
        let output_gate = gates.slice(s![3 * h..4 * h, ..]).map(|&x| sigmoid(x));

        let cy = &forget_gate * cx + &input_gate * &cell_gate;
        let hy = &output_gate * &cy.map(|&x| x.tanh());

        let cache = LSTMCellCache {
            input: input.clone(),
            hx: hx.clone(),
            cx: cx.clone(),
            input_gate,
            forget_gate,
            cell_gate,
            output_gate,
            cy: cy.clone(),
        };

        (hy, cy, cache)
    }

    /// Backward pass for one time step.
    ///
    /// Returns (parameter_gradients, input_gradient, hidden_gradient, cell_gradient)
    pub fn backward(&self, dhy: &Array2<f64>, dcy: &Array2<f64>, cache: &LSTMCellCache) -> (LSTMCellGradients, Array2<f64>, Array2<f64>, Array2<f64>) {
        let h = self.hidden_size;

        // ∂L/∂o_t = ∂L/∂h_t ⊙ tanh(c_t)
        let tanh_cy = cache.cy.map(|&x| x.tanh());
        let do_t = dhy * &tanh_cy;
        let do_raw = &do_t * &cache.output_gate * &cache.output_gate.map(|&x| 1.0 - x);

        // Cell gradient arrives from the next step and through tanh(c_t)
        let dcy_total = dcy + &(dhy * &cache.output_gate * &tanh_cy.map(|&x| 1.0 - x * x));

        let df_raw = &dcy_total * &cache.cx * &cache.forget_gate * &cache.forget_gate.map(|&x| 1.0 - x);
        let di_raw = &dcy_total * &cache.cell_gate * &cache.input_gate * &cache.input_gate.map(|&x| 1.0 - x);
        let dg_raw = &dcy_total * &cache.input_gate * &cache.cell_gate.map(|&x| 1.0 - x * x);

        let mut dgates = Array2::zeros((4 * h, 1));
        dgates.slice_mut(s![0..h, ..]).assign(&di_raw);
        dgates.slice_mut(s![h..2 * h, ..]).assign(&df_raw);
        dgates.slice_mut(s![2 * h..3 * h, ..]).assign(&dg_raw);
        dgates.slice_mut(s![3 * h..4 * h, ..]).assign(&do_raw);

        let gradients = LSTMCellGradients {
            w_ih: dgates.dot(&cache.input.t()),
            w_hh: dgates.dot(&cache.hx.t()),
            b_ih: dgates.clone(),
            b_hh: dgates.clone(),
        };

        let dx = self.w_ih.t().dot(&dgates);
        let dhx = self.w_hh.t().dot(&dgates);
        let dcx = &dcy_total * &cache.forget_gate;

        (gradients, dx, dhx, dcx)
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> LSTMCellGradients {
        LSTMCellGradients {
            w_ih: Array2::zeros(self.w_ih.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            b_ih: Array2::zeros(self.b_ih.raw_dim()),
            b_hh: Array2::zeros(self.b_hh.raw_dim()),
        }
    }

    pub fn update_parameters<O: Optimizer + ?Sized>(&mut self, gradients: &LSTMCellGradients, optimizer: &mut O, prefix: &str) {
        optimizer.update(&format!("{}_w_ih", prefix), &mut self.w_ih, &gradients.w_ih);
        optimizer.update(&format!("{}_w_hh", prefix), &mut self.w_hh, &gradients.w_hh);
        optimizer.update(&format!("{}_b_ih", prefix), &mut self.b_ih, &gradients.b_ih);
        optimizer.update(&format!("{}_b_hh", prefix), &mut self.b_hh, &gradients.b_hh);
    }

    pub fn num_parameters(&self) -> usize {
        self.w_ih.len() + self.w_hh.len() + self.b_ih.len() + self.b_hh.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::make_rng;
    use ndarray::arr2;

    #[test]
    fn test_lstm_cell_forward() {
        let mut rng = make_rng(Some(1));
        let cell = LSTMCell::new(3, 2, &mut rng);

        let input = arr2(&[[0.5], [0.1], [-0.3]]);
        let hx = arr2(&[[0.0], [0.0]]);
        let cx = arr2(&[[0.0], [0.0]]);

        let (hy, cy, _) = cell.forward(&input, &hx, &cx);

        assert_eq!(hy.shape(), &[2, 1]);
        assert_eq!(cy.shape(), &[2, 1]);
        assert!(hy.iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_forget_bias_starts_at_one() {
        let mut rng = make_rng(Some(1));
        let cell = LSTMCell::new(1, 4, &mut rng);
        assert!(cell.b_ih.slice(s![4..8, ..]).iter().all(|&b| b == 1.0));
        assert!(cell.b_ih.slice(s![0..4, ..]).iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_backward_shapes() {
        let mut rng = make_rng(Some(2));
        let cell = LSTMCell::new(2, 3, &mut rng);

        let input = arr2(&[[1.0], [0.5]]);
        let hx = arr2(&[[0.1], [0.2], [0.3]]);
        let cx = arr2(&[[0.0], [0.0], [0.0]]);
        let (_, _, cache) = cell.forward(&input, &hx, &cx);

        let dhy = arr2(&[[1.0], [1.0], [1.0]]);
        let dcy = arr2(&[[0.0], [0.0], [0.0]]);
        let (gradients, dx, dhx, dcx) = cell.backward(&dhy, &dcy, &cache);

        assert_eq!(gradients.w_ih.shape(), &[12, 2]);
        assert_eq!(gradients.w_hh.shape(), &[12, 3]);
        assert_eq!(dx.shape(), &[2, 1]);
        assert_eq!(dhx.shape(), &[3, 1]);
        assert_eq!(dcx.shape(), &[3, 1]);
    }

    #[test]
    fn test_input_gradient_matches_finite_difference() {
        let mut rng = make_rng(Some(3));
        let cell = LSTMCell::new(1, 2, &mut rng);
        let hx = arr2(&[[0.2], [-0.1]]);
        let cx = arr2(&[[0.05], [0.3]]);

        // L = sum(h_t)
        let loss = |x: f64| {
            let (hy, _, _) = cell.forward(&arr2(&[[x]]), &hx, &cx);
            hy.sum()
        };

        let x = 0.4;
        let (_, _, cache) = cell.forward(&arr2(&[[x]]), &hx, &cx);
        let (_, dx, _, _) = cell.backward(&arr2(&[[1.0], [1.0]]), &arr2(&[[0.0], [0.0]]), &cache);

        let eps = 1e-6;
        let numeric = (loss(x + eps) - loss(x - eps)) / (2.0 * eps);
        assert!((dx[[0, 0]] - numeric).abs() < 1e-6);
    }
}
