use ndarray::Array2;
use rand::Rng;

use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMCellGradients};
use crate::optimizers::Optimizer;

/// Cached cell values for a whole sequence, indexed `[time_step][layer]`.
#[derive(Clone, Debug)]
pub struct SequenceCache {
    pub steps: Vec<Vec<LSTMCellCache>>,
}

/// Multi-layer LSTM network for sequence modeling
///
/// Stacks multiple LSTM cells where the hidden output of layer i at step t
/// becomes the input of layer i+1 at step t. Every layer carries its own
/// hidden and cell state across time.
#[derive(Clone, Debug)]
pub struct LSTMNetwork {
    cells: Vec<LSTMCell>,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
}

impl LSTMNetwork {
    /// Creates a new multi-layer LSTM network
    ///
    /// First layer accepts `input_size` dimensions, subsequent layers
    /// accept `hidden_size` dimensions from the previous layer.
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, num_layers: usize, rng: &mut R) -> Self {
        let cells = (0..num_layers)
            .map(|i| {
                let layer_input_size = if i == 0 { input_size } else { hidden_size };
                LSTMCell::new(layer_input_size, hidden_size, rng)
            })
            .collect();

        LSTMNetwork {
            cells,
            input_size,
            hidden_size,
            num_layers,
        }
    }

    pub fn cells(&self) -> &[LSTMCell] {
        &self.cells
    }

    /// Runs the sequence from zero state.
    ///
    /// Returns the top layer's hidden state after the last step, the only
    /// output a sequence-to-value model needs, plus the per-step caches.
    pub fn forward_sequence(&self, sequence: &[Array2<f64>]) -> (Array2<f64>, SequenceCache) {
        let zeros = Array2::zeros((self.hidden_size, 1));
        let mut hidden = vec![zeros.clone(); self.num_layers];
        let mut cell_state = vec![zeros; self.num_layers];
        let mut steps = Vec::with_capacity(sequence.len());

        for input in sequence {
            let mut layer_input = input.clone();
            let mut step_caches = Vec::with_capacity(self.num_layers);

            for (layer, cell) in self.cells.iter().enumerate() {
                let (hy, cy, cache) = cell.forward(&layer_input, &hidden[layer], &cell_state[layer]);
                step_caches.push(cache);
                layer_input = hy.clone();
                hidden[layer] = hy;
                cell_state[layer] = cy;
            }

            steps.push(step_caches);
        }

        let output = hidden
            .pop()
            .unwrap_or_else(|| Array2::zeros((self.hidden_size, 1)));
        (output, SequenceCache { steps })
    }

    /// Backpropagation through time from a gradient on the final top-layer
    /// hidden state.
    ///
    /// Walks time steps in reverse and, inside each step, layers top-down, so
    /// each layer receives both its recurrent gradient from step t+1 and the
    /// input gradient of the layer above at step t.
    pub fn backward_sequence(&self, d_output: &Array2<f64>, cache: &SequenceCache) -> Vec<LSTMCellGradients> {
        let mut gradients = self.zero_gradients();
        let zeros = Array2::zeros((self.hidden_size, 1));
        let mut dh_next = vec![zeros.clone(); self.num_layers];
        let mut dc_next = vec![zeros; self.num_layers];
        let last_step = cache.steps.len().saturating_sub(1);

        for (t, step_caches) in cache.steps.iter().enumerate().rev() {
            let mut d_from_above: Option<Array2<f64>> = None;

            for layer in (0..self.num_layers).rev() {
                let mut dh = dh_next[layer].clone();
                if let Some(d) = d_from_above.take() {
                    dh += &d;
                } else if t == last_step && layer == self.num_layers - 1 {
                    dh += d_output;
                }

                let (step_grads, dx, dhx, dcx) = self.cells[layer].backward(&dh, &dc_next[layer], &step_caches[layer]);
                gradients[layer].accumulate(&step_grads);

                dh_next[layer] = dhx;
                dc_next[layer] = dcx;
                d_from_above = Some(dx);
            }
        }

        gradients
    }

    /// Update parameters for all layers using computed gradients
    pub fn update_parameters<O: Optimizer + ?Sized>(&mut self, gradients: &[LSTMCellGradients], optimizer: &mut O) {
        for (i, (cell, cell_gradients)) in self.cells.iter_mut().zip(gradients).enumerate() {
            cell.update_parameters(cell_gradients, optimizer, &format!("lstm_{}", i));
        }
    }

    /// Initialize zero gradients for all layers
    pub fn zero_gradients(&self) -> Vec<LSTMCellGradients> {
        self.cells.iter().map(|cell| cell.zero_gradients()).collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.cells.iter().map(|cell| cell.num_parameters()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::make_rng;
    use ndarray::arr2;

    fn sequence(values: &[f64]) -> Vec<Array2<f64>> {
        values.iter().map(|&v| arr2(&[[v]])).collect()
    }

    #[test]
    fn test_forward_sequence_shapes() {
        let network = LSTMNetwork::new(1, 4, 2, &mut make_rng(Some(1)));
        let (output, cache) = network.forward_sequence(&sequence(&[0.1, 0.2, 0.3]));

        assert_eq!(output.shape(), &[4, 1]);
        assert_eq!(cache.steps.len(), 3);
        assert!(cache.steps.iter().all(|step| step.len() == 2));
        assert_eq!(cache.steps[0][1].input.shape(), &[4, 1]);
    }

    #[test]
    fn test_layers_keep_their_own_state() {
        let network = LSTMNetwork::new(1, 3, 2, &mut make_rng(Some(4)));
        let (_, cache) = network.forward_sequence(&sequence(&[0.5, 0.6]));

        // Layer 1 at step 1 sees layer 1's previous output as recurrent input,
        // and layer 0's current output as its input.
        let layer0_step0_out = &cache.steps[0][0];
        let layer1_step1 = &cache.steps[1][1];
        let layer1_step0 = &cache.steps[0][1];
        let layer1_prev_h = &layer1_step0.output_gate * &layer1_step0.cy.map(|x| x.tanh());
        let layer0_step0_h = &layer0_step0_out.output_gate * &layer0_step0_out.cy.map(|x| x.tanh());

        assert_eq!(layer1_step1.hx, layer1_prev_h);
        assert_eq!(layer1_step0.input, layer0_step0_h);
    }

    #[test]
    fn test_backward_matches_finite_difference() {
        let network = LSTMNetwork::new(1, 3, 2, &mut make_rng(Some(9)));
        let inputs = sequence(&[0.3, -0.2, 0.7, 0.1]);

        // L = sum of the final hidden state
        let (output, cache) = network.forward_sequence(&inputs);
        let d_output = Array2::ones(output.raw_dim());
        let gradients = network.backward_sequence(&d_output, &cache);

        let eps = 1e-6;
        for (layer, row, col) in [(0, 2, 0), (0, 5, 1), (1, 7, 2), (1, 0, 0)] {
            let mut plus = network.clone();
            plus.cells[layer].w_hh[[row, col]] += eps;
            let mut minus = network.clone();
            minus.cells[layer].w_hh[[row, col]] -= eps;

            let numeric = (plus.forward_sequence(&inputs).0.sum() - minus.forward_sequence(&inputs).0.sum()) / (2.0 * eps);
            let analytic = gradients[layer].w_hh[[row, col]];
            assert!((numeric - analytic).abs() < 1e-6, "layer {} w_hh[{},{}]: {} vs {}", layer, row, col, numeric, analytic);
        }
    }
}
