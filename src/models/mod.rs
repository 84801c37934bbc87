/// Stacked LSTM layers with backpropagation through time.
pub mod lstm_network;

/// Sequence-to-value price regressor.
pub mod forecast_model;
