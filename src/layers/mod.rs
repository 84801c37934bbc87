/// Recurrent cell used by the stacked network.
pub mod lstm_cell;

/// Dense layers of the regression head.
pub mod linear;
