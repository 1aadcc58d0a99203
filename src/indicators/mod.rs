// Technical indicators module
// Exponential moving averages over price bars

pub mod moving_average;

pub use moving_average::{calculate_ema, ema, IndicatorSeries};
