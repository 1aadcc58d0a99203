// Trading strategy module
pub mod crossover;
pub mod signals;

use crate::models::{BarInterval, PriceBar, PriceQuote, Signal, Stance};
use crate::Result;
use chrono::{DateTime, Utc};

pub use crossover::CrossoverStrategy;
pub use signals::SignalConfig;

/// Everything a strategy sees for one instrument in one cycle
#[derive(Debug, Clone)]
pub struct SignalInput<'a> {
    pub instrument: &'a str,
    pub bars: &'a [PriceBar],
    pub interval: BarInterval,
    pub quote: Option<PriceQuote>,
    pub stance: Stance,
    /// Bar time of the crossover behind the last confirmed transition
    pub last_signal_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// Base trait for signal strategies
pub trait SignalStrategy: Send + Sync {
    /// Classify the instrument into Buy / Sell / None
    fn evaluate(&self, input: &SignalInput<'_>) -> Result<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum closed bars required for this strategy
    fn min_bars_required(&self) -> usize;

    /// Bars to request from the gateway, one extra for the still-forming bar
    fn lookback_bars(&self) -> usize {
        self.min_bars_required() + 1
    }
}
