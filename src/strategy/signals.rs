use crate::error::{BotError, Result};
use crate::models::{PriceBar, PriceSource, SignalKind};
use serde::{Deserialize, Serialize};

/// Configuration for crossover signal generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    pub short_period: usize,
    pub long_period: usize,
    pub source: PriceSource,
    /// Bars the fast EMA must have spent at-or-beyond the slow EMA before the cross
    pub confirmation_window: usize,
    /// Minimum closed bars before any evaluation, on top of what the periods need
    pub min_bars: usize,
    /// Quotes older than this are treated as missing
    pub max_price_age_secs: u64,
    /// Minimum |fast - slow| / slow in percent; `None` disables the gate
    pub min_divergence_pct: Option<f64>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            short_period: 9,
            long_period: 21,
            source: PriceSource::Close,
            confirmation_window: 2,
            min_bars: 0,
            max_price_age_secs: 120,
            min_divergence_pct: None,
        }
    }
}

impl SignalConfig {
    /// Closed bars needed before the detector will classify anything
    ///
    /// # Example
    /// ```
    /// use crossbot::strategy::signals::SignalConfig;
    ///
    /// let config = SignalConfig::default();
    /// // long EMA (21) dominates the confirmation window (2 + 1)
    /// assert_eq!(config.required_bars(), 21);
    /// ```
    pub fn required_bars(&self) -> usize {
        self.min_bars
            .max(self.long_period)
            .max(self.confirmation_window + 1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.short_period == 0 || self.long_period == 0 {
            return Err(BotError::InvalidConfig(
                "EMA periods must be positive".to_string(),
            ));
        }
        if self.short_period >= self.long_period {
            return Err(BotError::InvalidConfig(format!(
                "short_period ({}) must be below long_period ({})",
                self.short_period, self.long_period
            )));
        }
        if self.confirmation_window == 0 {
            return Err(BotError::InvalidConfig(
                "confirmation_window must be at least 1".to_string(),
            ));
        }
        if let Some(pct) = self.min_divergence_pct {
            if !pct.is_finite() || pct < 0.0 {
                return Err(BotError::InvalidConfig(format!(
                    "min_divergence_pct must be a non-negative number, got {}",
                    pct
                )));
            }
        }
        Ok(())
    }
}

/// Validate that bars form a usable, strictly increasing sequence
///
/// # Returns
/// * `Ok(())` if timestamps strictly increase and every close is a finite positive number
/// * `Err(DataUnavailable)` for empty, unsorted, duplicated or non-numeric data
pub fn validate_bar_sequence(instrument: &str, bars: &[PriceBar]) -> Result<()> {
    if bars.is_empty() {
        return Err(BotError::data_unavailable(instrument, "no bars returned"));
    }

    for window in bars.windows(2) {
        if window[1].timestamp <= window[0].timestamp {
            return Err(BotError::data_unavailable(
                instrument,
                format!(
                    "bars not strictly increasing: {} followed by {}",
                    window[0].timestamp.format("%Y-%m-%d %H:%M:%S"),
                    window[1].timestamp.format("%Y-%m-%d %H:%M:%S")
                ),
            ));
        }
    }

    if let Some(bad) = bars
        .iter()
        .find(|bar| !bar.close.is_finite() || bar.close <= 0.0)
    {
        return Err(BotError::data_unavailable(
            instrument,
            format!(
                "invalid close {} at {}",
                bad.close,
                bad.timestamp.format("%Y-%m-%d %H:%M:%S")
            ),
        ));
    }

    Ok(())
}

/// Classify the crossover state at the last index of two aligned series
///
/// A `Buy` needs the fast series strictly above the slow one at the last
/// index after `window` consecutive indices at-or-below it; `Sell` mirrors.
/// Because the previous index must be on the other side, a single cross can
/// only be reported at one index.
pub fn detect_crossover(fast: &[f64], slow: &[f64], window: usize) -> SignalKind {
    let len = fast.len().min(slow.len());
    if window == 0 || len < window + 1 {
        return SignalKind::None;
    }

    let diff = |i: usize| fast[i] - slow[i];
    let last = len - 1;
    let prior: Vec<f64> = (1..=window).map(|k| diff(last - k)).collect();

    let current = diff(last);
    if current > 0.0 && prior.iter().all(|&d| d <= 0.0) {
        SignalKind::Buy
    } else if current < 0.0 && prior.iter().all(|&d| d >= 0.0) {
        SignalKind::Sell
    } else {
        SignalKind::None
    }
}

/// Percentage gap between fast and slow EMA relative to the slow EMA
pub fn divergence_pct(fast: f64, slow: f64) -> f64 {
    if slow == 0.0 {
        return 0.0;
    }
    ((fast - slow) / slow).abs() * 100.0
}
