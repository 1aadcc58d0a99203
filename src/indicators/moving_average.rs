use crate::error::{BotError, Result};
use crate::models::{PriceBar, PriceSource};

/// Calculate Exponential Moving Average (EMA) series
///
/// Seeded with the first price (no warm-up gap), then
/// `ema[i] = α * price[i] + (1 - α) * ema[i - 1]` with `α = 2 / (period + 1)`.
/// Output is aligned 1:1 with the input. Returns an empty series for empty
/// input or `period == 0`.
pub fn calculate_ema(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut values = Vec::with_capacity(prices.len());

    for &price in prices {
        let next = match values.last() {
            Some(&prev) => alpha * price + (1.0 - alpha) * prev,
            None => price,
        };
        values.push(next);
    }

    values
}

/// EMA with a minimum-length guard
///
/// `min_len` is independent of `period`: callers that need trailing bars
/// for confirmation ask for more history than the period alone requires.
pub fn ema(prices: &[f64], period: usize, min_len: usize) -> Result<Vec<f64>> {
    if period == 0 {
        return Err(BotError::InvalidConfig(
            "EMA period must be positive".to_string(),
        ));
    }
    if prices.len() < min_len.max(1) {
        return Err(BotError::InsufficientData {
            have: prices.len(),
            need: min_len.max(1),
        });
    }

    Ok(calculate_ema(prices, period))
}

/// Smoothed values for one (period, source column) pair
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub period: usize,
    pub source: PriceSource,
    pub values: Vec<f64>,
}

impl IndicatorSeries {
    /// Compute an EMA series over `bars`, one value per bar
    pub fn ema(bars: &[PriceBar], period: usize, source: PriceSource, min_len: usize) -> Result<Self> {
        let prices: Vec<f64> = bars.iter().map(|bar| source.extract(bar)).collect();
        let values = ema(&prices, period, min_len)?;

        Ok(Self {
            period,
            source,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.last().copied()
    }
}
