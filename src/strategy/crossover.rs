use super::{
    signals::{detect_crossover, divergence_pct, SignalConfig},
    SignalInput, SignalStrategy,
};
use crate::indicators::IndicatorSeries;
use crate::models::{PriceBar, Signal};
use crate::{BotError, Result};

/// Confirmed EMA crossover strategy
///
/// Fires once per crossing of a fast EMA over a slow EMA, evaluated on
/// closed bars only. A candidate is downgraded to `None` when:
/// - the last price is missing, non-numeric or stale
/// - the EMAs are inside the configured divergence noise band
/// - the instrument already holds the requested stance
/// - the same crossover bar already produced a transition
#[derive(Debug, Clone)]
pub struct CrossoverStrategy {
    config: SignalConfig,
}

impl CrossoverStrategy {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    fn closed_bars(input: &SignalInput<'_>) -> Vec<PriceBar> {
        input
            .bars
            .iter()
            .filter(|bar| bar.is_closed(input.interval, input.now))
            .cloned()
            .collect()
    }

    fn quote_rejection(&self, input: &SignalInput<'_>) -> Option<String> {
        let quote = match input.quote {
            Some(quote) => quote,
            None => return Some("no last price".to_string()),
        };
        if !quote.is_usable() {
            return Some(format!("unusable last price {}", quote.price));
        }

        let age_secs = (input.now - quote.timestamp).num_seconds();
        if age_secs > self.config.max_price_age_secs as i64 {
            return Some(format!(
                "last price is {}s old (max {}s)",
                age_secs, self.config.max_price_age_secs
            ));
        }
        None
    }
}

impl Default for CrossoverStrategy {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}

impl SignalStrategy for CrossoverStrategy {
    fn evaluate(&self, input: &SignalInput<'_>) -> Result<Signal> {
        let required = self.min_bars_required();
        let closed = Self::closed_bars(input);
        if closed.len() < required {
            return Err(BotError::InsufficientData {
                have: closed.len(),
                need: required,
            });
        }

        let fast = IndicatorSeries::ema(
            &closed,
            self.config.short_period,
            self.config.source,
            required,
        )?;
        let slow = IndicatorSeries::ema(
            &closed,
            self.config.long_period,
            self.config.source,
            required,
        )?;

        let kind = detect_crossover(&fast.values, &slow.values, self.config.confirmation_window);
        let none = Signal::none(input.instrument, input.now);

        let target = match kind.target_stance() {
            Some(target) => target,
            None => return Ok(none),
        };

        let (fast_last, slow_last) = match (fast.last(), slow.last()) {
            (Some(f), Some(s)) => (f, s),
            _ => return Ok(none),
        };
        let bar_time = closed[closed.len() - 1].timestamp;

        tracing::debug!(
            instrument = %input.instrument,
            "Crossover candidate {:?} at {}: fast={:.6} slow={:.6}",
            kind,
            bar_time.format("%Y-%m-%d %H:%M"),
            fast_last,
            slow_last
        );

        if let Some(reason) = self.quote_rejection(input) {
            tracing::warn!(
                instrument = %input.instrument,
                "Suppressing {:?}: {}",
                kind,
                reason
            );
            return Ok(none);
        }

        if let Some(min_pct) = self.config.min_divergence_pct {
            let gap = divergence_pct(fast_last, slow_last);
            if gap < min_pct {
                tracing::debug!(
                    instrument = %input.instrument,
                    "Suppressing {:?}: divergence {:.3}% below {:.3}%",
                    kind,
                    gap,
                    min_pct
                );
                return Ok(none);
            }
        }

        if input.stance == target {
            tracing::debug!(
                instrument = %input.instrument,
                "Suppressing {:?}: already {}",
                kind,
                target
            );
            return Ok(none);
        }

        if input.last_signal_at == Some(bar_time) {
            tracing::debug!(
                instrument = %input.instrument,
                "Suppressing {:?}: crossover at {} already acted on",
                kind,
                bar_time.format("%Y-%m-%d %H:%M")
            );
            return Ok(none);
        }

        Ok(Signal {
            instrument: input.instrument.to_string(),
            kind,
            bar_time: Some(bar_time),
            evaluated_at: input.now,
        })
    }

    fn name(&self) -> &str {
        "CrossoverStrategy"
    }

    fn min_bars_required(&self) -> usize {
        self.config.required_bars()
    }
}
