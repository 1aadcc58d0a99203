// Poll scheduler: one sequential pass over the universe per cycle
pub mod clock;

pub use clock::{
    is_near_boundary, next_aligned_boundary, time_to_boundary, Clock, FixedClock, SystemClock,
};

use crate::api::ExchangeGateway;
use crate::execution::{initial_states, InstrumentState, ReconcileOutcome, Reconciler};
use crate::models::{BarInterval, Stance};
use crate::notify::{escape_markdown, notify_best_effort, Notifier};
use crate::strategy::{signals::validate_bar_sequence, SignalInput, SignalStrategy};
use crate::{BotError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub interval: BarInterval,
    /// Bars requested per fetch; raised to what the strategy needs if lower
    pub lookback_bars: usize,
    pub poll_interval_secs: u64,
    pub backoff_secs: u64,
    /// Flatten when the next interval boundary is this close
    pub flatten_threshold_secs: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            interval: BarInterval::default(),
            lookback_bars: 100,
            poll_interval_secs: 300,
            backoff_secs: 60,
            flatten_threshold_secs: None,
        }
    }
}

/// Result of one pass over the universe
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Instruments processed (successfully or not)
    pub evaluated: usize,
    pub transitions: usize,
    pub flattened: usize,
    pub failures: Vec<(String, BotError)>,
    /// Shutdown was requested before every instrument was processed
    pub interrupted: bool,
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.evaluated - self.failures.len()
    }

    /// Nothing succeeded and every failure points at the gateway
    pub fn is_cycle_failure(&self) -> bool {
        self.evaluated > 0
            && self.succeeded() == 0
            && self.failures.iter().all(|(_, e)| e.is_gateway_failure())
    }
}

pub struct Engine {
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
    strategy: Box<dyn SignalStrategy>,
    reconciler: Reconciler,
    states: Vec<InstrumentState>,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    last_digest: String,
}

impl Engine {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        strategy: Box<dyn SignalStrategy>,
        reconciler: Reconciler,
        instruments: &[String],
        settings: EngineSettings,
    ) -> Self {
        let states = initial_states(instruments);
        let last_digest = stance_digest(&states);
        Self {
            gateway,
            notifier,
            strategy,
            reconciler,
            states,
            settings,
            clock: Arc::new(SystemClock),
            last_digest,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn states(&self) -> &[InstrumentState] {
        &self.states
    }

    pub fn state(&self, instrument: &str) -> Option<&InstrumentState> {
        self.states.iter().find(|s| s.instrument() == instrument)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn lookback(&self) -> usize {
        self.settings.lookback_bars.max(self.strategy.lookback_bars())
    }

    /// Run until `shutdown` flips to true (or its sender is dropped)
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "🔄 Engine starting: {} instruments, {} bars, strategy {}",
            self.states.len(),
            self.settings.interval,
            self.strategy.name()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.cycle(Some(&shutdown)).await;
            if report.interrupted {
                break;
            }

            let pause = if report.is_cycle_failure() {
                tracing::error!(
                    "✗ Cycle failed for all {} instruments, backing off {}s",
                    report.evaluated,
                    self.settings.backoff_secs
                );
                Duration::from_secs(self.settings.backoff_secs)
            } else {
                Duration::from_secs(self.settings.poll_interval_secs)
            };

            let sender_gone = tokio::select! {
                _ = tokio::time::sleep(pause) => false,
                changed = shutdown.changed() => changed.is_err(),
            };
            if sender_gone {
                break;
            }
        }

        tracing::info!("🛑 Engine stopped");
    }

    /// One full pass over every instrument
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle(None).await
    }

    async fn cycle(&mut self, shutdown: Option<&watch::Receiver<bool>>) -> CycleReport {
        tracing::info!("💹 Cycle at {}", self.clock.now().format("%Y-%m-%d %H:%M:%S"));

        let mut report = CycleReport::default();
        let mut states = std::mem::take(&mut self.states);

        for state in states.iter_mut() {
            if shutdown.map(|rx| *rx.borrow()).unwrap_or(false) {
                tracing::info!("Shutdown requested, stopping cycle early");
                report.interrupted = true;
                break;
            }

            report.evaluated += 1;
            match self.process_instrument(state).await {
                Ok(ReconcileOutcome::Transitioned { .. }) | Ok(ReconcileOutcome::Adopted { .. }) => {
                    report.transitions += 1
                }
                Ok(ReconcileOutcome::Flattened { .. }) => report.flattened += 1,
                Ok(ReconcileOutcome::Unchanged) => {}
                Err(e) => {
                    tracing::warn!(instrument = %state.instrument(), "✗ {}", e);
                    if let BotError::OrderRejected { reason, .. } = &e {
                        notify_best_effort(
                            self.notifier.as_ref(),
                            &format!(
                                "❌ *{}* order rejected: {}",
                                escape_markdown(state.instrument()),
                                escape_markdown(reason)
                            ),
                        )
                        .await;
                    }
                    report.failures.push((state.instrument().to_string(), e));
                }
            }
        }

        self.states = states;
        self.publish_digest().await;

        tracing::info!(
            "Cycle done: {} evaluated, {} transitions, {} flattened, {} failed",
            report.evaluated,
            report.transitions,
            report.flattened,
            report.failures.len()
        );
        report
    }

    async fn process_instrument(&self, state: &mut InstrumentState) -> Result<ReconcileOutcome> {
        let instrument = state.instrument().to_string();
        let interval = self.settings.interval;

        let now = self.clock.now();
        if let Some(secs) = self.settings.flatten_threshold_secs {
            let threshold = chrono::Duration::seconds(secs as i64);
            if is_near_boundary(now, interval, threshold) {
                tracing::info!(
                    instrument = %instrument,
                    "⏱ {}s to {} boundary, flattening",
                    time_to_boundary(now, interval).num_seconds(),
                    interval
                );
                let outcome = self.reconciler.flatten(self.gateway.as_ref(), state).await?;
                if let ReconcileOutcome::Flattened { from } = outcome {
                    notify_best_effort(
                        self.notifier.as_ref(),
                        &format!(
                            "⏹ *{}* flattened before {} boundary (was {})",
                            escape_markdown(&instrument),
                            interval,
                            from
                        ),
                    )
                    .await;
                }
                return Ok(outcome);
            }
        }

        let bars = self
            .gateway
            .fetch_bars(&instrument, interval, self.lookback())
            .await?;
        validate_bar_sequence(&instrument, &bars)?;

        let quote = self.gateway.fetch_last_price(&instrument).await?;
        let input = SignalInput {
            instrument: &instrument,
            bars: &bars,
            interval,
            quote: Some(quote),
            stance: state.stance(),
            last_signal_at: state.last_signal_at(),
            now,
        };
        let signal = self.strategy.evaluate(&input)?;

        tracing::info!(
            instrument = %instrument,
            "✓ @ {:.6} -> {:?} (stance {})",
            quote.price,
            signal.kind,
            state.stance()
        );

        let outcome = self
            .reconciler
            .reconcile(self.gateway.as_ref(), state, &signal, quote.price)
            .await?;

        if let ReconcileOutcome::Transitioned { from, to, ref order } = outcome {
            notify_best_effort(
                self.notifier.as_ref(),
                &format!(
                    "📈 *{}* {} → {} @ {:.6} (order {})",
                    escape_markdown(&instrument),
                    from,
                    to,
                    quote.price,
                    escape_markdown(&order.id)
                ),
            )
            .await;
        }

        Ok(outcome)
    }

    /// Send the stance digest if it changed since the last one
    async fn publish_digest(&mut self) {
        let digest = stance_digest(&self.states);
        if digest != self.last_digest {
            notify_best_effort(self.notifier.as_ref(), &digest).await;
            self.last_digest = digest;
        }
    }
}

/// Summary of every non-flat instrument
pub fn stance_digest(states: &[InstrumentState]) -> String {
    let open: Vec<String> = states
        .iter()
        .filter(|s| s.stance() != Stance::Flat)
        .map(|s| format!("{}: {}", escape_markdown(s.instrument()), s.stance()))
        .collect();

    if open.is_empty() {
        "📊 All instruments flat".to_string()
    } else {
        format!("📊 Open stances\n{}", open.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(kind: &str) -> (String, BotError) {
        let err = match kind {
            "data" => BotError::data_unavailable("BTCUSDT", "timeout"),
            "price" => BotError::price_unavailable("BTCUSDT", "missing"),
            _ => BotError::InsufficientData { have: 3, need: 21 },
        };
        ("BTCUSDT".to_string(), err)
    }

    #[test]
    fn test_all_gateway_failures_is_cycle_failure() {
        let report = CycleReport {
            evaluated: 2,
            failures: vec![failure("data"), failure("price")],
            ..Default::default()
        };
        assert!(report.is_cycle_failure());
    }

    #[test]
    fn test_partial_success_is_not_cycle_failure() {
        let report = CycleReport {
            evaluated: 3,
            failures: vec![failure("data"), failure("price")],
            ..Default::default()
        };
        assert_eq!(report.succeeded(), 1);
        assert!(!report.is_cycle_failure());
    }

    #[test]
    fn test_local_failures_are_not_cycle_failure() {
        let report = CycleReport {
            evaluated: 2,
            failures: vec![failure("data"), failure("insufficient")],
            ..Default::default()
        };
        assert!(!report.is_cycle_failure());

        // An empty cycle never triggers backoff
        assert!(!CycleReport::default().is_cycle_failure());
    }

    #[test]
    fn test_stance_digest() {
        let states = vec![
            InstrumentState::with_stance("BTCUSDT", Stance::Long),
            InstrumentState::new("ETHUSDT"),
            InstrumentState::with_stance("SOLUSDT", Stance::Short),
        ];
        assert_eq!(
            stance_digest(&states),
            "📊 Open stances\nBTCUSDT: LONG\nSOLUSDT: SHORT"
        );
        assert_eq!(
            stance_digest(&[InstrumentState::new("ETHUSDT")]),
            "📊 All instruments flat"
        );
    }
}
