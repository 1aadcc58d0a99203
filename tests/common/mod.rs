// Shared test doubles for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use crossbot::api::{ExchangeGateway, MarketData};
use crossbot::engine::{Clock, Engine, EngineSettings, FixedClock};
use crossbot::execution::{OrderPolicy, Reconciler};
use crossbot::notify::Notifier;
use crossbot::strategy::{CrossoverStrategy, SignalConfig};
use crossbot::{
    BarInterval, BotError, OrderHandle, OrderRequest, Position, PriceBar, PriceQuote, Result,
    Side,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Gateway call as seen by the double, in issue order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchBars(String),
    FetchLastPrice(String),
    FetchPosition(String),
    Submit {
        instrument: String,
        side: Side,
        reduce_only: bool,
    },
    Cancel(String),
}

impl Call {
    pub fn is_order_call(&self) -> bool {
        matches!(self, Call::Submit { .. } | Call::Cancel(_))
    }
}

#[derive(Default)]
struct Book {
    calls: Vec<Call>,
    bars: HashMap<String, Vec<PriceBar>>,
    prices: HashMap<String, f64>,
    positions: HashMap<String, Position>,
    fail_bars: HashSet<String>,
    fail_price: HashSet<String>,
    reject_entries: HashMap<String, String>,
    shutdown_on_fetch: Option<(String, watch::Sender<bool>)>,
    next_id: u64,
}

/// In-memory gateway that records every call
///
/// Market orders fill immediately: entries replace the position, reduce-only
/// orders remove it.
pub struct RecordingGateway {
    book: Mutex<Book>,
    clock: Arc<FixedClock>,
}

impl RecordingGateway {
    pub fn new(clock: Arc<FixedClock>) -> Self {
        Self {
            book: Mutex::new(Book::default()),
            clock,
        }
    }

    pub fn set_bars(&self, instrument: &str, bars: Vec<PriceBar>) {
        let mut book = self.book.lock().unwrap();
        if let Some(last) = bars.last() {
            book.prices.insert(instrument.to_string(), last.close);
        }
        book.bars.insert(instrument.to_string(), bars);
    }

    pub fn set_price(&self, instrument: &str, price: f64) {
        self.book.lock().unwrap().prices.insert(instrument.to_string(), price);
    }

    pub fn set_position(&self, instrument: &str, side: Side, size: f64) {
        let position = Position {
            instrument: instrument.to_string(),
            side,
            entry_price: 100.0,
            size,
        };
        self.book
            .lock()
            .unwrap()
            .positions
            .insert(instrument.to_string(), position);
    }

    pub fn clear_position(&self, instrument: &str) {
        self.book.lock().unwrap().positions.remove(instrument);
    }

    pub fn position(&self, instrument: &str) -> Option<Position> {
        self.book.lock().unwrap().positions.get(instrument).cloned()
    }

    pub fn fail_bars_for(&self, instrument: &str) {
        self.book.lock().unwrap().fail_bars.insert(instrument.to_string());
    }

    pub fn fail_price_for(&self, instrument: &str) {
        self.book.lock().unwrap().fail_price.insert(instrument.to_string());
    }

    pub fn reject_entries_for(&self, instrument: &str) {
        self.reject_entries_with(instrument, "Margin is insufficient");
    }

    /// Reject non-reduce-only orders for `instrument` with `reason`
    pub fn reject_entries_with(&self, instrument: &str, reason: &str) {
        self.book
            .lock()
            .unwrap()
            .reject_entries
            .insert(instrument.to_string(), reason.to_string());
    }

    /// Flip `shutdown` to true when bars for `instrument` are requested
    pub fn shutdown_on_fetch(&self, instrument: &str, shutdown: watch::Sender<bool>) {
        self.book.lock().unwrap().shutdown_on_fetch = Some((instrument.to_string(), shutdown));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.book.lock().unwrap().calls.clone()
    }

    pub fn order_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_order_call).collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|c| *c == wanted).count()
    }

    pub fn clear_calls(&self) {
        self.book.lock().unwrap().calls.clear();
    }
}

#[async_trait]
impl MarketData for RecordingGateway {
    async fn fetch_bars(
        &self,
        instrument: &str,
        _interval: BarInterval,
        count: usize,
    ) -> Result<Vec<PriceBar>> {
        let mut book = self.book.lock().unwrap();
        book.calls.push(Call::FetchBars(instrument.to_string()));

        if let Some((target, tx)) = &book.shutdown_on_fetch {
            if target == instrument {
                let _ = tx.send(true);
            }
        }

        if book.fail_bars.contains(instrument) {
            return Err(BotError::data_unavailable(instrument, "HTTP 503"));
        }
        let bars = book.bars.get(instrument).cloned().unwrap_or_default();
        let skip = bars.len().saturating_sub(count);
        Ok(bars.into_iter().skip(skip).collect())
    }

    async fn fetch_last_price(&self, instrument: &str) -> Result<PriceQuote> {
        let mut book = self.book.lock().unwrap();
        book.calls.push(Call::FetchLastPrice(instrument.to_string()));

        if book.fail_price.contains(instrument) {
            return Err(BotError::price_unavailable(instrument, "missing price"));
        }
        match book.prices.get(instrument) {
            Some(price) => Ok(PriceQuote {
                price: *price,
                timestamp: self.clock.now(),
            }),
            None => Err(BotError::price_unavailable(instrument, "unknown symbol")),
        }
    }
}

#[async_trait]
impl ExchangeGateway for RecordingGateway {
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderHandle> {
        let mut book = self.book.lock().unwrap();
        book.calls.push(Call::Submit {
            instrument: request.instrument.clone(),
            side: request.side,
            reduce_only: request.reduce_only,
        });

        if !request.reduce_only {
            if let Some(reason) = book.reject_entries.get(&request.instrument) {
                return Err(BotError::order_rejected(&request.instrument, reason));
            }
        }

        if request.reduce_only {
            book.positions.remove(&request.instrument);
        } else {
            let price = book.prices.get(&request.instrument).copied().unwrap_or(0.0);
            book.positions.insert(
                request.instrument.clone(),
                Position {
                    instrument: request.instrument.clone(),
                    side: request.side,
                    entry_price: price,
                    size: request.quantity,
                },
            );
        }

        book.next_id += 1;
        Ok(OrderHandle {
            id: book.next_id.to_string(),
            instrument: request.instrument.clone(),
        })
    }

    async fn cancel_order(&self, handle: &OrderHandle) -> Result<()> {
        self.book
            .lock()
            .unwrap()
            .calls
            .push(Call::Cancel(handle.id.clone()));
        Ok(())
    }

    async fn fetch_position(&self, instrument: &str) -> Result<Option<Position>> {
        let mut book = self.book.lock().unwrap();
        book.calls.push(Call::FetchPosition(instrument.to_string()));
        Ok(book.positions.get(instrument).cloned())
    }
}

/// Notifier that keeps every message
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Notifier that never answers
pub struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _text: &str) -> Result<()> {
        std::future::pending::<Result<()>>().await
    }
}

/// 2024-03-01 05:00 UTC, first bar of every scenario
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap()
}

/// Hourly bars from `start()` with the given closes
pub fn hourly_bars(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            timestamp: start() + Duration::hours(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Closes whose last bar is a fresh bullish cross for `fast_signal_config`
pub const BULLISH: [f64; 5] = [10.0, 10.0, 10.0, 10.0, 20.0];
/// Mirror of `BULLISH`
pub const BEARISH: [f64; 5] = [20.0, 20.0, 20.0, 20.0, 10.0];

/// One minute after the last `BULLISH`/`BEARISH` bar closed
pub fn after_last_close() -> DateTime<Utc> {
    start() + Duration::hours(5) + Duration::minutes(1)
}

pub fn fast_signal_config() -> SignalConfig {
    SignalConfig {
        short_period: 2,
        long_period: 4,
        confirmation_window: 2,
        min_bars: 4,
        ..Default::default()
    }
}

pub fn engine_with(
    gateway: Arc<RecordingGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<FixedClock>,
    instruments: &[&str],
    settings: EngineSettings,
) -> Engine {
    let instruments: Vec<String> = instruments.iter().map(|s| s.to_string()).collect();
    Engine::new(
        gateway,
        notifier,
        Box::new(CrossoverStrategy::new(fast_signal_config())),
        Reconciler::new(OrderPolicy::default()),
        &instruments,
        settings,
    )
    .with_clock(clock)
}
