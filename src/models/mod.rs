use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV bar for one instrument, `timestamp` is the bar open time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// True once the bar's full interval has elapsed at `now`
    pub fn is_closed(&self, interval: BarInterval, now: DateTime<Utc>) -> bool {
        self.timestamp + interval.duration() <= now
    }
}

/// Latest traded price as reported by the gateway
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceQuote {
    /// A usable quote is finite and strictly positive
    pub fn is_usable(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Column a series is computed from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Open,
    High,
    Low,
    #[default]
    Close,
}

impl PriceSource {
    pub fn extract(&self, bar: &PriceBar) -> f64 {
        match self {
            PriceSource::Open => bar.open,
            PriceSource::High => bar.high,
            PriceSource::Low => bar.low,
            PriceSource::Close => bar.close,
        }
    }
}

/// Bar timeframe in exchange notation (`1m`, `15m`, `1h`, `4h`, `1d`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BarInterval {
    minutes: u32,
}

const SUPPORTED_INTERVALS: &[(&str, u32)] = &[
    ("1m", 1),
    ("3m", 3),
    ("5m", 5),
    ("15m", 15),
    ("30m", 30),
    ("1h", 60),
    ("2h", 120),
    ("4h", 240),
    ("6h", 360),
    ("8h", 480),
    ("12h", 720),
    ("1d", 1440),
];

impl BarInterval {
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        SUPPORTED_INTERVALS
            .iter()
            .any(|(_, m)| *m == minutes)
            .then_some(Self { minutes })
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes as i64)
    }

    pub fn as_str(&self) -> &'static str {
        SUPPORTED_INTERVALS
            .iter()
            .find(|(_, m)| *m == self.minutes)
            .map(|(s, _)| *s)
            .unwrap_or("1h")
    }
}

impl Default for BarInterval {
    fn default() -> Self {
        Self { minutes: 60 }
    }
}

impl FromStr for BarInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SUPPORTED_INTERVALS
            .iter()
            .find(|(name, _)| *name == s.trim())
            .map(|(_, minutes)| Self { minutes: *minutes })
            .ok_or_else(|| format!("unsupported bar interval '{}'", s))
    }
}

impl TryFrom<String> for BarInterval {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BarInterval> for String {
    fn from(value: BarInterval) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional exposure of an instrument
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Stance {
    #[default]
    Flat,
    Long,
    Short,
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stance::Flat => f.write_str("FLAT"),
            Stance::Long => f.write_str("LONG"),
            Stance::Short => f.write_str("SHORT"),
        }
    }
}

/// Classification produced by the detector
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalKind {
    Buy,
    Sell,
    None,
}

impl SignalKind {
    /// Stance this signal asks for, `None` for no signal
    pub fn target_stance(&self) -> Option<Stance> {
        match self {
            SignalKind::Buy => Some(Stance::Long),
            SignalKind::Sell => Some(Stance::Short),
            SignalKind::None => None,
        }
    }
}

/// One evaluation result per (instrument, cycle)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub instrument: String,
    pub kind: SignalKind,
    /// Open time of the closed bar the crossover was confirmed on
    pub bar_time: Option<DateTime<Utc>>,
    pub evaluated_at: DateTime<Utc>,
}

impl Signal {
    pub fn none(instrument: &str, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.to_string(),
            kind: SignalKind::None,
            bar_time: None,
            evaluated_at,
        }
    }
}

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Side that opens the given stance, `None` for `Flat`
    pub fn opening(stance: Stance) -> Option<Self> {
        match stance {
            Stance::Long => Some(Side::Buy),
            Stance::Short => Some(Side::Sell),
            Stance::Flat => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    Market,
    Limit,
}

/// Everything a gateway needs to place one order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub instrument: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: f64,
    /// Limit price, required for `OrderKind::Limit`
    pub price: Option<f64>,
    pub leverage: Option<u32>,
    /// Only reduce an existing position, never open or flip one
    pub reduce_only: bool,
}

/// Gateway-issued order identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OrderHandle {
    pub id: String,
    pub instrument: String,
}

impl fmt::Display for OrderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.instrument, self.id)
    }
}

/// Open position as reported by the gateway (read-only view)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub instrument: String,
    /// `Buy` for a long position, `Sell` for a short one
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
}

impl Position {
    pub fn stance(&self) -> Stance {
        match self.side {
            Side::Buy => Stance::Long,
            Side::Sell => Stance::Short,
        }
    }
}
