use crate::models::{OrderHandle, Stance};
use chrono::{DateTime, Utc};

/// Per-instrument cache of stance and order handle
///
/// Created `Flat` at startup for every configured instrument and kept for the
/// lifetime of the process. Only the reconciler mutates it, and only after the
/// gateway confirmed an action.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentState {
    instrument: String,
    stance: Stance,
    pending_order: Option<OrderHandle>,
    last_signal_at: Option<DateTime<Utc>>,
}

impl InstrumentState {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self::with_stance(instrument, Stance::Flat)
    }

    /// State seeded with a known stance (e.g. restored by an operator)
    pub fn with_stance(instrument: impl Into<String>, stance: Stance) -> Self {
        Self {
            instrument: instrument.into(),
            stance,
            pending_order: None,
            last_signal_at: None,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn stance(&self) -> Stance {
        self.stance
    }

    pub fn pending_order(&self) -> Option<&OrderHandle> {
        self.pending_order.as_ref()
    }

    pub fn last_signal_at(&self) -> Option<DateTime<Utc>> {
        self.last_signal_at
    }

    pub(crate) fn set_stance(&mut self, stance: Stance) {
        self.stance = stance;
    }

    pub(crate) fn clear_pending_order(&mut self) -> Option<OrderHandle> {
        self.pending_order.take()
    }

    /// Record a confirmed entry
    ///
    /// `resting` is the entry handle only while it can still be working at the
    /// gateway; filled market entries pass `None`.
    pub(crate) fn record_entry(
        &mut self,
        stance: Stance,
        resting: Option<OrderHandle>,
        signal_bar: Option<DateTime<Utc>>,
    ) {
        self.stance = stance;
        self.pending_order = resting;
        if signal_bar.is_some() {
            self.last_signal_at = signal_bar;
        }
    }
}

/// Build the startup state for a whole universe
pub fn initial_states(instruments: &[String]) -> Vec<InstrumentState> {
    instruments.iter().map(InstrumentState::new).collect()
}
