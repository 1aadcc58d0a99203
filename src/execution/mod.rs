// Order execution: per-instrument state, sizing policy, reconciliation
pub mod instrument_state;
pub mod order_policy;
pub mod paper;
pub mod reconciler;

pub use instrument_state::{initial_states, InstrumentState};
pub use order_policy::{OrderPolicy, OrderStyle, Sizing};
pub use paper::PaperExchange;
pub use reconciler::{ReconcileAction, ReconcileDecision, ReconcileOutcome, Reconciler};
