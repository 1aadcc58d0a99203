/// Errors raised by the signal engine and its collaborators
///
/// Only `DataUnavailable` and `PriceUnavailable` count towards a
/// cycle-level gateway outage; everything else is local to one instrument.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BotError {
    #[error("market data unavailable for {instrument}: {reason}")]
    DataUnavailable { instrument: String, reason: String },

    #[error("last price unavailable for {instrument}: {reason}")]
    PriceUnavailable { instrument: String, reason: String },

    #[error("insufficient data: have {have} values, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("order rejected for {instrument}: {reason}")]
    OrderRejected { instrument: String, reason: String },

    #[error("notifier failure: {0}")]
    NotifierFailure(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl BotError {
    pub fn data_unavailable(instrument: &str, reason: impl ToString) -> Self {
        Self::DataUnavailable {
            instrument: instrument.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn price_unavailable(instrument: &str, reason: impl ToString) -> Self {
        Self::PriceUnavailable {
            instrument: instrument.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn order_rejected(instrument: &str, reason: impl ToString) -> Self {
        Self::OrderRejected {
            instrument: instrument.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True when the error means the gateway could not be reached or returned
    /// nothing usable
    pub fn is_gateway_failure(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. } | Self::PriceUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_failure_classification() {
        assert!(BotError::data_unavailable("BTCUSDT", "timeout").is_gateway_failure());
        assert!(BotError::price_unavailable("BTCUSDT", "missing").is_gateway_failure());
        assert!(!BotError::order_rejected("BTCUSDT", "margin").is_gateway_failure());
        assert!(!BotError::InsufficientData { have: 3, need: 21 }.is_gateway_failure());
        assert!(!BotError::NotifierFailure("down".to_string()).is_gateway_failure());
    }

    #[test]
    fn test_display_carries_reason() {
        let err = BotError::order_rejected("ETHUSDT", "Margin is insufficient");
        assert_eq!(
            err.to_string(),
            "order rejected for ETHUSDT: Margin is insufficient"
        );
    }
}
