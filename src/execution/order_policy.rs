use crate::models::{OrderKind, OrderRequest, Position, Side};
use crate::{BotError, Result};
use serde::{Deserialize, Serialize};

/// How big each new position is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Sizing {
    /// Quote-currency value divided by the latest price
    FixedNotional { notional: f64 },
    /// Fixed contract quantity
    FixedQuantity { quantity: f64 },
}

/// Order type used for entries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderStyle {
    Market,
    /// Buy `offset_pct` below / sell `offset_pct` above the last price
    Limit { offset_pct: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrderPolicy {
    pub sizing: Sizing,
    pub style: OrderStyle,
    pub leverage: Option<u32>,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            sizing: Sizing::FixedNotional { notional: 100.0 },
            style: OrderStyle::Market,
            leverage: None,
        }
    }
}

impl OrderPolicy {
    pub fn validate(&self) -> Result<()> {
        match self.sizing {
            Sizing::FixedNotional { notional } if !(notional.is_finite() && notional > 0.0) => {
                return Err(BotError::InvalidConfig(format!(
                    "notional must be positive, got {}",
                    notional
                )));
            }
            Sizing::FixedQuantity { quantity } if !(quantity.is_finite() && quantity > 0.0) => {
                return Err(BotError::InvalidConfig(format!(
                    "quantity must be positive, got {}",
                    quantity
                )));
            }
            _ => {}
        }

        if let OrderStyle::Limit { offset_pct } = self.style {
            if !(0.0..100.0).contains(&offset_pct) {
                return Err(BotError::InvalidConfig(format!(
                    "limit offset must be in [0, 100), got {}",
                    offset_pct
                )));
            }
        }

        if self.leverage == Some(0) {
            return Err(BotError::InvalidConfig(
                "leverage must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Quantity for a new position at `last_price`
    ///
    /// Precision and lot-size rounding are left to the gateway.
    pub fn quantity(&self, last_price: f64) -> f64 {
        match self.sizing {
            Sizing::FixedNotional { notional } => notional / last_price,
            Sizing::FixedQuantity { quantity } => quantity,
        }
    }

    /// Build the entry order for `side` around `last_price`
    pub fn entry_request(&self, instrument: &str, side: Side, last_price: f64) -> Result<OrderRequest> {
        if !(last_price.is_finite() && last_price > 0.0) {
            return Err(BotError::price_unavailable(
                instrument,
                format!("cannot size an order at price {}", last_price),
            ));
        }

        let (kind, price) = match self.style {
            OrderStyle::Market => (OrderKind::Market, None),
            OrderStyle::Limit { offset_pct } => {
                let offset = offset_pct / 100.0;
                let limit = match side {
                    Side::Buy => last_price * (1.0 - offset),
                    Side::Sell => last_price * (1.0 + offset),
                };
                (OrderKind::Limit, Some(limit))
            }
        };

        Ok(OrderRequest {
            instrument: instrument.to_string(),
            side,
            kind,
            quantity: self.quantity(last_price),
            price,
            leverage: self.leverage,
            reduce_only: false,
        })
    }

    /// Reduce-only market order that flattens `position`
    pub fn close_request(&self, position: &Position) -> OrderRequest {
        OrderRequest {
            instrument: position.instrument.clone(),
            side: position.side.opposite(),
            kind: OrderKind::Market,
            quantity: position.size,
            price: None,
            leverage: None,
            reduce_only: true,
        }
    }
}
