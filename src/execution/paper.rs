use crate::api::{ExchangeGateway, MarketData};
use crate::models::{
    BarInterval, OrderHandle, OrderKind, OrderRequest, Position, PriceBar, PriceQuote, Side,
};
use crate::{BotError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct PaperPosition {
    side: Side,
    entry_price: f64,
    size: f64,
}

#[derive(Debug, Clone)]
struct RestingOrder {
    handle: OrderHandle,
    request: OrderRequest,
}

#[derive(Debug, Default)]
struct PaperBook {
    positions: HashMap<String, PaperPosition>,
    resting: Vec<RestingOrder>,
    leverage: HashMap<String, u32>,
}

impl PaperBook {
    /// Apply a fill, netting against any existing position
    fn apply_fill(&mut self, instrument: &str, side: Side, quantity: f64, price: f64) {
        let remaining = match self.positions.get_mut(instrument) {
            None => quantity,
            Some(position) if position.side == side => {
                // Add to position (average entry)
                let cost = position.entry_price * position.size + price * quantity;
                position.size += quantity;
                position.entry_price = cost / position.size;
                return;
            }
            Some(position) => {
                if quantity < position.size {
                    position.size -= quantity;
                    return;
                }
                quantity - position.size
            }
        };

        self.positions.remove(instrument);
        if remaining > f64::EPSILON {
            self.positions.insert(
                instrument.to_string(),
                PaperPosition {
                    side,
                    entry_price: price,
                    size: remaining,
                },
            );
        }
    }

    /// Quantity a reduce-only order may actually fill
    fn reducible(&self, request: &OrderRequest) -> Option<f64> {
        self.positions
            .get(&request.instrument)
            .filter(|p| p.side == request.side.opposite())
            .map(|p| request.quantity.min(p.size))
    }
}

fn crosses(request: &OrderRequest, last_price: f64) -> bool {
    match (request.side, request.price) {
        (Side::Buy, Some(limit)) => last_price <= limit,
        (Side::Sell, Some(limit)) => last_price >= limit,
        (_, None) => true,
    }
}

/// Paper-trading gateway
///
/// Market data comes from a real source; orders are simulated in memory.
/// Market orders fill at the last price, limit orders rest until a later
/// last-price observation crosses them.
pub struct PaperExchange<M: MarketData> {
    market: M,
    book: Mutex<PaperBook>,
}

impl<M: MarketData> PaperExchange<M> {
    pub fn new(market: M) -> Self {
        Self {
            market,
            book: Mutex::new(PaperBook::default()),
        }
    }

    fn book(&self) -> MutexGuard<'_, PaperBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resting (unfilled) orders for an instrument
    pub fn open_orders(&self, instrument: &str) -> Vec<OrderHandle> {
        self.book()
            .resting
            .iter()
            .filter(|o| o.handle.instrument == instrument)
            .map(|o| o.handle.clone())
            .collect()
    }

    pub fn leverage(&self, instrument: &str) -> Option<u32> {
        self.book().leverage.get(instrument).copied()
    }

    /// Fill resting orders that the observed price crosses
    fn match_resting(&self, instrument: &str, last_price: f64) {
        let mut book = self.book();
        let (filled, resting): (Vec<RestingOrder>, Vec<RestingOrder>) =
            std::mem::take(&mut book.resting)
                .into_iter()
                .partition(|o| o.request.instrument == instrument && crosses(&o.request, last_price));
        book.resting = resting;

        for order in filled {
            let fill_price = order.request.price.unwrap_or(last_price);
            book.apply_fill(instrument, order.request.side, order.request.quantity, fill_price);
            tracing::info!(
                instrument = %instrument,
                "📄 Paper limit {} {:.6} filled @ {:.6} (order {})",
                order.request.side,
                order.request.quantity,
                fill_price,
                order.handle.id
            );
        }
    }
}

#[async_trait]
impl<M: MarketData> MarketData for PaperExchange<M> {
    async fn fetch_bars(
        &self,
        instrument: &str,
        interval: BarInterval,
        count: usize,
    ) -> Result<Vec<PriceBar>> {
        self.market.fetch_bars(instrument, interval, count).await
    }

    async fn fetch_last_price(&self, instrument: &str) -> Result<PriceQuote> {
        let quote = self.market.fetch_last_price(instrument).await?;
        self.match_resting(instrument, quote.price);
        Ok(quote)
    }
}

#[async_trait]
impl<M: MarketData> ExchangeGateway for PaperExchange<M> {
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderHandle> {
        let instrument = request.instrument.as_str();
        if !(request.quantity.is_finite() && request.quantity > 0.0) {
            return Err(BotError::order_rejected(
                instrument,
                format!("invalid quantity {}", request.quantity),
            ));
        }
        if request.kind == OrderKind::Limit && request.price.is_none() {
            return Err(BotError::order_rejected(instrument, "limit order without price"));
        }

        // Price first; never hold the book lock across an await
        let last_price = self
            .market
            .fetch_last_price(instrument)
            .await
            .map_err(|e| BotError::order_rejected(instrument, e))?
            .price;

        let handle = OrderHandle {
            id: Uuid::new_v4().to_string(),
            instrument: instrument.to_string(),
        };

        let mut book = self.book();
        if let Some(leverage) = request.leverage {
            book.leverage.insert(instrument.to_string(), leverage);
        }

        let quantity = if request.reduce_only {
            match book.reducible(request) {
                Some(quantity) => quantity,
                None => {
                    return Err(BotError::order_rejected(
                        instrument,
                        "ReduceOnly Order is rejected",
                    ))
                }
            }
        } else {
            request.quantity
        };

        if request.kind == OrderKind::Limit && !crosses(request, last_price) {
            book.resting.push(RestingOrder {
                handle: handle.clone(),
                request: request.clone(),
            });
            tracing::info!(
                instrument = %instrument,
                "📄 Paper limit {} {:.6} resting @ {:.6}",
                request.side,
                quantity,
                request.price.unwrap_or(last_price)
            );
        } else {
            book.apply_fill(instrument, request.side, quantity, last_price);
            tracing::info!(
                instrument = %instrument,
                "📄 Paper {} {:.6} filled @ {:.6}",
                request.side,
                quantity,
                last_price
            );
        }

        Ok(handle)
    }

    async fn cancel_order(&self, handle: &OrderHandle) -> Result<()> {
        let mut book = self.book();
        let before = book.resting.len();
        book.resting.retain(|o| o.handle != *handle);
        if book.resting.len() == before {
            tracing::debug!("Cancel of {} is a no-op (filled or unknown)", handle);
        }
        Ok(())
    }

    async fn fetch_position(&self, instrument: &str) -> Result<Option<Position>> {
        Ok(self.book().positions.get(instrument).map(|p| Position {
            instrument: instrument.to_string(),
            side: p.side,
            entry_price: p.entry_price,
            size: p.size,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// Market data source with a settable price
    struct StaticMarket {
        price: Mutex<f64>,
    }

    impl StaticMarket {
        fn new(price: f64) -> Self {
            Self {
                price: Mutex::new(price),
            }
        }
    }

    #[async_trait]
    impl MarketData for StaticMarket {
        async fn fetch_bars(&self, _: &str, _: BarInterval, _: usize) -> Result<Vec<PriceBar>> {
            Ok(Vec::new())
        }

        async fn fetch_last_price(&self, _: &str) -> Result<PriceQuote> {
            Ok(PriceQuote {
                price: *self.price.lock().unwrap(),
                timestamp: Utc::now(),
            })
        }
    }

    fn market_order(side: Side, quantity: f64) -> OrderRequest {
        OrderRequest {
            instrument: "BTCUSDT".to_string(),
            side,
            kind: OrderKind::Market,
            quantity,
            price: None,
            leverage: None,
            reduce_only: false,
        }
    }

    #[tokio::test]
    async fn test_market_order_opens_position() {
        let exchange = PaperExchange::new(StaticMarket::new(100.0));
        exchange.submit_order(&market_order(Side::Buy, 2.0)).await.unwrap();

        let position = exchange.fetch_position("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(position.side, Side::Buy);
        assert_eq!(position.size, 2.0);
        assert_eq!(position.entry_price, 100.0);
    }

    #[tokio::test]
    async fn test_adding_averages_entry() {
        let exchange = PaperExchange::new(StaticMarket::new(100.0));
        exchange.submit_order(&market_order(Side::Buy, 1.0)).await.unwrap();
        *exchange.market.price.lock().unwrap() = 200.0;
        exchange.submit_order(&market_order(Side::Buy, 1.0)).await.unwrap();

        let position = exchange.fetch_position("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(position.size, 2.0);
        assert_eq!(position.entry_price, 150.0);
    }

    #[tokio::test]
    async fn test_reduce_only_close_flattens() {
        let exchange = PaperExchange::new(StaticMarket::new(100.0));
        exchange.submit_order(&market_order(Side::Sell, 1.5)).await.unwrap();

        let mut close = market_order(Side::Buy, 5.0);
        close.reduce_only = true;
        exchange.submit_order(&close).await.unwrap();

        assert!(exchange.fetch_position("BTCUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reduce_only_without_position_is_rejected() {
        let exchange = PaperExchange::new(StaticMarket::new(100.0));
        let mut close = market_order(Side::Buy, 1.0);
        close.reduce_only = true;

        let result = exchange.submit_order(&close).await;
        assert!(matches!(result, Err(BotError::OrderRejected { .. })));
    }

    #[tokio::test]
    async fn test_limit_order_rests_then_fills_on_cross() {
        let exchange = PaperExchange::new(StaticMarket::new(100.0));
        let mut request = market_order(Side::Buy, 1.0);
        request.kind = OrderKind::Limit;
        request.price = Some(99.0);
        request.leverage = Some(3);

        let handle = exchange.submit_order(&request).await.unwrap();
        assert_eq!(exchange.open_orders("BTCUSDT"), vec![handle]);
        assert!(exchange.fetch_position("BTCUSDT").await.unwrap().is_none());
        assert_eq!(exchange.leverage("BTCUSDT"), Some(3));

        *exchange.market.price.lock().unwrap() = 98.5;
        exchange.fetch_last_price("BTCUSDT").await.unwrap();

        assert!(exchange.open_orders("BTCUSDT").is_empty());
        let position = exchange.fetch_position("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(position.entry_price, 99.0);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let exchange = PaperExchange::new(StaticMarket::new(100.0));
        let mut request = market_order(Side::Sell, 1.0);
        request.kind = OrderKind::Limit;
        request.price = Some(101.0);

        let handle = exchange.submit_order(&request).await.unwrap();
        exchange.cancel_order(&handle).await.unwrap();
        exchange.cancel_order(&handle).await.unwrap();
        assert!(exchange.open_orders("BTCUSDT").is_empty());
    }

    #[tokio::test]
    async fn test_invalid_quantity_rejected() {
        let exchange = PaperExchange::new(StaticMarket::new(100.0));
        let result = exchange.submit_order(&market_order(Side::Buy, f64::NAN)).await;
        assert!(matches!(result, Err(BotError::OrderRejected { .. })));
    }
}
