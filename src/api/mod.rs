pub mod binance;

pub use binance::BinanceFuturesClient;

use crate::models::{BarInterval, OrderHandle, OrderRequest, Position, PriceBar, PriceQuote};
use crate::Result;
use async_trait::async_trait;

/// Read side of the exchange: bars and last traded price
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most recent `count` bars, oldest first. The last bar may still be forming.
    ///
    /// Fails with `DataUnavailable` on network/API errors.
    async fn fetch_bars(
        &self,
        instrument: &str,
        interval: BarInterval,
        count: usize,
    ) -> Result<Vec<PriceBar>>;

    /// Fails with `PriceUnavailable` if the price is missing or non-numeric
    async fn fetch_last_price(&self, instrument: &str) -> Result<PriceQuote>;
}

/// Full exchange capability the reconciler drives
#[async_trait]
pub trait ExchangeGateway: MarketData {
    /// Fails with `OrderRejected` carrying the gateway's reason
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderHandle>;

    /// Idempotent: cancelling a filled or already cancelled order is a no-op
    async fn cancel_order(&self, handle: &OrderHandle) -> Result<()>;

    async fn fetch_position(&self, instrument: &str) -> Result<Option<Position>>;
}
