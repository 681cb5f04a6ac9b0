use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

use crate::models::{FundamentalRatios, Instrument, PriceBar};

pub mod invest_client;
pub use invest_client::InvestApiClient;

/// Simple rate limiter for API requests
pub struct ApiRateLimiter {
    delay_ms: u64,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let delay_ms = if requests_per_minute > 0 {
            60_000 / requests_per_minute as u64
        } else {
            1000 // Default 1 second delay
        };

        Self { delay_ms }
    }

    pub async fn wait(&self) {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
    }
}

/// Capability the screening pipeline needs from a market-data backend.
/// The analysis engine never sees this trait; only the data collector
/// does, so any broker with candles and fundamentals can slot in.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Shares tradable on the main board, qualified-investor-only issues
    /// excluded.
    async fn list_instruments(&self) -> Result<Vec<Instrument>>;

    /// Daily closing candles for one instrument over the date range,
    /// oldest first.
    async fn get_candles(
        &self,
        instrument: &Instrument,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceBar>>;

    /// Fundamental ratios for one instrument's underlying asset. `None`
    /// when the broker has no report for it.
    async fn get_fundamentals(&self, instrument: &Instrument)
        -> Result<Option<FundamentalRatios>>;
}
