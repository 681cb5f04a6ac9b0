//! Market data refresh orchestration.
//!
//! Pulls the instrument directory, five years of daily candles per
//! instrument, and the fundamentals snapshot through the injected
//! provider, then hands the assembled tables to the CSV store. One
//! instrument's failure is logged and skipped; it never aborts the run.

use anyhow::Result;
use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::api::MarketDataProvider;
use crate::models::{Config, FundamentalsTable, Instrument, PriceBar, PriceTable};
use crate::storage::DataStore;

/// How old the latest cached candle may be before a refresh is needed
const MAX_CACHE_AGE_DAYS: i64 = 1;

/// Outcome of one refresh run
#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub instruments: usize,
    pub candle_series: usize,
    pub fundamentals: usize,
    pub failed: usize,
}

/// Data collection system for fetching and caching market data
pub struct DataCollector {
    provider: Arc<dyn MarketDataProvider>,
    store: DataStore,
    config: Config,
    concurrency_semaphore: Arc<Semaphore>,
}

impl DataCollector {
    /// Create a new data collector
    pub fn new(provider: Arc<dyn MarketDataProvider>, store: DataStore, config: Config) -> Self {
        let max_concurrent = config.fetch_concurrency.max(1);

        Self {
            provider,
            store,
            config,
            concurrency_semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// True when the cached candle table already extends to within one
    /// day of today and needs no refresh.
    pub fn cache_is_fresh(&self) -> bool {
        let Ok(table) = self.store.load_price_table() else {
            return false;
        };
        table.last_date().map_or(false, |last| {
            (Utc::now().date_naive() - last).num_days() <= MAX_CACHE_AGE_DAYS
        })
    }

    /// Fetch candles and fundamentals for every main-board instrument
    /// and rewrite the cache files.
    pub async fn refresh(&self) -> Result<RefreshSummary> {
        let instruments = self.provider.list_instruments().await?;
        info!("📊 Found {} instruments on the main board", instruments.len());

        let to = Utc::now().date_naive();
        let from = to - Duration::days(self.config.history_days);

        let mut summary = RefreshSummary { instruments: instruments.len(), ..Default::default() };

        // Candle fetches run concurrently; results merge at this join
        // point in whatever order they complete, the table sorts them.
        let mut series: BTreeMap<String, Vec<PriceBar>> = BTreeMap::new();
        let mut fetches = stream::iter(instruments.iter().cloned())
            .map(|instrument| {
                let provider = Arc::clone(&self.provider);
                let semaphore = Arc::clone(&self.concurrency_semaphore);
                async move {
                    let _permit = semaphore.acquire().await.unwrap();
                    let result = provider.get_candles(&instrument, from, to).await;
                    (instrument, result)
                }
            })
            .buffer_unordered(self.config.fetch_concurrency.max(1));

        while let Some((instrument, result)) = fetches.next().await {
            match result {
                Ok(bars) if bars.is_empty() => {
                    warn!("No candles returned for {}", instrument.ticker);
                }
                Ok(bars) => {
                    series.insert(instrument.ticker.clone(), bars);
                    summary.candle_series += 1;
                }
                Err(e) => {
                    warn!("Failed to fetch candles for {}: {}", instrument.ticker, e);
                    summary.failed += 1;
                }
            }
        }
        drop(fetches);

        let table = PriceTable::from_series(series);
        self.store.save_price_table(&table)?;

        let fundamentals = self.fetch_fundamentals(&instruments).await;
        summary.fundamentals = fundamentals.len();
        self.store.save_fundamentals(&fundamentals)?;

        info!(
            "✅ Refresh complete: {} candle series, {} fundamentals, {} failed",
            summary.candle_series, summary.fundamentals, summary.failed
        );
        Ok(summary)
    }

    /// Fundamentals come one asset at a time; failures and instruments
    /// without a report are skipped.
    async fn fetch_fundamentals(&self, instruments: &[Instrument]) -> FundamentalsTable {
        let mut table = FundamentalsTable::new();

        for instrument in instruments {
            match self.provider.get_fundamentals(instrument).await {
                Ok(Some(ratios)) => {
                    table.insert(instrument.ticker.clone(), ratios);
                }
                Ok(None) => {
                    warn!("No fundamentals reported for {}", instrument.ticker);
                }
                Err(e) => {
                    warn!("Failed to fetch fundamentals for {}: {}", instrument.ticker, e);
                }
            }
        }

        table
    }
}
