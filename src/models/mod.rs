use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Exchange-listed share as reported by the broker's instrument directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    pub name: String,
    pub figi: String,
    pub asset_uid: String,
}

/// One daily closing-price observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: f64,
}

/// Closing prices aligned on the sorted union of observation dates, one
/// column per ticker. Missing cells are explicit: a ticker that did not
/// trade on a date carries `None` there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl PriceTable {
    /// Build the table from per-ticker bar series (any date coverage).
    pub fn from_series(series: BTreeMap<String, Vec<PriceBar>>) -> Self {
        let mut dates: Vec<NaiveDate> = series
            .values()
            .flat_map(|bars| bars.iter().map(|bar| bar.date))
            .collect();
        dates.sort_unstable();
        dates.dedup();

        let index: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut columns = BTreeMap::new();
        for (ticker, bars) in series {
            let mut column = vec![None; dates.len()];
            for bar in bars {
                column[index[&bar.date]] = Some(bar.close);
            }
            columns.insert(ticker, column);
        }

        Self { dates, columns }
    }

    /// Build the table from an already-aligned date index and columns.
    /// Columns shorter or longer than the index are truncated/padded.
    pub fn from_columns(
        dates: Vec<NaiveDate>,
        columns: BTreeMap<String, Vec<Option<f64>>>,
    ) -> Self {
        let len = dates.len();
        let columns = columns
            .into_iter()
            .map(|(ticker, mut column)| {
                column.resize(len, None);
                (ticker, column)
            })
            .collect();
        Self { dates, columns }
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.columns.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Tickers in deterministic (lexicographic) order.
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|t| t.as_str())
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.columns.contains_key(ticker)
    }

    pub fn column(&self, ticker: &str) -> Option<&[Option<f64>]> {
        self.columns.get(ticker).map(|c| c.as_slice())
    }

    /// The column with interior gaps forward-filled. Cells before the
    /// ticker's first observation stay missing.
    pub fn forward_filled(&self, ticker: &str) -> Option<Vec<Option<f64>>> {
        let column = self.columns.get(ticker)?;
        let mut filled = Vec::with_capacity(column.len());
        let mut last = None;
        for cell in column {
            if cell.is_some() {
                last = *cell;
            }
            filled.push(last);
        }
        Some(filled)
    }

    /// The ticker's observed closes in date order, gaps dropped.
    pub fn observed(&self, ticker: &str) -> Vec<f64> {
        self.columns
            .get(ticker)
            .map(|column| column.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Close on the table's final date, if the ticker traded that day.
    /// Delisted instruments have no close there and return `None`.
    pub fn close_on_last_date(&self, ticker: &str) -> Option<f64> {
        self.columns.get(ticker)?.last().copied().flatten()
    }
}

/// Fundamental ratios reported per asset. Every field is optional at the
/// edge: the broker omits metrics it cannot compute, and cache parsing
/// treats unreadable cells as missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalRatios {
    pub pe_ttm: Option<f64>,
    pub pb_ttm: Option<f64>,
    pub roe: Option<f64>,
    pub revenue_growth_yoy: Option<f64>,
    pub div_yield: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub beta: Option<f64>,
    pub fcf_yield: Option<f64>,
}

/// Ticker-keyed fundamentals, deterministically ordered.
pub type FundamentalsTable = BTreeMap<String, FundamentalRatios>;

/// Scored output row for one instrument, produced by the analysis engine
/// and consumed by the report printer and the position ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub ticker: String,
    pub current_price: f64,
    pub support: f64,
    pub resistance: f64,
    pub buy_price: f64,
    pub sell_price: f64,
    pub rsi: Option<f64>,
    pub z_score: Option<f64>,
    pub pe_ttm: f64,
    pub roe: f64,
    pub div_yield: f64,
    pub buy_signal: bool,
    pub sell_signal: bool,
    pub score: f64,
}

/// Direction of a tracked recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "Buy"),
            Signal::Sell => write!(f, "Sell"),
        }
    }
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: String,
    pub api_base_url: String,
    pub data_dir: String,
    pub ledger_dir: String,
    pub rate_limit_per_minute: u32,
    pub history_days: i64,
    pub fetch_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Ok(Config {
            api_token: std::env::var("INVEST_API_TOKEN")
                .map_err(|_| anyhow::anyhow!("INVEST_API_TOKEN environment variable required"))?,
            api_base_url: std::env::var("INVEST_API_BASE_URL")
                .unwrap_or_else(|_| "https://invest-public-api.tbank.ru/rest".to_string()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            ledger_dir: std::env::var("LEDGER_DIR").unwrap_or_else(|_| "data".to_string()),
            rate_limit_per_minute: std::env::var("RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
            history_days: std::env::var("HISTORY_DAYS")
                .unwrap_or_else(|_| format!("{}", 365 * 5))
                .parse()
                .unwrap_or(365 * 5),
            fetch_concurrency: std::env::var("FETCH_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .unwrap_or(8),
        })
    }
}
