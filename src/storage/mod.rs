//! CSV-backed cache for candles and fundamentals.
//!
//! The candle file is a wide table: a `date` column plus one column per
//! ticker, empty cells where an instrument did not trade. The
//! fundamentals file is one row per ticker. Numeric cells that fail to
//! parse load as missing values, never as errors, so a damaged cell
//! costs one instrument instead of the whole run.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::models::{FundamentalRatios, FundamentalsTable, PriceTable};

pub const CANDLES_FILE: &str = "candles.csv";
pub const FUNDAMENTALS_FILE: &str = "fundamentals.csv";

const FUNDAMENTALS_HEADER: [&str; 9] = [
    "ticker",
    "pe_ttm",
    "pb_ttm",
    "roe",
    "revenue_growth_yoy",
    "div_yield",
    "debt_to_equity",
    "beta",
    "fcf_yield",
];

/// File-system cache rooted at the data directory
pub struct DataStore {
    data_dir: PathBuf,
}

impl DataStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    pub fn candles_path(&self) -> PathBuf {
        self.data_dir.join(CANDLES_FILE)
    }

    pub fn fundamentals_path(&self) -> PathBuf {
        self.data_dir.join(FUNDAMENTALS_FILE)
    }

    pub fn has_candles(&self) -> bool {
        self.candles_path().exists()
    }

    /// Write the wide candle table, one row per date
    pub fn save_price_table(&self, table: &PriceTable) -> Result<()> {
        let path = self.candles_path();
        let mut writer = WriterBuilder::new().from_path(&path)?;

        let tickers: Vec<&str> = table.tickers().collect();
        let mut header = vec!["date"];
        header.extend(&tickers);
        writer.write_record(&header)?;

        let columns: Vec<&[Option<f64>]> =
            tickers.iter().map(|t| table.column(t).unwrap()).collect();
        for (row, date) in table.dates().iter().enumerate() {
            let mut record = StringRecord::new();
            record.push_field(&date.to_string());
            for column in &columns {
                match column[row] {
                    Some(close) => record.push_field(&close.to_string()),
                    None => record.push_field(""),
                }
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        info!("💾 Saved {} candle dates to {}", table.dates().len(), path.display());
        Ok(())
    }

    /// Load the wide candle table written by [`DataStore::save_price_table`]
    pub fn load_price_table(&self) -> Result<PriceTable> {
        let path = self.candles_path();
        if !path.exists() {
            return Err(anyhow!("Candle file not found: {}", path.display()));
        }

        let mut reader = ReaderBuilder::new().has_headers(true).from_path(&path)?;
        let tickers: Vec<String> = reader
            .headers()?
            .iter()
            .skip(1)
            .map(|t| t.to_string())
            .collect();

        let mut dates = Vec::new();
        let mut columns: BTreeMap<String, Vec<Option<f64>>> = tickers
            .iter()
            .map(|ticker| (ticker.clone(), Vec::new()))
            .collect();

        for record in reader.records() {
            let record = record?;
            let date_field = record
                .get(0)
                .ok_or_else(|| anyhow!("candle row without a date column"))?;
            let date = NaiveDate::parse_from_str(date_field, "%Y-%m-%d")
                .with_context(|| format!("unparseable candle date: {date_field}"))?;
            dates.push(date);

            for (i, ticker) in tickers.iter().enumerate() {
                // Unreadable or empty cells become missing observations
                let close = record.get(i + 1).and_then(|cell| cell.parse::<f64>().ok());
                columns.get_mut(ticker).unwrap().push(close);
            }
        }

        Ok(PriceTable::from_columns(dates, columns))
    }

    /// Write the fundamentals table, one row per ticker
    pub fn save_fundamentals(&self, table: &FundamentalsTable) -> Result<()> {
        let path = self.fundamentals_path();
        let mut writer = WriterBuilder::new().from_path(&path)?;
        writer.write_record(FUNDAMENTALS_HEADER)?;

        for (ticker, ratios) in table {
            let fields = [
                ratios.pe_ttm,
                ratios.pb_ttm,
                ratios.roe,
                ratios.revenue_growth_yoy,
                ratios.div_yield,
                ratios.debt_to_equity,
                ratios.beta,
                ratios.fcf_yield,
            ];
            let mut record = StringRecord::new();
            record.push_field(ticker);
            for field in fields {
                match field {
                    Some(value) => record.push_field(&value.to_string()),
                    None => record.push_field(""),
                }
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        info!("💾 Saved fundamentals for {} tickers to {}", table.len(), path.display());
        Ok(())
    }

    /// Load the fundamentals table written by [`DataStore::save_fundamentals`]
    pub fn load_fundamentals(&self) -> Result<FundamentalsTable> {
        let path = self.fundamentals_path();
        if !path.exists() {
            return Err(anyhow!("Fundamentals file not found: {}", path.display()));
        }

        let mut reader = ReaderBuilder::new().has_headers(true).from_path(&path)?;
        let mut table = FundamentalsTable::new();

        for record in reader.records() {
            let record = record?;
            let ticker = match record.get(0) {
                Some(ticker) if !ticker.is_empty() => ticker.to_string(),
                _ => continue,
            };
            let cell = |i: usize| record.get(i).and_then(|c| c.parse::<f64>().ok());

            table.insert(
                ticker,
                FundamentalRatios {
                    pe_ttm: cell(1),
                    pb_ttm: cell(2),
                    roe: cell(3),
                    revenue_growth_yoy: cell(4),
                    div_yield: cell(5),
                    debt_to_equity: cell(6),
                    beta: cell(7),
                    fcf_yield: cell(8),
                },
            );
        }

        Ok(table)
    }
}
