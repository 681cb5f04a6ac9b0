//! Tracked-position ledger.
//!
//! Two CSV sheets: open recommendations keyed by ticker, and a trade
//! history of closed signals. Each screening run's buy/sell lists are
//! reconciled against the open sheet; a ticker whose signal flips moves
//! to history with its result percentage and days held.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{PriceTable, Recommendation, Signal};

pub const POSITIONS_FILE: &str = "ledger_positions.csv";
pub const HISTORY_FILE: &str = "ledger_history.csv";

/// Row of the open-recommendations sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub ticker: String,
    pub signal: Signal,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub last_price: f64,
    pub last_date: NaiveDate,
    pub change_pct: f64,
}

/// Row of the trade-history sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub ticker: String,
    pub signal: Signal,
    pub exit_price: f64,
    pub result_pct: f64,
    pub days_held: i64,
}

/// The two-sheet ledger, loaded into memory for reconciliation
pub struct PositionLedger {
    dir: PathBuf,
    positions: Vec<OpenPosition>,
    history: Vec<ClosedTrade>,
}

impl PositionLedger {
    /// Load both sheets from `dir`; absent files mean an empty ledger
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let positions = read_sheet(&dir.join(POSITIONS_FILE))?;
        let history = read_sheet(&dir.join(HISTORY_FILE))?;
        Ok(Self { dir, positions, history })
    }

    pub fn positions(&self) -> &[OpenPosition] {
        &self.positions
    }

    pub fn history(&self) -> &[ClosedTrade] {
        &self.history
    }

    /// Merge this run's signals into the open sheet.
    ///
    /// Tracked tickers without a new signal get their last price and
    /// change refreshed from the price table. New signals update a
    /// matching open position in place, flip an opposing one into the
    /// history sheet, or open a fresh position. Buys apply before sells,
    /// each in ranked order, so reruns reconcile identically.
    pub fn reconcile(
        &mut self,
        buy_list: &[Recommendation],
        sell_list: &[Recommendation],
        prices: &PriceTable,
        today: NaiveDate,
    ) {
        let signals: Vec<(String, Signal, f64)> = buy_list
            .iter()
            .map(|row| (row.ticker.clone(), Signal::Buy, row.current_price))
            .chain(
                sell_list
                    .iter()
                    .map(|row| (row.ticker.clone(), Signal::Sell, row.current_price)),
            )
            .collect();

        let signalled: HashSet<String> =
            signals.iter().map(|(ticker, _, _)| ticker.clone()).collect();

        // Idle positions still track the market
        for position in &mut self.positions {
            if signalled.contains(&position.ticker) {
                continue;
            }
            if let Some(close) = prices.close_on_last_date(&position.ticker) {
                position.last_price = close;
                if let Some(date) = prices.last_date() {
                    position.last_date = date;
                }
                position.change_pct = percent_change(position.entry_price, close);
            }
        }

        for (ticker, signal, price) in signals {
            match self.positions.iter().position(|p| p.ticker == ticker) {
                Some(index) if self.positions[index].signal == signal => {
                    let position = &mut self.positions[index];
                    position.last_price = price;
                    position.last_date = today;
                    position.change_pct = percent_change(position.entry_price, price);
                }
                Some(index) => {
                    // The signal flipped: close the position out
                    let position = self.positions.remove(index);
                    self.history.push(ClosedTrade {
                        ticker: position.ticker,
                        signal: position.signal,
                        exit_price: price,
                        result_pct: percent_change(position.entry_price, price),
                        days_held: (today - position.entry_date).num_days(),
                    });
                }
                None => {
                    self.positions.push(OpenPosition {
                        ticker,
                        signal,
                        entry_price: price,
                        entry_date: today,
                        last_price: price,
                        last_date: today,
                        change_pct: 0.0,
                    });
                }
            }
        }
    }

    /// Write both sheets back to disk
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating ledger directory {}", self.dir.display()))?;
        write_sheet(&self.dir.join(POSITIONS_FILE), &self.positions)?;
        write_sheet(&self.dir.join(HISTORY_FILE), &self.history)?;
        info!(
            "💾 Ledger saved: {} open positions, {} closed trades",
            self.positions.len(),
            self.history.len()
        );
        Ok(())
    }
}

/// Percent change from entry to current, rounded to one decimal place
fn percent_change(entry: f64, current: f64) -> f64 {
    ((current - entry) / entry * 100.0 * 10.0).round() / 10.0
}

fn read_sheet<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.with_context(|| format!("reading ledger sheet {}", path.display()))?);
    }
    Ok(rows)
}

fn write_sheet<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceBar;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn recommendation(ticker: &str, price: f64, buy: bool) -> Recommendation {
        Recommendation {
            ticker: ticker.to_string(),
            current_price: price,
            support: price * 0.9,
            resistance: price * 1.2,
            buy_price: price * 0.95,
            sell_price: price * 1.15,
            rsi: Some(if buy { 28.0 } else { 75.0 }),
            z_score: Some(if buy { -1.2 } else { 2.4 }),
            pe_ttm: 8.0,
            roe: 15.0,
            div_yield: 4.0,
            buy_signal: buy,
            sell_signal: !buy,
            score: if buy { 7.0 } else { 3.0 },
        }
    }

    fn prices_with(ticker: &str, closes: &[f64]) -> PriceTable {
        let mut series = BTreeMap::new();
        series.insert(
            ticker.to_string(),
            closes
                .iter()
                .enumerate()
                .map(|(i, close)| PriceBar { date: date(i as u32 + 1), close: *close })
                .collect(),
        );
        PriceTable::from_series(series)
    }

    #[test]
    fn test_new_signal_opens_position() {
        let dir = tempdir().unwrap();
        let mut ledger = PositionLedger::load(dir.path()).unwrap();

        let buys = vec![recommendation("GAZP", 160.0, true)];
        ledger.reconcile(&buys, &[], &prices_with("GAZP", &[150.0, 160.0]), date(10));

        assert_eq!(ledger.positions().len(), 1);
        let position = &ledger.positions()[0];
        assert_eq!(position.ticker, "GAZP");
        assert_eq!(position.signal, Signal::Buy);
        assert_eq!(position.entry_price, 160.0);
        assert_eq!(position.entry_date, date(10));
        assert_eq!(position.change_pct, 0.0);
        assert!(ledger.history().is_empty());
    }

    #[test]
    fn test_repeated_signal_updates_in_place() {
        let dir = tempdir().unwrap();
        let mut ledger = PositionLedger::load(dir.path()).unwrap();

        ledger.reconcile(
            &[recommendation("GAZP", 160.0, true)],
            &[],
            &prices_with("GAZP", &[160.0]),
            date(10),
        );
        ledger.reconcile(
            &[recommendation("GAZP", 168.0, true)],
            &[],
            &prices_with("GAZP", &[168.0]),
            date(15),
        );

        assert_eq!(ledger.positions().len(), 1);
        let position = &ledger.positions()[0];
        assert_eq!(position.entry_price, 160.0); // entry unchanged
        assert_eq!(position.entry_date, date(10));
        assert_eq!(position.last_price, 168.0);
        assert_eq!(position.last_date, date(15));
        assert_eq!(position.change_pct, 5.0);
        assert!(ledger.history().is_empty());
    }

    #[test]
    fn test_flipped_signal_moves_to_history() {
        let dir = tempdir().unwrap();
        let mut ledger = PositionLedger::load(dir.path()).unwrap();

        ledger.reconcile(
            &[recommendation("GAZP", 160.0, true)],
            &[],
            &prices_with("GAZP", &[160.0]),
            date(1),
        );
        ledger.reconcile(
            &[],
            &[recommendation("GAZP", 184.0, false)],
            &prices_with("GAZP", &[184.0]),
            date(21),
        );

        assert!(ledger.positions().is_empty());
        assert_eq!(ledger.history().len(), 1);
        let trade = &ledger.history()[0];
        assert_eq!(trade.signal, Signal::Buy); // the signal that was held
        assert_eq!(trade.exit_price, 184.0);
        assert_eq!(trade.result_pct, 15.0);
        assert_eq!(trade.days_held, 20);
    }

    #[test]
    fn test_idle_position_tracks_market_price() {
        let dir = tempdir().unwrap();
        let mut ledger = PositionLedger::load(dir.path()).unwrap();

        ledger.reconcile(
            &[recommendation("GAZP", 160.0, true)],
            &[],
            &prices_with("GAZP", &[160.0]),
            date(1),
        );
        // Next run produces no signal for GAZP at all
        ledger.reconcile(&[], &[], &prices_with("GAZP", &[160.0, 152.0]), date(5));

        let position = &ledger.positions()[0];
        assert_eq!(position.last_price, 152.0);
        assert_eq!(position.change_pct, -5.0);
        assert_eq!(position.entry_price, 160.0);
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempdir().unwrap();

        {
            let mut ledger = PositionLedger::load(dir.path()).unwrap();
            ledger.reconcile(
                &[recommendation("GAZP", 160.0, true)],
                &[recommendation("LKOH", 7000.0, false)],
                &prices_with("GAZP", &[160.0]),
                date(1),
            );
            ledger.save().unwrap();
        }

        let reloaded = PositionLedger::load(dir.path()).unwrap();
        assert_eq!(reloaded.positions().len(), 2);
        assert!(reloaded.history().is_empty());
        let tickers: Vec<&str> =
            reloaded.positions().iter().map(|p| p.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["GAZP", "LKOH"]);
    }
}
