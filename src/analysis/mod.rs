//! Scoring and recommendation engine.
//!
//! Turns an in-memory price table and fundamentals table into ranked buy
//! and sell lists. The whole pipeline is pure and deterministic: no I/O,
//! no clocks, no randomness, and instruments are processed in ticker
//! order so identical inputs produce identical output.

pub mod features;
pub mod indicators;
pub mod normalize;
pub mod scorer;

pub use features::{FeatureRow, ScreeningCriteria};
pub use normalize::EligibleInstrument;

use tracing::{debug, info};

use crate::models::{FundamentalsTable, PriceTable, Recommendation};

/// The analysis pipeline over one snapshot of market data.
///
/// Construction runs the cross-sectional stages (features, screens,
/// outlier removal, normalization); [`AnalysisEngine::recommendations`]
/// runs the per-instrument stages and ranking.
pub struct AnalysisEngine {
    prices: PriceTable,
    criteria: ScreeningCriteria,
    eligible: Vec<EligibleInstrument>,
}

impl AnalysisEngine {
    pub fn new(prices: PriceTable, fundamentals: &FundamentalsTable) -> Self {
        Self::with_criteria(prices, fundamentals, ScreeningCriteria::default())
    }

    pub fn with_criteria(
        prices: PriceTable,
        fundamentals: &FundamentalsTable,
        criteria: ScreeningCriteria,
    ) -> Self {
        let rows = features::build_features(&prices, fundamentals);
        debug!("{} tickers with complete features", rows.len());

        let rows = features::apply_screens(rows, &criteria);
        // Outlier passes are sequential, ROE first: each pass takes its
        // quartiles from the previous pass's survivors.
        let rows = features::remove_outliers_iqr(rows, criteria.iqr_factor, |r| r.roe);
        let rows = features::remove_outliers_iqr(rows, criteria.iqr_factor, |r| r.pe_ttm);
        let rows = features::apply_liquidity_screen(rows, &prices, criteria.min_price);

        let eligible = normalize::normalize_factors(rows);
        info!("📊 {} instruments eligible for scoring", eligible.len());

        Self { prices, criteria, eligible }
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    pub fn eligible(&self) -> &[EligibleInstrument] {
        &self.eligible
    }

    /// Score every eligible instrument with enough history and partition
    /// the results into the ranked buy and sell lists. An empty eligible
    /// set yields two empty lists, not an error.
    pub fn recommendations(&self) -> (Vec<Recommendation>, Vec<Recommendation>) {
        let mut scored = Vec::new();

        for instrument in &self.eligible {
            let ticker = &instrument.features.ticker;
            let closes = self.prices.observed(ticker);
            if closes.len() < self.criteria.min_history {
                debug!(
                    "skipping {}: {} observations, need {}",
                    ticker,
                    closes.len(),
                    self.criteria.min_history
                );
                continue;
            }

            if let Some(row) = scorer::score_instrument(instrument, &closes) {
                scored.push(row);
            }
        }

        scorer::partition_and_rank(&scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FundamentalRatios, PriceBar};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn bars(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| PriceBar {
                date: start + chrono::Duration::days(i as i64),
                close: *close,
            })
            .collect()
    }

    fn ratios(pe: f64, roe: f64, div_yield: f64) -> FundamentalRatios {
        FundamentalRatios {
            pe_ttm: Some(pe),
            pb_ttm: Some(1.2),
            roe: Some(roe),
            revenue_growth_yoy: Some(5.0),
            div_yield: Some(div_yield),
            debt_to_equity: Some(0.8),
            beta: Some(1.0),
            fcf_yield: Some(4.0),
        }
    }

    /// Gently oscillating series: stays eligible, keeps RSI defined.
    fn wavy(base: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| base * (1.0 + 0.01 * ((i % 5) as f64 - 2.0)))
            .collect()
    }

    fn engine_fixture() -> AnalysisEngine {
        let mut series = BTreeMap::new();
        series.insert("AAA".to_string(), bars(&wavy(100.0, 250)));
        series.insert("BBB".to_string(), bars(&wavy(50.0, 250)));
        series.insert("CCC".to_string(), bars(&wavy(200.0, 250)));

        let mut fundamentals = FundamentalsTable::new();
        fundamentals.insert("AAA".to_string(), ratios(10.0, 20.0, 3.0));
        fundamentals.insert("BBB".to_string(), ratios(8.0, 15.0, 5.0));
        fundamentals.insert("CCC".to_string(), ratios(12.0, 25.0, 1.0));

        AnalysisEngine::new(PriceTable::from_series(series), &fundamentals)
    }

    #[test]
    fn test_missing_fundamentals_excluded() {
        let mut series = BTreeMap::new();
        series.insert("AAA".to_string(), bars(&wavy(100.0, 250)));
        series.insert("NOFUND".to_string(), bars(&wavy(50.0, 250)));

        let mut fundamentals = FundamentalsTable::new();
        fundamentals.insert("AAA".to_string(), ratios(10.0, 20.0, 3.0));

        let engine = AnalysisEngine::new(PriceTable::from_series(series), &fundamentals);
        let tickers: Vec<&str> = engine
            .eligible()
            .iter()
            .map(|i| i.features.ticker.as_str())
            .collect();
        assert_eq!(tickers, vec!["AAA"]);
    }

    #[test]
    fn test_short_history_skipped_but_others_scored() {
        // YOUNG lists late: it trades through the final date but has only
        // 150 observations, short of the 200 the indicators need.
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let young_bars: Vec<PriceBar> = wavy(50.0, 150)
            .into_iter()
            .enumerate()
            .map(|(i, close)| PriceBar {
                date: start + chrono::Duration::days(100 + i as i64),
                close,
            })
            .collect();

        let mut series = BTreeMap::new();
        series.insert("AAA".to_string(), bars(&wavy(100.0, 250)));
        series.insert("YOUNG".to_string(), young_bars);

        let mut fundamentals = FundamentalsTable::new();
        fundamentals.insert("AAA".to_string(), ratios(10.0, 20.0, 3.0));
        fundamentals.insert("YOUNG".to_string(), ratios(8.0, 15.0, 2.0));

        let engine = AnalysisEngine::new(PriceTable::from_series(series), &fundamentals);
        // YOUNG survives every cross-sectional screen...
        assert!(engine
            .eligible()
            .iter()
            .any(|inst| inst.features.ticker == "YOUNG"));

        // ...but is skipped at scoring time for lack of history
        let (buy_list, sell_list) = engine.recommendations();
        for row in buy_list.iter().chain(sell_list.iter()) {
            assert_ne!(row.ticker, "YOUNG");
        }
    }

    #[test]
    fn test_empty_inputs_yield_empty_lists() {
        let engine =
            AnalysisEngine::new(PriceTable::default(), &FundamentalsTable::new());
        let (buy_list, sell_list) = engine.recommendations();
        assert!(buy_list.is_empty());
        assert!(sell_list.is_empty());
    }

    #[test]
    fn test_reruns_are_identical() {
        let engine = engine_fixture();
        let first = engine.recommendations();
        let second = engine.recommendations();
        assert_eq!(first, second);
    }

    #[test]
    fn test_lists_satisfy_their_predicates() {
        let engine = engine_fixture();
        let (buy_list, sell_list) = engine.recommendations();

        for row in &buy_list {
            assert!(row.buy_signal);
            assert!(row.score >= 6.0);
            assert!(row.rsi.unwrap() < 50.0);
            assert!(row.pe_ttm < 15.0);
            assert!(row.roe > 10.0);
        }
        for row in &sell_list {
            assert!(row.sell_signal);
            assert!(row.rsi.unwrap() > 70.0);
            assert!(row.z_score.unwrap() > 2.0);
        }
    }

    #[test]
    fn test_scores_within_bounds() {
        let engine = engine_fixture();
        for inst in engine.eligible() {
            assert!((0.0..=3.0).contains(&inst.roe_score));
            assert!((0.0..=3.0).contains(&inst.pe_score));
            assert!((0.0..=0.5).contains(&inst.div_score));
        }
        let (buy_list, sell_list) = engine.recommendations();
        for row in buy_list.iter().chain(sell_list.iter()) {
            assert!((0.0..=scorer::MAX_SCORE).contains(&row.score));
        }
    }
}
