//! Composite scoring, signal evaluation, and ranking.

use std::cmp::Ordering;

use crate::models::Recommendation;

use super::indicators::{
    self, RSI_WINDOW, SUPPORT_RESISTANCE_WINDOW, Z_SCORE_WINDOW,
};
use super::normalize::EligibleInstrument;

/// Highest attainable composite score: 3 + 3 + 2 + 1 + 1 + 0.5
pub const MAX_SCORE: f64 = 10.5;

const BUY_SCORE_FLOOR: f64 = 6.0;
const BUY_MAX_RSI: f64 = 50.0;
const BUY_MAX_PE: f64 = 15.0;
const BUY_MIN_ROE: f64 = 10.0;
const SELL_MIN_RSI: f64 = 70.0;
const SELL_MIN_Z_SCORE: f64 = 2.0;
const SUPPORT_PROXIMITY: f64 = 1.05;

/// Score one instrument from its observed close series.
///
/// Returns `None` when the history is too short for the 200-observation
/// support/resistance window; the instrument is skipped, never an error.
/// Absent RSI or Z-score contribute nothing to the score and keep the
/// signals that require them false.
pub fn score_instrument(
    instrument: &EligibleInstrument,
    closes: &[f64],
) -> Option<Recommendation> {
    let current_price = *closes.last()?;
    let (support, resistance) =
        indicators::support_resistance(closes, SUPPORT_RESISTANCE_WINDOW)?;

    let rsi = indicators::rsi(closes, RSI_WINDOW);
    let z_score = indicators::z_score(closes, Z_SCORE_WINDOW);

    let features = &instrument.features;
    let mut score = instrument.pe_score + instrument.roe_score;

    score += match rsi {
        Some(r) if r < 30.0 => 2.0,
        Some(r) if r < 40.0 => 1.5,
        Some(r) if r < 50.0 => 0.5,
        _ => 0.0,
    };
    score += match z_score {
        Some(z) if z < -1.0 => 1.0,
        Some(z) if z < 0.0 => 0.5,
        _ => 0.0,
    };
    if current_price <= support * SUPPORT_PROXIMITY {
        score += 1.0;
    }
    score += instrument.div_score;

    let buy_signal = score >= BUY_SCORE_FLOOR
        && rsi.map_or(false, |r| r < BUY_MAX_RSI)
        && features.pe_ttm < BUY_MAX_PE
        && features.roe > BUY_MIN_ROE;
    let sell_signal = rsi.map_or(false, |r| r > SELL_MIN_RSI)
        && z_score.map_or(false, |z| z > SELL_MIN_Z_SCORE);

    let buy_price = support
        .max(current_price * 0.95)
        .max((support + current_price) / 2.0);
    let sell_price = resistance.min(current_price * 1.15);

    Some(Recommendation {
        ticker: features.ticker.clone(),
        current_price,
        support,
        resistance,
        buy_price,
        sell_price,
        rsi,
        z_score,
        pe_ttm: features.pe_ttm,
        roe: features.roe,
        div_yield: features.div_yield,
        buy_signal,
        sell_signal,
        score,
    })
}

/// Split the scored rows into the ranked buy and sell lists.
///
/// Buys sort by score descending, sells by RSI descending; both break
/// ties on ticker ascending so reruns are order-stable. The predicates
/// are independent: a row satisfying both lands in both lists.
pub fn partition_and_rank(
    rows: &[Recommendation],
) -> (Vec<Recommendation>, Vec<Recommendation>) {
    let mut buy_list: Vec<Recommendation> =
        rows.iter().filter(|r| r.buy_signal).cloned().collect();
    buy_list.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });

    let mut sell_list: Vec<Recommendation> =
        rows.iter().filter(|r| r.sell_signal).cloned().collect();
    sell_list.sort_by(|a, b| {
        b.rsi
            .partial_cmp(&a.rsi)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });

    (buy_list, sell_list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::FeatureRow;

    fn eligible(ticker: &str, pe: f64, roe: f64) -> EligibleInstrument {
        EligibleInstrument {
            features: FeatureRow {
                ticker: ticker.to_string(),
                mean_return: 0.001,
                volatility: 0.02,
                pe_ttm: pe,
                pb_ttm: 1.2,
                roe,
                revenue_growth_yoy: 5.0,
                div_yield: 3.0,
                debt_to_equity: 0.8,
                beta: 1.0,
                fcf_yield: 4.0,
            },
            roe_score: 1.5,
            pe_score: 1.5,
            div_score: 0.25,
        }
    }

    fn recommendation(ticker: &str, score: f64, rsi: Option<f64>) -> Recommendation {
        Recommendation {
            ticker: ticker.to_string(),
            current_price: 100.0,
            support: 95.0,
            resistance: 110.0,
            buy_price: 97.5,
            sell_price: 110.0,
            rsi,
            z_score: Some(0.0),
            pe_ttm: 10.0,
            roe: 20.0,
            div_yield: 3.0,
            buy_signal: true,
            sell_signal: rsi.map_or(false, |r| r > 70.0),
            score,
        }
    }

    #[test]
    fn test_short_history_is_skipped() {
        let closes = vec![100.0; 199];
        assert!(score_instrument(&eligible("AAA", 10.0, 20.0), &closes).is_none());
    }

    #[test]
    fn test_flat_history_scores_without_momentum_terms() {
        // 250 flat closes: RSI and Z-score undefined, price sits on support
        let closes = vec![100.0; 250];
        let row = score_instrument(&eligible("AAA", 10.0, 20.0), &closes).unwrap();

        assert_eq!(row.rsi, None);
        assert_eq!(row.z_score, None);
        assert_eq!(row.support, 100.0);
        assert_eq!(row.resistance, 100.0);
        // 1.5 + 1.5 + 0 + 0 + 1.0 + 0.25
        assert!((row.score - 4.25).abs() < 1e-9);
        // High enough fundamentals, but absent RSI vetoes the buy signal
        assert!(!row.buy_signal);
        assert!(!row.sell_signal);
    }

    #[test]
    fn test_declining_history_triggers_buy() {
        // 200 strictly declining closes ending on the trailing minimum
        let closes: Vec<f64> = (0..200).map(|i| 299.0 - i as f64).collect();
        let row = score_instrument(&eligible("BBB", 8.0, 15.0), &closes).unwrap();

        assert_eq!(row.current_price, 100.0);
        assert_eq!(row.support, 100.0);
        assert_eq!(row.resistance, 299.0);
        assert!(row.rsi.unwrap() < 30.0);
        assert!(row.z_score.unwrap() < -1.0);
        // 1.5 + 1.5 + 2.0 + 1.0 + 1.0 + 0.25
        assert!((row.score - 7.25).abs() < 1e-9);
        assert!(row.score >= 6.0);
        assert!(row.buy_signal);
        assert!(!row.sell_signal);
    }

    #[test]
    fn test_score_never_exceeds_maximum() {
        let mut strong = eligible("TOP", 8.0, 15.0);
        strong.roe_score = 3.0;
        strong.pe_score = 3.0;
        strong.div_score = 0.5;

        let closes: Vec<f64> = (0..200).map(|i| 299.0 - i as f64).collect();
        let row = score_instrument(&strong, &closes).unwrap();
        assert!(row.score <= MAX_SCORE);
        assert!((row.score - MAX_SCORE).abs() < 1e-9);
    }

    #[test]
    fn test_trade_price_suggestions() {
        let closes: Vec<f64> = (0..200).map(|i| 299.0 - i as f64).collect();
        let row = score_instrument(&eligible("BBB", 8.0, 15.0), &closes).unwrap();

        // max(support, 0.95 * price, midpoint of support and price)
        assert_eq!(row.buy_price, 100.0);
        // min(resistance, 1.15 * price)
        assert!((row.sell_price - 115.0).abs() < 1e-9);
    }

    #[test]
    fn test_buy_list_sorted_by_score_with_ticker_tie_break() {
        let rows = vec![
            recommendation("BBB", 7.0, Some(40.0)),
            recommendation("AAA", 7.0, Some(40.0)),
            recommendation("CCC", 9.0, Some(25.0)),
        ];
        let (buy_list, _) = partition_and_rank(&rows);
        let tickers: Vec<&str> = buy_list.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["CCC", "AAA", "BBB"]);
    }

    #[test]
    fn test_sell_list_sorted_by_rsi() {
        let rows = vec![
            recommendation("AAA", 5.0, Some(75.0)),
            recommendation("BBB", 5.0, Some(90.0)),
            recommendation("CCC", 5.0, Some(80.0)),
        ];
        let (_, sell_list) = partition_and_rank(&rows);
        let tickers: Vec<&str> = sell_list.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["BBB", "CCC", "AAA"]);
    }
}
