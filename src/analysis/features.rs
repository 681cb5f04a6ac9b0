//! Cross-sectional feature construction and eligibility filtering.
//!
//! Builds per-ticker return statistics from the price table, joins the
//! fundamentals onto them, and whittles the population down through range
//! screens, sequential IQR outlier passes, and a liquidity screen.

use crate::models::{FundamentalsTable, PriceTable};

/// Per-ticker return statistics joined with fundamentals. Every field is
/// finite: rows with missing or infinite values never make it this far.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub ticker: String,
    pub mean_return: f64,
    pub volatility: f64,
    pub pe_ttm: f64,
    pub pb_ttm: f64,
    pub roe: f64,
    pub revenue_growth_yoy: f64,
    pub div_yield: f64,
    pub debt_to_equity: f64,
    pub beta: f64,
    pub fcf_yield: f64,
}

/// Eligibility screens applied to the merged feature table
#[derive(Debug, Clone)]
pub struct ScreeningCriteria {
    pub min_roe: f64,       // inclusive
    pub max_roe: f64,       // exclusive
    pub min_pe: f64,        // exclusive
    pub max_pe: f64,        // exclusive
    pub min_div_yield: f64, // inclusive
    pub max_div_yield: f64, // inclusive
    pub max_volatility: f64,
    pub min_price: f64,
    pub min_history: usize,
    pub iqr_factor: f64,
}

impl Default for ScreeningCriteria {
    fn default() -> Self {
        Self {
            min_roe: 3.0,
            max_roe: 50.0,
            min_pe: 0.5,
            max_pe: 30.0,
            min_div_yield: 0.0,
            max_div_yield: 15.0,
            max_volatility: 0.4,
            min_price: 0.10,
            min_history: 200,
            iqr_factor: 1.5,
        }
    }
}

/// Build the merged feature table: forward-fill each price column, compute
/// day-over-day percentage changes, drop every date row where any ticker's
/// change is missing, then join fundamentals by ticker (inner join).
///
/// Tickers missing any fundamental field, or whose statistics come out
/// non-finite, are dropped. Fewer than two usable return rows yields an
/// empty table rather than an error.
pub fn build_features(prices: &PriceTable, fundamentals: &FundamentalsTable) -> Vec<FeatureRow> {
    if prices.dates().len() < 2 {
        return Vec::new();
    }

    let tickers: Vec<&str> = prices.tickers().collect();
    let returns: Vec<Vec<Option<f64>>> = tickers
        .iter()
        .map(|ticker| daily_returns(prices, ticker))
        .collect();

    // A date row survives only when every ticker has a defined return
    // there; with forward-fill in place this trims the leading rows up
    // to the youngest listing.
    let num_rows = prices.dates().len() - 1;
    let kept_rows: Vec<usize> = (0..num_rows)
        .filter(|&row| returns.iter().all(|column| column[row].is_some()))
        .collect();
    if kept_rows.len() < 2 {
        return Vec::new();
    }

    let mut features = Vec::new();
    for (ticker, column) in tickers.iter().zip(&returns) {
        let Some(ratios) = fundamentals.get(*ticker) else {
            continue;
        };

        let values: Vec<f64> = kept_rows.iter().map(|&row| column[row].unwrap()).collect();
        let mean_return = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|v| (v - mean_return).powi(2)).sum::<f64>()
            / (values.len() as f64 - 1.0);
        let volatility = variance.sqrt();

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
        // Infinite values count as missing, and any missing field drops the row
        if fields.iter().any(|f| !f.map_or(false, f64::is_finite)) {
            continue;
        }
        if !mean_return.is_finite() || !volatility.is_finite() {
            continue;
        }

        features.push(FeatureRow {
            ticker: ticker.to_string(),
            mean_return,
            volatility,
            pe_ttm: ratios.pe_ttm.unwrap(),
            pb_ttm: ratios.pb_ttm.unwrap(),
            roe: ratios.roe.unwrap(),
            revenue_growth_yoy: ratios.revenue_growth_yoy.unwrap(),
            div_yield: ratios.div_yield.unwrap(),
            debt_to_equity: ratios.debt_to_equity.unwrap(),
            beta: ratios.beta.unwrap(),
            fcf_yield: ratios.fcf_yield.unwrap(),
        });
    }

    features
}

fn daily_returns(prices: &PriceTable, ticker: &str) -> Vec<Option<f64>> {
    let filled = prices.forward_filled(ticker).unwrap_or_default();
    filled
        .windows(2)
        .map(|pair| match (pair[0], pair[1]) {
            (Some(prev), Some(curr)) => Some((curr - prev) / prev),
            _ => None,
        })
        .collect()
}

/// Range screens: ROE in [min, max), P/E in (min, max), dividend yield in
/// [min, max], volatility below the ceiling.
pub fn apply_screens(rows: Vec<FeatureRow>, criteria: &ScreeningCriteria) -> Vec<FeatureRow> {
    rows.into_iter()
        .filter(|row| {
            row.roe >= criteria.min_roe
                && row.roe < criteria.max_roe
                && row.pe_ttm > criteria.min_pe
                && row.pe_ttm < criteria.max_pe
                && row.div_yield >= criteria.min_div_yield
                && row.div_yield <= criteria.max_div_yield
                && row.volatility < criteria.max_volatility
        })
        .collect()
}

/// Drop rows whose `field` value falls outside
/// [Q1 - factor * IQR, Q3 + factor * IQR], quartiles taken over the rows
/// as given. Passes are sequential: run once per column, each on the
/// previous pass's survivors.
pub fn remove_outliers_iqr(
    rows: Vec<FeatureRow>,
    factor: f64,
    field: fn(&FeatureRow) -> f64,
) -> Vec<FeatureRow> {
    if rows.is_empty() {
        return rows;
    }

    let mut values: Vec<f64> = rows.iter().map(field).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q1 = quantile(&values, 0.25);
    let q3 = quantile(&values, 0.75);
    let iqr = q3 - q1;
    let lower = q1 - factor * iqr;
    let upper = q3 + factor * iqr;

    rows.into_iter()
        .filter(|row| {
            let value = field(row);
            value >= lower && value <= upper
        })
        .collect()
}

/// Keep only tickers present in the price table whose close on the final
/// date exists and exceeds `min_price`. Instruments with no close on the
/// final date (delisted or suspended) are excluded.
pub fn apply_liquidity_screen(
    rows: Vec<FeatureRow>,
    prices: &PriceTable,
    min_price: f64,
) -> Vec<FeatureRow> {
    rows.into_iter()
        .filter(|row| {
            prices
                .close_on_last_date(&row.ticker)
                .map_or(false, |close| close > min_price)
        })
        .collect()
}

/// Quantile with linear interpolation between closest ranks, over an
/// ascending-sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let fraction = position - lower as f64;
    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}
