//! Factor normalization onto bounded score ranges.
//!
//! Scales are recomputed over each run's surviving population, so scores
//! are relative to that run, not comparable across runs.

use super::features::FeatureRow;

const ROE_SCORE_MAX: f64 = 3.0;
const PE_SCORE_MAX: f64 = 3.0;
const DIV_SCORE_MAX: f64 = 0.5;
const DIV_YIELD_CLAMP: (f64, f64) = (0.0, 15.0);

/// Feature row that passed every screen, carrying its normalized factor
/// scores. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibleInstrument {
    pub features: FeatureRow,
    /// Profitability score in [0, 3]
    pub roe_score: f64,
    /// Valuation score in [0, 3]; lower P/E scores higher
    pub pe_score: f64,
    /// Yield score in [0, 0.5]
    pub div_score: f64,
}

/// Attach normalized factor scores to the eligible rows.
///
/// Dividend yield is clamped to its screen range before scaling. P/E is
/// scaled and then inverted, so the cheapest instrument lands at 3.
pub fn normalize_factors(rows: Vec<FeatureRow>) -> Vec<EligibleInstrument> {
    let roe_scores = min_max_scale(
        &rows.iter().map(|r| r.roe).collect::<Vec<_>>(),
        0.0,
        ROE_SCORE_MAX,
    );
    let div_scores = min_max_scale(
        &rows
            .iter()
            .map(|r| r.div_yield.clamp(DIV_YIELD_CLAMP.0, DIV_YIELD_CLAMP.1))
            .collect::<Vec<_>>(),
        0.0,
        DIV_SCORE_MAX,
    );
    let pe_scaled = min_max_scale(
        &rows.iter().map(|r| r.pe_ttm).collect::<Vec<_>>(),
        0.0,
        PE_SCORE_MAX,
    );

    rows.into_iter()
        .enumerate()
        .map(|(i, features)| EligibleInstrument {
            features,
            roe_score: roe_scores[i],
            pe_score: PE_SCORE_MAX - pe_scaled[i],
            div_score: div_scores[i],
        })
        .collect()
}

/// Linear min-max rescaling onto [lo, hi]. A zero-range input has no
/// defined scale; every value then maps to the midpoint of the target
/// range instead of dividing by zero.
pub fn min_max_scale(values: &[f64], lo: f64, hi: f64) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if range == 0.0 {
        return vec![(lo + hi) / 2.0; values.len()];
    }

    values
        .iter()
        .map(|value| lo + (value - min) / range * (hi - lo))
        .collect()
}
