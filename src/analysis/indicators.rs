//! Technical indicators over a single instrument's observed close series.
//!
//! Each function evaluates a trailing window and reports the most recent
//! defined point, `None` when no point in the series is defined. Absence is
//! the normal outcome for flat or too-short histories, not an error.

/// Trailing window for the Relative Strength Index
pub const RSI_WINDOW: usize = 14;

/// Trailing window for the price Z-score
pub const Z_SCORE_WINDOW: usize = 60;

/// Trailing window for support/resistance levels
pub const SUPPORT_RESISTANCE_WINDOW: usize = 200;

/// Relative Strength Index: 100 - 100 / (1 + RS), where RS is the average
/// gain over the window divided by the average absolute loss.
///
/// A window whose loss average is zero has no defined RS; such points are
/// skipped and the latest defined point is returned instead.
pub fn rsi(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window + 1 {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|pair| pair[1] - pair[0]).collect();

    for end in (window..=deltas.len()).rev() {
        let tail = &deltas[end - window..end];
        let avg_gain = tail.iter().filter(|d| **d > 0.0).sum::<f64>() / window as f64;
        let avg_loss =
            tail.iter().filter(|d| **d < 0.0).map(|d| d.abs()).sum::<f64>() / window as f64;

        if avg_loss == 0.0 {
            continue;
        }

        let rs = avg_gain / avg_loss;
        return Some(100.0 - 100.0 / (1.0 + rs));
    }

    None
}

/// Distance of the window's last close from the trailing mean, in units of
/// the trailing sample standard deviation. Windows with zero deviation are
/// undefined and skipped, latest defined point wins.
pub fn z_score(closes: &[f64], window: usize) -> Option<f64> {
    if window < 2 || closes.len() < window {
        return None;
    }

    for end in (window..=closes.len()).rev() {
        let tail = &closes[end - window..end];
        let mean = tail.iter().sum::<f64>() / window as f64;
        let variance = tail.iter().map(|c| (c - mean).powi(2)).sum::<f64>()
            / (window as f64 - 1.0);
        let std_dev = variance.sqrt();

        if std_dev == 0.0 {
            continue;
        }

        return Some((tail[window - 1] - mean) / std_dev);
    }

    None
}

/// Trailing minimum (support) and maximum (resistance) of the last
/// `window` closes. Defined whenever the series covers the window.
pub fn support_resistance(closes: &[f64], window: usize) -> Option<(f64, f64)> {
    if window == 0 || closes.len() < window {
        return None;
    }

    let tail = &closes[closes.len() - window..];
    let support = tail.iter().copied().fold(f64::INFINITY, f64::min);
    let resistance = tail.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some((support, resistance))
}
