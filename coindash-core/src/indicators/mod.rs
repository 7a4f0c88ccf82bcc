//! Technical indicators for chart overlays and panes.
//!
//! The numeric functions work on plain close slices and return one value per
//! input bar, NaN where the indicator is not yet defined. The engine turns
//! them into time-stamped series, dropping the undefined bars.

pub mod bollinger;
pub mod ema;
pub mod engine;
pub mod macd;
pub mod rsi;

pub use bollinger::{bollinger, BollingerSeries};
pub use ema::ema;
pub use engine::{compute_indicators, IndicatorOutput, LastValues, SeriesPoint};
pub use macd::{macd, MacdSeries};
pub use rsi::rsi;

/// Synthetic hourly candles from close prices for testing.
///
/// open = prev close (or close for the first bar), high/low = +/- 1 around
/// the body, volume = 1000.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<crate::domain::Candle> {
    use crate::domain::Candle;
    const HOUR_MS: i64 = 3_600_000;
    let base = 1_704_067_200_000; // 2024-01-01T00:00:00Z
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                time: base + i as i64 * HOUR_MS,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
