//! Relative Strength Index (RSI), Wilder smoothing.
//!
//! Seed: average gain and average loss over the first `period` deltas.
//! Then avg = (avg * (period - 1) + x) / period for each later delta.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss); avg_loss == 0 → 100.
//! Lookback: period (first value at index `period`, needs `period + 1` closes).

/// RSI of `closes`, aligned 1:1 with the input; NaN before index `period`.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let ch = closes[i] - closes[i - 1];
        if ch > 0.0 {
            avg_gain += ch;
        } else {
            avg_loss -= ch;
        }
    }
    let p = period as f64;
    avg_gain /= p;
    avg_loss /= p;
    result[period] = rsi_value(avg_gain, avg_loss);

    for i in (period + 1)..n {
        let ch = closes[i] - closes[i - 1];
        let gain = ch.max(0.0);
        let loss = (-ch).max(0.0);
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        result[i] = rsi_value(avg_gain, avg_loss);
    }

    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}
