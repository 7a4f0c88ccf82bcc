//! Bollinger Bands: rolling mean +/- k population standard deviations.
//!
//! The window sum and sum of squares are updated incrementally (add the new
//! close, subtract the one leaving the window). Variance that rounds below
//! zero is clamped to zero.
//! Lookback: n - 1.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BollingerSeries {
    pub mid: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bands over `closes`, aligned 1:1 with the input; NaN before index `n - 1`.
pub fn bollinger(closes: &[f64], n: usize, k: f64) -> BollingerSeries {
    let len = closes.len();
    let mut out = BollingerSeries {
        mid: vec![f64::NAN; len],
        upper: vec![f64::NAN; len],
        lower: vec![f64::NAN; len],
    };
    if n == 0 || len < n {
        return out;
    }

    let window = n as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for (i, &x) in closes.iter().enumerate() {
        sum += x;
        sum_sq += x * x;
        if i >= n {
            let old = closes[i - n];
            sum -= old;
            sum_sq -= old * old;
        }
        if i + 1 < n {
            continue;
        }
        let mean = sum / window;
        let variance = (sum_sq / window - mean * mean).max(0.0);
        let std = variance.sqrt();
        out.mid[i] = mean;
        out.upper[i] = mean + k * std;
        out.lower[i] = mean - k * std;
    }
    out
}
