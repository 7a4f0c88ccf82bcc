//! Indicator engine: candles + configuration → chart series.
//!
//! Pure and deterministic. Bars where an indicator is undefined produce no
//! point, so a series can be shorter than the candle list.

use super::bollinger::bollinger;
use super::macd::macd;
use super::rsi::rsi;
use crate::domain::Candle;
use crate::indicator_config::ChartIndicatorConfigV1;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub time: i64,
    pub value: f64,
}

/// Latest defined value of each indicator, for headers and summaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LastValues {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bb_mid: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorOutput {
    pub volume: Vec<SeriesPoint>,
    pub rsi: Vec<SeriesPoint>,
    pub macd: Vec<SeriesPoint>,
    pub macd_signal: Vec<SeriesPoint>,
    pub macd_histogram: Vec<SeriesPoint>,
    pub bb_mid: Vec<SeriesPoint>,
    pub bb_upper: Vec<SeriesPoint>,
    pub bb_lower: Vec<SeriesPoint>,
    pub last: LastValues,
}

impl IndicatorOutput {
    /// Every series with its chart name, overlays first.
    pub fn named_series(&self) -> [(&'static str, &[SeriesPoint]); 8] {
        [
            ("bb_mid", self.bb_mid.as_slice()),
            ("bb_upper", self.bb_upper.as_slice()),
            ("bb_lower", self.bb_lower.as_slice()),
            ("volume", self.volume.as_slice()),
            ("rsi", self.rsi.as_slice()),
            ("macd", self.macd.as_slice()),
            ("macd_signal", self.macd_signal.as_slice()),
            ("macd_histogram", self.macd_histogram.as_slice()),
        ]
    }
}

pub fn compute_indicators(candles: &[Candle], config: &ChartIndicatorConfigV1) -> IndicatorOutput {
    let mut out = IndicatorOutput::default();
    if candles.len() < 2 {
        return out;
    }

    // candles without a finite close contribute nothing
    let bars: Vec<&Candle> = candles.iter().filter(|c| c.close.is_finite()).collect();
    let times: Vec<i64> = bars.iter().map(|c| c.time).collect();
    let closes: Vec<f64> = bars.iter().map(|c| c.close).collect();

    if config.panes.volume {
        out.volume = bars
            .iter()
            .map(|c| SeriesPoint {
                time: c.time,
                value: if c.volume.is_finite() { c.volume } else { 0.0 },
            })
            .collect();
    }

    let rsi_cfg = &config.panes.rsi;
    if rsi_cfg.enabled {
        out.rsi = points(&times, &rsi(&closes, rsi_cfg.period));
        out.last.rsi = last(&out.rsi);
    }

    let macd_cfg = &config.panes.macd;
    if macd_cfg.enabled {
        let m = macd(&closes, macd_cfg.fast, macd_cfg.slow, macd_cfg.signal);
        out.macd = points(&times, &m.macd);
        out.macd_signal = points(&times, &m.signal);
        out.macd_histogram = points(&times, &m.histogram);
        out.last.macd = last(&out.macd);
        out.last.macd_signal = last(&out.macd_signal);
        out.last.macd_histogram = last(&out.macd_histogram);
    }

    let bb_cfg = &config.overlays.bollinger;
    if bb_cfg.enabled {
        let b = bollinger(&closes, bb_cfg.n, bb_cfg.k);
        out.bb_mid = points(&times, &b.mid);
        out.bb_upper = points(&times, &b.upper);
        out.bb_lower = points(&times, &b.lower);
        out.last.bb_mid = last(&out.bb_mid);
        out.last.bb_upper = last(&out.bb_upper);
        out.last.bb_lower = last(&out.bb_lower);
    }

    out
}

fn points(times: &[i64], values: &[f64]) -> Vec<SeriesPoint> {
    times
        .iter()
        .zip(values)
        .filter(|(_, v)| v.is_finite())
        .map(|(&time, &value)| SeriesPoint { time, value })
        .collect()
}

fn last(series: &[SeriesPoint]) -> Option<f64> {
    series.last().map(|p| p.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles};

    fn all_on() -> ChartIndicatorConfigV1 {
        let mut cfg = ChartIndicatorConfigV1::default();
        cfg.overlays.bollinger.enabled = true;
        cfg.panes.rsi.enabled = true;
        cfg.panes.macd.enabled = true;
        cfg
    }

    #[test]
    fn empty_and_single_bar_yield_nothing() {
        for candles in [make_candles(&[]), make_candles(&[100.0])] {
            let out = compute_indicators(&candles, &all_on());
            assert_eq!(out, IndicatorOutput::default());
            assert_eq!(out.last, LastValues::default());
        }
    }

    #[test]
    fn series_lengths() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let candles = make_candles(&closes);
        let out = compute_indicators(&candles, &all_on());

        assert_eq!(out.volume.len(), 60);
        assert_eq!(out.macd.len(), 60);
        assert_eq!(out.macd_signal.len(), 60);
        assert_eq!(out.macd_histogram.len(), 60);
        assert_eq!(out.bb_mid.len(), 60 - 19);
        assert_eq!(out.bb_upper.len(), 60 - 19);
        assert_eq!(out.rsi.len(), 60 - 14);
        assert_eq!(out.rsi[0].time, candles[14].time);
        assert_eq!(out.bb_mid[0].time, candles[19].time);
    }

    #[test]
    fn disabled_indicators_are_empty() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0]);
        let mut cfg = ChartIndicatorConfigV1::default();
        cfg.panes.volume = false;
        let out = compute_indicators(&candles, &cfg);
        assert_eq!(out, IndicatorOutput::default());
    }

    #[test]
    fn last_values_match_series_tails() {
        let closes: Vec<f64> = (0..40).map(|i| 50.0 + i as f64).collect();
        let out = compute_indicators(&make_candles(&closes), &all_on());
        assert_eq!(out.last.rsi, Some(100.0));
        assert_eq!(out.last.macd, out.macd.last().map(|p| p.value));
        assert_approx(
            out.last.macd_histogram.unwrap(),
            out.last.macd.unwrap() - out.last.macd_signal.unwrap(),
            1e-9,
        );
        let (mid, up, lo) = (out.last.bb_mid.unwrap(), out.last.bb_upper.unwrap(), out.last.bb_lower.unwrap());
        assert!(lo < mid && mid < up);
    }

    #[test]
    fn non_finite_values_are_skipped_or_zeroed() {
        let mut candles = make_candles(&[1.0, 2.0, 3.0, 4.0]);
        candles[1].close = f64::NAN;
        candles[2].volume = f64::INFINITY;
        let out = compute_indicators(&candles, &ChartIndicatorConfigV1::default());
        assert_eq!(out.volume.len(), 3);
        assert!(out.volume.iter().all(|p| p.time != candles[1].time));
        assert_eq!(out.volume[1].value, 0.0);
    }

    #[test]
    fn named_series_covers_every_output() {
        let out = compute_indicators(&make_candles(&[1.0, 2.0, 3.0]), &all_on());
        let names: Vec<&str> = out.named_series().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            ["bb_mid", "bb_upper", "bb_lower", "volume", "rsi", "macd", "macd_signal", "macd_histogram"]
        );
    }
}
