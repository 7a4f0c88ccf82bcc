//! Candle: one OHLCV bar, plus the loose wire shapes the backend sends.
//!
//! The chart endpoint is not strict about candle encoding: rows arrive either as
//! positional arrays `[time, open, high, low, close, volume]` or as objects with
//! long or short keys, and numbers are sometimes strings. `RawCandle` accepts all
//! of them; `normalize_candles` turns them into a clean, time-ordered series.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// OHLCV bar. `time` is a millisecond epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// `high >= max(open, close)` and `low <= min(open, close)`.
    ///
    /// Informational only; indicator math assumes it but nothing enforces it.
    pub fn is_sane(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }
}

/// A number as it appears on the wire: float, integer, numeric string, or null.
///
/// Anything that does not parse to a finite `f64` is treated as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LooseNumber(pub Option<f64>);

impl LooseNumber {
    pub fn value(self) -> Option<f64> {
        self.0
    }

    fn finite(v: f64) -> Self {
        if v.is_finite() {
            Self(Some(v))
        } else {
            Self(None)
        }
    }
}

impl From<f64> for LooseNumber {
    fn from(v: f64) -> Self {
        Self::finite(v)
    }
}

impl Serialize for LooseNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(v) => serializer.serialize_f64(v),
            None => serializer.serialize_none(),
        }
    }
}

struct LooseNumberVisitor;

impl<'de> Visitor<'de> for LooseNumberVisitor {
    type Value = LooseNumber;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number, a numeric string, or null")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(LooseNumber::finite(v))
    }

    fn visit_f32<E: de::Error>(self, v: f32) -> Result<Self::Value, E> {
        Ok(LooseNumber::finite(v as f64))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(LooseNumber(Some(v as f64)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(LooseNumber(Some(v as f64)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(v
            .trim()
            .parse::<f64>()
            .map(LooseNumber::finite)
            .unwrap_or_default())
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(LooseNumber(Some(if v { 1.0 } else { 0.0 })))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LooseNumber(None))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LooseNumber(None))
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        d.deserialize_any(self)
    }
}

impl<'de> Deserialize<'de> for LooseNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LooseNumberVisitor)
    }
}

/// Object-shaped candle; accepts long and short key names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandleFields {
    #[serde(default, alias = "t", alias = "ts")]
    pub time: LooseNumber,
    #[serde(default, alias = "o")]
    pub open: LooseNumber,
    #[serde(default, alias = "h")]
    pub high: LooseNumber,
    #[serde(default, alias = "l")]
    pub low: LooseNumber,
    #[serde(default, alias = "c")]
    pub close: LooseNumber,
    #[serde(default, alias = "v")]
    pub volume: LooseNumber,
}

/// A candle as received from the backend, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCandle {
    /// `[time, open, high, low, close, volume?]`
    Row(Vec<LooseNumber>),
    Fields(CandleFields),
}

impl RawCandle {
    /// Positional row for a fully-specified candle.
    pub fn row(c: &Candle) -> Self {
        RawCandle::Row(vec![
            LooseNumber(Some(c.time as f64)),
            c.open.into(),
            c.high.into(),
            c.low.into(),
            c.close.into(),
            c.volume.into(),
        ])
    }

    /// Convert to a `Candle`. Returns `None` without a finite time and close.
    ///
    /// Missing open/high/low fall back to close; missing volume is zero.
    pub fn to_candle(&self) -> Option<Candle> {
        let (time, open, high, low, close, volume) = match self {
            RawCandle::Row(cols) => {
                let at = |i: usize| cols.get(i).and_then(|n| n.value());
                (at(0), at(1), at(2), at(3), at(4), at(5))
            }
            RawCandle::Fields(f) => (
                f.time.value(),
                f.open.value(),
                f.high.value(),
                f.low.value(),
                f.close.value(),
                f.volume.value(),
            ),
        };
        let time = time?;
        let close = close?;
        Some(Candle {
            time: time as i64,
            open: open.unwrap_or(close),
            high: high.unwrap_or(close),
            low: low.unwrap_or(close),
            close,
            volume: volume.unwrap_or(0.0),
        })
    }
}

impl From<Candle> for RawCandle {
    fn from(c: Candle) -> Self {
        RawCandle::row(&c)
    }
}

/// Normalize raw rows: drop unusable rows, sort by time, de-duplicate timestamps.
///
/// On duplicate timestamps the later row in input order wins. The result has
/// strictly increasing `time`.
pub fn normalize_candles(raw: &[RawCandle]) -> Vec<Candle> {
    let mut candles: Vec<Candle> = raw.iter().filter_map(RawCandle::to_candle).collect();
    // stable sort keeps input order among equal timestamps
    candles.sort_by_key(|c| c.time);

    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for c in candles {
        match out.last_mut() {
            Some(last) if last.time == c.time => *last = c,
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: i64, close: f64) -> Candle {
        Candle {
            time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn row_and_object_shapes_parse() {
        let json = r#"[
            [1000, 1.0, 2.0, 0.5, 1.5, 10],
            {"t": 2000, "o": "1.5", "h": 2.5, "l": 1.0, "c": 2.0, "v": null},
            {"time": 3000, "close": 3.0}
        ]"#;
        let raw: Vec<RawCandle> = serde_json::from_str(json).unwrap();
        let candles = normalize_candles(&raw);

        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].volume, 10.0);
        assert_eq!(candles[1].open, 1.5);
        assert_eq!(candles[1].volume, 0.0);
        assert_eq!(candles[2].open, 3.0);
        assert_eq!(candles[2].high, 3.0);
    }

    #[test]
    fn rows_without_time_or_close_are_dropped() {
        let json = r#"[[null, 1, 2, 0, 1, 5], {"time": 5, "close": "abc"}, [7, 1, 1, 1, 1]]"#;
        let raw: Vec<RawCandle> = serde_json::from_str(json).unwrap();
        let candles = normalize_candles(&raw);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].time, 7);
    }

    #[test]
    fn normalize_sorts_and_dedupes() {
        let raw: Vec<RawCandle> = vec![
            candle(3, 3.0).into(),
            candle(1, 1.0).into(),
            candle(3, 30.0).into(),
            candle(2, 2.0).into(),
        ];
        let candles = normalize_candles(&raw);
        let times: Vec<i64> = candles.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![1, 2, 3]);
        assert_eq!(candles[2].close, 30.0);
    }

    #[test]
    fn sanity_check() {
        assert!(candle(1, 10.0).is_sane());
        let mut bad = candle(1, 10.0);
        bad.high = 9.0;
        assert!(!bad.is_sane());
    }
}
