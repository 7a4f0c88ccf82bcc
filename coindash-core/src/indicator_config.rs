//! Versioned chart indicator configuration.
//!
//! The stored form is JSON (`{"v": 1, "overlays": {...}, "panes": {...}}`).
//! Everything read from storage or from a user goes through [`sanitize`],
//! which never fails: out-of-range numbers are clamped, wrong types fall back
//! to the field default, and anything that is not a version-1 object yields
//! the default configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const CONFIG_VERSION: u32 = 1;

/// Durable key the configuration is stored under.
pub const CONFIG_KEY: &str = "chart.indicators.v1";

pub const BOLLINGER_N_RANGE: (usize, usize) = (2, 200);
pub const BOLLINGER_K_RANGE: (f64, f64) = (0.5, 5.0);
pub const RSI_PERIOD_RANGE: (usize, usize) = (2, 200);
pub const MACD_FAST_RANGE: (usize, usize) = (2, 50);
pub const MACD_SLOW_RANGE: (usize, usize) = (3, 200);
pub const MACD_SIGNAL_RANGE: (usize, usize) = (2, 50);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerConfig {
    pub enabled: bool,
    pub n: usize,
    pub k: f64,
}

impl Default for BollingerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            n: 20,
            k: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiConfig {
    pub enabled: bool,
    pub period: usize,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period: 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdConfig {
    pub enabled: bool,
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overlays {
    pub bollinger: BollingerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panes {
    pub volume: bool,
    pub rsi: RsiConfig,
    pub macd: MacdConfig,
}

impl Default for Panes {
    fn default() -> Self {
        Self {
            volume: true,
            rsi: RsiConfig::default(),
            macd: MacdConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartIndicatorConfigV1 {
    pub v: u32,
    pub overlays: Overlays,
    pub panes: Panes,
}

impl Default for ChartIndicatorConfigV1 {
    fn default() -> Self {
        Self {
            v: CONFIG_VERSION,
            overlays: Overlays::default(),
            panes: Panes::default(),
        }
    }
}

impl ChartIndicatorConfigV1 {
    pub fn to_value(&self) -> Value {
        // every field is a bool, an integer or a finite float
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Re-sanitize after an in-place edit.
    pub fn sanitized(&self) -> Self {
        sanitize(&self.to_value())
    }
}

/// Coerce any JSON value into a valid configuration.
pub fn sanitize(raw: &Value) -> ChartIndicatorConfigV1 {
    let Some(root) = raw.as_object() else {
        return ChartIndicatorConfigV1::default();
    };
    if root.get("v").and_then(Value::as_f64) != Some(f64::from(CONFIG_VERSION)) {
        warn!(v = ?root.get("v"), "indicator config version mismatch; using defaults");
        return ChartIndicatorConfigV1::default();
    }

    let overlays = object(root, "overlays");
    let panes = object(root, "panes");
    let bb = overlays.and_then(|o| object(o, "bollinger"));
    let rsi = panes.and_then(|p| object(p, "rsi"));
    let macd = panes.and_then(|p| object(p, "macd"));

    let d = ChartIndicatorConfigV1::default();

    let fast = period(macd, "fast", d.panes.macd.fast, MACD_FAST_RANGE);
    let slow = period(macd, "slow", d.panes.macd.slow, MACD_SLOW_RANGE)
        .max(fast + 1)
        .clamp(MACD_SLOW_RANGE.0, MACD_SLOW_RANGE.1);

    ChartIndicatorConfigV1 {
        v: CONFIG_VERSION,
        overlays: Overlays {
            bollinger: BollingerConfig {
                enabled: flag(bb, "enabled", d.overlays.bollinger.enabled),
                n: period(bb, "n", d.overlays.bollinger.n, BOLLINGER_N_RANGE),
                k: number(bb, "k")
                    .map(|k| k.clamp(BOLLINGER_K_RANGE.0, BOLLINGER_K_RANGE.1))
                    .unwrap_or(d.overlays.bollinger.k),
            },
        },
        panes: Panes {
            volume: panes
                .and_then(|p| p.get("volume"))
                .and_then(Value::as_bool)
                .unwrap_or(d.panes.volume),
            rsi: RsiConfig {
                enabled: flag(rsi, "enabled", d.panes.rsi.enabled),
                period: period(rsi, "period", d.panes.rsi.period, RSI_PERIOD_RANGE),
            },
            macd: MacdConfig {
                enabled: flag(macd, "enabled", d.panes.macd.enabled),
                fast,
                slow,
                signal: period(macd, "signal", d.panes.macd.signal, MACD_SIGNAL_RANGE),
            },
        },
    }
}

fn object<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

fn flag(map: Option<&Map<String, Value>>, key: &str, default: bool) -> bool {
    map.and_then(|m| m.get(key))
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

fn number(map: Option<&Map<String, Value>>, key: &str) -> Option<f64> {
    map.and_then(|m| m.get(key))
        .and_then(Value::as_f64)
        .filter(|x| x.is_finite())
}

fn period(
    map: Option<&Map<String, Value>>,
    key: &str,
    default: usize,
    (lo, hi): (usize, usize),
) -> usize {
    match number(map, key) {
        Some(x) => x.round().clamp(lo as f64, hi as f64) as usize,
        None => default,
    }
}

/// The configuration file under a settings directory.
#[derive(Debug, Clone)]
pub struct IndicatorConfigStore {
    path: PathBuf,
}

impl IndicatorConfigStore {
    pub fn new(settings_dir: impl AsRef<Path>) -> Self {
        Self {
            path: settings_dir.as_ref().join(format!("{CONFIG_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored configuration, or the defaults when there is none usable.
    pub fn load(&self) -> ChartIndicatorConfigV1 {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return ChartIndicatorConfigV1::default()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable indicator config; using defaults");
                return ChartIndicatorConfigV1::default();
            }
        };
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(raw) => sanitize(&raw),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "malformed indicator config; using defaults");
                ChartIndicatorConfigV1::default()
            }
        }
    }

    /// Sanitize and write atomically. Returns what was stored.
    pub fn save(&self, config: &ChartIndicatorConfigV1) -> io::Result<ChartIndicatorConfigV1> {
        let clean = config.sanitized();
        let json = serde_json::to_vec_pretty(&clean).map_err(io::Error::other)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(clean)
    }

    /// Remove the stored configuration. Returns whether a file was removed.
    pub fn reset(&self) -> io::Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
