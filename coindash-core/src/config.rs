//! Application configuration, stored as TOML.
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration. `COINDASH_API_BASE` overrides `api_base`.

use crate::backoff::Backoff;
use crate::cache::TierCapacity;
use crate::data::order_pager::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "coindash.toml";
pub const API_BASE_ENV: &str = "COINDASH_API_BASE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base: String,
    /// Root of the persistent cache stores and the settings file.
    pub data_dir: PathBuf,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub cache: CacheConfig,
    pub order: OrderConfig,
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub bundle_memory: usize,
    pub bundle_persistent: usize,
    pub order_memory: usize,
    pub order_persistent: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    pub page_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter: f64,
    pub max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/api".to_string(),
            data_dir: PathBuf::from(".coindash"),
            user_agent: concat!("coindash/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 15,
            cache: CacheConfig::default(),
            order: OrderConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bundle_memory: 5,
            bundle_persistent: 50,
            order_memory: 8,
            order_persistent: 20,
        }
    }
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 400,
            max_ms: 8000,
            jitter: 0.4,
            max_attempts: 4,
        }
    }
}

impl AppConfig {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(format!("read config {}: {e}", path.display())),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        let config: Self =
            toml::from_str(content).map_err(|e| format!("parse config TOML: {e}"))?;
        Ok(config.validated())
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("serialize config: {e}"))
    }

    /// Apply `COINDASH_API_BASE` when set and non-blank.
    pub fn with_env_overrides(self) -> Self {
        let api_base = std::env::var(API_BASE_ENV).ok();
        self.with_api_base_override(api_base.as_deref())
    }

    fn with_api_base_override(mut self, api_base: Option<&str>) -> Self {
        if let Some(base) = api_base.map(str::trim).filter(|b| !b.is_empty()) {
            self.api_base = base.to_string();
        }
        self
    }

    /// Clamp out-of-range values instead of rejecting them.
    pub fn validated(mut self) -> Self {
        let c = &mut self.cache;
        c.bundle_memory = c.bundle_memory.max(1);
        c.bundle_persistent = c.bundle_persistent.max(1);
        c.order_memory = c.order_memory.max(1);
        c.order_persistent = c.order_persistent.max(1);
        self.order.page_limit = self.order.page_limit.clamp(1, MAX_PAGE_LIMIT);
        self.request_timeout_secs = self.request_timeout_secs.max(1);
        let b = &mut self.backoff;
        b.base_ms = b.base_ms.max(1);
        b.max_ms = b.max_ms.max(b.base_ms);
        b.jitter = if b.jitter.is_finite() { b.jitter.clamp(0.0, 1.0) } else { 0.0 };
        b.max_attempts = b.max_attempts.max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bundle_capacity(&self) -> TierCapacity {
        TierCapacity {
            memory: self.cache.bundle_memory,
            persistent: self.cache.bundle_persistent,
        }
    }

    pub fn order_capacity(&self) -> TierCapacity {
        TierCapacity {
            memory: self.cache.order_memory,
            persistent: self.cache.order_persistent,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff.base_ms),
            Duration::from_millis(self.backoff.max_ms),
            self.backoff.jitter,
        )
    }
}
