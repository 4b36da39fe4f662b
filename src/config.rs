// src/config.rs
//! Fetch engine configuration.
//!
//! Every tunable the engine uses lives here, with documented defaults:
//! window, page sizing, retry budget, pacing, rolling-history size and the
//! early-stop thresholds. Nothing in the control flow carries inline literals.
//!
//! Loading order mirrors the other file-backed configs in this repo:
//! explicit path → `$FEED_FETCH_CONFIG_PATH` → `config/fetch.toml` → defaults,
//! then env overrides (`FEED_WINDOW_HOURS`, `FEED_PAGE_SIZE`,
//! `FEED_HARD_PAGE_CAP`, `FEED_API_KEY`).

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_CONFIG_PATH: &str = "FEED_FETCH_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/fetch.toml";

pub const ENV_WINDOW_HOURS: &str = "FEED_WINDOW_HOURS";
pub const ENV_PAGE_SIZE: &str = "FEED_PAGE_SIZE";
pub const ENV_HARD_PAGE_CAP: &str = "FEED_HARD_PAGE_CAP";
pub const ENV_API_KEY: &str = "FEED_API_KEY";

fn default_window_hours() -> f64 {
    3.0
}
fn default_page_size_hint() -> u32 {
    20
}
fn default_hard_page_cap() -> u32 {
    15
}
fn default_history_size() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Rolling window, in hours, counted back from the start of each fetch call.
    #[serde(default = "default_window_hours")]
    pub window_hours: f64,
    #[serde(default = "default_page_size_hint")]
    pub page_size_hint: u32,
    /// Cost safety valve: max pages with records visited per session.
    #[serde(default = "default_hard_page_cap")]
    pub hard_page_cap: u32,
    /// Ring-buffer length for the per-page in-window count history.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub thresholds: StopThresholds,
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            page_size_hint: default_page_size_hint(),
            hard_page_cap: default_hard_page_cap(),
            history_size: default_history_size(),
            retry: RetryConfig::default(),
            pacing: PacingConfig::default(),
            thresholds: StopThresholds::default(),
            endpoint: EndpointConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, first try included.
    pub max_attempts: u32,
    /// Base backoff; attempt `n` waits `retry_delay_ms * n`.
    pub retry_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PacingConfig {
    /// Minimum gap between the end of one request and the start of the next.
    pub min_request_spacing_ms: u64,
    /// Fixed delay between successful pages (on top of request spacing).
    pub inter_page_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_request_spacing_ms: 1_000,
            inter_page_delay_ms: 1_000,
        }
    }
}

impl PacingConfig {
    pub fn min_request_spacing(&self) -> Duration {
        Duration::from_millis(self.min_request_spacing_ms)
    }
    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }
}

/// Which per-entity timestamp decides "overdue".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverdueBasis {
    /// Newest timestamp from the most recent page the entity appeared on.
    /// In a newest-first feed this is where the entity currently stands.
    #[default]
    Frontier,
    /// Max timestamp seen for the entity over the whole session.
    LatestKnown,
}

/// Early-stop thresholds. All tunable; defaults are the production values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StopThresholds {
    pub overdue_basis: OverdueBasis,
    /// Stop when nobody was active this page and at least this share is overdue.
    pub overdue_majority_ratio: f64,
    /// Stop when at least this share is overdue and few entities are still active.
    pub overdue_high_ratio: f64,
    /// "Few" for `overdue_high_ratio`: active entities at or below this count.
    pub high_ratio_max_active: usize,
    /// Stop after this many consecutive pages with zero in-window records.
    pub consecutive_empty_limit: u32,
    /// Stop when the rolling average of in-window records per page drops below this.
    pub min_avg_valid_per_page: f64,
    /// From this page number on, a page with zero active entities stops the walk.
    pub deep_page_threshold: u32,
}

impl Default for StopThresholds {
    fn default() -> Self {
        Self {
            overdue_basis: OverdueBasis::Frontier,
            overdue_majority_ratio: 0.6,
            overdue_high_ratio: 0.8,
            high_ratio_max_active: 1,
            consecutive_empty_limit: 5,
            min_avg_valid_per_page: 1.0,
            deep_page_threshold: 40,
        }
    }
}

/// Where the feed lives and how its payload is shaped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: String,
    pub feed_param: String,
    pub page_size_param: String,
    pub cursor_param: String,
    /// Candidate keys for the record list, first present wins.
    pub record_keys: Vec<String>,
    pub cursor_keys: Vec<String>,
    /// Nested path to the entity id inside each record.
    pub entity_path: Vec<String>,
    pub timestamp_keys: Vec<String>,
    pub api_key_header: String,
    /// Only ever populated from `FEED_API_KEY`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            feed_param: "feed_id".into(),
            page_size_param: "count".into(),
            cursor_param: "cursor".into(),
            record_keys: vec!["records".into(), "data".into()],
            cursor_keys: vec!["next_cursor".into(), "nextCursor".into()],
            entity_path: vec!["author".into(), "id".into()],
            timestamp_keys: vec!["createdAt".into(), "created_at".into()],
            api_key_header: "X-API-Key".into(),
            api_key: None,
        }
    }
}

impl FetchConfig {
    /// Range/ordering checks. Called by every constructor that accepts a config.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        validate_window_hours(self.window_hours)?;
        if self.page_size_hint == 0 {
            return Err(ConfigError::invalid("page_size_hint", "must be >= 1"));
        }
        validate_hard_page_cap(self.hard_page_cap)?;
        if self.history_size == 0 {
            return Err(ConfigError::invalid("history_size", "must be >= 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be >= 1"));
        }
        if self.retry.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::invalid(
                "retry.retry_delay_ms",
                format!("must be <= {MAX_RETRY_DELAY_MS}"),
            ));
        }
        if self.retry.request_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "retry.request_timeout_ms",
                "must be > 0",
            ));
        }
        self.thresholds.validate()?;
        if self.endpoint.record_keys.is_empty() {
            return Err(ConfigError::invalid(
                "endpoint.record_keys",
                "need at least one key",
            ));
        }
        if self.endpoint.timestamp_keys.is_empty() {
            return Err(ConfigError::invalid(
                "endpoint.timestamp_keys",
                "need at least one key",
            ));
        }
        Ok(())
    }

    /// Apply `FEED_*` env overrides on top of whatever was loaded.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = parse_env::<f64>(std::env::var(ENV_WINDOW_HOURS).ok()) {
            self.window_hours = v;
        }
        if let Some(v) = parse_env::<u32>(std::env::var(ENV_PAGE_SIZE).ok()) {
            self.page_size_hint = v;
        }
        if let Some(v) = parse_env::<u32>(std::env::var(ENV_HARD_PAGE_CAP).ok()) {
            self.hard_page_cap = v;
        }
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            let key = key.trim();
            if !key.is_empty() {
                self.endpoint.api_key = Some(key.to_string());
            }
        }
    }
}

impl StopThresholds {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (field, v) in [
            (
                "thresholds.overdue_majority_ratio",
                self.overdue_majority_ratio,
            ),
            ("thresholds.overdue_high_ratio", self.overdue_high_ratio),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::invalid(field, format!("{v} not in [0, 1]")));
            }
        }
        if self.overdue_majority_ratio > self.overdue_high_ratio {
            return Err(ConfigError::invalid(
                "thresholds.overdue_majority_ratio",
                "must not exceed overdue_high_ratio",
            ));
        }
        if self.consecutive_empty_limit == 0 {
            return Err(ConfigError::invalid(
                "thresholds.consecutive_empty_limit",
                "must be >= 1",
            ));
        }
        if !self.min_avg_valid_per_page.is_finite() || self.min_avg_valid_per_page < 0.0 {
            return Err(ConfigError::invalid(
                "thresholds.min_avg_valid_per_page",
                "must be finite and >= 0",
            ));
        }
        if self.deep_page_threshold == 0 {
            return Err(ConfigError::invalid(
                "thresholds.deep_page_threshold",
                "must be >= 1",
            ));
        }
        Ok(())
    }
}

/// Upper bound on the base retry delay: one hour.
pub const MAX_RETRY_DELAY_MS: u64 = 3_600_000;

/// Upper bound on `window_hours`: one hundred years.
pub const MAX_WINDOW_HOURS: f64 = 24.0 * 365.0 * 100.0;

pub(crate) fn validate_window_hours(v: f64) -> std::result::Result<(), ConfigError> {
    if !v.is_finite() || v <= 0.0 {
        return Err(ConfigError::invalid("window_hours", format!("{v} must be > 0")));
    }
    if v > MAX_WINDOW_HOURS {
        return Err(ConfigError::invalid(
            "window_hours",
            format!("{v} exceeds {MAX_WINDOW_HOURS}"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_hard_page_cap(v: u32) -> std::result::Result<(), ConfigError> {
    if v == 0 {
        return Err(ConfigError::invalid("hard_page_cap", "must be >= 1"));
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|s| s.trim().parse::<T>().ok())
}

/// Load config from an explicit path. TOML or JSON, by extension.
pub fn load_config_from(path: &Path) -> Result<FetchConfig> {
    let content = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
        .with_context(|| format!("loading fetch config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
}

/// Load config using env var + fallbacks, then env overrides:
/// 1) $FEED_FETCH_CONFIG_PATH
/// 2) config/fetch.toml
/// 3) built-in defaults
pub fn load_config_default() -> Result<FetchConfig> {
    let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        load_config_from(&pb)?
    } else {
        let toml_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if toml_p.exists() {
            load_config_from(&toml_p)?
        } else {
            FetchConfig::default()
        }
    };
    cfg.apply_env_overrides();
    cfg.validate().context("validating fetch config")?;
    Ok(cfg)
}

fn parse_config(s: &str, hint_ext: &str) -> Result<FetchConfig> {
    let cfg: FetchConfig = if hint_ext == "json" {
        serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?
    } else {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?
    };
    cfg.validate()?;
    Ok(cfg)
}
