//! Disruption controller configuration, loaded from TOML.
//!
//! Durations are written the way the rest of WarpGrid writes them:
//! `"500ms"`, `"30s"`, `"15m"`, `"1h"`.
//!
//! ```toml
//! report_window = "15m"
//! call_timeout = "30s"
//! resync_interval = "5m"
//! nomination_window = "20s"
//! max_concurrent_reconciles = 10
//! error_backoff_base = "1s"
//! error_backoff_max = "5m"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DisruptionError, DisruptionResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisruptionConfig {
    /// Minimum gap between two "not disrupted" events for the same node.
    pub report_window: String,
    /// Upper bound on each pod-list, node-write, delete, or drift call.
    pub call_timeout: String,
    /// How often every node is re-enqueued regardless of requeue requests.
    pub resync_interval: String,
    /// How long a scheduler nomination protects a node.
    pub nomination_window: String,
    /// Maximum nodes reconciled at the same time.
    pub max_concurrent_reconciles: usize,
    /// First retry delay after a failed pass.
    pub error_backoff_base: String,
    /// Cap on the retry delay.
    pub error_backoff_max: String,
}

impl Default for DisruptionConfig {
    fn default() -> Self {
        Self {
            report_window: "15m".to_string(),
            call_timeout: "30s".to_string(),
            resync_interval: "5m".to_string(),
            nomination_window: "20s".to_string(),
            max_concurrent_reconciles: 10,
            error_backoff_base: "1s".to_string(),
            error_backoff_max: "5m".to_string(),
        }
    }
}

impl DisruptionConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> DisruptionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DisruptionError::Config(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> DisruptionResult<Self> {
        let config: DisruptionConfig =
            toml::from_str(s).map_err(|e| DisruptionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every duration parses and the numeric bounds make sense.
    pub fn validate(&self) -> DisruptionResult<()> {
        self.report_window()?;
        self.call_timeout()?;
        self.nomination_window()?;
        if self.resync_interval()?.is_zero() {
            return Err(DisruptionError::Config(
                "resync_interval must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_reconciles == 0 {
            return Err(DisruptionError::Config(
                "max_concurrent_reconciles must be at least 1".to_string(),
            ));
        }
        if self.error_backoff_base()? > self.error_backoff_max()? {
            return Err(DisruptionError::Config(
                "error_backoff_base exceeds error_backoff_max".to_string(),
            ));
        }
        Ok(())
    }

    pub fn report_window(&self) -> DisruptionResult<Duration> {
        parse_duration("report_window", &self.report_window)
    }

    pub fn call_timeout(&self) -> DisruptionResult<Duration> {
        parse_duration("call_timeout", &self.call_timeout)
    }

    pub fn resync_interval(&self) -> DisruptionResult<Duration> {
        parse_duration("resync_interval", &self.resync_interval)
    }

    pub fn nomination_window(&self) -> DisruptionResult<Duration> {
        parse_duration("nomination_window", &self.nomination_window)
    }

    pub fn error_backoff_base(&self) -> DisruptionResult<Duration> {
        parse_duration("error_backoff_base", &self.error_backoff_base)
    }

    pub fn error_backoff_max(&self) -> DisruptionResult<Duration> {
        parse_duration("error_backoff_max", &self.error_backoff_max)
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h".
fn parse_duration(field: &str, s: &str) -> DisruptionResult<Duration> {
    let s = s.trim();
    let invalid = || DisruptionError::Config(format!("{field}: invalid duration {s:?}"));

    let (digits, millis_per_unit) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1_000)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60_000)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3_600_000)
    } else {
        return Err(invalid());
    };

    let n = digits.parse::<u64>().map_err(|_| invalid())?;
    n.checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}
