// crates/hodl-daemon/src/config.rs
//
// Runtime configuration for the HODL ledger daemon.
// Loaded from a TOML file or populated with sensible defaults.

use serde::Deserialize;
use std::fs;

use hodl_core::error::HodlError;
use hodl_core::params::EpochParams;

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Directory for the ledger's RocksDB instance.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Log level used when `RUST_LOG` is unset: "trace", "debug", "info",
    /// "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Base URL of the points API queried for balances at opt-in.
    #[serde(default = "default_balance_api_url")]
    pub balance_api_url: String,

    /// Timeout for one balance request.
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,

    /// Webhook that receives error reports. Reports are only logged when
    /// unset.
    #[serde(default)]
    pub report_url: Option<String>,

    /// Emoji appended to amounts in the staking status text.
    #[serde(default = "default_points_marker")]
    pub points_emoji: String,

    /// Marker preceding the amount in points-log messages.
    #[serde(default = "default_points_marker")]
    pub points_marker: String,

    /// Upper bound on a single row-lock wait.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: i64,

    /// Epoch lifecycle parameters (`[epochs]` table).
    #[serde(default)]
    pub epochs: EpochParams,
}

fn default_data_dir() -> String {
    "~/.hodl/data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_balance_api_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_oracle_timeout_secs() -> u64 {
    10
}

fn default_points_marker() -> String {
    "<:points:819648258112225316>".to_string()
}

fn default_lock_timeout_ms() -> i64 {
    1_000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            balance_api_url: default_balance_api_url(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
            report_url: None,
            points_emoji: default_points_marker(),
            points_marker: default_points_marker(),
            lock_timeout_ms: default_lock_timeout_ms(),
            epochs: EpochParams::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, HodlError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| HodlError::Config(format!("cannot read {}: {}", path, e)))?;
        Self::parse(&contents)
    }

    /// Parse and validate a TOML document.
    pub fn parse(contents: &str) -> Result<Self, HodlError> {
        let config: DaemonConfig =
            toml::from_str(contents).map_err(|e| HodlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HodlError> {
        if self.lock_timeout_ms <= 0 {
            return Err(HodlError::Config(
                "lock_timeout_ms must be positive".to_string(),
            ));
        }
        if self.oracle_timeout_secs == 0 {
            return Err(HodlError::Config(
                "oracle_timeout_secs must be positive".to_string(),
            ));
        }
        self.epochs.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hodl_core::points::Rate;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = DaemonConfig::parse("").unwrap();
        assert_eq!(config.data_dir, "~/.hodl/data");
        assert_eq!(config.lock_timeout_ms, 1_000);
        assert_eq!(config.epochs, EpochParams::default());
        assert!(config.report_url.is_none());
    }

    #[test]
    fn test_epochs_table_overrides() {
        let config = DaemonConfig::parse(
            r#"
            data_dir = "/var/lib/hodl"
            report_url = "http://127.0.0.1:9000/errors"

            [epochs]
            epoch_duration_days = 7
            default_apy = "0.08"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, "/var/lib/hodl");
        assert_eq!(config.report_url.as_deref(), Some("http://127.0.0.1:9000/errors"));
        assert_eq!(config.epochs.epoch_duration_days, 7);
        assert_eq!(config.epochs.default_apy, "0.08".parse::<Rate>().unwrap());
        assert_eq!(config.epochs.space_between_epochs_secs, 42);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            DaemonConfig::parse("lock_timeout_ms = 0"),
            Err(HodlError::Config(_))
        ));
        assert!(matches!(
            DaemonConfig::parse("[epochs]\ncheck_epoch_minutes = 0"),
            Err(HodlError::Config(_))
        ));
        assert!(matches!(
            DaemonConfig::parse("data_dir = 5"),
            Err(HodlError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = DaemonConfig::load("/nonexistent/hodl.toml").unwrap_err();
        assert!(matches!(err, HodlError::Config(_)));
    }
}
