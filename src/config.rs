// ABOUTME: JSON configuration file - connection endpoints, shared secret, watermark
// ABOUTME: Loaded before a run and written back with the advanced watermark afterwards

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tokio::fs;

/// Connection parameters for one side of the sync.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// `mysql://host:port/db` URL or PDO-style `mysql:host=...;dbname=...`
    pub dsn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Database whose tables are enumerated.
    pub db: String,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("dsn", &crate::utils::sanitize_url(&self.dsn))
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .finish()
    }
}

/// The `db` section: both endpoints and what the last run reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbConfig {
    pub left: EndpointConfig,
    pub right: EndpointConfig,
    /// Diagnostic payload from the last run that had something to report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intel: Option<serde_json::Value>,
    /// Explicit primary-key column per table name; others use their first column.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub primary_keys: BTreeMap<String, String>,
    /// Source rows fetched per page; defaults to 1000.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Whole configuration file.
///
/// Fields this crate does not know about are kept and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Shared secret the HTTP trigger must present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    /// Branch pulled before each triggered run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Watermark: epoch seconds of the last successful run (0 if never).
    #[serde(default)]
    pub last_update: i64,
    pub db: DbConfig,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Config {
    /// Load configuration from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration from {:?}", path))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse configuration from {:?}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Save configuration to a JSON file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, contents)
            .await
            .with_context(|| format!("Failed to write configuration to {:?}", path))?;
        Ok(())
    }

    pub fn watermark(&self) -> i64 {
        self.last_update
    }

    /// Move the watermark to `now`. It never moves backwards.
    pub fn advance_watermark(&mut self, now: i64) {
        self.last_update = self.last_update.max(now);
    }

    /// Keep `intel` only when the run had something to say; otherwise leave the old value.
    pub fn record_intel(&mut self, intel: Option<serde_json::Value>) {
        if let Some(intel) = intel {
            self.db.intel = Some(intel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"{
        "auth": "s3cret",
        "branch": "staging",
        "last_update": 1700000000,
        "db": {
            "left": {"dsn": "mysql:host=prod;dbname=shop", "user": "app", "password": "pw", "db": "shop"},
            "right": {"dsn": "mysql://stage:3306/shop", "user": "app", "password": "pw", "db": "shop"},
            "primary_keys": {"order_items": "item_id"},
            "batch_size": 500,
            "replica_note": "keep me"
        },
        "deploy_hook": {"enabled": true}
    }"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.auth.as_deref(), Some("s3cret"));
        assert_eq!(config.branch.as_deref(), Some("staging"));
        assert_eq!(config.watermark(), 1_700_000_000);
        assert_eq!(config.db.left.db, "shop");
        assert_eq!(config.db.right.dsn, "mysql://stage:3306/shop");
        assert_eq!(config.db.primary_keys["order_items"], "item_id");
        assert_eq!(config.db.batch_size, Some(500));
        assert!(config.db.intel.is_none());
    }

    #[test]
    fn test_missing_last_update_is_epoch() {
        let config = Config::parse(
            r#"{"db": {"left": {"dsn": "mysql://a/x", "db": "x"}, "right": {"dsn": "mysql://b/x", "db": "x"}}}"#,
        )
        .unwrap();
        assert_eq!(config.watermark(), 0);
        assert!(config.auth.is_none());
        assert!(config.db.batch_size.is_none());
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let config = Config::parse(SAMPLE).unwrap();
        let written = serde_json::to_value(&config).unwrap();
        assert_eq!(written["deploy_hook"], json!({"enabled": true}));
        assert_eq!(written["db"]["replica_note"], "keep me");
    }

    #[test]
    fn test_watermark_is_monotonic() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.advance_watermark(1_600_000_000);
        assert_eq!(config.watermark(), 1_700_000_000);
        config.advance_watermark(1_800_000_000);
        assert_eq!(config.watermark(), 1_800_000_000);
    }

    #[test]
    fn test_intel_only_replaced_when_present() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.record_intel(Some(json!({"tables": []})));
        config.record_intel(None);
        assert_eq!(config.db.intel, Some(json!({"tables": []})));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = Config::parse(SAMPLE).unwrap();
        let rendered = format!("{:?}", config.db.left);
        assert!(!rendered.contains("\"pw\""));
        assert!(rendered.contains("***"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::parse(SAMPLE).unwrap();
        config.advance_watermark(1_800_000_000);
        config.save(&path).await.unwrap();

        let loaded = Config::load(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(&dir.path().join("absent.json")).await.is_err());
    }
}
