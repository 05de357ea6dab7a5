// ABOUTME: Trigger - the authorized entry point around a sync run
// ABOUTME: Loads config, checks the shared secret, pulls, syncs and persists the watermark

use anyhow::Context;
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::Config;
use crate::report::SyncReport;
use crate::session::run_sync;
use crate::utils::now_epoch;

#[derive(Error, Debug)]
pub enum TriggerError {
    /// Missing or wrong secret, or no readable configuration. Callers cannot tell these apart.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Configuration error: {0:#}")]
    Config(anyhow::Error),

    /// The run could not start or could not reach both databases; the watermark was not advanced.
    #[error("Sync failed: {0:#}")]
    Sync(anyhow::Error),

    #[error("Failed to persist configuration: {0:#}")]
    Persist(anyhow::Error),
}

/// Runs syncs for one configuration file and one deployment checkout.
#[derive(Debug, Clone)]
pub struct Trigger {
    config_path: PathBuf,
    repo_dir: PathBuf,
}

impl Trigger {
    pub fn new(config_path: impl Into<PathBuf>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            repo_dir: repo_dir.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// The externally triggered sequence: authorize, pull, sync, persist.
    pub async fn run(&self, auth: Option<&str>) -> Result<SyncReport, TriggerError> {
        let config = self.authorize(auth).await?;

        if let Some(branch) = config.branch.as_deref() {
            if let Err(e) = crate::git::pull(&self.repo_dir, branch).await {
                tracing::warn!("Continuing without pull: {:#}", e);
            }
        }

        self.sync_and_persist(config).await
    }

    /// Load the configuration and check `auth` against its secret.
    pub async fn authorize(&self, auth: Option<&str>) -> Result<Config, TriggerError> {
        let config = match self.load().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Rejecting trigger: {}", e);
                return Err(TriggerError::Unauthorized);
            }
        };
        check_auth(&config, auth)?;
        Ok(config)
    }

    /// Sync without the secret check or pull, for operators running from a shell.
    pub async fn run_local(&self) -> Result<SyncReport, TriggerError> {
        let config = self.load().await?;
        self.sync_and_persist(config).await
    }

    async fn load(&self) -> Result<Config, TriggerError> {
        Config::load(&self.config_path)
            .await
            .map_err(TriggerError::Config)
    }

    async fn sync_and_persist(&self, config: Config) -> Result<SyncReport, TriggerError> {
        self.sync_and_persist_with(config, |config| async move { run_sync(&config).await })
            .await
    }

    /// The new watermark is the time the run started. A table written while
    /// the run is in progress stays newer than it and is picked up next time.
    async fn sync_and_persist_with<F, Fut>(
        &self,
        mut config: Config,
        sync: F,
    ) -> Result<SyncReport, TriggerError>
    where
        F: FnOnce(Config) -> Fut,
        Fut: Future<Output = anyhow::Result<SyncReport>>,
    {
        tracing::info!("Starting sync (watermark {})", config.watermark());
        let started = now_epoch();
        let report = sync(config.clone()).await.map_err(TriggerError::Sync)?;

        persist_run(&self.config_path, &mut config, &report, started)
            .await
            .map_err(TriggerError::Persist)?;
        Ok(report)
    }
}

/// Exact-match the presented secret against the configured one.
pub fn check_auth(config: &Config, auth: Option<&str>) -> Result<(), TriggerError> {
    match (config.auth.as_deref(), auth) {
        (Some(expected), Some(given)) if expected == given => Ok(()),
        (None, _) => {
            tracing::warn!("Rejecting trigger: no shared secret configured");
            Err(TriggerError::Unauthorized)
        }
        _ => {
            tracing::warn!("Rejecting trigger: missing or wrong auth parameter");
            Err(TriggerError::Unauthorized)
        }
    }
}

/// Record a successful run: advance the watermark, attach intel, write the file.
pub async fn persist_run(
    path: &Path,
    config: &mut Config,
    report: &SyncReport,
    now: i64,
) -> anyhow::Result<()> {
    config.advance_watermark(now);
    config.record_intel(report.intel());
    config
        .save(path)
        .await
        .with_context(|| format!("Watermark {} not saved", now))?;
    tracing::info!("Watermark advanced to {}", config.watermark());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::TableOutcome;
    use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use std::time::Duration;

    fn config(auth: Option<&str>) -> Config {
        let mut config = Config::parse(
            r#"{"db": {"left": {"dsn": "mysql://a/x", "db": "x"}, "right": {"dsn": "mysql://b/x", "db": "x"}}}"#,
        )
        .unwrap();
        config.auth = auth.map(str::to_string);
        config
    }

    #[test]
    fn test_check_auth() {
        assert!(check_auth(&config(Some("s3cret")), Some("s3cret")).is_ok());
        assert!(matches!(
            check_auth(&config(Some("s3cret")), Some("S3CRET")),
            Err(TriggerError::Unauthorized)
        ));
        assert!(check_auth(&config(Some("s3cret")), None).is_err());
        assert!(check_auth(&config(None), Some("s3cret")).is_err());
        assert!(check_auth(&config(None), None).is_err());
    }

    #[tokio::test]
    async fn test_persist_run_advances_watermark_and_keeps_intel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = config(Some("s3cret"));

        let mut failing = SyncReport::new(0);
        failing.push(
            "orders",
            TableOutcome::Failed {
                error: "read failed".to_string(),
            },
        );
        persist_run(&path, &mut config, &failing, 1_000).await.unwrap();

        let clean = SyncReport::new(1_000);
        persist_run(&path, &mut config, &clean, 2_000).await.unwrap();

        let saved = Config::load(&path).await.unwrap();
        assert_eq!(saved.watermark(), 2_000);
        assert_eq!(saved.auth.as_deref(), Some("s3cret"));
        let intel = saved.db.intel.unwrap();
        assert_eq!(intel["tables"][0]["table"], "orders");
    }

    #[tokio::test]
    async fn test_watermark_is_taken_when_the_run_starts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let trigger = Trigger::new(&path, dir.path());
        let seen_during_run = Arc::new(AtomicI64::new(0));

        let seen = seen_during_run.clone();
        trigger
            .sync_and_persist_with(config(Some("s3cret")), |config| async move {
                seen.store(now_epoch(), AtomicOrdering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1100)).await;
                Ok(SyncReport::new(config.watermark()))
            })
            .await
            .unwrap();

        let saved = Config::load(&path).await.unwrap();
        assert!(saved.watermark() > 0);
        assert!(saved.watermark() <= seen_during_run.load(AtomicOrdering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_run_leaves_config_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let trigger = Trigger::new(&path, dir.path());

        let result = trigger
            .sync_and_persist_with(config(Some("s3cret")), |_| async {
                Err(anyhow::anyhow!("connection refused"))
            })
            .await;

        assert!(matches!(result, Err(TriggerError::Sync(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_config_is_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let trigger = Trigger::new(dir.path().join("config.json"), dir.path());
        assert!(matches!(
            trigger.run(Some("anything")).await,
            Err(TriggerError::Unauthorized)
        ));
        assert!(matches!(trigger.run_local().await, Err(TriggerError::Config(_))));
    }
}
