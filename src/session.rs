// ABOUTME: Sync session - owns both connections and catalogs for one run
// ABOUTME: Matches tables, gates them on staleness and replicates the stale ones

use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::database::Database;
use crate::mysql::MySqlDatabase;
use crate::replicator::{replicate, DEFAULT_BATCH_SIZE};
use crate::report::{SkippedEntry, SyncReport, TableOutcome};
use crate::staleness::needs_sync;

/// One sync run between a left (source) and right (target) database.
///
/// The session owns both connections; [`SyncSession::run`] always closes them,
/// including when the run fails part-way.
pub struct SyncSession<L: Database, R: Database> {
    left: L,
    right: R,
    left_catalog: Catalog,
    right_catalog: Catalog,
    watermark: i64,
    batch_size: usize,
}

impl<L: Database, R: Database> SyncSession<L, R> {
    /// Build both catalogs. On failure both connections are closed before returning.
    pub async fn open(
        mut left: L,
        left_database: &str,
        mut right: R,
        right_database: &str,
        primary_keys: &BTreeMap<String, String>,
        watermark: i64,
    ) -> Result<Self> {
        let catalogs = async {
            let left_catalog = Catalog::load(&mut left, left_database, primary_keys)
                .await
                .context("Failed to build left catalog")?;
            let right_catalog = Catalog::load(&mut right, right_database, primary_keys)
                .await
                .context("Failed to build right catalog")?;
            anyhow::Ok((left_catalog, right_catalog))
        }
        .await;

        match catalogs {
            Ok((left_catalog, right_catalog)) => Ok(Self {
                left,
                right,
                left_catalog,
                right_catalog,
                watermark,
                batch_size: DEFAULT_BATCH_SIZE,
            }),
            Err(e) => {
                close_quietly(&mut left, "left").await;
                close_quietly(&mut right, "right").await;
                Err(e)
            }
        }
    }

    /// Rows fetched from the source per page.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn left_catalog(&self) -> &Catalog {
        &self.left_catalog
    }

    pub fn right_catalog(&self) -> &Catalog {
        &self.right_catalog
    }

    /// Replicate every stale table pair, strictly one table at a time.
    pub async fn sync(&mut self) -> SyncReport {
        let start = std::time::Instant::now();
        let mut report = SyncReport::new(self.watermark);
        report.skipped_left = self.left_catalog.skipped().iter().map(SkippedEntry::from).collect();
        report.skipped_right = self.right_catalog.skipped().iter().map(SkippedEntry::from).collect();

        for left_table in self.left_catalog.tables() {
            let name = left_table.name();

            let Some(right_table) = self.right_catalog.find(name) else {
                tracing::info!("Skipping '{}': not present in target", name);
                report.push(name, TableOutcome::Absent);
                continue;
            };

            if !needs_sync(left_table, right_table, self.watermark) {
                tracing::debug!("'{}' is up to date", name);
                report.push(name, TableOutcome::UpToDate);
                continue;
            }

            if !left_table.same_layout(right_table) {
                tracing::error!(
                    "Not replicating '{}': columns differ (source {:?}, target {:?})",
                    name,
                    left_table.columns(),
                    right_table.columns()
                );
                report.push(
                    name,
                    TableOutcome::ColumnMismatch {
                        left: left_table.columns().to_vec(),
                        right: right_table.columns().to_vec(),
                    },
                );
                continue;
            }

            let replicated = replicate(
                &mut self.left,
                left_table,
                &mut self.right,
                right_table,
                self.batch_size,
            )
            .await;
            match replicated {
                Ok(stats) => {
                    tracing::info!(
                        "Replicated '{}': {} rows read, {} updated, {} missing in target, {} failed",
                        name,
                        stats.rows_read,
                        stats.rows_updated,
                        stats.rows_missing,
                        stats.rows_failed
                    );
                    report.push(name, TableOutcome::Replicated(stats));
                }
                Err(e) => {
                    // Log with :? to show full error chain including root cause
                    tracing::error!("Failed to replicate '{}': {:?}", name, e);
                    report.push(
                        name,
                        TableOutcome::Failed {
                            error: format!("{:#}", e),
                        },
                    );
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Close both connections. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        let left = self.left.close().await.context("Failed to close left connection");
        let right = self.right.close().await.context("Failed to close right connection");
        left.and(right)
    }

    /// Sync, then close both connections regardless of the outcome.
    pub async fn run(mut self) -> SyncReport {
        let report = self.sync().await;
        if let Err(e) = self.close().await {
            tracing::warn!("{:#}", e);
        }
        report
    }

    /// Hand the connections back, e.g. to inspect them after a run.
    pub fn into_parts(self) -> (L, R) {
        (self.left, self.right)
    }
}

async fn close_quietly<D: Database>(db: &mut D, side: &str) {
    if let Err(e) = db.close().await {
        tracing::warn!("Failed to close {} connection: {:#}", side, e);
    }
}

/// Run one sync from configuration: connect both sides, replicate, disconnect.
///
/// Errors here are fatal to the run (connection or catalog failures); the caller
/// must not advance the watermark. Table- and row-level problems are in the report.
pub async fn run_sync(config: &Config) -> Result<SyncReport> {
    let db = &config.db;

    let mut left = MySqlDatabase::connect(&db.left)
        .await
        .context("Failed to open left database")?;
    let right = match MySqlDatabase::connect(&db.right).await {
        Ok(right) => right,
        Err(e) => {
            close_quietly(&mut left, "left").await;
            return Err(e.context("Failed to open right database"));
        }
    };

    let session = SyncSession::open(
        left,
        &db.left.db,
        right,
        &db.right.db,
        &db.primary_keys,
        config.watermark(),
    )
    .await?
    .with_batch_size(db.batch_size.unwrap_or(DEFAULT_BATCH_SIZE));

    let report = session.run().await;
    tracing::info!(
        "Sync finished: {} of {} tables replicated, {} rows updated in {}ms",
        report.tables_replicated(),
        report.tables.len(),
        report.totals().rows_updated,
        report.duration_ms
    );
    Ok(report)
}
