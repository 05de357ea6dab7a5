// ABOUTME: Row differ and replicator - copies changed rows from source to target
// ABOUTME: Update-only: rows missing on the target are counted, never inserted

use anyhow::{anyhow, bail, Context, Result};
use mysql_async::Value;

use crate::database::Database;
use crate::report::TableStats;
use crate::row::Row;
use crate::table::TableDescriptor;

/// Source rows fetched per round trip.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Keyset pagination over one source table, in primary-key order.
///
/// Holds only the last key seen, so memory stays O(batch_size) however large
/// the table is.
#[derive(Debug)]
pub struct BatchReader<'a> {
    table: &'a TableDescriptor,
    last_key: Option<Value>,
    batch_size: usize,
    exhausted: bool,
}

impl<'a> BatchReader<'a> {
    pub fn new(table: &'a TableDescriptor, batch_size: usize) -> Self {
        Self {
            table,
            last_key: None,
            batch_size: batch_size.max(1),
            exhausted: false,
        }
    }

    /// Fetch the next page, or `None` once the table is exhausted.
    pub async fn next_batch<D>(&mut self, db: &mut D) -> Result<Option<Vec<Row>>>
    where
        D: Database + ?Sized,
    {
        if self.exhausted {
            return Ok(None);
        }

        let rows = db
            .select_batch(self.table, self.last_key.as_ref(), self.batch_size)
            .await?;

        // A short page is the last one
        if rows.len() < self.batch_size {
            self.exhausted = true;
        }

        let Some(last) = rows.last() else {
            return Ok(None);
        };
        let key = last
            .value_at(self.table.key_index())
            .cloned()
            .ok_or_else(|| anyhow!("Row of '{}' has no primary key value", self.table.name()))?;
        if self.last_key.as_ref() == Some(&key) {
            bail!(
                "Primary key of '{}' did not advance past {:?}",
                self.table.name(),
                key
            );
        }
        self.last_key = Some(key);

        Ok(Some(rows))
    }
}

/// Replicate one table pair, row by row.
///
/// Pages through the source in primary-key order, looks each key up on the
/// target, and issues a single-row update binding the source row's values when
/// any non-key column differs. Each row is looked up, compared and (maybe)
/// written before the next one is processed.
///
/// # Errors
///
/// Fails when the pair's layouts differ or a source page cannot be read.
/// A failed lookup or update is logged, counted in `rows_failed`, and skipped.
pub async fn replicate<S, T>(
    source: &mut S,
    source_table: &TableDescriptor,
    target: &mut T,
    target_table: &TableDescriptor,
    batch_size: usize,
) -> Result<TableStats>
where
    S: Database + ?Sized,
    T: Database + ?Sized,
{
    if !source_table.same_layout(target_table) {
        bail!(
            "Column layout of '{}' differs between source {:?} and target {:?}",
            source_table.name(),
            source_table.columns(),
            target_table.columns()
        );
    }

    let name = source_table.name();
    let key_index = source_table.key_index();
    let mut stats = TableStats::default();
    let mut reader = BatchReader::new(source_table, batch_size);
    let mut batch_count = 0u64;

    while let Some(rows) = reader.next_batch(source).await.with_context(|| {
        format!(
            "Failed to read rows from source table '{}' after {} rows",
            name, stats.rows_read
        )
    })? {
        batch_count += 1;
        tracing::debug!("Comparing batch {} of '{}' ({} rows)", batch_count, name, rows.len());

        for row in rows {
            stats.rows_read += 1;

            let Some(key) = row.value_at(key_index) else {
                tracing::warn!("Row of '{}' has no primary key value, skipping", name);
                stats.rows_failed += 1;
                continue;
            };

            let existing = match target.select_by_key(target_table, key).await {
                Ok(Some(existing)) => existing,
                Ok(None) => {
                    tracing::debug!("No row with {:?} in target '{}', not inserting", key, name);
                    stats.rows_missing += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Lookup of {:?} in target '{}' failed: {:#}", key, name, e);
                    stats.rows_failed += 1;
                    continue;
                }
            };

            let Some(column) = row.first_difference(&existing, key_index) else {
                stats.rows_unchanged += 1;
                continue;
            };

            tracing::trace!(
                "Row {:?} of '{}' differs in column '{}'",
                key,
                name,
                source_table.columns().get(column).map(String::as_str).unwrap_or("?")
            );

            match target.update_row(target_table, &row).await {
                Ok(_) => stats.rows_updated += 1,
                Err(e) => {
                    tracing::warn!("Update of {:?} in target '{}' failed: {:#}", key, name, e);
                    stats.rows_failed += 1;
                }
            }
        }
    }

    Ok(stats)
}
