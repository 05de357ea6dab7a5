// ABOUTME: Table catalog - every table of one connection, with name lookup
// ABOUTME: Lookup follows the other side's order first and falls back to a full scan

use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::database::Database;
use crate::table::TableDescriptor;

/// A table that was left out of the catalog because introspection failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTable {
    pub table: String,
    pub reason: String,
}

/// Ordered set of table descriptors discovered on one connection.
///
/// Order is whatever the engine's table-status query returned. Two catalogs are
/// usually congruent, so `find` keeps a cursor one past the last match and
/// probes there before scanning.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Vec<TableDescriptor>,
    skipped: Vec<SkippedTable>,
    cursor: usize,
}

impl Catalog {
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        Self {
            tables,
            skipped: Vec::new(),
            cursor: 0,
        }
    }

    /// Build the catalog for `database` on `db`.
    ///
    /// A table whose columns cannot be introspected is skipped and recorded in
    /// [`Catalog::skipped`]; only a failure to list tables at all is an error.
    /// `primary_keys` maps table names to an explicit primary-key column.
    pub async fn load<D>(
        db: &mut D,
        database: &str,
        primary_keys: &BTreeMap<String, String>,
    ) -> Result<Self>
    where
        D: Database + ?Sized,
    {
        let statuses = db
            .table_status(database)
            .await
            .with_context(|| format!("Failed to list tables of database '{}'", database))?;

        let mut tables = Vec::with_capacity(statuses.len());
        let mut skipped = Vec::new();

        for status in statuses {
            let name = status.name.clone();
            let columns = match db.describe(&name).await {
                Ok(columns) => columns,
                Err(e) => {
                    tracing::warn!("Skipping table '{}': failed to describe: {:#}", name, e);
                    skipped.push(SkippedTable {
                        table: name,
                        reason: format!("{:#}", e),
                    });
                    continue;
                }
            };

            let key = primary_keys.get(&name).map(String::as_str);
            match TableDescriptor::new(status, columns, key) {
                Ok(table) => tables.push(table),
                Err(e) => {
                    tracing::warn!("Skipping table '{}': {:#}", name, e);
                    skipped.push(SkippedTable {
                        table: name,
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        tracing::info!(
            "Found {} tables in database '{}' ({} skipped)",
            tables.len(),
            database,
            skipped.len()
        );

        Ok(Self {
            tables,
            skipped,
            cursor: 0,
        })
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn skipped(&self) -> &[SkippedTable] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Resolve a table by name.
    ///
    /// Probes the cursor position, then the one after it, then scans from the
    /// start. A hit moves the cursor past the matched table.
    pub fn find(&mut self, name: &str) -> Option<&TableDescriptor> {
        let index = self.position(name)?;
        self.cursor = index + 1;
        self.tables.get(index)
    }

    fn position(&self, name: &str) -> Option<usize> {
        let is_match = |i: usize| self.tables.get(i).is_some_and(|t| t.name() == name);

        if is_match(self.cursor) {
            return Some(self.cursor);
        }
        if is_match(self.cursor + 1) {
            return Some(self.cursor + 1);
        }
        self.tables.iter().position(|t| t.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableStatus;

    fn catalog(names: &[&str]) -> Catalog {
        Catalog::new(
            names
                .iter()
                .map(|n| {
                    TableDescriptor::new(
                        TableStatus::new(*n, None, None),
                        vec!["id".to_string()],
                        None,
                    )
                    .unwrap()
                })
                .collect(),
        )
    }

    #[test]
    fn test_congruent_order_walks_the_cursor() {
        let mut right = catalog(&["a", "b", "c"]);
        for name in ["a", "b", "c"] {
            assert_eq!(right.find(name).map(|t| t.name()), Some(name));
        }
        assert_eq!(right.cursor, 3);
    }

    #[test]
    fn test_next_position_probe() {
        // "b" is missing on the left, so the right side is one ahead each time.
        let mut right = catalog(&["a", "b", "c", "d"]);
        assert!(right.find("a").is_some());
        assert_eq!(right.find("c").map(|t| t.name()), Some("c"));
        assert_eq!(right.cursor, 3);
        assert_eq!(right.find("d").map(|t| t.name()), Some("d"));
    }

    #[test]
    fn test_fallback_scan_on_reordered_catalog() {
        let mut right = catalog(&["d", "c", "b", "a"]);
        for name in ["a", "b", "c", "d"] {
            assert_eq!(right.find(name).map(|t| t.name()), Some(name));
        }
    }

    #[test]
    fn test_missing_name_is_not_found() {
        let mut right = catalog(&["a", "b"]);
        assert!(right.find("logs").is_none());
        assert!(right.find("a").is_some());
        assert!(right.find("logs").is_none());
    }

    #[test]
    fn test_miss_leaves_cursor_alone() {
        let mut right = catalog(&["a", "b", "c"]);
        assert!(right.find("a").is_some());
        assert!(right.find("zzz").is_none());
        assert_eq!(right.cursor, 1);
        assert_eq!(right.find("b").map(|t| t.name()), Some("b"));
    }

    #[test]
    fn test_empty_catalog() {
        let mut right = Catalog::default();
        assert!(right.is_empty());
        assert!(right.find("a").is_none());
    }

    #[test]
    fn test_every_permutation_of_small_catalog() {
        let names = ["a", "b", "c", "d"];
        let mut orders = vec![Vec::new()];
        for _ in 0..names.len() {
            let mut next = Vec::new();
            for order in &orders {
                for name in names {
                    if !order.contains(&name) {
                        let mut extended = order.clone();
                        extended.push(name);
                        next.push(extended);
                    }
                }
            }
            orders = next;
        }
        assert_eq!(orders.len(), 24);

        for order in orders {
            let mut right = catalog(&order);
            for name in names {
                assert_eq!(right.find(name).map(|t| t.name()), Some(name));
            }
            assert!(right.find("absent").is_none());
        }
    }
}
