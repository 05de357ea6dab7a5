// ABOUTME: Table descriptor - schema metadata for one table plus its query templates
// ABOUTME: Every descriptor owns its own select/lookup/update statements

use anyhow::{bail, Result};

use crate::utils::quote_mysql_ident;

/// Engine-level metadata for one table, as reported by the table-status query.
///
/// Timestamps are epoch seconds (UTC). The engine may report no update time at
/// all (e.g. InnoDB after a restart), which is kept as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub name: String,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl TableStatus {
    pub fn new(name: impl Into<String>, created_at: Option<i64>, updated_at: Option<i64>) -> Self {
        Self {
            name: name.into(),
            created_at,
            updated_at,
        }
    }
}

/// SQL templates derived from a descriptor's columns.
///
/// Batches are keyset pages in primary-key order: the first page has no lower
/// bound, every later one starts after the last key seen. `update` is `None`
/// when the table has nothing but its key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQueries {
    pub select_first_batch: String,
    pub select_batch_after: String,
    pub select_by_key: String,
    pub update: Option<String>,
}

impl TableQueries {
    fn build(name: &str, columns: &[String], key_index: usize) -> Self {
        let table = quote_mysql_ident(name);
        let key = quote_mysql_ident(&columns[key_index]);
        let column_list = columns
            .iter()
            .map(|c| quote_mysql_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key_index)
            .map(|(_, c)| format!("{} = ?", quote_mysql_ident(c)))
            .collect();

        let update = if assignments.is_empty() {
            None
        } else {
            Some(format!(
                "UPDATE {} SET {} WHERE {} = ?",
                table,
                assignments.join(", "),
                key
            ))
        };

        Self {
            select_first_batch: format!(
                "SELECT {} FROM {} ORDER BY {} LIMIT ?",
                column_list, table, key
            ),
            select_batch_after: format!(
                "SELECT {} FROM {} WHERE {} > ? ORDER BY {} LIMIT ?",
                column_list, table, key, key
            ),
            select_by_key: format!("SELECT {} FROM {} WHERE {} = ?", column_list, table, key),
            update,
        }
    }
}

/// Schema of one table in one catalog.
///
/// Immutable after construction. The primary key is an explicit column name;
/// when no override is configured it is the first introspected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    status: TableStatus,
    columns: Vec<String>,
    key_index: usize,
    queries: TableQueries,
}

impl TableDescriptor {
    /// Build a descriptor from table status and introspected columns.
    ///
    /// # Errors
    ///
    /// Fails if the table has no columns or if `primary_key` names a column the
    /// table does not have.
    pub fn new(status: TableStatus, columns: Vec<String>, primary_key: Option<&str>) -> Result<Self> {
        if columns.is_empty() {
            bail!("Table '{}' has no columns", status.name);
        }

        let key_index = match primary_key {
            Some(key) => match columns.iter().position(|c| c == key) {
                Some(index) => index,
                None => bail!(
                    "Configured primary key '{}' is not a column of table '{}'",
                    key,
                    status.name
                ),
            },
            None => 0,
        };

        let queries = TableQueries::build(&status.name, &columns, key_index);

        Ok(Self {
            status,
            columns,
            key_index,
            queries,
        })
    }

    pub fn name(&self) -> &str {
        &self.status.name
    }

    pub fn created_at(&self) -> Option<i64> {
        self.status.created_at
    }

    pub fn updated_at(&self) -> Option<i64> {
        self.status.updated_at
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn primary_key(&self) -> &str {
        &self.columns[self.key_index]
    }

    pub fn key_index(&self) -> usize {
        self.key_index
    }

    /// Columns written by an update: everything except the primary key.
    pub fn updatable_columns(&self) -> impl Iterator<Item = &String> {
        self.columns
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.key_index)
            .map(|(_, c)| c)
    }

    pub fn queries(&self) -> &TableQueries {
        &self.queries
    }

    /// True when both tables have the same columns in the same order and the same key.
    pub fn same_layout(&self, other: &TableDescriptor) -> bool {
        self.columns == other.columns && self.key_index == other.key_index
    }
}
