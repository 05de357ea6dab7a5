// ABOUTME: In-memory Database backend with a statement log
// ABOUTME: Used to exercise the sync core without a MySQL server

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use mysql_async::Value;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::database::Database;
use crate::row::Row;
use crate::table::{TableDescriptor, TableStatus};

/// Every operation the backend was asked to perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    TableStatus(String),
    Describe(String),
    SelectBatch { table: String, after: Option<Value> },
    SelectByKey { table: String, key: Value },
    Update { table: String, values: Vec<Value> },
}

impl Statement {
    /// Table the statement touched, if it is about a single table.
    pub fn table(&self) -> Option<&str> {
        match self {
            Statement::TableStatus(_) => None,
            Statement::Describe(table) => Some(table.as_str()),
            Statement::SelectBatch { table, .. }
            | Statement::SelectByKey { table, .. }
            | Statement::Update { table, .. } => Some(table.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryTable {
    status: TableStatus,
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| anyhow!("Unknown column '{}' in table '{}'", column, self.status.name))
    }
}

/// A database held in memory, keeping tables in insertion order.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: Vec<MemoryTable>,
    log: Vec<Statement>,
    failing_describe: Vec<String>,
    failing_select: Vec<String>,
    failing_updates: Vec<(String, Value)>,
    closed: bool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table. Each row's values line up with `columns`.
    pub fn with_table(
        mut self,
        name: &str,
        updated_at: Option<i64>,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.tables.push(MemoryTable {
            status: TableStatus::new(name, Some(0), updated_at),
            columns: columns
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .into(),
            rows,
        });
        self
    }

    pub fn fail_describe(mut self, table: &str) -> Self {
        self.failing_describe.push(table.to_string());
        self
    }

    pub fn fail_select(mut self, table: &str) -> Self {
        self.failing_select.push(table.to_string());
        self
    }

    pub fn fail_update(mut self, table: &str, key: Value) -> Self {
        self.failing_updates.push((table.to_string(), key));
        self
    }

    pub fn rows(&self, table: &str) -> Option<&[Vec<Value>]> {
        self.table(table).ok().map(|t| t.rows.as_slice())
    }

    pub fn statements(&self) -> &[Statement] {
        &self.log
    }

    pub fn statements_for(&self, table: &str) -> Vec<&Statement> {
        self.log.iter().filter(|s| s.table() == Some(table)).collect()
    }

    pub fn updates(&self) -> Vec<&Statement> {
        self.log
            .iter()
            .filter(|s| matches!(s, Statement::Update { .. }))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            bail!("Connection is closed");
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| t.status.name == name)
            .ok_or_else(|| anyhow!("Table '{}' doesn't exist", name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.tables
            .iter_mut()
            .find(|t| t.status.name == name)
            .ok_or_else(|| anyhow!("Table '{}' doesn't exist", name))
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn table_status(&mut self, database: &str) -> Result<Vec<TableStatus>> {
        self.ensure_open()?;
        self.log.push(Statement::TableStatus(database.to_string()));
        Ok(self.tables.iter().map(|t| t.status.clone()).collect())
    }

    async fn describe(&mut self, table: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.log.push(Statement::Describe(table.to_string()));
        if self.failing_describe.iter().any(|t| t == table) {
            bail!("Describe of '{}' failed", table);
        }
        Ok(self.table(table)?.columns.to_vec())
    }

    async fn select_batch(
        &mut self,
        table: &TableDescriptor,
        after: Option<&Value>,
        limit: usize,
    ) -> Result<Vec<Row>> {
        self.ensure_open()?;
        self.log.push(Statement::SelectBatch {
            table: table.name().to_string(),
            after: after.cloned(),
        });
        if self.failing_select.iter().any(|t| t == table.name()) {
            bail!("Select from '{}' failed", table.name());
        }

        let stored = self.table(table.name())?;
        let key_index = stored.column_index(table.primary_key())?;
        let key_of = |values: &[Value]| values.get(key_index).cloned().unwrap_or(Value::NULL);

        let mut page: Vec<&Vec<Value>> = stored
            .rows
            .iter()
            .filter(|values| match after {
                Some(after) => compare_keys(&key_of(values.as_slice()), after) == Ordering::Greater,
                None => true,
            })
            .collect();
        page.sort_by(|a, b| compare_keys(&key_of(a.as_slice()), &key_of(b.as_slice())));

        page.into_iter()
            .take(limit)
            .map(|values| Row::new(stored.columns.clone(), values.clone()))
            .collect()
    }

    async fn select_by_key(&mut self, table: &TableDescriptor, key: &Value) -> Result<Option<Row>> {
        self.ensure_open()?;
        self.log.push(Statement::SelectByKey {
            table: table.name().to_string(),
            key: key.clone(),
        });
        let stored = self.table(table.name())?;
        let key_index = stored.column_index(table.primary_key())?;
        stored
            .rows
            .iter()
            .find(|values| values.get(key_index) == Some(key))
            .map(|values| Row::new(stored.columns.clone(), values.clone()))
            .transpose()
    }

    async fn update_row(&mut self, table: &TableDescriptor, row: &Row) -> Result<u64> {
        self.ensure_open()?;
        let key_index = table.key_index();
        let key = row
            .value_at(key_index)
            .ok_or_else(|| anyhow!("Row has no primary key value"))?
            .clone();

        let mut values: Vec<Value> = row.non_key_values(key_index).cloned().collect();
        values.push(key.clone());
        self.log.push(Statement::Update {
            table: table.name().to_string(),
            values,
        });

        if self
            .failing_updates
            .iter()
            .any(|(t, k)| t == table.name() && *k == key)
        {
            bail!("Update of {:?} in '{}' failed", key, table.name());
        }

        let stored = self.table_mut(table.name())?;
        let stored_key = stored.column_index(table.primary_key())?;
        let mut targets = Vec::new();
        for column in table.updatable_columns() {
            targets.push(stored.column_index(column)?);
        }

        let mut affected = 0;
        for values in stored.rows.iter_mut() {
            if values.get(stored_key) != Some(&key) {
                continue;
            }
            for (target, value) in targets.iter().zip(row.non_key_values(key_index)) {
                values[*target] = value.clone();
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Order two key values the way `ORDER BY` would for the common key types.
fn compare_keys(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::NULL, Value::NULL) => Ordering::Equal,
        (Value::NULL, _) => Ordering::Less,
        (_, Value::NULL) => Ordering::Greater,
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::UInt(x), Value::UInt(y)) => x.cmp(y),
        (Value::Int(x), Value::UInt(y)) => i128::from(*x).cmp(&i128::from(*y)),
        (Value::UInt(x), Value::Int(y)) => i128::from(*x).cmp(&i128::from(*y)),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        _ => format!("{:?}", a).cmp(&format!("{:?}", b)),
    }
}
