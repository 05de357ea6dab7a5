// ABOUTME: MySQL connection endpoint - the Database implementation used in production
// ABOUTME: Table metadata via SHOW TABLE STATUS / SHOW COLUMNS, rows via prepared statements

pub mod dsn;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use mysql_async::prelude::*;
use mysql_async::{Conn, Value};
use std::time::Duration;

use crate::config::EndpointConfig;
use crate::database::Database;
use crate::row::Row;
use crate::table::{TableDescriptor, TableStatus};
use crate::utils::{quote_mysql_ident, retry_with_backoff, sanitize_url};

const CONNECT_RETRIES: u32 = 3;
const CONNECT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// One open MySQL connection, owned by a sync session for the run's duration.
pub struct MySqlDatabase {
    conn: Option<Conn>,
    label: String,
}

impl MySqlDatabase {
    /// Open a connection, retrying with exponential backoff.
    pub async fn connect(endpoint: &EndpointConfig) -> Result<Self> {
        let opts = dsn::build_opts(endpoint)?;
        let label = format!("{} ({})", sanitize_url(&endpoint.dsn), endpoint.db);

        tracing::info!("Connecting to {}", label);
        let conn = retry_with_backoff(
            || {
                let opts = opts.clone();
                async move { Conn::new(opts).await.map_err(anyhow::Error::from) }
            },
            CONNECT_RETRIES,
            CONNECT_INITIAL_DELAY,
        )
        .await
        .with_context(|| format!("Failed to connect to {}", label))?;

        Ok(Self {
            conn: Some(conn),
            label,
        })
    }

    fn conn(&mut self) -> Result<&mut Conn> {
        let label = &self.label;
        self.conn
            .as_mut()
            .ok_or_else(|| anyhow!("Connection to {} is closed", label))
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn table_status(&mut self, database: &str) -> Result<Vec<TableStatus>> {
        let sql = format!("SHOW TABLE STATUS FROM {}", quote_mysql_ident(database));
        let rows: Vec<mysql_async::Row> = self
            .conn()?
            .query(sql)
            .await
            .with_context(|| format!("Failed to read table status of '{}'", database))?;

        rows.into_iter()
            .map(|row| {
                let name: String = row
                    .get("Name")
                    .ok_or_else(|| anyhow!("Table status row without a name"))?;
                let created_at = epoch_seconds(&row.get::<Value, _>("Create_time").unwrap_or(Value::NULL))
                    .with_context(|| format!("Bad Create_time for table '{}'", name))?;
                let updated_at = epoch_seconds(&row.get::<Value, _>("Update_time").unwrap_or(Value::NULL))
                    .with_context(|| format!("Bad Update_time for table '{}'", name))?;
                Ok(TableStatus::new(name, created_at, updated_at))
            })
            .collect()
    }

    async fn describe(&mut self, table: &str) -> Result<Vec<String>> {
        let sql = format!("SHOW COLUMNS FROM {}", quote_mysql_ident(table));
        let rows: Vec<mysql_async::Row> = self
            .conn()?
            .query(sql)
            .await
            .with_context(|| format!("Failed to describe table '{}'", table))?;

        rows.iter()
            .map(|row| {
                row.get::<String, _>("Field")
                    .ok_or_else(|| anyhow!("Column row of '{}' without a field name", table))
            })
            .collect()
    }

    async fn select_batch(
        &mut self,
        table: &TableDescriptor,
        after: Option<&Value>,
        limit: usize,
    ) -> Result<Vec<Row>> {
        let queries = table.queries();
        let limit = Value::UInt(limit as u64);
        let (sql, params) = match after {
            Some(key) => (queries.select_batch_after.as_str(), vec![key.clone(), limit]),
            None => (queries.select_first_batch.as_str(), vec![limit]),
        };

        let rows: Vec<mysql_async::Row> = self
            .conn()?
            .exec(sql, params)
            .await
            .with_context(|| format!("Failed to select from '{}' after {:?}", table.name(), after))?;
        Ok(rows.into_iter().map(Row::from_mysql).collect())
    }

    async fn select_by_key(&mut self, table: &TableDescriptor, key: &Value) -> Result<Option<Row>> {
        let row: Option<mysql_async::Row> = self
            .conn()?
            .exec_first(table.queries().select_by_key.as_str(), vec![key.clone()])
            .await
            .with_context(|| format!("Failed to look up {:?} in '{}'", key, table.name()))?;
        Ok(row.map(Row::from_mysql))
    }

    async fn update_row(&mut self, table: &TableDescriptor, row: &Row) -> Result<u64> {
        let Some(sql) = table.queries().update.as_deref() else {
            return Ok(0);
        };
        let key_index = table.key_index();
        let Some(key) = row.value_at(key_index) else {
            bail!("Row of '{}' has no primary key value", table.name());
        };

        let mut params: Vec<Value> = row.non_key_values(key_index).cloned().collect();
        params.push(key.clone());

        let conn = self.conn()?;
        conn.exec_drop(sql, params)
            .await
            .with_context(|| format!("Failed to update {:?} in '{}'", key, table.name()))?;
        Ok(conn.affected_rows())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.disconnect()
                .await
                .with_context(|| format!("Failed to disconnect from {}", self.label))?;
            tracing::debug!("Disconnected from {}", self.label);
        }
        Ok(())
    }
}

/// Convert an engine timestamp to epoch seconds, reading it as UTC.
///
/// Connections run with a UTC session time zone (see [`dsn::SESSION_INIT`]), so
/// `Create_time`/`Update_time` arrive in UTC. Handles text-protocol strings, binary-protocol dates and integers. `NULL` and
/// MySQL's zero date map to `None`.
pub fn epoch_seconds(value: &Value) -> Result<Option<i64>> {
    match value {
        Value::NULL => Ok(None),
        Value::Int(seconds) => Ok(Some(*seconds)),
        Value::UInt(seconds) => Ok(Some(i64::try_from(*seconds)?)),
        Value::Date(0, 0, 0, ..) => Ok(None),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let datetime = NaiveDate::from_ymd_opt(*year as i32, *month as u32, *day as u32)
                .and_then(|d| d.and_hms_micro_opt(*hour as u32, *minute as u32, *second as u32, *micros))
                .ok_or_else(|| anyhow!("Invalid date {:?}", value))?;
            Ok(Some(datetime.and_utc().timestamp()))
        }
        Value::Bytes(bytes) => {
            let text = std::str::from_utf8(bytes).context("Timestamp is not valid UTF-8")?;
            if text.starts_with("0000-00-00") {
                return Ok(None);
            }
            let datetime = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .with_context(|| format!("Unrecognized timestamp '{}'", text))?;
            Ok(Some(datetime.and_utc().timestamp()))
        }
        other => bail!("Unexpected timestamp value {:?}", other),
    }
}
