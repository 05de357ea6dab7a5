// ABOUTME: Database trait - the operations the sync core needs from one connection
// ABOUTME: Implemented by the MySQL endpoint and by the in-memory backend

use anyhow::Result;
use async_trait::async_trait;
use mysql_async::Value;

use crate::row::Row;
use crate::table::{TableDescriptor, TableStatus};

/// One open connection to one side of a sync run.
///
/// Calls are issued strictly one at a time; every method takes `&mut self`.
/// Row-level methods run the query templates owned by the given descriptor.
#[async_trait]
pub trait Database: Send {
    /// Enumerate tables of `database` in the order the engine reports them.
    async fn table_status(&mut self, database: &str) -> Result<Vec<TableStatus>>;

    /// Column names of `table`, in table order.
    async fn describe(&mut self, table: &str) -> Result<Vec<String>>;

    /// Up to `limit` rows in primary-key order, starting after `after` when given.
    async fn select_batch(
        &mut self,
        table: &TableDescriptor,
        after: Option<&Value>,
        limit: usize,
    ) -> Result<Vec<Row>>;

    /// Point lookup by primary key.
    async fn select_by_key(&mut self, table: &TableDescriptor, key: &Value) -> Result<Option<Row>>;

    /// Write every non-key value of `row` into the row with the same key.
    ///
    /// Returns the number of affected rows.
    async fn update_row(&mut self, table: &TableDescriptor, row: &Row) -> Result<u64>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}
