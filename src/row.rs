// ABOUTME: Row codec - one record as an ordered column-name to value mapping
// ABOUTME: Positional comparison helpers used by the row differ

use anyhow::{bail, Result};
use mysql_async::Value;
use std::sync::Arc;

/// One database record: column names in table order, paired positionally with values.
///
/// Column names are shared between all rows of a result set. Rows are transient:
/// they live for one read-compare-update cycle and are dropped afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row from shared column names and values in the same order.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Result<Self> {
        if columns.len() != values.len() {
            bail!(
                "Row has {} values but {} columns",
                values.len(),
                columns.len()
            );
        }
        Ok(Self { columns, values })
    }

    /// Convenience constructor, mostly for tests and the in-memory backend.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(c, v)| (c.into(), v)).unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Convert a driver row, keeping the column order reported by the server.
    pub fn from_mysql(row: mysql_async::Row) -> Self {
        let columns: Arc<[String]> = row
            .columns_ref()
            .iter()
            .map(|c| c.name_str().into_owned())
            .collect::<Vec<_>>()
            .into();
        Self {
            columns,
            values: row.unwrap(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Values of every column except the one at `key_index`, in column order.
    pub fn non_key_values(&self, key_index: usize) -> impl Iterator<Item = &Value> {
        self.values
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != key_index)
            .map(|(_, v)| v)
    }

    /// Position of the first non-key column whose value differs from `other`.
    ///
    /// Comparison is positional and strict: `Int(1)` and `UInt(1)` differ, and so
    /// do `Bytes("1")` and `Int(1)`. A column missing on either side counts as a
    /// difference. Returns `None` when the rows are equal outside the key.
    pub fn first_difference(&self, other: &Row, key_index: usize) -> Option<usize> {
        let width = self.values.len().max(other.values.len());
        (0..width)
            .filter(|i| *i != key_index)
            .find(|&i| self.values.get(i) != other.values.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, email: &str, age: Value) -> Row {
        Row::from_pairs([
            ("id", Value::Int(id)),
            ("email", Value::Bytes(email.as_bytes().to_vec())),
            ("age", age),
        ])
    }

    #[test]
    fn test_new_rejects_width_mismatch() {
        let columns: Arc<[String]> = vec!["id".to_string(), "name".to_string()].into();
        assert!(Row::new(columns.clone(), vec![Value::Int(1)]).is_err());
        assert!(Row::new(columns, vec![Value::Int(1), Value::NULL]).is_ok());
    }

    #[test]
    fn test_get_by_name_and_position() {
        let row = user(7, "a@example.com", Value::Int(30));
        assert_eq!(row.get("id"), Some(&Value::Int(7)));
        assert_eq!(row.value_at(2), Some(&Value::Int(30)));
        assert!(row.get("missing").is_none());
        assert_eq!(row.columns(), ["id", "email", "age"]);
    }

    #[test]
    fn test_equal_rows_have_no_difference() {
        let a = user(1, "a@example.com", Value::Int(30));
        let b = user(1, "a@example.com", Value::Int(30));
        assert_eq!(a.first_difference(&b, 0), None);
    }

    #[test]
    fn test_difference_reports_first_dirty_column() {
        let a = user(1, "a@example.com", Value::Int(30));
        let b = user(1, "b@example.com", Value::Int(31));
        assert_eq!(a.first_difference(&b, 0), Some(1));
    }

    #[test]
    fn test_key_column_is_ignored() {
        let a = user(1, "a@example.com", Value::Int(30));
        let b = user(2, "a@example.com", Value::Int(30));
        assert_eq!(a.first_difference(&b, 0), None);
    }

    #[test]
    fn test_comparison_is_type_strict() {
        let a = user(1, "a@example.com", Value::Int(30));
        let b = user(1, "a@example.com", Value::UInt(30));
        assert_eq!(a.first_difference(&b, 0), Some(2));

        let c = user(1, "a@example.com", Value::NULL);
        assert_eq!(a.first_difference(&c, 0), Some(2));
    }

    #[test]
    fn test_shorter_row_is_dirty() {
        let a = user(1, "a@example.com", Value::Int(30));
        let b = Row::from_pairs([
            ("id", Value::Int(1)),
            ("email", Value::Bytes(b"a@example.com".to_vec())),
        ]);
        assert_eq!(a.first_difference(&b, 0), Some(2));
    }

    #[test]
    fn test_non_key_values_skip_key() {
        let row = user(1, "a@example.com", Value::Int(30));
        let values: Vec<&Value> = row.non_key_values(0).collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1], &Value::Int(30));
    }
}
