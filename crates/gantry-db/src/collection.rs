//! Materialized result sets.
//!
//! A [`RowCollection`] is a read-only snapshot taken while the statement was
//! live; once returned it holds no backend resources. Column lookup is by
//! name and case-insensitive.
//!
//! Typed getters return `Result<Option<T>>`:
//! - `Ok(None)`: the column exists and is NULL
//! - `Err(ColumnNotFound)`: the result set has no such column
//! - `Err(TypeMismatch)`: the stored value cannot be coerced

use std::sync::Arc;

use serde::Serialize;
use serde::ser::SerializeMap;

use crate::errors::{DbError, Result};
use crate::value::Value;

/// One immutable result row.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row. `values` should line up with `columns`; a column with no
    /// value behind it reads as [`DbError::ColumnNotFound`].
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Column names, in result-set order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw values, in result-set order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Raw value for a column.
    pub fn get(&self, column: &str) -> Result<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| DbError::ColumnNotFound(column.to_string()))
    }

    /// Whether a column is NULL.
    pub fn is_null(&self, column: &str) -> Result<bool> {
        Ok(self.get(column)?.is_null())
    }

    /// Text value. Numbers and booleans are rendered as text; blobs must be UTF-8.
    pub fn get_string(&self, column: &str) -> Result<Option<String>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            Value::Integer(i) => Ok(Some(i.to_string())),
            Value::Real(f) => Ok(Some(f.to_string())),
            Value::Bool(b) => Ok(Some(b.to_string())),
            v @ Value::Blob(b) => String::from_utf8(b.clone())
                .map(Some)
                .map_err(|_| mismatch(column, "string", v)),
        }
    }

    /// Integer value. Text is parsed; booleans map to 0/1; reals must be whole.
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    pub fn get_long(&self, column: &str) -> Result<Option<i64>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Integer(i) => Ok(Some(*i)),
            Value::Bool(b) => Ok(Some(i64::from(*b))),
            v @ Value::Real(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Ok(Some(*f as i64))
                } else {
                    Err(mismatch(column, "long", v))
                }
            }
            v @ Value::Text(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| mismatch(column, "long", v)),
            v @ Value::Blob(_) => Err(mismatch(column, "long", v)),
        }
    }

    /// Floating point value. Integers widen; text is parsed.
    #[allow(clippy::cast_precision_loss)]
    pub fn get_double(&self, column: &str) -> Result<Option<f64>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Real(f) => Ok(Some(*f)),
            Value::Integer(i) => Ok(Some(*i as f64)),
            v @ Value::Text(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| mismatch(column, "double", v)),
            v @ (Value::Bool(_) | Value::Blob(_)) => Err(mismatch(column, "double", v)),
        }
    }

    /// Boolean value. Integers are `!= 0`; text accepts `true`/`false`/`1`/`0`.
    pub fn get_boolean(&self, column: &str) -> Result<Option<bool>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            Value::Integer(i) => Ok(Some(*i != 0)),
            v @ Value::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" => Ok(Some(false)),
                _ => Err(mismatch(column, "boolean", v)),
            },
            v @ (Value::Real(_) | Value::Blob(_)) => Err(mismatch(column, "boolean", v)),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

fn mismatch(column: &str, expected: &'static str, found: &Value) -> DbError {
    DbError::TypeMismatch {
        column: column.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Ordered rows returned by a read query. Never null: "no rows" is an
/// empty collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowCollection {
    columns: Arc<[String]>,
    rows: Vec<Row>,
}

impl RowCollection {
    /// Build a collection from column names and row values.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let columns: Arc<[String]> = columns.into();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(columns.clone(), values))
            .collect();
        Self { columns, rows }
    }

    /// Number of rows.
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names, in result-set order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The first row.
    pub fn first(&self) -> Result<&Row> {
        self.rows.first().ok_or(DbError::EmptyResult)
    }

    /// Row at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Iterate rows in result-set order.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl IntoIterator for RowCollection {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowCollection {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
