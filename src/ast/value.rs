//! Runtime values carried by constants, bound as arguments and returned by
//! backends.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::types::LogicalType;
use crate::compiled::QueryProvider;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    /// Host object with named members.
    Record(BTreeMap<String, Value>),
    List(Vec<Value>),
    /// Materialized query result.
    Rows(RowSet),
    /// A queryable table, optionally bound to the provider that owns it.
    Source(QuerySource),
    Provider(Arc<dyn QueryProvider>),
}

/// Named table reference, bound or unbound.
#[derive(Clone)]
pub struct QuerySource {
    pub table: String,
    pub provider: Option<Arc<dyn QueryProvider>>,
}

impl QuerySource {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            provider: None,
        }
    }

    pub fn bound(table: impl Into<String>, provider: Arc<dyn QueryProvider>) -> Self {
        Self {
            table: table.into(),
            provider: Some(provider),
        }
    }
}

impl PartialEq for QuerySource {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
            && match (&self.provider, &other.provider) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

impl fmt::Debug for QuerySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySource")
            .field("table", &self.table)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

/// Column names plus positional rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Vec<Value> {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().map(|r| r[idx].clone()).collect(),
            None => vec![],
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&RowSet> {
        match self {
            Value::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// The provider this value denotes, directly or through a bound source.
    pub fn bound_provider(&self) -> Option<Arc<dyn QueryProvider>> {
        match self {
            Value::Provider(p) => Some(p.clone()),
            Value::Source(source) => source.provider.clone(),
            _ => None,
        }
    }

    /// Logical type inferred from the value itself.
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(LogicalType::Bool),
            Value::Int(_) => Some(LogicalType::Int64),
            Value::Float(_) => Some(LogicalType::Float64),
            Value::Text(_) => Some(LogicalType::String),
            Value::Bytes(_) => Some(LogicalType::Bytes),
            Value::Date(_) => Some(LogicalType::Date),
            Value::Time(_) => Some(LogicalType::Time),
            Value::DateTime(_) => Some(LogicalType::DateTime),
            Value::Record(_) => Some(LogicalType::Record(String::new())),
            Value::List(_) | Value::Rows(_) => None,
            Value::Source(source) => Some(LogicalType::queryable_of(source.table.clone())),
            Value::Provider(_) => Some(LogicalType::Provider),
        }
    }

    /// SQL comparison: `None` when either side is NULL or the values are not comparable.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) | (Value::Float(_), Value::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used for sorting: NULL sorts first, incomparable values are equal.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => self.sql_cmp(other).unwrap_or(Ordering::Equal),
        }
    }

    pub fn display(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => format!("[{} bytes]", b.len()),
            Value::Date(d) => d.to_string(),
            Value::Time(t) => t.to_string(),
            Value::DateTime(dt) => dt.to_string(),
            Value::Record(fields) => {
                let items: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.display()))
                    .collect();
                format!("{{{}}}", items.join(", "))
            }
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(|v| v.display()).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Rows(rows) => format!("[{} rows]", rows.len()),
            Value::Source(source) => format!("<source {}>", source.table),
            Value::Provider(p) => format!("<provider {}>", p.name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Rows(a), Value::Rows(b)) => a == b,
            (Value::Source(a), Value::Source(b)) => a == b,
            (Value::Provider(a), Value::Provider(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({:?})", b),
            Value::Int(i) => write!(f, "Int({:?})", i),
            Value::Float(x) => write!(f, "Float({:?})", x),
            Value::Text(s) => write!(f, "Text({:?})", s),
            Value::Bytes(b) => write!(f, "Bytes({:?})", b),
            Value::Date(d) => write!(f, "Date({:?})", d),
            Value::Time(t) => write!(f, "Time({:?})", t),
            Value::DateTime(dt) => write!(f, "DateTime({:?})", dt),
            Value::Record(fields) => f.debug_tuple("Record").field(fields).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Rows(rows) => f.debug_tuple("Rows").field(rows).finish(),
            Value::Source(source) => f.debug_tuple("Source").field(source).finish(),
            Value::Provider(p) => write!(f, "Provider({})", p.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<QuerySource> for Value {
    fn from(source: QuerySource) -> Self {
        Value::Source(source)
    }
}

impl From<RowSet> for Value {
    fn from(rows: RowSet) -> Self {
        Value::Rows(rows)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
