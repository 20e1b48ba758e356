//! Portable scalar values crossing the source/target boundary.
//!
//! Every cell read from the source is normalized into a [`SqlValue`] before it
//! reaches the transfer engine, so the insert path never inspects driver types.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Format used when a timestamp is bound on the target.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Closed set of scalar values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Timestamp rendered the way it is bound on the target.
    pub fn timestamp_string(ts: &NaiveDateTime) -> String {
        ts.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Exact decimal view of numeric-looking values.
    ///
    /// Text is parsed, so a source `DECIMAL` returned as digits and a target
    /// `DECIMAL` returned as bytes compare by value (`12.5 == 12.5000`).
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SqlValue::Integer(i) => Some(Decimal::from(*i)),
            SqlValue::Float(f) => Decimal::try_from(*f).ok(),
            SqlValue::Boolean(b) => Some(Decimal::from(*b as i64)),
            SqlValue::Text(s) => {
                let s = s.trim();
                Decimal::from_str(s)
                    .or_else(|_| Decimal::from_scientific(s))
                    .ok()
            }
            SqlValue::Null | SqlValue::Timestamp(_) => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(i) => Some(*i as f64),
            SqlValue::Float(f) => Some(*f),
            SqlValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Null | SqlValue::Timestamp(_) => None,
        }
    }

    /// Value equality across engines: numbers compare by value regardless of
    /// how each driver represents them.
    ///
    /// When either side is a `Float` the comparison is done in `f64`, since
    /// converting a double to a decimal rounds away its last digits.
    pub fn same_value(&self, other: &SqlValue) -> bool {
        if matches!(self, SqlValue::Float(_)) || matches!(other, SqlValue::Float(_)) {
            if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
                return a == b;
            }
        }
        if let (Some(a), Some(b)) = (self.as_decimal(), other.as_decimal()) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a == b;
        }
        self == other
    }

    /// Short rendering for diagnostics. Strings longer than 50 characters
    /// keep their first 47 followed by `...`.
    pub fn preview(&self) -> String {
        match self {
            SqlValue::Text(s) if s.chars().count() > 50 => {
                let head: String = s.chars().take(47).collect();
                format!("{:?}", format!("{}...", head))
            }
            SqlValue::Text(s) => format!("{:?}", s),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Boolean(b) => write!(f, "{}", b),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Timestamp(ts) => f.write_str(&SqlValue::timestamp_string(ts)),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Boolean(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// A single row of normalized values, in column order.
pub type Row = Vec<SqlValue>;

/// One page of rows fetched from the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
}

impl Page {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// MIN/MAX of one column. Both are `Null` when the column holds no values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extremes {
    pub min: SqlValue,
    pub max: SqlValue,
}

impl Extremes {
    pub fn matches(&self, other: &Extremes) -> bool {
        self.min.same_value(&other.min) && self.max.same_value(&other.max)
    }
}
