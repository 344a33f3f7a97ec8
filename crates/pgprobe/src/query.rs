//! Query specs, typed values and result sets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Strictness;
use crate::error::{Error, Result};

/// A bind parameter or decoded column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float8(f64),
    Text(String),
    /// Column of a type the harness doesn't decode; holds the type name.
    Unsupported(String),
}

impl Value {
    /// Integer view across the integer widths.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int2(v) => Some(i64::from(*v)),
            Self::Int4(v) => Some(i64::from(*v)),
            Self::Int8(v) => Some(*v),
            _ => None,
        }
    }

    /// Equality that ignores integer width, so `Int4(1)` matches `Int8(1)`.
    #[must_use]
    pub fn matches(&self, other: &Value) -> bool {
        match (self.as_i64(), other.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Postgres type name this value binds as.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOL",
            Self::Int2(_) => "INT2",
            Self::Int4(_) => "INT4",
            Self::Int8(_) => "INT8",
            Self::Float8(_) => "FLOAT8",
            Self::Text(_) => "TEXT",
            Self::Unsupported(name) => name,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int2(v) => write!(f, "{v}"),
            Self::Int4(v) => write!(f, "{v}"),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Float8(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Unsupported(name) => write!(f, "<{name}>"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int4(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int8(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float8(v)
    }
}

/// Name and type of one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
}

/// Rows returned by one query execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Empty when no rows came back; the driver only describes columns per row.
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Build a result set from column metadata and rows.
    #[must_use]
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows came back.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the column named `name`.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Structural summary used for idempotence checks.
    #[must_use]
    pub fn shape(&self) -> ResultShape {
        ResultShape {
            columns: self.columns.clone(),
            rows: self.rows.len(),
        }
    }
}

/// Column layout and row count of a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultShape {
    pub columns: Vec<ColumnInfo>,
    pub rows: usize,
}

/// Expected-shape contract for a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expectation {
    row_count: Option<usize>,
    arity: Option<usize>,
    exact_rows: Option<Vec<Vec<Value>>>,
    key_filter: Option<(String, Value)>,
}

impl Expectation {
    /// Accept any result.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Require exactly `n` rows.
    #[must_use]
    pub fn row_count(mut self, n: usize) -> Self {
        self.row_count = Some(n);
        self
    }

    /// Require every row to have `n` columns.
    #[must_use]
    pub fn arity(mut self, n: usize) -> Self {
        self.arity = Some(n);
        self
    }

    /// Require exactly one row equal to `row`.
    #[must_use]
    pub fn single_row(self, row: Vec<Value>) -> Self {
        let arity = row.len();
        self.row_count(1).arity(arity).exact_rows(vec![row])
    }

    /// Require the rows to equal `rows`, in order.
    #[must_use]
    pub fn exact_rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        self.exact_rows = Some(rows);
        self
    }

    /// Require `column == value` on every returned row.
    #[must_use]
    pub fn key_equals(mut self, column: impl Into<String>, value: Value) -> Self {
        self.key_filter = Some((column.into(), value));
        self
    }

    /// Validate `result` at the given strictness.
    pub fn check(&self, result: &ResultSet, strictness: Strictness) -> Result<()> {
        if strictness == Strictness::Liveness {
            return Ok(());
        }

        if let Some(expected) = self.row_count {
            if result.len() != expected {
                return Err(Error::Assertion(format!(
                    "expected {expected} row(s), got {}",
                    result.len()
                )));
            }
        }
        if let Some(arity) = self.arity {
            if let Some((i, row)) = result.rows.iter().enumerate().find(|(_, r)| r.len() != arity) {
                return Err(Error::Assertion(format!(
                    "row {i} has {} column(s), expected {arity}",
                    row.len()
                )));
            }
        }

        if strictness == Strictness::Shape {
            return Ok(());
        }

        if let Some(expected) = &self.exact_rows {
            check_exact_rows(expected, &result.rows)?;
        }
        if let Some((column, value)) = &self.key_filter {
            check_key_filter(result, column, value)?;
        }
        Ok(())
    }
}

fn check_exact_rows(expected: &[Vec<Value>], actual: &[Vec<Value>]) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(Error::Assertion(format!(
            "expected {} row(s), got {}",
            expected.len(),
            actual.len()
        )));
    }
    for (i, (want, got)) in expected.iter().zip(actual).enumerate() {
        let equal = want.len() == got.len() && want.iter().zip(got).all(|(w, g)| w.matches(g));
        if !equal {
            return Err(Error::Assertion(format!(
                "row {i} mismatch: expected ({}), got ({})",
                render_row(want),
                render_row(got)
            )));
        }
    }
    Ok(())
}

fn check_key_filter(result: &ResultSet, column: &str, value: &Value) -> Result<()> {
    if result.is_empty() {
        return Ok(());
    }
    let idx = result.column_index(column).ok_or_else(|| {
        Error::Protocol(format!("result set has no column named '{column}'"))
    })?;
    for (i, row) in result.rows.iter().enumerate() {
        match row.get(idx) {
            Some(got) if got.matches(value) => {}
            Some(got) => {
                return Err(Error::Assertion(format!(
                    "row {i} has {column} = {got}, expected {value} (misrouted?)"
                )))
            }
            None => {
                return Err(Error::Protocol(format!(
                    "row {i} is shorter than the column list"
                )))
            }
        }
    }
    Ok(())
}

fn render_row(row: &[Value]) -> String {
    row.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// SQL text, positional parameters and the contract the result must meet.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub sql: String,
    pub params: Vec<Value>,
    pub expectation: Expectation,
}

impl QuerySpec {
    /// A query with no parameters that accepts any result.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            expectation: Expectation::any(),
        }
    }

    /// Append a positional parameter (`$1`, `$2`, ... in order).
    #[must_use]
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Set the result contract.
    #[must_use]
    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectation = expectation;
        self
    }
}
