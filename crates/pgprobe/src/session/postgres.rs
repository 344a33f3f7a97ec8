//! Postgres wire-protocol sessions backed by `sqlx`.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Postgres, Row, TypeInfo};
use tracing::{debug, info};

use super::{session_label, Session, SessionFactory};
use crate::config::ConnectionOptions;
use crate::error::{Error, Result};
use crate::query::{ColumnInfo, QuerySpec, ResultSet, Value};

/// Opens [`PgSession`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgSessionFactory;

impl PgSessionFactory {
    /// Create a new factory.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Map options 1:1 onto the driver's connect options.
fn connect_options(options: &ConnectionOptions) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&options.host)
        .port(options.port)
        .username(&options.user)
        .password(&options.password)
        .database(&options.database)
        .application_name(&options.application_name)
        .statement_cache_capacity(options.statement_cache_size)
}

/// Whether queries are prepared as named statements.
///
/// With the cache disabled sqlx still names and keeps persistent statements
/// on the server, so they must be sent as unnamed ones instead.
fn persistent_statements(options: &ConnectionOptions) -> bool {
    options.statement_cache_size > 0
}

#[async_trait]
impl SessionFactory for PgSessionFactory {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn open(&self, options: &ConnectionOptions) -> Result<Box<dyn Session>> {
        let label = session_label(options);
        info!("Connecting to {}", label);

        let pg_options = connect_options(options);
        let connect = PgConnection::connect_with(&pg_options);
        let conn = match options.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                Error::Connection(format!(
                    "{label}: handshake timed out after {} ms",
                    limit.as_millis()
                ))
            })?,
            None => connect.await,
        }
        .map_err(|e| connect_error(&label, e))?;

        debug!(
            "Connected to {} (statement cache size {})",
            label, options.statement_cache_size
        );
        Ok(Box::new(PgSession {
            conn,
            label,
            persistent: persistent_statements(options),
        }))
    }
}

/// A live `sqlx` connection to the proxy.
pub struct PgSession {
    conn: PgConnection,
    label: String,
    persistent: bool,
}

#[async_trait]
impl Session for PgSession {
    fn label(&self) -> &str {
        &self.label
    }

    async fn execute(&mut self, query: &QuerySpec) -> Result<ResultSet> {
        let mut pending = sqlx::query(&query.sql).persistent(self.persistent);
        for param in &query.params {
            pending = bind_value(pending, param)?;
        }
        let rows = pending.fetch_all(&mut self.conn).await.map_err(query_error)?;
        decode_rows(&rows)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Self { conn, label, .. } = *self;
        conn.close()
            .await
            .map_err(|e| Error::Connection(format!("{label}: close failed: {e}")))
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Result<Query<'q, Postgres, PgArguments>> {
    let query = match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int2(v) => query.bind(*v),
        Value::Int4(v) => query.bind(*v),
        Value::Int8(v) => query.bind(*v),
        Value::Float8(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.clone()),
        Value::Unsupported(name) => {
            return Err(Error::Config(format!("cannot bind a parameter of type {name}")))
        }
    };
    Ok(query)
}

fn decode_rows(rows: &[PgRow]) -> Result<ResultSet> {
    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name().to_string(),
                    type_name: c.type_info().name().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let mut decoded = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(row.len());
        for (idx, column) in row.columns().iter().enumerate() {
            values.push(decode_column(row, idx, column.type_info().name())?);
        }
        decoded.push(values);
    }
    Ok(ResultSet::new(columns, decoded))
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Value> {
    let decoded = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .map(|v| v.map_or(Value::Null, Value::Bool)),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map(|v| v.map_or(Value::Null, Value::Int2)),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map(|v| v.map_or(Value::Null, Value::Int4)),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .map(|v| v.map_or(Value::Null, Value::Int8)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map(|v| v.map_or(Value::Null, |f| Value::Float8(f64::from(f)))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .map(|v| v.map_or(Value::Null, Value::Float8)),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
            .try_get::<Option<String>, _>(idx)
            .map(|v| v.map_or(Value::Null, Value::Text)),
        other => return Ok(Value::Unsupported(other.to_string())),
    };
    decoded.map_err(|e| Error::Protocol(format!("column {idx} ({type_name}): {e}")))
}

fn connect_error(label: &str, err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Configuration(e) => Error::Config(format!("{label}: {e}")),
        other => Error::Connection(format!("{label}: {other}")),
    }
}

fn query_error(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db) => Error::Query {
            iteration: 0,
            sqlstate: db.code().map(|c| c.into_owned()),
            message: db.message().to_string(),
        },
        sqlx::Error::Protocol(msg) => Error::Protocol(msg),
        err @ (sqlx::Error::Decode(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }) => Error::Protocol(err.to_string()),
        other => Error::Query {
            iteration: 0,
            sqlstate: None,
            message: other.to_string(),
        },
    }
}
