//! Error types for pgprobe.

use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No scenario registered under the requested name.
    #[error("Unknown scenario '{name}' (known: {known})")]
    UnknownScenario {
        /// Requested name.
        name: String,
        /// Comma-separated list of registered names.
        known: String,
    },

    /// Handshake, authentication or network failure while opening a session.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query rejected by the proxy or a backend.
    #[error("Query error at iteration {iteration}: {message}")]
    Query {
        /// 1-based iteration of the runner pass that failed.
        iteration: usize,
        /// SQLSTATE reported by the server, when there is one.
        sqlstate: Option<String>,
        /// Server or driver message.
        message: String,
    },

    /// Unexpected response from the wire layer.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A result set did not satisfy its expectation.
    #[error("Assertion failed: {0}")]
    Assertion(String),

    /// The scenario exceeded its configured timeout.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// A scenario task panicked or was cancelled.
    #[error("Scenario task failed: {0}")]
    Task(String),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error.
    ///
    /// Connection and query failures get distinct codes because they point at
    /// different proxy subsystems (authentication/pooling versus routing).
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_)
            | Self::UnknownScenario { .. }
            | Self::Yaml(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::Task(_) => 1,
            Self::Connection(_) => 2,
            Self::Query { .. } => 3,
            Self::Protocol(_) => 4,
            Self::Assertion(_) => 5,
            Self::Timeout(_) => 6,
        }
    }

    /// Attach the failing iteration to a query or assertion error.
    #[must_use]
    pub fn at_iteration(self, iteration: usize) -> Self {
        match self {
            Self::Query {
                sqlstate, message, ..
            } => Self::Query {
                iteration,
                sqlstate,
                message,
            },
            Self::Assertion(msg) => Self::Assertion(format!("iteration {iteration}: {msg}")),
            other => other,
        }
    }
}

/// Result type alias for probe operations.
pub type Result<T> = std::result::Result<T, Error>;
