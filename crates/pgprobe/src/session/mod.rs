//! Client sessions against the proxy under test.

mod guard;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;

use crate::config::ConnectionOptions;
use crate::error::Result;
use crate::query::{QuerySpec, ResultSet};

pub use guard::SessionGuard;
#[cfg(feature = "postgres")]
pub use postgres::{PgSession, PgSessionFactory};

/// One open, authenticated connection to the proxy.
///
/// Owned by exactly one scenario. `close` consumes the session, so it can't be
/// used after release.
#[async_trait]
pub trait Session: Send {
    /// Short label for logs (`user@host:port/db`).
    fn label(&self) -> &str;

    /// Bind `query.params` positionally, run the query and collect every row.
    ///
    /// Query errors carry iteration `0`; the runner fills in the real index.
    async fn execute(&mut self, query: &QuerySpec) -> Result<ResultSet>;

    /// Terminate the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens sessions. Performs no retries.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Name of the client backend (`"postgres"`).
    fn backend(&self) -> &'static str;

    /// Connect and complete the startup handshake.
    async fn open(&self, options: &ConnectionOptions) -> Result<Box<dyn Session>>;
}

/// Label used for a session opened with `options`.
#[must_use]
pub fn session_label(options: &ConnectionOptions) -> String {
    format!(
        "{}@{}/{}",
        options.user,
        options.endpoint(),
        options.database
    )
}
