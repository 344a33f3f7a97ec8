//! # pgprobe
//!
//! Correctness probes for Postgres wire-protocol proxies and poolers.
//!
//! A [`Scenario`](scenario::Scenario) opens one session through a
//! [`SessionFactory`](session::SessionFactory), drives one or more
//! [`QueryCycleRunner`](runner::QueryCycleRunner) passes, and closes the
//! session on every exit path. The [`Driver`](driver::Driver) picks scenarios
//! from a [`ScenarioRegistry`](registry::ScenarioRegistry) by name.
//!
//! ## Scenarios
//!
//! - `unsharded`: `SELECT $1::int, $2::text` with `(1, '1')`, 100 times.
//! - `sharded`: `SELECT * FROM sharded WHERE id = $1` per shard key; rows
//!   for any other key mean the proxy misrouted.
//! - `statement_cache`: `SELECT $1` with a new parameter type every time.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pgprobe::{Driver, HarnessConfig, PgSessionFactory, ScenarioRegistry, Selection};
//!
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_all()
//!     .build()?;
//! let driver = Driver::new(
//!     runtime,
//!     ScenarioRegistry::builtin(),
//!     HarnessConfig::default(),
//!     Arc::new(PgSessionFactory::new()),
//! );
//! let reports = driver.run(&Selection::One("unsharded".to_string()))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod query;
pub mod registry;
pub mod runner;
pub mod scenario;
pub mod session;

pub use config::{ConnectionOptions, HarnessConfig, ScenarioSettings, Strictness};
pub use driver::{exit_code, Driver, Selection};
pub use error::{Error, Result};
pub use query::{Expectation, QuerySpec, ResultSet, Value};
pub use registry::ScenarioRegistry;
pub use runner::{PassReport, QueryCycleRunner};
pub use scenario::{execute_scenario, Scenario, ScenarioReport};
#[cfg(feature = "postgres")]
pub use session::PgSessionFactory;
pub use session::{Session, SessionFactory, SessionGuard};
