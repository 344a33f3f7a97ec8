//! Same SQL text, different parameter types on every execution.
//!
//! With the client statement cache disabled each execution is prepared
//! afresh, so a proxy that caches plans by query text alone will return a
//! type mismatch on the second iteration.

use std::time::Duration;

use async_trait::async_trait;

use super::Scenario;
use crate::config::{ConnectionOptions, HarnessConfig, DEFAULT_CREDENTIAL};
use crate::error::Result;
use crate::query::{Expectation, QuerySpec, Value};
use crate::runner::{PassReport, QueryCycleRunner};
use crate::session::Session;

/// Query text shared by every iteration.
pub const TYPE_CYCLE_QUERY: &str = "SELECT $1";

const NAME: &str = "statement_cache";
const DEFAULT_REPEAT: usize = 8;

/// Cycles `SELECT $1` through int8, text, float8 and bool parameters.
pub struct StatementCacheScenario {
    options: ConnectionOptions,
    runner: QueryCycleRunner,
    repeat: usize,
    timeout: Option<Duration>,
}

impl StatementCacheScenario {
    /// Build from the harness configuration.
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        let settings = config.settings(NAME);
        let database = settings.database.as_deref().unwrap_or(DEFAULT_CREDENTIAL);
        Self {
            options: config.endpoint.connection_options(database),
            runner: QueryCycleRunner::new(config.strictness_for(NAME)),
            repeat: settings.repeat.unwrap_or(DEFAULT_REPEAT),
            timeout: config.timeout_for(NAME),
        }
    }

    fn value_for(iteration: usize) -> Value {
        match iteration % 4 {
            0 => Value::Int8(1),
            1 => Value::Text("1".to_string()),
            2 => Value::Float8(1.5),
            _ => Value::Bool(true),
        }
    }

    fn queries(&self) -> Vec<QuerySpec> {
        (0..self.repeat)
            .map(|i| {
                let value = Self::value_for(i);
                QuerySpec::new(TYPE_CYCLE_QUERY)
                    .bind(value.clone())
                    .expect(Expectation::any().single_row(vec![value]))
            })
            .collect()
    }
}

#[async_trait]
impl Scenario for StatementCacheScenario {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "SELECT $1 with a different parameter type each time, no cached-plan mismatch"
    }

    fn connection_options(&self) -> &ConnectionOptions {
        &self.options
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn run(&self, session: &mut dyn Session) -> Result<Vec<PassReport>> {
        let pass = self
            .runner
            .run_each(session, "type_cycle", &self.queries())
            .await?;
        Ok(vec![pass])
    }
}
