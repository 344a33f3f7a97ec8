//! Single logical database: parameter binding across two types.

use std::time::Duration;

use async_trait::async_trait;

use super::Scenario;
use crate::config::{ConnectionOptions, HarnessConfig, DEFAULT_CREDENTIAL};
use crate::error::Result;
use crate::query::{Expectation, QuerySpec, Value};
use crate::runner::{PassReport, QueryCycleRunner};
use crate::session::Session;

/// Query issued by the unsharded scenario.
pub const INT_TEXT_QUERY: &str = "SELECT $1::int, $2::text";

const NAME: &str = "unsharded";
const DEFAULT_REPEAT: usize = 100;

/// Binds `(1, '1')` and expects exactly that row back, `repeat` times.
pub struct UnshardedScenario {
    options: ConnectionOptions,
    runner: QueryCycleRunner,
    repeat: usize,
    timeout: Option<Duration>,
}

impl UnshardedScenario {
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

    fn query() -> QuerySpec {
        QuerySpec::new(INT_TEXT_QUERY)
            .bind(1_i32)
            .bind("1")
            .expect(Expectation::any().single_row(vec![Value::Int4(1), Value::from("1")]))
    }
}

#[async_trait]
impl Scenario for UnshardedScenario {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "SELECT $1::int, $2::text on a single database, one row (1, '1') per execution"
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
            .run(session, "int_text", &Self::query(), self.repeat)
            .await?;
        Ok(vec![pass])
    }
}
