//! Sharded logical database: every row must belong to the requested key.

use std::time::Duration;

use async_trait::async_trait;

use super::Scenario;
use crate::config::{ConnectionOptions, HarnessConfig};
use crate::error::Result;
use crate::query::{Expectation, QuerySpec, Value};
use crate::runner::{PassReport, QueryCycleRunner};
use crate::session::Session;

/// Query issued once per shard key.
pub const SHARDED_QUERY: &str = "SELECT * FROM sharded WHERE id = $1";

const NAME: &str = "sharded";
const DEFAULT_DATABASE: &str = "pgdog_sharded";
const SHARD_KEY_COLUMN: &str = "id";

/// Looks up each candidate shard key and rejects rows with a different key.
pub struct ShardedScenario {
    options: ConnectionOptions,
    runner: QueryCycleRunner,
    shard_keys: Vec<i64>,
    rounds: usize,
    timeout: Option<Duration>,
}

impl ShardedScenario {
    /// Build from the harness configuration.
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        let settings = config.settings(NAME);
        let database = settings.database.as_deref().unwrap_or(DEFAULT_DATABASE);
        Self {
            options: config.endpoint.connection_options(database),
            runner: QueryCycleRunner::new(config.strictness_for(NAME)),
            shard_keys: settings.shard_keys.unwrap_or_else(|| vec![0]),
            rounds: settings.repeat.unwrap_or(1),
            timeout: config.timeout_for(NAME),
        }
    }

    fn queries(&self) -> Vec<QuerySpec> {
        self.shard_keys
            .iter()
            .map(|&key| {
                QuerySpec::new(SHARDED_QUERY)
                    .bind(key)
                    .expect(Expectation::any().key_equals(SHARD_KEY_COLUMN, Value::Int8(key)))
            })
            .collect()
    }
}

#[async_trait]
impl Scenario for ShardedScenario {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "SELECT * FROM sharded WHERE id = $1 per shard key, rows must match the key"
    }

    fn connection_options(&self) -> &ConnectionOptions {
        &self.options
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn run(&self, session: &mut dyn Session) -> Result<Vec<PassReport>> {
        let queries = self.queries();
        let mut passes = Vec::with_capacity(self.rounds);
        for round in 1..=self.rounds {
            let label = format!("shard_keys#{round}");
            passes.push(self.runner.run_each(session, &label, &queries).await?);
        }
        Ok(passes)
    }
}
