//! Scenarios: self-contained probes that own exactly one session.

mod sharded;
mod statement_cache;
mod unsharded;

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::ConnectionOptions;
use crate::error::{Error, Result};
use crate::runner::PassReport;
use crate::session::{Session, SessionFactory, SessionGuard};

pub use sharded::{ShardedScenario, SHARDED_QUERY};
pub use statement_cache::{StatementCacheScenario, TYPE_CYCLE_QUERY};
pub use unsharded::{UnshardedScenario, INT_TEXT_QUERY};

/// A named probe. Implementations only drive queries; session lifetime is
/// handled by [`execute_scenario`].
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// One-line description for `--list`.
    fn description(&self) -> &'static str;

    /// Options for the scenario's session.
    fn connection_options(&self) -> &ConnectionOptions;

    /// Bound on the query phase. `None` imposes no harness-level timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Run every pass against `session`.
    async fn run(&self, session: &mut dyn Session) -> Result<Vec<PassReport>>;
}

/// Lifecycle of one scenario instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    Idle,
    Connecting,
    Ready,
    Executing,
    Failed,
    Closing,
    Done,
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::Failed => "failed",
            Self::Closing => "closing",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

struct Lifecycle {
    scenario: &'static str,
    state: ScenarioState,
}

impl Lifecycle {
    fn new(scenario: &'static str) -> Self {
        Self {
            scenario,
            state: ScenarioState::Idle,
        }
    }

    fn enter(&mut self, next: ScenarioState) {
        debug!("[{}] {} -> {}", self.scenario, self.state, next);
        self.state = next;
    }
}

/// Outcome of one successful scenario instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub passes: Vec<PassReport>,
    pub elapsed_ms: u64,
}

impl ScenarioReport {
    /// Queries executed across all passes.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.passes.iter().map(|p| p.iterations).sum()
    }

    /// Rows received across all passes.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.passes.iter().map(|p| p.rows).sum()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Open a session, run `scenario`, and close the session on every exit path.
///
/// A failed open has nothing to close. After a failed run the close is still
/// attempted and its error logged; the run's error is returned. If this future
/// is dropped mid-run the [`SessionGuard`] closes the session in the
/// background.
pub async fn execute_scenario(
    scenario: &dyn Scenario,
    factory: &dyn SessionFactory,
) -> Result<ScenarioReport> {
    let started = Instant::now();
    let name = scenario.name();
    let mut lifecycle = Lifecycle::new(name);

    lifecycle.enter(ScenarioState::Connecting);
    let session = match factory.open(scenario.connection_options()).await {
        Ok(session) => session,
        Err(e) => {
            error!("[{}] connect failed: {}", name, e);
            lifecycle.enter(ScenarioState::Failed);
            lifecycle.enter(ScenarioState::Done);
            return Err(e);
        }
    };
    let mut guard = SessionGuard::new(session);
    lifecycle.enter(ScenarioState::Ready);

    lifecycle.enter(ScenarioState::Executing);
    let outcome = {
        let body = async {
            match guard.session() {
                Ok(session) => scenario.run(session).await,
                Err(e) => Err(e),
            }
        };
        match scenario.timeout() {
            Some(limit) => tokio::time::timeout(limit, body)
                .await
                .unwrap_or_else(|_| Err(Error::Timeout(millis(limit)))),
            None => body.await,
        }
    };

    match outcome {
        Ok(passes) => {
            lifecycle.enter(ScenarioState::Closing);
            if let Err(e) = guard.close().await {
                error!("[{}] close failed: {}", name, e);
                lifecycle.enter(ScenarioState::Failed);
                lifecycle.enter(ScenarioState::Done);
                return Err(e);
            }
            lifecycle.enter(ScenarioState::Done);
            let report = ScenarioReport {
                scenario: name.to_string(),
                passes,
                elapsed_ms: millis(started.elapsed()),
            };
            info!(
                "[{}] ok: {} queries, {} rows in {} ms",
                name,
                report.iterations(),
                report.rows(),
                report.elapsed_ms
            );
            Ok(report)
        }
        Err(e) => {
            error!("[{}] failed: {}", name, e);
            lifecycle.enter(ScenarioState::Failed);
            lifecycle.enter(ScenarioState::Closing);
            if let Err(close_err) = guard.close().await {
                warn!("[{}] close after failure also failed: {}", name, close_err);
            }
            lifecycle.enter(ScenarioState::Done);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HarnessConfig, Strictness};
    use crate::query::{ResultSet, Value};
    use crate::session::scripted::{echo, ScriptedFactory, Step};

    fn unsharded(config: &HarnessConfig) -> UnshardedScenario {
        UnshardedScenario::from_config(config)
    }

    #[tokio::test]
    async fn test_success_closes_once() {
        let factory = ScriptedFactory::echo();
        let report = execute_scenario(&unsharded(&HarnessConfig::default()), &factory)
            .await
            .unwrap();

        assert_eq!(report.scenario, "unsharded");
        assert_eq!(report.iterations(), 100);
        assert_eq!(factory.probe().opened(), 1);
        assert_eq!(factory.probe().closed(), 1);
    }

    #[tokio::test]
    async fn test_query_failure_still_closes_once() {
        let factory = ScriptedFactory::new(|_, _| Step::Fail(Error::Query {
            iteration: 0,
            sqlstate: Some("42601".to_string()),
            message: "syntax error".to_string(),
        }));

        let err = execute_scenario(&unsharded(&HarnessConfig::default()), &factory)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Query { iteration: 1, .. }));
        assert_eq!(factory.probe().executed(), 1);
        assert_eq!(factory.probe().closed(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_has_nothing_to_close() {
        let factory = ScriptedFactory::refusing();
        let err = execute_scenario(&unsharded(&HarnessConfig::default()), &factory)
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert_eq!(factory.probe().opened(), 0);
        assert_eq!(factory.probe().closed(), 0);
    }

    #[tokio::test]
    async fn test_timeout_fails_and_closes() {
        let mut config = HarnessConfig::default();
        config.timeout_ms = Some(20);
        let factory = ScriptedFactory::new(|_, _| Step::Hang);

        let err = execute_scenario(&unsharded(&config), &factory)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(20)));
        assert_eq!(factory.probe().closed(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_closes_in_background() {
        let factory = std::sync::Arc::new(ScriptedFactory::new(|query, n| {
            if n == 2 {
                Step::Hang
            } else {
                Step::Rows(echo(query))
            }
        }));
        let probe = factory.probe();

        let task = {
            let factory = std::sync::Arc::clone(&factory);
            tokio::spawn(async move {
                let scenario = UnshardedScenario::from_config(&HarnessConfig::default());
                execute_scenario(&scenario, factory.as_ref()).await
            })
        };
        while probe.executed() < 2 {
            tokio::task::yield_now().await;
        }
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        probe.wait_closed(1).await;
        assert_eq!(probe.closed(), 1);
    }

    #[tokio::test]
    async fn test_sharded_detects_misrouted_rows() {
        let factory = ScriptedFactory::new(|_, _| {
            Step::Rows(ResultSet::new(
                vec![
                    crate::query::ColumnInfo {
                        name: "id".to_string(),
                        type_name: "INT8".to_string(),
                    },
                    crate::query::ColumnInfo {
                        name: "value".to_string(),
                        type_name: "TEXT".to_string(),
                    },
                ],
                vec![vec![Value::Int8(5), "other shard".into()]],
            ))
        });
        let scenario = ShardedScenario::from_config(&HarnessConfig::default());

        let err = execute_scenario(&scenario, &factory).await.unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert_eq!(factory.probe().closed(), 1);

        let mut liveness = HarnessConfig::default();
        liveness.strictness = Strictness::Liveness;
        let scenario = ShardedScenario::from_config(&liveness);
        assert!(execute_scenario(&scenario, &factory).await.is_ok());
        assert_eq!(factory.probe().closed(), 2);
    }

    #[tokio::test]
    async fn test_each_scenario_gets_its_own_session() {
        let factory = ScriptedFactory::echo();
        let config = HarnessConfig::default();
        let a = unsharded(&config);
        let b = StatementCacheScenario::from_config(&config);

        let (ra, rb) = tokio::join!(
            execute_scenario(&a, &factory),
            execute_scenario(&b, &factory)
        );
        assert!(ra.is_ok());
        assert!(rb.is_ok());
        assert_eq!(factory.probe().opened(), 2);
        assert_eq!(factory.probe().closed(), 2);
    }
}
