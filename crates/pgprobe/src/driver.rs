//! Driver: owns the runtime and dispatches scenario selections.

use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::registry::ScenarioRegistry;
use crate::scenario::{execute_scenario, ScenarioReport};
use crate::session::SessionFactory;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// One scenario by name.
    One(String),
    /// Every registered scenario, sequentially, in name order.
    All {
        /// Run the rest after a failure instead of stopping.
        keep_going: bool,
    },
    /// `clients` concurrent instances of one scenario, each with its own session.
    Concurrent { name: String, clients: usize },
    /// Run one scenario twice and require identical result shapes.
    Idempotent(String),
}

/// Runs scenario selections on an injected tokio runtime.
pub struct Driver {
    runtime: Runtime,
    registry: ScenarioRegistry,
    config: HarnessConfig,
    factory: Arc<dyn SessionFactory>,
}

impl Driver {
    /// Create a driver. The runtime is owned for the driver's lifetime.
    #[must_use]
    pub fn new(
        runtime: Runtime,
        registry: ScenarioRegistry,
        config: HarnessConfig,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            runtime,
            registry,
            config,
            factory,
        }
    }

    /// Registry the driver selects from.
    #[must_use]
    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    /// Block on `selection` and return one report per completed scenario instance.
    pub fn run(&self, selection: &Selection) -> Result<Vec<ScenarioReport>> {
        info!(
            "Running {:?} against {}:{} ({} backend)",
            selection,
            self.config.endpoint.host,
            self.config.endpoint.port,
            self.factory.backend()
        );
        self.runtime.block_on(self.dispatch(selection))
    }

    async fn dispatch(&self, selection: &Selection) -> Result<Vec<ScenarioReport>> {
        match selection {
            Selection::One(name) => Ok(vec![self.run_one(name).await?]),
            Selection::All { keep_going } => self.run_all(*keep_going).await,
            Selection::Concurrent { name, clients } => self.run_concurrent(name, *clients).await,
            Selection::Idempotent(name) => self.verify_idempotent(name).await,
        }
    }

    async fn run_one(&self, name: &str) -> Result<ScenarioReport> {
        let scenario = self.registry.build(name, &self.config)?;
        execute_scenario(scenario.as_ref(), self.factory.as_ref()).await
    }

    async fn run_all(&self, keep_going: bool) -> Result<Vec<ScenarioReport>> {
        let mut reports = Vec::new();
        let mut first_error = None;
        for name in self.registry.names() {
            match self.run_one(name).await {
                Ok(report) => reports.push(report),
                Err(e) if keep_going => {
                    warn!("Scenario {} failed, continuing: {}", name, e);
                    first_error.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    async fn run_concurrent(&self, name: &str, clients: usize) -> Result<Vec<ScenarioReport>> {
        if clients == 0 {
            return Err(Error::Config("clients must be at least 1".to_string()));
        }
        let mut tasks = JoinSet::new();
        for _ in 0..clients {
            let scenario = self.registry.build(name, &self.config)?;
            let factory = Arc::clone(&self.factory);
            tasks.spawn(async move { execute_scenario(scenario.as_ref(), factory.as_ref()).await });
        }

        let mut reports = Vec::with_capacity(clients);
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!("Scenario task for {} failed: {}", name, e);
                    first_error.get_or_insert(Error::Task(e.to_string()));
                }
            }
        }
        info!(
            "{}: {}/{} concurrent clients succeeded",
            name,
            reports.len(),
            clients
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    async fn verify_idempotent(&self, name: &str) -> Result<Vec<ScenarioReport>> {
        let first = self.run_one(name).await?;
        let second = self.run_one(name).await?;
        let shapes = |r: &ScenarioReport| {
            r.passes
                .iter()
                .map(|p| (p.iterations, p.shapes.clone()))
                .collect::<Vec<_>>()
        };
        if shapes(&first) != shapes(&second) {
            return Err(Error::Assertion(format!(
                "{name}: result shapes differ between two runs"
            )));
        }
        Ok(vec![first, second])
    }
}

/// Process exit code for a driver outcome: `0` on success, otherwise the
/// error's code.
#[must_use]
pub fn exit_code<T>(outcome: &Result<T>) -> i32 {
    match outcome {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    }
}
