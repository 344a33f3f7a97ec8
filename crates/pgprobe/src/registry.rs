//! Scenario registry: select scenarios by name instead of editing code.

use std::collections::BTreeMap;

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::scenario::{Scenario, ShardedScenario, StatementCacheScenario, UnshardedScenario};

/// Builds a scenario from the harness configuration.
pub type ScenarioConstructor = fn(&HarnessConfig) -> Box<dyn Scenario>;

/// Name → constructor map. Iteration order is by name.
#[derive(Clone, Default)]
pub struct ScenarioRegistry {
    entries: BTreeMap<&'static str, ScenarioConstructor>,
}

impl ScenarioRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in scenario.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("unsharded", unsharded);
        registry.register("sharded", sharded);
        registry.register("statement_cache", statement_cache);
        registry
    }

    /// Add or replace `name`.
    pub fn register(&mut self, name: &'static str, constructor: ScenarioConstructor) {
        self.entries.insert(name, constructor);
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Construct the scenario registered as `name`.
    pub fn build(&self, name: &str, config: &HarnessConfig) -> Result<Box<dyn Scenario>> {
        self.entries
            .get(name)
            .map(|constructor| constructor(config))
            .ok_or_else(|| Error::UnknownScenario {
                name: name.to_string(),
                known: self.names().join(", "),
            })
    }
}

fn unsharded(config: &HarnessConfig) -> Box<dyn Scenario> {
    Box::new(UnshardedScenario::from_config(config))
}

fn sharded(config: &HarnessConfig) -> Box<dyn Scenario> {
    Box::new(ShardedScenario::from_config(config))
}

fn statement_cache(config: &HarnessConfig) -> Box<dyn Scenario> {
    Box::new(StatementCacheScenario::from_config(config))
}

impl std::fmt::Debug for ScenarioRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}
