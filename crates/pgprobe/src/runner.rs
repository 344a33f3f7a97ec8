//! Query cycle runner: repeat a query on one session, strictly in order.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::Strictness;
use crate::error::Result;
use crate::query::{QuerySpec, ResultShape};
use crate::session::Session;

/// Outcome of one runner pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub label: String,
    /// Queries executed.
    pub iterations: usize,
    /// Rows received across all iterations.
    pub rows: usize,
    /// Distinct result shapes, in order of first appearance.
    pub shapes: Vec<ResultShape>,
}

impl PassReport {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Self::default()
        }
    }

    fn record(&mut self, shape: ResultShape) {
        self.iterations += 1;
        self.rows += shape.rows;
        if !self.shapes.contains(&shape) {
            self.shapes.push(shape);
        }
    }
}

/// Executes queries against a session and validates each result set.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryCycleRunner {
    strictness: Strictness,
}

impl QueryCycleRunner {
    /// Create a runner enforcing expectations at `strictness`.
    #[must_use]
    pub fn new(strictness: Strictness) -> Self {
        Self { strictness }
    }

    /// Execute `query` `repeat` times. Iteration `i + 1` starts only after
    /// iteration `i`'s result set has been fully received and checked.
    ///
    /// `repeat == 0` makes no session calls. The first failure ends the pass.
    pub async fn run(
        &self,
        session: &mut dyn Session,
        label: &str,
        query: &QuerySpec,
        repeat: usize,
    ) -> Result<PassReport> {
        debug!(
            "Pass '{}' on {}: {} x {}",
            label,
            session.label(),
            repeat,
            query.sql
        );
        let mut report = PassReport::new(label);
        for iteration in 1..=repeat {
            self.execute_one(session, query, iteration, &mut report)
                .await?;
        }
        Ok(report)
    }

    /// Execute each query in `queries` once, in order.
    pub async fn run_each(
        &self,
        session: &mut dyn Session,
        label: &str,
        queries: &[QuerySpec],
    ) -> Result<PassReport> {
        debug!(
            "Pass '{}' on {}: {} queries",
            label,
            session.label(),
            queries.len()
        );
        let mut report = PassReport::new(label);
        for (i, query) in queries.iter().enumerate() {
            self.execute_one(session, query, i + 1, &mut report).await?;
        }
        Ok(report)
    }

    async fn execute_one(
        &self,
        session: &mut dyn Session,
        query: &QuerySpec,
        iteration: usize,
        report: &mut PassReport,
    ) -> Result<()> {
        trace!("executing({}) {}", iteration, query.sql);
        let result = session
            .execute(query)
            .await
            .map_err(|e| e.at_iteration(iteration))?;
        query
            .expectation
            .check(&result, self.strictness)
            .map_err(|e| e.at_iteration(iteration))?;
        report.record(result.shape());
        Ok(())
    }
}
