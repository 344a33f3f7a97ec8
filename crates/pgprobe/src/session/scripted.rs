//! In-memory session used by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{session_label, Session, SessionFactory};
use crate::config::ConnectionOptions;
use crate::error::{Error, Result};
use crate::query::{ColumnInfo, QuerySpec, ResultSet, Value};

/// What a scripted session does for one query.
pub(crate) enum Step {
    Rows(ResultSet),
    Fail(Error),
    Hang,
}

type Script = dyn Fn(&QuerySpec, usize) -> Step + Send + Sync;

/// Counters shared between a factory and every session it opens.
#[derive(Default)]
pub(crate) struct Probe {
    opened: AtomicUsize,
    executed: AtomicUsize,
    closed: AtomicUsize,
    queries: Mutex<Vec<QuerySpec>>,
}

impl Probe {
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn queries(&self) -> Vec<QuerySpec> {
        self.queries.lock().unwrap().clone()
    }

    /// Wait (bounded) until `n` sessions have been closed.
    pub(crate) async fn wait_closed(&self, n: usize) {
        for _ in 0..200 {
            if self.closed() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub(crate) struct ScriptedFactory {
    probe: Arc<Probe>,
    script: Arc<Script>,
    refuse: bool,
}

impl ScriptedFactory {
    pub(crate) fn new(script: impl Fn(&QuerySpec, usize) -> Step + Send + Sync + 'static) -> Self {
        Self {
            probe: Arc::new(Probe::default()),
            script: Arc::new(script),
            refuse: false,
        }
    }

    /// Return one row echoing the bound parameters, columns named `col1..`.
    pub(crate) fn echo() -> Self {
        Self::new(|query, _| Step::Rows(echo(query)))
    }

    /// Answer `WHERE id = $1` lookups with one row owned by that key.
    pub(crate) fn shards() -> Self {
        Self::new(|query, _| {
            let key = query.params.first().cloned().unwrap_or(Value::Null);
            Step::Rows(ResultSet::new(
                vec![
                    ColumnInfo {
                        name: "id".to_string(),
                        type_name: "INT8".to_string(),
                    },
                    ColumnInfo {
                        name: "value".to_string(),
                        type_name: "TEXT".to_string(),
                    },
                ],
                vec![vec![key, Value::Text("row".to_string())]],
            ))
        })
    }

    /// Every open fails with a connection error.
    pub(crate) fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::echo()
        }
    }

    pub(crate) fn probe(&self) -> Arc<Probe> {
        Arc::clone(&self.probe)
    }
}

pub(crate) fn echo(query: &QuerySpec) -> ResultSet {
    let columns = query
        .params
        .iter()
        .enumerate()
        .map(|(i, v)| ColumnInfo {
            name: format!("col{}", i + 1),
            type_name: v.type_name().to_string(),
        })
        .collect();
    ResultSet::new(columns, vec![query.params.clone()])
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    fn backend(&self) -> &'static str {
        "scripted"
    }

    async fn open(&self, options: &ConnectionOptions) -> Result<Box<dyn Session>> {
        if self.refuse {
            return Err(Error::Connection(format!(
                "{}: connection refused",
                options.endpoint()
            )));
        }
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            label: session_label(options),
            probe: Arc::clone(&self.probe),
            script: Arc::clone(&self.script),
            executed: 0,
        }))
    }
}

struct ScriptedSession {
    label: String,
    probe: Arc<Probe>,
    script: Arc<Script>,
    executed: usize,
}

#[async_trait]
impl Session for ScriptedSession {
    fn label(&self) -> &str {
        &self.label
    }

    async fn execute(&mut self, query: &QuerySpec) -> Result<ResultSet> {
        self.executed += 1;
        self.probe.executed.fetch_add(1, Ordering::SeqCst);
        self.probe.queries.lock().unwrap().push(query.clone());
        let step = (self.script)(query, self.executed);
        match step {
            Step::Rows(rows) => Ok(rows),
            Step::Fail(err) => Err(err),
            Step::Hang => {
                std::future::pending::<()>().await;
                Ok(ResultSet::default())
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.probe.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
