//! pgprobe CLI - run correctness scenarios against a Postgres proxy.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pgprobe::{
    exit_code, Driver, HarnessConfig, PgSessionFactory, ScenarioRegistry, ScenarioReport,
    Selection, Strictness,
};

/// pgprobe - correctness probes for Postgres wire-protocol proxies
#[derive(Parser, Debug)]
#[command(name = "pgprobe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario to run (see --list)
    #[arg(default_value = "sharded", env = "PGPROBE_SCENARIO")]
    scenario: String,

    /// Run every registered scenario in name order
    #[arg(long, conflicts_with_all = ["clients", "verify_idempotent"])]
    all: bool,

    /// With --all, keep running after a failure
    #[arg(long, requires = "all")]
    keep_going: bool,

    /// List registered scenarios and exit
    #[arg(long)]
    list: bool,

    /// Run this many concurrent instances of the scenario
    #[arg(long, default_value_t = 1)]
    clients: usize,

    /// Run the scenario twice and require identical result shapes
    #[arg(long, conflicts_with = "clients")]
    verify_idempotent: bool,

    /// YAML configuration file
    #[arg(short, long, env = "PGPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Proxy host
    #[arg(long, env = "PGPROBE_HOST")]
    host: Option<String>,

    /// Proxy port
    #[arg(short, long, env = "PGPROBE_PORT")]
    port: Option<u16>,

    /// User name
    #[arg(short, long, env = "PGPROBE_USER")]
    user: Option<String>,

    /// Password
    #[arg(long, env = "PGPROBE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Client statement cache size (0 disables prepared statement caching)
    #[arg(long)]
    statement_cache_size: Option<usize>,

    /// Assertion strictness: liveness, shape or values
    #[arg(long)]
    strictness: Option<Strictness>,

    /// Per-scenario timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Connection handshake timeout in milliseconds
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn selection(&self) -> Selection {
        if self.all {
            Selection::All {
                keep_going: self.keep_going,
            }
        } else if self.verify_idempotent {
            Selection::Idempotent(self.scenario.clone())
        } else if self.clients != 1 {
            Selection::Concurrent {
                name: self.scenario.clone(),
                clients: self.clients,
            }
        } else {
            Selection::One(self.scenario.clone())
        }
    }

    /// Config file (or defaults) with command-line overrides applied.
    fn harness_config(&self) -> anyhow::Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => HarnessConfig::default(),
        };

        let endpoint = &mut config.endpoint;
        if let Some(host) = &self.host {
            endpoint.host.clone_from(host);
        }
        if let Some(port) = self.port {
            endpoint.port = port;
        }
        if let Some(user) = &self.user {
            endpoint.user.clone_from(user);
        }
        if let Some(password) = &self.password {
            endpoint.password.clone_from(password);
        }
        if let Some(size) = self.statement_cache_size {
            endpoint.statement_cache_size = size;
        }
        if let Some(ms) = self.connect_timeout_ms {
            endpoint.connect_timeout_ms = Some(ms);
        }
        if let Some(strictness) = self.strictness {
            config.strictness = strictness;
            for settings in config.scenarios.values_mut() {
                settings.strictness = None;
            }
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout_ms = Some(ms);
            for settings in config.scenarios.values_mut() {
                settings.timeout_ms = None;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pgprobe=debug,info" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_reports(reports: &[ScenarioReport], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
        return Ok(());
    }
    for report in reports {
        println!(
            "{}: ok ({} queries, {} rows, {} ms)",
            report.scenario,
            report.iterations(),
            report.rows(),
            report.elapsed_ms
        );
        for pass in &report.passes {
            println!(
                "  {}: {} iterations, {} rows",
                pass.label, pass.iterations, pass.rows
            );
        }
    }
    Ok(())
}

fn run(args: &Args) -> anyhow::Result<i32> {
    let registry = ScenarioRegistry::builtin();
    let config = args.harness_config()?;

    if args.list {
        for name in registry.names() {
            let scenario = registry.build(name, &config)?;
            println!("{:<16} {}", name, scenario.description());
        }
        return Ok(0);
    }

    // Single-threaded: scenarios are cooperative tasks on one scheduler.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let driver = Driver::new(runtime, registry, config, Arc::new(PgSessionFactory::new()));

    let outcome = driver.run(&args.selection());
    let code = exit_code(&outcome);
    match outcome {
        Ok(reports) => print_reports(&reports, args.json)?,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("pgprobe: {e}");
        }
    }
    Ok(code)
}

fn main() {
    // Usage errors exit 1 so that 2 always means "could not connect".
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = i32::from(e.use_stderr());
            let _ = e.print();
            std::process::exit(code);
        }
    };
    init_tracing(args.verbose);

    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("pgprobe: {e:#}");
            1
        }
    };
    std::process::exit(code);
}
