//! `triage-gate` operator CLI.
//!
//! Usage:
//!   triage-gate route --submitter ops "schedule the weekly export"
//!   triage-gate route --submitter ops --critical --execute "restart billing"
//!   triage-gate worker                   # drain the queue until Ctrl-C / SIGTERM
//!   triage-gate worker --once --tier LOW
//!   triage-gate status
//!
//! JSON goes to stdout, logs to stderr.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use triage_gate::worker::cancel_on_shutdown;
use triage_gate::{
    BatchWorker, Config, DeferredStore, ExecutionEngine, HttpEngine, Request, Router,
    SqliteDeferredStore, Tier,
};

#[derive(Parser, Debug)]
#[command(
    name = "triage-gate",
    version,
    about = "Request triage and admission control in front of an execution engine"
)]
struct Cli {
    /// Config file (takes precedence over TRIAGE_GATE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Deferred store database, overriding [store] db_path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Screen, classify and route one request
    Route {
        /// Submitter identifier recorded with queued work
        #[arg(long)]
        submitter: String,

        /// Skip classification and the queue (the security screen still runs)
        #[arg(long)]
        critical: bool,

        /// Send bypass and heavy-path requests to the engine right away
        #[arg(long)]
        execute: bool,

        /// Request text; multiple words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Drain the deferred queue through the execution engine
    Worker {
        /// Run a single claim cycle and exit
        #[arg(long)]
        once: bool,

        /// Records claimed per cycle, overriding [worker] batch_size
        #[arg(long)]
        batch_size: Option<usize>,

        /// Only claim records of this tier
        #[arg(long)]
        tier: Option<Tier>,
    },

    /// Queue counts, overall and per tier
    Status,

    /// Show one queued record
    Inspect { request_id: String },

    /// List records stuck in processing
    Stranded {
        /// Minimum time in processing
        #[arg(long, default_value_t = 3600)]
        older_than_secs: u64,
    },

    /// Print the effective classification rule table
    Rules,

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Generate shell completions
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// JSON schema of the config file
    Schema,
    /// Effective configuration as TOML
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "triage-gate", &mut std::io::stdout());
        return Ok(());
    }

    let (mut config, source) = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.store.db_path = db;
    }
    init_logging(&config.log.level);
    if let Some(path) = &source {
        tracing::debug!(path = %path.display(), "using config file");
    }

    match cli.command {
        Commands::Route {
            submitter,
            critical,
            execute,
            text,
        } => route(&config, submitter, critical, execute, text.join(" ")).await,
        Commands::Worker {
            once,
            batch_size,
            tier,
        } => {
            if let Some(size) = batch_size {
                config.worker.batch_size = size;
            }
            if tier.is_some() {
                config.worker.tier_filter = tier;
            }
            config.validate()?;
            worker(&config, once).await
        }
        Commands::Status => print_json(&open_store(&config)?.status()?),
        Commands::Inspect { request_id } => {
            let record = open_store(&config)?
                .get(&request_id)?
                .with_context(|| format!("no queued record with id '{request_id}'"))?;
            print_json(&record)
        }
        Commands::Stranded { older_than_secs } => print_json(
            &open_store(&config)?.stranded(Duration::from_secs(older_than_secs))?,
        ),
        Commands::Rules => {
            let gate = triage_gate::ClassificationGate::from_config(&config.classifier)?;
            print_json(&gate.table().specs().collect::<Vec<_>>())
        }
        Commands::Config { action } => match action {
            ConfigCommand::Schema => print_json(&Config::json_schema()),
            ConfigCommand::Show => {
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
        },
        Commands::Completions { .. } => Ok(()),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_store(config: &Config) -> Result<SqliteDeferredStore> {
    SqliteDeferredStore::from_config(&config.store).with_context(|| {
        format!(
            "failed to open deferred store at {}",
            config.store.db_path.display()
        )
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn route(
    config: &Config,
    submitter: String,
    critical: bool,
    execute: bool,
    text: String,
) -> Result<()> {
    let store: Arc<dyn DeferredStore> = Arc::new(open_store(config)?);
    let router = Router::from_config(config, store)?;

    let mut request = Request::new(text, submitter);
    if critical {
        request = request.critical();
    }
    let outcome = router.route(&request)?;
    let response = serde_json::to_value(outcome.to_response())?;

    if !(execute && outcome.needs_engine()) {
        return print_json(&response);
    }

    let engine = HttpEngine::from_config(&config.engine)?;
    let request_id = outcome.request_id();
    let result = engine.execute(request_id, &request.text).await;
    let execution = match &result {
        Ok(output) => serde_json::json!({ "ok": true, "result": output }),
        Err(e) => serde_json::json!({ "ok": false, "error": format!("{e:#}") }),
    };
    tracing::info!(
        request_id = %request_id,
        outcome = outcome.label(),
        ok = result.is_ok(),
        "direct execution finished"
    );
    print_json(&serde_json::json!({ "response": response, "execution": execution }))
}

async fn worker(config: &Config, once: bool) -> Result<()> {
    let store: Arc<dyn DeferredStore> = Arc::new(open_store(config)?);
    let engine: Arc<dyn ExecutionEngine> = Arc::new(HttpEngine::from_config(&config.engine)?);
    let worker = BatchWorker::new(store, engine, &config.worker);

    if once {
        let report = worker.run_once().await?;
        return print_json(&report);
    }

    cancel_on_shutdown(worker.cancel_token()).context("failed to install signal handlers")?;

    let totals = worker.run().await;
    print_json(&totals)
}
