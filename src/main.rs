//! consilium — multi-agent clinical consultation orchestrator
//!
//! Usage:
//!   consilium catalog                              → list agents
//!   consilium score case.json                      → complexity breakdown
//!   consilium select case.json                     → selected agents + spawn decisions
//!   consilium consult case.json --responses r.json → full pipeline on a scripted executor
//!   consilium config                               → print default config (TOML)

use anyhow::Context;
use clap::{Parser, Subcommand};
use consilium_agents::AgentCatalog;
use consilium_core::CaseSignals;
use consilium_executor::{ScriptFile, ScriptedExecutor};
use consilium_orchestrator::{ConsiliumConfig, ConsultationService, PollOptions};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(
    name = "consilium",
    about = "Multi-agent clinical consultation orchestrator",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (TOML)
    #[arg(long, global = true, env = "CONSILIUM_CONFIG")]
    config: Option<PathBuf>,

    /// Agent catalog file (TOML). Default: built-in catalog.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog agents
    Catalog,
    /// Score a case's complexity
    Score {
        /// Case signals (JSON)
        case: PathBuf,
    },
    /// Select agents for a case and show every spawn decision
    Select {
        /// Case signals (JSON)
        case: PathBuf,
    },
    /// Run a consultation end to end against the scripted executor
    Consult {
        /// Case signals (JSON)
        case: PathBuf,
        /// Per-agent worker scripts (JSON). Agents without a script never finish.
        #[arg(short, long)]
        responses: Option<PathBuf>,
        /// Poll attempts before giving up (default from config)
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Delay between polls in milliseconds (default from config)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Print the effective config as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;

    let config = match &cli.config {
        Some(path) => ConsiliumConfig::load(path),
        None => ConsiliumConfig::default(),
    };
    let catalog = Arc::new(load_catalog(cli.catalog.as_deref())?);

    match cli.command {
        Commands::Catalog => print_json(catalog.list_all())?,
        Commands::Score { case } => {
            let service = offline_service(config, catalog);
            print_json(&service.assess(&read_case(&case)?)?.complexity)?;
        }
        Commands::Select { case } => {
            let service = offline_service(config, catalog);
            print_json(&service.assess(&read_case(&case)?)?)?;
        }
        Commands::Consult {
            case,
            responses,
            max_attempts,
            interval_ms,
        } => {
            let executor = match responses {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    let scripts: ScriptFile = serde_json::from_str(&content)
                        .with_context(|| format!("parsing {}", path.display()))?;
                    ScriptedExecutor::from_script_file(scripts)
                }
                None => ScriptedExecutor::new(),
            };
            let service = ConsultationService::new(config, catalog, Arc::new(executor));
            let defaults = service.default_poll_options();
            let options = PollOptions {
                max_attempts: max_attempts.unwrap_or(defaults.max_attempts),
                interval: interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.interval),
            };

            let ticket = service.start_consultation(read_case(&case)?).await?;
            tracing::info!(task_id = %ticket.task_id, poll_url = %ticket.poll_url, "Dispatched");
            let outcome = service.poll_until_complete(&ticket.task_id, options).await;
            service.shutdown();
            print_json(&outcome?)?;
        }
        Commands::Config => print!("{}", config.to_toml()),
    }

    Ok(())
}

/// Service for offline commands; its executor is never called.
fn offline_service(config: ConsiliumConfig, catalog: Arc<AgentCatalog>) -> ConsultationService {
    ConsultationService::new(config, catalog, Arc::new(ScriptedExecutor::new()))
}

fn load_catalog(path: Option<&Path>) -> anyhow::Result<AgentCatalog> {
    let Some(path) = path else {
        return Ok(AgentCatalog::builtin());
    };
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let catalog = AgentCatalog::from_toml_str(&content)?;
    tracing::info!(agents = catalog.len(), "Loaded catalog from {}", path.display());
    Ok(catalog)
}

fn read_case(path: &Path) -> anyhow::Result<CaseSignals> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing case {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "consilium=info".into())
    };
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(stderr).init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .context("--log-file must name a file")?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    let file = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter());
    tracing_subscriber::registry().with(stderr).with(file).init();
    Ok(Some(guard))
}
