//! # Filing Processor
//!
//! Runs the filing worker pool against PostgreSQL and pgmq until interrupted.
//!
//! ```bash
//! filing-processor --config-dir config run
//! filing-processor --environment production validate
//! filing-processor migrate
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use filing_processor::config::{ConfigManager, FilerConfig};
use filing_processor::database::{DatabaseMigrations, PgFilingStore};
use filing_processor::events::OutcomePublisher;
use filing_processor::execution::FilingWorkerPool;
use filing_processor::logging::init_structured_logging;
use filing_processor::messaging::{MessageBroker, PgmqBroker};
use filing_processor::orchestration::FilingOrchestrator;
use filing_processor::registry::ProcessorRegistry;
use filing_processor::utils::SystemClock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "filing-processor")]
#[command(about = "Apply registry filings from the filer queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory holding filer.toml and filer.<env>.toml
    #[arg(short, long, env = "FILER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Environment name; defaults to FILER_ENV, then APP_ENV, then development
    #[arg(short, long)]
    environment: Option<String>,

    /// Override worker.concurrency
    #[arg(short, long)]
    workers: Option<usize>,

    /// Directory of SQL migrations
    #[arg(long, default_value = "migrations")]
    migrations_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations, then consume the filer queue until ctrl-c
    Run,
    /// Load and validate configuration, then print it with secrets masked
    Validate,
    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.environment {
        Some(environment) => ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment),
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    }
    .context("failed to load configuration")?;

    let mut config = manager.config().clone();
    if let Some(workers) = cli.workers {
        config.worker.concurrency = workers;
        config.validate().context("invalid --workers override")?;
    }

    init_structured_logging(&config.logging);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Validate => {
            println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
            info!(environment = manager.environment(), "✅ Configuration is valid");
            Ok(())
        }
        Commands::Migrate => {
            let store = PgFilingStore::connect(&config.database).await?;
            let applied = DatabaseMigrations::run_all(store.pool(), &cli.migrations_dir).await?;
            info!(applied, "✅ Migrations complete");
            Ok(())
        }
        Commands::Run => run(config, &cli.migrations_dir).await,
    }
}

async fn run(config: FilerConfig, migrations_dir: &std::path::Path) -> anyhow::Result<()> {
    let store = PgFilingStore::connect(&config.database)
        .await
        .context("failed to connect to the filing database")?;
    DatabaseMigrations::run_all(store.pool(), migrations_dir)
        .await
        .context("failed to run migrations")?;

    let broker: Arc<dyn MessageBroker> = Arc::new(PgmqBroker::new_with_pool(store.pool().clone()));
    let publisher = Arc::new(OutcomePublisher::new(broker.clone(), &config.broker));
    publisher.ensure_queues().await?;

    let registry = Arc::new(ProcessorRegistry::from_config(&config.processors)?);
    let orchestrator = Arc::new(FilingOrchestrator::new(
        Arc::new(store),
        registry,
        publisher,
        Arc::new(SystemClock),
        &config,
    ));

    let pool = Arc::new(FilingWorkerPool::new(broker, orchestrator, &config));
    pool.start(config.worker.concurrency).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutdown requested");

    let grace = config.worker.pipeline_timeout() + Duration::from_secs(5);
    if !pool.shutdown(grace).await {
        warn!(grace = ?grace, "Exiting with filing events still in flight");
    }
    info!(stats = ?pool.stats(), "👋 Filing processor stopped");
    Ok(())
}
