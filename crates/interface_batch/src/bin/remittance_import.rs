//! Remittance import binary
//!
//! Records payments from remittance files and applies their advice, or runs
//! bulk reconciliation requests, against the PostgreSQL store.
//!
//! # Usage
//!
//! ```bash
//! # Import remittance files, one transaction per file
//! remittance-import remittance era-0412.json era-0413.json
//!
//! # Run a bulk reconciliation
//! remittance-import reconcile matches.json
//!
//! # Apply migrations and exit
//! remittance-import migrate
//! ```
//!
//! # Environment Variables
//!
//! * `REVENUE_DATABASE__URL` or `DATABASE_URL` - PostgreSQL connection string
//! * `REVENUE_LOG_LEVEL` - `EnvFilter` directive when `RUST_LOG` is unset (default: info)
//! * `REVENUE_LOG_FORMAT` - `text` or `json` (default: text)
//! * `REVENUE_ACTOR` - actor recorded on every change (default: remittance-import)
//! * `REVENUE_RUN_MIGRATIONS` - apply migrations before importing (default: false)

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::{AdapterHealth, HealthCheckable};
use domain_revenue::adapters::{TracingNotifier, TracingObservability};
use domain_revenue::EngineContext;
use infra_db::{create_pool, run_migrations, PostgresBillingStore, PostgresDirectory};
use interface_batch::{BatchConfig, BatchImporter, LogFormat};

#[derive(Parser)]
#[command(name = "remittance-import")]
#[command(about = "Import remittance advice and reconcile payments")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record and apply remittance files
    Remittance {
        /// Remittance files, imported in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Run reconciliation requests from a file
    Reconcile {
        file: PathBuf,
    },
    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = BatchConfig::load(cli.config.as_deref()).context("loading configuration")?;

    init_tracing(&config.log_level, config.log_format);

    let pool = create_pool(config.database.clone())
        .await
        .context("connecting to database")?;

    if config.run_migrations || matches!(cli.command, Commands::Migrate) {
        run_migrations(&pool).await.context("applying migrations")?;
    }

    let store = Arc::new(PostgresBillingStore::new(pool.clone()));
    let health = store.health_check().await;
    if health.status != AdapterHealth::Healthy {
        anyhow::bail!(
            "store unhealthy: {}",
            health.message.unwrap_or_else(|| "no detail".to_string())
        );
    }

    let ctx = EngineContext::new(
        store,
        Arc::new(PostgresDirectory::new(pool)),
        Arc::new(TracingObservability),
        Arc::new(TracingNotifier),
        config.engine.clone(),
    );
    let importer = BatchImporter::new(ctx, config.actor.clone());

    match cli.command {
        Commands::Migrate => {
            tracing::info!("migrations complete");
        }
        Commands::Remittance { files } => {
            let mut rejected = 0usize;
            for path in &files {
                let report = importer
                    .import_remittance(path)
                    .await
                    .with_context(|| format!("importing {}", path.display()))?;
                if !report.is_success() {
                    rejected += 1;
                }
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            tracing::info!(files = files.len(), rejected, "remittance import finished");
            if rejected > 0 {
                anyhow::bail!("{} of {} remittance files were rejected", rejected, files.len());
            }
        }
        Commands::Reconcile { file } => {
            let report = importer
                .reconcile_file(&file)
                .await
                .with_context(|| format!("reconciling {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.failed.is_empty() {
                anyhow::bail!("{} reconciliation requests failed", report.failed.len());
            }
        }
    }

    Ok(())
}

/// Initializes the tracing subscriber for structured logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
    }
}
