//! # Project Sync Main Entry Point
//!
//! `serve` runs the API (and the scheduler when enabled), `sync` performs a
//! one-shot synchronous run, `migrate` applies pending migrations.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use project_sync::{
    config::{AppConfig, ConfigLoader},
    connectors::{ClientFactory, HttpClientFactory},
    db,
    models::sync_job::SyncJobKind,
    server::{AppState, run_server},
    sync::SyncService,
    sync_executor::SyncExecutor,
    telemetry::init_tracing,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "project-sync", version, about = "Project sync service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply migrations and start the HTTP API
    Serve,
    /// Run one sync for a project and print the result as JSON
    Sync {
        #[arg(long)]
        project: Uuid,
        #[arg(long, default_value = "full")]
        kind: SyncJobKind,
    },
    /// Apply pending database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load().context("loading configuration")?;
    init_tracing(&config).context("initializing tracing")?;
    if let Ok(redacted) = config.redacted_json() {
        tracing::debug!(config = %redacted, "Loaded configuration");
    }
    let config = Arc::new(config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Sync { project, kind } => sync_once(config, project, kind).await,
        Command::Migrate => {
            let db = db::init_pool(&config).await?;
            db::migrate(&db).await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
    }
}

async fn serve(config: Arc<AppConfig>) -> Result<()> {
    let db = db::init_pool(&config).await?;
    db::migrate(&db).await?;

    // Background jobs get a pool of their own
    let executor_db = db::init_pool(&config).await?;
    let factory: Arc<dyn ClientFactory> = Arc::new(HttpClientFactory::new(config.clone()));
    let executor = SyncExecutor::new(executor_db, config.clone(), factory.clone());
    executor
        .recover()
        .await
        .context("recovering sync jobs left active by a previous run")?;

    let state = AppState {
        config: config.clone(),
        db,
        clients: factory,
        executor,
    };

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        signal.cancel();
    });

    run_server(state, shutdown)
        .await
        .map_err(|err| anyhow!("server error: {err}"))
}

async fn sync_once(config: Arc<AppConfig>, project_id: Uuid, kind: SyncJobKind) -> Result<()> {
    let db = db::init_pool(&config).await?;
    let clients = HttpClientFactory::new(config.clone())
        .create()
        .context("building remote clients")?;

    let service = SyncService::new(db, config, clients);
    let result = service.run(project_id, kind).await;
    service.close().await;
    let result = result.with_context(|| format!("syncing project {project_id}"))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.has_errors() {
        return Err(anyhow!(
            "sync finished with errors: {}",
            result.error_summary().unwrap_or_default()
        ));
    }
    Ok(())
}
