//! devrec-collector - device catalog data collection service
//!
//! Discovers devices, enriches and scores them, and serves the validated
//! catalog. The pipeline starts idle; `POST /pipeline/start` launches it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use devrec_collector::config::{CollectorConfig, CONFIG_FILE_NAME};
use devrec_collector::control::FlowControl;
use devrec_collector::db::{CatalogDb, DbSettings};
use devrec_collector::monitor::{ErrorMonitor, ParseErrorLog};
use devrec_collector::pipeline::PipelineManager;
use devrec_collector::sources::http::EnrichmentClient;
use devrec_collector::sources::{Collaborators, Reviewer};
use devrec_collector::AppState;
use devrec_common::config::{
    load_toml_or_default, resolve_config_path, RootFolderInitializer, RootFolderResolver,
};
use devrec_common::db::PoolSettings;
use devrec_common::logging::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "devrec-collector", version, about = "Device catalog data collection service")]
struct Args {
    /// Path to devrec.toml
    #[arg(long, env = "DEVREC_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the database and parse error log
    #[arg(long, env = "DEVREC_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_FILE_NAME);
    let config: CollectorConfig = load_toml_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!("Starting devrec-collector");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: compiled defaults"),
    }

    // Root folder holds the database and the parse error log
    let resolver = RootFolderResolver::new("devrec");
    let root_folder = resolver.resolve(args.root_folder.as_deref(), config.root_folder.as_deref());
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());

    let settings = DbSettings::from(&config.pipeline);
    let parse_log = ParseErrorLog::new(initializer.parse_error_log_path());
    let ceilings = config.ceilings.clone();
    let db_timeout = settings.db_timeout;
    let catalog = CatalogDb::connect(&db_path, &PoolSettings::default(), settings, |pool| {
        ErrorMonitor::new(pool, ceilings)
            .with_parse_log(parse_log)
            .with_db_timeout(db_timeout)
    })
    .await
    .context("Failed to open catalog database")?;
    info!("Database connection established");

    // Finish any promotion a previous process left half done
    let (ctrl, _stop) = FlowControl::new();
    match catalog.recover_validation(&ctrl).await {
        Ok(true) => info!("Recovered interrupted validation"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "Validation recovery failed; it will be retried when the pipeline starts"),
    }

    let client = Arc::new(
        EnrichmentClient::new(&config.sources).context("Failed to create enrichment client")?,
    );
    let reviewer = Reviewer::new(client.review_sources(&config.sources.review_sources));
    info!(sources = ?reviewer.source_names(), base_url = %config.sources.base_url, "Enrichment sources configured");

    let collaborators = Collaborators {
        discovery: client.clone(),
        specs: client.clone(),
        price: client.clone(),
        benchmark: client,
        reviewer,
    };

    let manager = PipelineManager::new(catalog.clone(), collaborators, config.pipeline.clone());
    let state = AppState::new(manager);
    let app = devrec_collector::build_router(state.clone());

    let bind_address = config.server.bind_address;
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(outcome) = state.pipeline.stop().await {
        info!(?outcome, "Pipeline stopped for shutdown");
    }
    catalog.disconnect().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
