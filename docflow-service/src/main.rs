use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use docflow_service::api;
use docflow_service::config::load_config;
use docflow_service::db::Database;
use docflow_service::fetch::HttpContentFetcher;
use docflow_service::research::HttpResearchClient;
use docflow_service::storage::FsBlobStore;
use docflow_service::{Collaborators, IngestionService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!("Starting docflow service v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Configuration loaded"
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&config.storage.data_dir)?;

    let db_path = config.storage.database_path();
    let db = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    let blob_dir = config.storage.blob_dir();
    let blobs = Arc::new(FsBlobStore::new(&blob_dir));
    info!(path = %blob_dir.display(), "Blob storage initialized");

    let research = Arc::new(HttpResearchClient::new(config.research.clone())?);
    info!(url = %config.research.base_url, "Research provider client initialized");

    let fetcher = Arc::new(HttpContentFetcher::new(&config.fetcher)?);

    let metrics = PrometheusBuilder::new().install_recorder()?;

    let shutdown = CancellationToken::new();
    let service = Arc::new(IngestionService::new(
        Collaborators {
            documents: db.clone(),
            queue: db,
            blobs,
            research,
            fetcher,
        },
        config.pipeline.clone(),
        shutdown.clone(),
    ));

    let app = api::router(service, metrics);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C, cancelling in-flight waits so their jobs can be redelivered
async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    token.cancel();
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docflow_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
