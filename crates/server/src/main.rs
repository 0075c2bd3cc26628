mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triage_core::{
    create_dispatch_system, load_config, validate_config, SqliteTicketRepository, TicketRepository,
    TriageEngine, UpdateTransport,
};

use api::{create_router, WsBroadcaster};
use state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("TRIAGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!(
        "Queue policy: max_retries={}, retry_precedence={}",
        config.queue.max_retries, config.queue.retry_precedence
    );

    // Log a config hash so deployments can be correlated with behavior
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!("Config hash: {}", &config_hash[..16]);

    // Create the durable ticket repository
    let repository: Arc<dyn TicketRepository> = Arc::new(
        SqliteTicketRepository::new(&config.database.path)
            .context("Failed to open ticket repository")?,
    );
    info!("Ticket repository initialized");

    // Create the WebSocket broadcaster and wire it into the dispatch
    // system as a transport
    let ws_broadcaster = WsBroadcaster::new(config.dispatch.broadcast_capacity);
    let (dispatcher, dispatch_worker) = create_dispatch_system(
        vec![Arc::new(ws_broadcaster.clone()) as Arc<dyn UpdateTransport>],
        config.dispatch.buffer_size,
    );

    // Spawn dispatch worker task
    let worker_handle = tokio::spawn(dispatch_worker.run());
    info!("Dispatch worker started");

    // The dispatcher is built first and handed to the engine at
    // construction; there is no post-construction wiring step.
    let engine = Arc::new(TriageEngine::new(
        config.queue.clone(),
        dispatcher,
        Arc::clone(&repository),
    ));

    // Rebuild the in-memory queue from the repository
    let restored = engine
        .recover()
        .context("Failed to rebuild queue from repository")?;
    info!("Queue rebuilt with {} active tickets", restored);

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&engine),
        ws_broadcaster,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    // Drop all holders of the dispatcher so the worker's channel closes.
    // The engine owns the dispatcher; the router (and its AppState clone)
    // is already gone once serve returns.
    drop(engine);

    // Wait for the worker to finish delivering remaining events
    let _ = worker_handle.await;
    info!("Dispatch worker stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
