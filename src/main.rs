use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_drop::{
    api,
    config::{Config, StorageSettings},
    object_store::{ObjectStore, S3Store, StorageHandle},
    storage::Database,
    sweeper::ExpirationSweeper,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "file-drop starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db = Database::open(&config.node.data_dir)?;
    info!("Database opened at: {}", config.node.data_dir);

    // Storage is optional until the setup flow has run
    let storage = match StorageSettings::load(&db)? {
        Some(settings) => {
            info!(
                endpoint = %settings.endpoint,
                bucket = %settings.bucket_name,
                "Using S3-compatible storage"
            );
            let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&settings));
            StorageHandle::new(Some(store))
        }
        None => {
            info!("Storage not configured yet, waiting for setup");
            StorageHandle::default()
        }
    };

    // Create shared state
    let state = AppState::new(config.clone(), db.clone(), storage.clone());

    // Start the expiration sweeper
    let cancel = CancellationToken::new();
    let sweeper = ExpirationSweeper::new(
        db,
        storage,
        state.guard.clone(),
        config.sweeper.rate_limit_entry_ttl,
    );
    let sweeper_handle = sweeper.spawn(config.sweeper.interval, cancel.clone());

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.node.bind_address).await?;
    info!("Listening on: {}", config.node.bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Cleanup: stop background tasks
    info!("Shutting down background tasks");
    cancel.cancel();
    if let Err(e) = sweeper_handle.await {
        tracing::error!(error = %e, "Sweeper task ended abnormally");
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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

    info!("Shutdown signal received, draining connections");
}
