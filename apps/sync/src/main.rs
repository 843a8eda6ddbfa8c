use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use resume_sync::api_client::ApiClient;
use resume_sync::config::Config;
use resume_sync::relay::{self, RelayOptions};
use resume_sync::routes::build_router;
use resume_sync::state::AppState;
use resume_sync::store::{FileStore, MemoryStore, PersistentStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("resume_sync={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume-sync v{}", env!("CARGO_PKG_VERSION"));

    // Initialize persistent store
    let store = open_store(&config).await?;

    // Start background relay (seeds the profile document on first run)
    let relay = relay::spawn(store.clone(), RelayOptions::from(&config)).await;

    // Initialize remote API client
    let api = ApiClient::new(&config.api_base_url, store)
        .context("Failed to build remote API client")?;
    info!("Remote API client initialized (base URL: {})", api.base_url());

    let state = AppState {
        relay,
        api,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("127.0.0.1:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn PersistentStore>> {
    match &config.storage_path {
        Some(path) => {
            let store = FileStore::open(path)
                .await
                .with_context(|| format!("Failed to open store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            info!("No STORAGE_PATH set, using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
