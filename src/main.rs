use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod storage;
mod tts;

use api::routes::{create_router, AppState};
use config::Config;
use storage::{AudioPublisher, ObjectStorePublisher};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    tracing::info!("TTS Publish Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Scratch directory: {}", config.scratch_dir.display());
    std::fs::create_dir_all(&config.scratch_dir)?;

    // Loaded once, shared read-only by every request
    let synthesizer = tts::build_synthesizer(&config.backend)?;

    let publisher: Arc<dyn AudioPublisher> = match &config.storage.local_dir {
        Some(dir) => {
            tracing::info!("Publishing to local directory {}", dir.display());
            Arc::new(ObjectStorePublisher::local(dir, &config.storage.public_base_url)?)
        }
        None => {
            tracing::info!("Publishing to bucket {}", config.storage.bucket);
            Arc::new(ObjectStorePublisher::gcs(
                &config.storage.bucket,
                &config.storage.public_base_url,
            )?)
        }
    };

    let state = Arc::new(AppState {
        synthesizer,
        publisher,
        scratch_dir: config.scratch_dir.clone(),
    });

    let app = create_router(state);

    tracing::info!("Starting server on http://{}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
