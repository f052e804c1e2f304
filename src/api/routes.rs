use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::storage::AudioPublisher;
use crate::tts::SpeechSynthesizer;

pub struct AppState {
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub publisher: Arc<dyn AudioPublisher>,
    /// Temporary WAV files are created here.
    pub scratch_dir: PathBuf,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/tts", post(handlers::tts))
        .route("/health", get(handlers::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
