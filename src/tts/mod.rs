pub mod model;
pub mod onnx;
pub mod pipeline;
pub mod riva;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::BackendConfig;
use crate::error::AppError;

pub use onnx::OnnxPipeline;
pub use pipeline::PipelineSynthesizer;
pub use riva::RivaSynthesizer;

/// Produces a readable WAV file at `output` for the given text.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), AppError>;

    /// Short backend name, reported by the health endpoint.
    fn name(&self) -> &'static str;
}

/// Build the configured backend. Models are loaded here, once.
pub fn build_synthesizer(backend: &BackendConfig) -> Result<Arc<dyn SpeechSynthesizer>, AppError> {
    match backend {
        BackendConfig::Onnx { model_dir } => {
            tracing::info!("Loading ONNX models from {}", model_dir.display());
            let pipeline = OnnxPipeline::load(model_dir)?;
            Ok(Arc::new(PipelineSynthesizer::new(pipeline)))
        }
        BackendConfig::Riva(riva) => {
            tracing::info!(
                server = %riva.server,
                voice = %riva.voice,
                "Delegating synthesis to {}",
                riva.program
            );
            Ok(Arc::new(RivaSynthesizer::new(riva.clone())))
        }
    }
}

pub(crate) fn ensure_text(text: &str) -> Result<(), AppError> {
    if text.trim().is_empty() {
        return Err(AppError::Synthesis("empty text".to_string()));
    }
    Ok(())
}
