use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};

use super::{ensure_text, SpeechSynthesizer};
use crate::error::AppError;

/// Mel spectrogram in row-major order with the model's own shape,
/// typically `[batch, n_mels, frames]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// The three stages of neural text-to-speech.
pub trait AcousticPipeline: Send + Sync + 'static {
    fn text_to_tokens(&self, text: &str) -> Result<Vec<i64>, AppError>;

    fn tokens_to_spectrogram(&self, tokens: &[i64]) -> Result<Spectrogram, AppError>;

    fn spectrogram_to_audio(&self, spectrogram: &Spectrogram) -> Result<Vec<f32>, AppError>;

    fn sample_rate(&self) -> u32;
}

/// Runs an [`AcousticPipeline`] on the blocking pool and writes the result
/// as 16-bit mono PCM.
pub struct PipelineSynthesizer<P> {
    pipeline: Arc<P>,
}

impl<P: AcousticPipeline> PipelineSynthesizer<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

#[async_trait]
impl<P: AcousticPipeline> SpeechSynthesizer for PipelineSynthesizer<P> {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), AppError> {
        ensure_text(text)?;

        let pipeline = Arc::clone(&self.pipeline);
        let text = text.to_string();
        let sample_rate = self.pipeline.sample_rate();

        // Only inference runs detached. The file is written here so a
        // dropped request never creates it after its guard is gone.
        let samples = tokio::task::spawn_blocking(move || run_pipeline(pipeline.as_ref(), &text))
            .await
            .map_err(|e| AppError::Synthesis(format!("Synthesis task failed: {}", e)))??;

        write_wav(output, &samples, sample_rate)
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

fn run_pipeline<P: AcousticPipeline>(pipeline: &P, text: &str) -> Result<Vec<f32>, AppError> {
    let tokens = pipeline.text_to_tokens(text)?;
    if tokens.is_empty() {
        return Err(AppError::Synthesis("text produced no tokens".to_string()));
    }

    let spectrogram = pipeline.tokens_to_spectrogram(&tokens)?;
    let samples = pipeline.spectrogram_to_audio(&spectrogram)?;
    if samples.is_empty() {
        return Err(AppError::Synthesis("vocoder produced no audio".to_string()));
    }

    tracing::debug!(
        tokens = tokens.len(),
        frames = spectrogram.shape.last().copied().unwrap_or(0),
        samples = samples.len(),
        "Pipeline finished"
    );
    Ok(samples)
}

/// Write 16-bit mono PCM to `path`, replacing any existing file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AppError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| AppError::Synthesis(format!("Failed to create WAV writer: {}", e)))?;

    for sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer
            .write_sample(scaled)
            .map_err(|e| AppError::Synthesis(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| AppError::Synthesis(format!("Failed to finalize WAV: {}", e)))?;

    Ok(())
}
