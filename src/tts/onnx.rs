use std::path::Path;
use std::sync::Mutex;

use lazy_static::lazy_static;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use regex::Regex;

use super::model::{ModelConfig, ModelFiles};
use super::pipeline::{AcousticPipeline, Spectrogram};
use crate::error::AppError;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// FastPitch spectrogram generator plus HiFi-GAN vocoder, both exported to ONNX.
pub struct OnnxPipeline {
    config: ModelConfig,
    spectrogram_generator: Mutex<Session>,
    vocoder: Mutex<Session>,
}

impl OnnxPipeline {
    pub fn load(model_dir: &Path) -> Result<Self, AppError> {
        let files = ModelFiles::load(model_dir)?;

        Ok(Self {
            spectrogram_generator: Mutex::new(open_session(&files.spectrogram_path)?),
            vocoder: Mutex::new(open_session(&files.vocoder_path)?),
            config: files.config,
        })
    }
}

fn open_session(path: &Path) -> Result<Session, AppError> {
    Session::builder()
        .map_err(|e| AppError::Synthesis(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| AppError::Synthesis(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(4)
        .map_err(|e| AppError::Synthesis(format!("Failed to set threads: {}", e)))?
        .commit_from_file(path)
        .map_err(|e| {
            AppError::Synthesis(format!("Failed to load model {}: {}", path.display(), e))
        })
}

impl AcousticPipeline for OnnxPipeline {
    fn text_to_tokens(&self, text: &str) -> Result<Vec<i64>, AppError> {
        Ok(tokenize(text, &self.config))
    }

    fn tokens_to_spectrogram(&self, tokens: &[i64]) -> Result<Spectrogram, AppError> {
        // text: [batch, sequence] = [1, token_count]
        let input = Value::from_array((vec![1, tokens.len()], tokens.to_vec()))
            .map_err(|e| AppError::Synthesis(format!("Failed to create token tensor: {}", e)))?;

        let mut session = self
            .spectrogram_generator
            .lock()
            .map_err(|_| AppError::Synthesis("Spectrogram generator lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| AppError::Synthesis(format!("Spectrogram inference failed: {}", e)))?;

        let output = outputs
            .get("spect")
            .or_else(|| outputs.get("spectrogram"))
            .ok_or_else(|| AppError::Synthesis("Missing spectrogram tensor".to_string()))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::Synthesis(format!("Failed to extract spectrogram: {}", e)))?;

        Ok(Spectrogram {
            shape: shape.iter().map(|d| *d as usize).collect(),
            data: data.to_vec(),
        })
    }

    fn spectrogram_to_audio(&self, spectrogram: &Spectrogram) -> Result<Vec<f32>, AppError> {
        let input = Value::from_array((spectrogram.shape.clone(), spectrogram.data.clone()))
            .map_err(|e| AppError::Synthesis(format!("Failed to create spectrogram tensor: {}", e)))?;

        let mut session = self
            .vocoder
            .lock()
            .map_err(|_| AppError::Synthesis("Vocoder lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| AppError::Synthesis(format!("Vocoder inference failed: {}", e)))?;

        let output = outputs
            .get("audio")
            .or_else(|| outputs.get("output"))
            .ok_or_else(|| AppError::Synthesis("Missing audio tensor".to_string()))?;

        let (_, audio) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::Synthesis(format!("Failed to extract audio: {}", e)))?;

        // Batch of one, so the flattened tensor is the waveform.
        Ok(audio.to_vec())
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

/// Normalize text and map it to symbol IDs. Unknown characters are dropped.
pub fn tokenize(text: &str, config: &ModelConfig) -> Vec<i64> {
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    let normalized = if config.lowercase {
        collapsed.to_lowercase()
    } else {
        collapsed.into_owned()
    };

    let symbols: Vec<i64> = normalized
        .chars()
        .filter_map(|ch| config.symbol_id_map.get(ch.to_string().as_str()).copied())
        .collect();
    if symbols.is_empty() {
        return symbols;
    }

    let mut ids = Vec::with_capacity(symbols.len() * 2 + 2);
    ids.extend(config.bos_id);
    for (i, id) in symbols.into_iter().enumerate() {
        if i > 0 {
            ids.extend(config.pad_id);
        }
        ids.push(id);
    }
    ids.extend(config.eos_id);

    ids
}
