use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const SPECTROGRAM_MODEL: &str = "fastpitch.onnx";
pub const VOCODER_MODEL: &str = "hifigan.onnx";
pub const TOKENIZER_CONFIG: &str = "tokenizer.json";

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_lowercase")]
    pub lowercase: bool,
    pub symbol_id_map: HashMap<String, i64>,
    #[serde(default)]
    pub bos_id: Option<i64>,
    #[serde(default)]
    pub eos_id: Option<i64>,
    /// Inserted between symbols when set.
    #[serde(default)]
    pub pad_id: Option<i64>,
}

fn default_sample_rate() -> u32 {
    22050
}

fn default_lowercase() -> bool {
    true
}

/// Model files for the in-process pipeline.
#[derive(Debug)]
pub struct ModelFiles {
    pub config: ModelConfig,
    pub spectrogram_path: PathBuf,
    pub vocoder_path: PathBuf,
}

impl ModelFiles {
    pub fn load(model_dir: &Path) -> Result<Self, AppError> {
        let spectrogram_path = model_dir.join(SPECTROGRAM_MODEL);
        let vocoder_path = model_dir.join(VOCODER_MODEL);
        let config_path = model_dir.join(TOKENIZER_CONFIG);

        for path in [&spectrogram_path, &vocoder_path, &config_path] {
            if !path.exists() {
                return Err(AppError::ModelNotFound(path.display().to_string()));
            }
        }

        let config: ModelConfig = serde_json::from_reader(File::open(&config_path)?)?;

        Ok(Self {
            config,
            spectrogram_path,
            vocoder_path,
        })
    }
}
