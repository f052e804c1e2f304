use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_VOICE: &str = "English-US.Female-1";
const DEFAULT_RIVA_CLIENT: &str = "python3 python-clients/scripts/tts/talk.py";
const DEFAULT_RIVA_SERVER: &str = "grpc.nvcf.nvidia.com:443";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub scratch_dir: PathBuf,
    pub storage: StorageConfig,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub public_base_url: String,
    /// Publish into a local directory instead of GCS.
    pub local_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum BackendConfig {
    Onnx { model_dir: PathBuf },
    Riva(RivaConfig),
}

#[derive(Clone)]
pub struct RivaConfig {
    pub program: String,
    pub program_args: Vec<String>,
    pub server: String,
    pub function_id: String,
    pub api_key: String,
    pub voice: String,
    pub language_code: String,
    pub use_ssl: bool,
}

impl fmt::Debug for RivaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RivaConfig")
            .field("program", &self.program)
            .field("program_args", &self.program_args)
            .field("server", &self.server)
            .field("function_id", &self.function_id)
            .field("api_key", &"<redacted>")
            .field("voice", &self.voice)
            .field("language_code", &self.language_code)
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("PORT").unwrap_or_else(|| "8080".to_string());
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|_| ConfigError::Invalid {
                var: "HOST/PORT",
                value: format!("{}:{}", host, port),
            })?;

        let scratch_dir = var("AUDIO_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        let bucket = var("GCS_BUCKET_NAME").ok_or(ConfigError::Missing("GCS_BUCKET_NAME"))?;
        let public_base_url = var("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("https://storage.googleapis.com/{}", bucket))
            .trim_end_matches('/')
            .to_string();
        let storage = StorageConfig {
            bucket,
            public_base_url,
            local_dir: var("LOCAL_STORAGE_DIR").map(PathBuf::from),
        };

        let backend_name = var("TTS_BACKEND").unwrap_or_else(|| "onnx".to_string());
        let backend = match backend_name.to_ascii_lowercase().as_str() {
            "onnx" => BackendConfig::Onnx {
                model_dir: var("MODEL_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./models")),
            },
            "riva" => BackendConfig::Riva(riva_from_lookup(&var)?),
            _ => {
                return Err(ConfigError::Invalid {
                    var: "TTS_BACKEND",
                    value: backend_name,
                })
            }
        };

        Ok(Self {
            addr,
            scratch_dir,
            storage,
            backend,
        })
    }
}

fn riva_from_lookup<F>(var: &F) -> Result<RivaConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let command = var("RIVA_CLIENT_CMD").unwrap_or_else(|| DEFAULT_RIVA_CLIENT.to_string());
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next().ok_or(ConfigError::Invalid {
        var: "RIVA_CLIENT_CMD",
        value: command.clone(),
    })?;

    let use_ssl = match var("RIVA_USE_SSL") {
        None => true,
        Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid {
            var: "RIVA_USE_SSL",
            value: v,
        })?,
    };

    Ok(RivaConfig {
        program,
        program_args: parts.collect(),
        server: var("RIVA_SERVER").unwrap_or_else(|| DEFAULT_RIVA_SERVER.to_string()),
        function_id: var("RIVA_FUNCTION_ID").ok_or(ConfigError::Missing("RIVA_FUNCTION_ID"))?,
        api_key: var("RIVA_API_KEY").ok_or(ConfigError::Missing("RIVA_API_KEY"))?,
        voice: var("RIVA_VOICE").unwrap_or_else(|| DEFAULT_VOICE.to_string()),
        language_code: var("RIVA_LANGUAGE_CODE").unwrap_or_else(|| "en-US".to_string()),
        use_ssl,
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
