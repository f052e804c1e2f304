use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use super::{ensure_text, SpeechSynthesizer};
use crate::config::RivaConfig;
use crate::error::AppError;

/// Delegates synthesis to an external Riva client process, which writes the
/// WAV file itself.
pub struct RivaSynthesizer {
    config: RivaConfig,
}

impl RivaSynthesizer {
    pub fn new(config: RivaConfig) -> Self {
        Self { config }
    }

    /// Arguments passed after the client program. Contains the bearer
    /// credential, so never log the result.
    fn command_args(&self, text: &str, output: &Path) -> Vec<String> {
        let c = &self.config;
        let mut args = c.program_args.clone();

        args.extend(["--server".to_string(), c.server.clone()]);
        if c.use_ssl {
            args.push("--use-ssl".to_string());
        }
        args.extend([
            "--metadata".to_string(),
            "function-id".to_string(),
            c.function_id.clone(),
            "--metadata".to_string(),
            "authorization".to_string(),
            format!("Bearer {}", c.api_key),
            "--language-code".to_string(),
            c.language_code.clone(),
            "--text".to_string(),
            text.to_string(),
            "--voice".to_string(),
            c.voice.clone(),
            "--output".to_string(),
            output.display().to_string(),
        ]);

        args
    }
}

#[async_trait]
impl SpeechSynthesizer for RivaSynthesizer {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), AppError> {
        ensure_text(text)?;

        tracing::debug!(
            program = %self.config.program,
            voice = %self.config.voice,
            output = %output.display(),
            "Running speech client"
        );

        let result = Command::new(&self.config.program)
            .args(self.command_args(text, output))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AppError::Synthesis(format!(
                    "Failed to run speech client '{}': {}",
                    self.config.program, e
                ))
            })?;

        if !result.status.success() {
            tracing::error!(
                status = %result.status,
                stdout = %String::from_utf8_lossy(&result.stdout).trim(),
                stderr = %String::from_utf8_lossy(&result.stderr).trim(),
                "Speech client output"
            );
            return Err(AppError::Synthesis(format!(
                "speech client exited with {}",
                result.status
            )));
        }

        let written = tokio::fs::metadata(output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            tracing::debug!(
                stdout = %String::from_utf8_lossy(&result.stdout).trim(),
                "Speech client output"
            );
            return Err(AppError::Synthesis(
                "speech client produced no audio".to_string(),
            ));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "riva"
    }
}
