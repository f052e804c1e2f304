use std::path::Path;

use tempfile::TempPath;
use uuid::Uuid;

use crate::error::AppError;

/// A WAV file in the scratch directory, removed when dropped.
#[derive(Debug)]
pub struct AudioArtifact {
    id: Uuid,
    path: TempPath,
}

impl AudioArtifact {
    /// Create `<uuid>.wav` in `dir`. Creation is exclusive, so an existing
    /// file with the same name is an error rather than being reused.
    pub fn create(dir: &Path) -> Result<Self, AppError> {
        let id = Uuid::new_v4();
        let file = tempfile::Builder::new()
            .prefix(&id.to_string())
            .suffix(".wav")
            .rand_bytes(0)
            .tempfile_in(dir)?;

        Ok(Self {
            id,
            path: file.into_temp_path(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Object store key for this artifact, same as its file name.
    pub fn object_key(&self) -> String {
        format!("{}.wav", self.id)
    }

    /// Remove the file now and report the result. Dropping also removes it,
    /// but silently.
    pub fn close(self) -> std::io::Result<()> {
        self.path.close()
    }
}
