pub mod artifact;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};

use crate::error::AppError;

pub use artifact::AudioArtifact;

/// Uploads a finished artifact and returns the URL it can be fetched from.
///
/// Publishers never delete the local file; the caller owns the artifact.
#[async_trait]
pub trait AudioPublisher: Send + Sync {
    async fn publish(&self, artifact: &AudioArtifact) -> Result<String, AppError>;
}

pub struct ObjectStorePublisher {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
}

impl ObjectStorePublisher {
    pub fn new(store: Arc<dyn ObjectStore>, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Google Cloud Storage bucket, credentials taken from the environment.
    pub fn gcs(bucket: &str, public_base_url: &str) -> Result<Self, AppError> {
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| AppError::Publish(format!("Failed to open bucket '{}': {}", bucket, e)))?;

        Ok(Self::new(Arc::new(store), public_base_url))
    }

    /// Local directory acting as a bucket, for development.
    pub fn local(dir: &Path, public_base_url: &str) -> Result<Self, AppError> {
        std::fs::create_dir_all(dir)?;
        let store = LocalFileSystem::new_with_prefix(dir).map_err(|e| {
            AppError::Publish(format!("Failed to open {}: {}", dir.display(), e))
        })?;

        Ok(Self::new(Arc::new(store), public_base_url))
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl AudioPublisher for ObjectStorePublisher {
    async fn publish(&self, artifact: &AudioArtifact) -> Result<String, AppError> {
        let key = artifact.object_key();

        let bytes = tokio::fs::read(artifact.path()).await.map_err(|e| {
            tracing::debug!(path = %artifact.path().display(), "Failed to read audio file: {}", e);
            AppError::Publish("could not read synthesized audio".to_string())
        })?;
        let size = bytes.len();

        self.store
            .put(&ObjectPath::from(key.as_str()), PutPayload::from(bytes))
            .await
            .map_err(|e| {
                tracing::debug!(key = %key, "Object store upload failed: {}", e);
                AppError::Publish(e.to_string())
            })?;

        tracing::info!(key = %key, size, "Uploaded audio");
        Ok(self.public_url(&key))
    }
}
