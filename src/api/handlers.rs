use axum::{body::Bytes, extract::State, Json};
use std::sync::Arc;

use super::{HealthResponse, TtsResponse};
use crate::api::routes::AppState;
use crate::error::AppError;
use crate::storage::AudioArtifact;

/// `POST /tts` with `{"text": "..."}`.
///
/// The body is read as raw bytes so that a missing, malformed or non-object
/// body gets the same 400 as a blank `text`, instead of an extractor rejection.
pub async fn tts(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TtsResponse>, AppError> {
    let text = request_text(&body).ok_or(AppError::MissingText)?;

    // Removed on drop, so every early return below cleans up.
    let artifact = AudioArtifact::create(&state.scratch_dir)?;

    tracing::info!(
        id = %artifact.id(),
        chars = text.chars().count(),
        backend = state.synthesizer.name(),
        "Synthesizing speech"
    );

    state.synthesizer.synthesize(&text, artifact.path()).await?;
    let audio_url = state.publisher.publish(&artifact).await?;

    let id = artifact.id();
    if let Err(e) = artifact.close() {
        tracing::warn!(id = %id, "Failed to remove temporary audio: {}", e);
    }

    tracing::info!(id = %id, url = %audio_url, "Published speech");
    Ok(Json(TtsResponse { audio_url, text }))
}

/// The `text` field of a JSON object body, if it is a non-blank string.
fn request_text(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let text = value.as_object()?.get("text")?.as_str()?;

    if text.trim().is_empty() {
        return None;
    }
    Some(text.to_string())
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.synthesizer.name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use crate::storage::{AudioPublisher, ObjectStorePublisher};
    use crate::tts::pipeline::{AcousticPipeline, Spectrogram};
    use crate::tts::{PipelineSynthesizer, SpeechSynthesizer};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use object_store::memory::InMemory;
    use object_store::ObjectStore;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeSynthesizer {
        fail: bool,
        calls: AtomicUsize,
        paths: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynthesizer {
        async fn synthesize(&self, _text: &str, output: &Path) -> Result<(), AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.paths.lock().unwrap().push(output.to_path_buf());
            if self.fail {
                // Partial output left behind by a failing backend.
                std::fs::write(output, b"RIF")?;
                return Err(AppError::Synthesis("speech client exited with exit status: 1".into()));
            }
            std::fs::write(output, b"RIFF....WAVEfmt ")?;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    struct FailingPublisher {
        calls: AtomicUsize,
        saw_file: Mutex<Option<bool>>,
    }

    #[async_trait]
    impl AudioPublisher for FailingPublisher {
        async fn publish(&self, artifact: &AudioArtifact) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.saw_file.lock().unwrap() = Some(artifact.path().exists());
            Err(AppError::Publish("bucket unavailable".into()))
        }
    }

    struct Harness {
        app: Router,
        scratch: TempDir,
        synthesizer: Arc<FakeSynthesizer>,
        store: Arc<InMemory>,
    }

    fn harness(fail_synthesis: bool) -> Harness {
        let scratch = tempfile::tempdir().unwrap();
        let synthesizer = Arc::new(FakeSynthesizer {
            fail: fail_synthesis,
            ..Default::default()
        });
        let store = Arc::new(InMemory::new());
        let publisher = ObjectStorePublisher::new(
            store.clone(),
            "https://storage.googleapis.com/speech",
        );

        let state = Arc::new(AppState {
            synthesizer: synthesizer.clone(),
            publisher: Arc::new(publisher),
            scratch_dir: scratch.path().to_path_buf(),
        });

        Harness {
            app: create_router(state),
            scratch,
            synthesizer,
            store,
        }
    }

    async fn post_tts(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tts")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn scratch_is_empty(dir: &TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn publishes_and_echoes_text() {
        let h = harness(false);
        let (status, json) = post_tts(h.app, r#"{"text": "hello world"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["text"], "hello world");

        let url = json["audio_url"].as_str().unwrap();
        let key = url
            .strip_prefix("https://storage.googleapis.com/speech/")
            .unwrap();
        assert!(key.ends_with(".wav"));
        assert!(uuid::Uuid::parse_str(key.trim_end_matches(".wav")).is_ok());

        let stored = h
            .store
            .get(&object_store::path::Path::from(key))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert!(stored.starts_with(b"RIFF"));
        assert!(scratch_is_empty(&h.scratch));
    }

    #[tokio::test]
    async fn text_is_echoed_verbatim() {
        let h = harness(false);
        let (status, json) = post_tts(h.app, r#"{"text": "  padded  "}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["text"], "  padded  ");
    }

    #[tokio::test]
    async fn missing_or_blank_text_is_rejected() {
        for body in [
            "{}",
            "",
            "not json",
            "[]",
            r#"["text"]"#,
            r#"{"text": ""}"#,
            r#"{"text": "   \n\t"}"#,
            r#"{"text": null}"#,
            r#"{"text": 42}"#,
        ] {
            let h = harness(false);
            let (status, json) = post_tts(h.app, body).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {:?}", body);
            assert_eq!(json, serde_json::json!({ "error": "No text provided" }));
            assert_eq!(h.synthesizer.calls.load(Ordering::SeqCst), 0);
            assert!(scratch_is_empty(&h.scratch));
        }
    }

    #[tokio::test]
    async fn synthesis_failure_skips_upload_and_cleans_up() {
        let h = harness(true);
        let (status, json) = post_tts(h.app, r#"{"text": "hello"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().starts_with("Speech synthesis failed"));
        assert!(h
            .store
            .list_with_delimiter(None)
            .await
            .unwrap()
            .objects
            .is_empty());

        let paths = h.synthesizer.paths.lock().unwrap().clone();
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].exists());
        assert!(scratch_is_empty(&h.scratch));
    }

    #[tokio::test]
    async fn upload_failure_still_removes_file() {
        let scratch = tempfile::tempdir().unwrap();
        let synthesizer = Arc::new(FakeSynthesizer::default());
        let publisher = Arc::new(FailingPublisher {
            calls: AtomicUsize::new(0),
            saw_file: Mutex::new(None),
        });
        let app = create_router(Arc::new(AppState {
            synthesizer: synthesizer.clone(),
            publisher: publisher.clone(),
            scratch_dir: scratch.path().to_path_buf(),
        }));

        let (status, json) = post_tts(app, r#"{"text": "hello"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Audio upload failed: bucket unavailable");
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*publisher.saw_file.lock().unwrap(), Some(true));
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn concurrent_requests_get_distinct_files_and_keys() {
        let h = harness(false);

        let requests = (0..16).map(|i| {
            let app = h.app.clone();
            async move { post_tts(app, &format!(r#"{{"text": "request {}"}}"#, i)).await }
        });
        let results = spawn_all(requests).await;

        let mut urls = std::collections::HashSet::new();
        for (status, json) in results {
            assert_eq!(status, StatusCode::OK);
            urls.insert(json["audio_url"].as_str().unwrap().to_string());
        }
        assert_eq!(urls.len(), 16);

        let paths: std::collections::HashSet<_> =
            h.synthesizer.paths.lock().unwrap().iter().cloned().collect();
        assert_eq!(paths.len(), 16);
        assert!(scratch_is_empty(&h.scratch));
    }

    async fn spawn_all<F, T>(futures: impl Iterator<Item = F>) -> Vec<T>
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = futures.map(tokio::spawn).collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.await.unwrap());
        }
        out
    }

    /// Inference that takes longer than the caller is willing to wait.
    struct SlowPipeline;

    impl AcousticPipeline for SlowPipeline {
        fn text_to_tokens(&self, _text: &str) -> Result<Vec<i64>, AppError> {
            Ok(vec![1, 2, 3])
        }

        fn tokens_to_spectrogram(&self, tokens: &[i64]) -> Result<Spectrogram, AppError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Spectrogram {
                shape: vec![1, 1, tokens.len()],
                data: vec![0.0; tokens.len()],
            })
        }

        fn spectrogram_to_audio(&self, _spectrogram: &Spectrogram) -> Result<Vec<f32>, AppError> {
            Ok(vec![0.25; 2205])
        }

        fn sample_rate(&self) -> u32 {
            22050
        }
    }

    fn pipeline_app(scratch: &TempDir) -> Router {
        create_router(Arc::new(AppState {
            synthesizer: Arc::new(PipelineSynthesizer::new(SlowPipeline)),
            publisher: Arc::new(ObjectStorePublisher::new(
                Arc::new(InMemory::new()),
                "https://storage.googleapis.com/speech",
            )),
            scratch_dir: scratch.path().to_path_buf(),
        }))
    }

    fn scratch_entries(dir: &TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn pipeline_backend_publishes_and_cleans_up() {
        let scratch = tempfile::tempdir().unwrap();
        let (status, json) = post_tts(pipeline_app(&scratch), r#"{"text": "hello"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["text"], "hello");
        assert!(scratch_entries(&scratch).is_empty());
    }

    #[tokio::test]
    async fn cancelled_request_leaves_no_file() {
        let scratch = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/tts")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"text": "hello"}"#))
            .unwrap();

        let outcome =
            tokio::time::timeout(Duration::from_millis(50), pipeline_app(&scratch).oneshot(request))
                .await;
        assert!(outcome.is_err(), "request should still be synthesizing");

        // Let the detached inference finish.
        tokio::time::sleep(Duration::from_millis(700)).await;
        let leftover = scratch_entries(&scratch);
        assert!(leftover.is_empty(), "leftover files: {:?}", leftover);
    }

    #[tokio::test]
    async fn health_reports_backend() {
        let h = harness(false);
        let response = h
            .app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["backend"], "fake");
    }
}
