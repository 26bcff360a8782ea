//! The caption/summary client used during enrichment.
//!
//! [`Annotator`] is the capability the enricher depends on. It is passed in
//! as `Option<&dyn Annotator>`; `None` runs the pipeline with no model.
//!
//! ## Failure semantics
//!
//! Neither operation returns `Result`. Every per-item failure (timeout,
//! HTTP error, unreadable image, empty answer) is logged here and becomes
//! [`Annotation::Failed`]; the next item is attempted regardless. Requests
//! are not retried.

use crate::error::AnnotationError;
use crate::output::Annotation;
use crate::pipeline::backend::{InferenceBackend, InferenceRequest};
use crate::pipeline::encode::encode_image_file;
use crate::pipeline::postprocess::clean_response;
use crate::prompts::{summary_prompt, IMAGE_DESCRIPTION_PROMPT};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Describe images and summarise slide text.
#[async_trait]
pub trait Annotator: Send + Sync {
    /// One-sentence summary of `text`. Never fails; see module docs.
    async fn summarize(&self, text: &str) -> Annotation;

    /// Caption every image in `paths`, in order, one request at a time.
    ///
    /// Paths that do not exist on disk are logged and left out of the map
    /// entirely; a failed request maps its path to [`Annotation::Failed`].
    async fn describe_images(&self, paths: &[PathBuf]) -> HashMap<PathBuf, Annotation>;
}

/// [`Annotator`] backed by a language model.
pub struct LlmAnnotator {
    backend: Arc<dyn InferenceBackend>,
    timeout: Duration,
}

impl LlmAnnotator {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Bound every request; a timeout is treated like any other failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    async fn request(&self, request: InferenceRequest<'_>) -> Result<String, AnnotationError> {
        let start = Instant::now();
        match tokio::time::timeout(self.timeout, self.backend.generate(request)).await {
            Ok(Ok(raw)) => {
                debug!(
                    "{}: answered in {}ms",
                    self.backend.describe(),
                    start.elapsed().as_millis()
                );
                Ok(clean_response(&raw))
            }
            Ok(Err(AnnotationError::Timeout { .. })) | Err(_) => Err(AnnotationError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => Err(e),
        }
    }

    async fn describe_image(&self, path: &Path) -> Annotation {
        let image = match encode_image_file(path).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Error describing image {}: {}", path.display(), e);
                return Annotation::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let result = self
            .request(InferenceRequest::with_image(IMAGE_DESCRIPTION_PROMPT, &image))
            .await;
        let annotation = Annotation::from_result(result);
        if let Annotation::Failed { reason } = &annotation {
            warn!("Error describing image {}: {}", path.display(), reason);
        }
        annotation
    }
}

#[async_trait]
impl Annotator for LlmAnnotator {
    async fn summarize(&self, text: &str) -> Annotation {
        let prompt = summary_prompt(text);
        let annotation = Annotation::from_result(self.request(InferenceRequest::text(&prompt)).await);
        if let Annotation::Failed { reason } = &annotation {
            warn!("Error generating summary: {}", reason);
        }
        annotation
    }

    async fn describe_images(&self, paths: &[PathBuf]) -> HashMap<PathBuf, Annotation> {
        let mut descriptions = HashMap::with_capacity(paths.len());
        for path in paths {
            if descriptions.contains_key(path) {
                continue;
            }
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                warn!("Image not found: {}", path.display());
                continue;
            }
            let annotation = self.describe_image(path).await;
            descriptions.insert(path.clone(), annotation);
        }
        descriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Backend that records every request and can fail the Nth call.
    struct ScriptedBackend {
        seen: Mutex<Vec<String>>,
        fail_on_call: Option<usize>,
        delay: Option<Duration>,
        reply: String,
    }

    impl ScriptedBackend {
        fn replying(reply: &str) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail_on_call: None,
                delay: None,
                reply: reply.to_string(),
            }
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        fn describe(&self) -> String {
            "scripted".into()
        }

        async fn generate(&self, request: InferenceRequest<'_>) -> Result<String, AnnotationError> {
            let call = {
                let mut seen = self.seen.lock().unwrap();
                seen.push(match request.image {
                    Some(image) => format!("image:{}", image.data),
                    None => format!("text:{}", request.prompt),
                });
                seen.len()
            };
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_on_call == Some(call) {
                return Err(AnnotationError::Transport("connection reset".into()));
            }
            Ok(format!("{} #{call}", self.reply))
        }
    }

    fn write_images(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
        names
            .iter()
            .map(|name| {
                let p = dir.join(name);
                std::fs::write(&p, name.as_bytes()).unwrap();
                p
            })
            .collect()
    }

    #[tokio::test]
    async fn summarize_cleans_response() {
        let backend = Arc::new(ScriptedBackend::replying("Sure! The slide lists goals."));
        let annotator = LlmAnnotator::new(backend.clone());

        let summary = annotator.summarize("- goal one\n- goal two").await;
        assert_eq!(summary, Annotation::Generated("The slide lists goals. #1".into()));

        let seen = backend.seen.lock().unwrap();
        assert!(seen[0].starts_with("text:Summarize in exactly one sentence"));
        assert!(seen[0].ends_with("- goal one\n- goal two"));
    }

    #[tokio::test]
    async fn summarize_failure_is_soft() {
        let backend = Arc::new(ScriptedBackend {
            fail_on_call: Some(1),
            ..ScriptedBackend::replying("unused")
        });
        let annotator = LlmAnnotator::new(backend);

        let summary = annotator.summarize("text").await;
        assert!(summary.is_failed());
        assert_eq!(summary.as_str(), "");
    }

    #[tokio::test]
    async fn missing_images_are_absent_from_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_images(dir.path(), &["a.png"]);
        paths.push(dir.path().join("missing.png"));

        let annotator = LlmAnnotator::new(Arc::new(ScriptedBackend::replying("A thing.")));
        let result = annotator.describe_images(&paths).await;

        assert_eq!(result.len(), 1);
        assert!(result[&paths[0]].is_generated());
        assert!(!result.contains_key(&paths[1]));
    }

    #[tokio::test]
    async fn one_failed_image_does_not_affect_others() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_images(dir.path(), &["one.png", "two.png", "three.png"]);
        let backend = Arc::new(ScriptedBackend {
            fail_on_call: Some(2),
            ..ScriptedBackend::replying("An image.")
        });
        let annotator = LlmAnnotator::new(backend.clone());

        let result = annotator.describe_images(&paths).await;

        assert_eq!(result.len(), 3);
        assert!(result[&paths[0]].is_generated());
        assert!(result[&paths[1]].is_failed());
        assert!(result[&paths[2]].is_generated());
        assert_eq!(backend.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn images_are_requested_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_images(dir.path(), &["b.png", "a.png", "c.png"]);
        let backend = Arc::new(ScriptedBackend::replying("x"));
        let annotator = LlmAnnotator::new(backend.clone());

        annotator.describe_images(&paths).await;

        use base64::{engine::general_purpose::STANDARD, Engine as _};
        let expected: Vec<String> = ["b.png", "a.png", "c.png"]
            .iter()
            .map(|n| format!("image:{}", STANDARD.encode(n.as_bytes())))
            .collect();
        assert_eq!(*backend.seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn duplicate_paths_are_described_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_images(dir.path(), &["logo.png"]).remove(0);
        let backend = Arc::new(ScriptedBackend::replying("Logo."));
        let annotator = LlmAnnotator::new(backend.clone());

        let result = annotator.describe_images(&[path.clone(), path.clone()]).await;
        assert_eq!(result.len(), 1);
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn timeout_becomes_failed_annotation() {
        let backend = Arc::new(ScriptedBackend {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedBackend::replying("too late")
        });
        let annotator = LlmAnnotator::new(backend).with_timeout(Duration::from_millis(50));

        match annotator.summarize("text").await {
            Annotation::Failed { reason } => assert!(reason.contains("timed out"), "got: {reason}"),
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_answer_is_failure() {
        struct Blank;

        #[async_trait]
        impl InferenceBackend for Blank {
            fn describe(&self) -> String {
                "blank".into()
            }

            async fn generate(&self, _: InferenceRequest<'_>) -> Result<String, AnnotationError> {
                Ok(" \n\u{200B}\n ".into())
            }
        }

        let annotator = LlmAnnotator::new(Arc::new(Blank));
        assert!(annotator.summarize("text").await.is_failed());
    }
}
