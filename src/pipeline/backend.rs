//! Inference backends: the request/response boundary to the language model.
//!
//! A backend takes a model prompt plus at most one embedded image and
//! returns the generated text. Timeouts, response cleanup and the mapping to
//! [`crate::output::Annotation`] live in
//! [`crate::pipeline::annotate::LlmAnnotator`].
//!
//! Two implementations ship with the crate:
//!
//! * [`OllamaBackend`]: talks to a local Ollama server over HTTP
//!   (`POST /api/chat`, non-streaming). The default.
//! * [`ProviderBackend`]: wraps any [`edgequake_llm::LLMProvider`] so hosted
//!   vision models (OpenAI, Anthropic, Gemini, …) can be used instead.

use crate::error::AnnotationError;
use crate::pipeline::encode::EncodedImage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One generation request.
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    pub prompt: &'a str,
    pub image: Option<&'a EncodedImage>,
}

impl<'a> InferenceRequest<'a> {
    pub fn text(prompt: &'a str) -> Self {
        Self {
            prompt,
            image: None,
        }
    }

    pub fn with_image(prompt: &'a str, image: &'a EncodedImage) -> Self {
        Self {
            prompt,
            image: Some(image),
        }
    }
}

/// Sampling parameters shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    /// `None` keeps the model's own default.
    pub temperature: Option<f32>,
    pub max_tokens: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: None,
            max_tokens: 500,
        }
    }
}

/// A model endpoint that turns a prompt (and optional image) into text.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short name for logs, e.g. `ollama:gemma3:4b`.
    fn describe(&self) -> String;

    async fn generate(&self, request: InferenceRequest<'_>) -> Result<String, AnnotationError>;

    /// Cheap reachability check run once before a batch. Backends without
    /// one report success.
    async fn check_connection(&self) -> Result<(), AnnotationError> {
        Ok(())
    }
}

// ── Ollama ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    num_predict: usize,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

/// Backend for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    options: GenerationOptions,
}

impl OllamaBackend {
    /// Create a backend for `model` served at `base_url`
    /// (e.g. `http://localhost:11434`).
    ///
    /// `timeout` bounds every HTTP request, connection included.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        options: GenerationOptions,
        timeout: Duration,
    ) -> Result<Self, AnnotationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnnotationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            options,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Probe `GET /api/tags` to see whether the server is up.
    ///
    /// The pipeline runs without a reachable server (every annotation just
    /// stays empty), so callers use this only to warn early.
    pub async fn check_connection(&self) -> Result<(), AnnotationError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(3))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            return Err(AnnotationError::HttpStatus {
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }

    fn build_request<'a>(&'a self, request: &InferenceRequest<'a>) -> OllamaChatRequest<'a> {
        OllamaChatRequest {
            model: &self.model,
            messages: vec![OllamaMessage {
                role: "user",
                content: request.prompt,
                images: request.image.map(|i| i.data.as_str()).into_iter().collect(),
            }],
            stream: false,
            options: OllamaOptions {
                temperature: self.options.temperature,
                num_predict: self.options.max_tokens,
            },
        }
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn describe(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn check_connection(&self) -> Result<(), AnnotationError> {
        OllamaBackend::check_connection(self).await
    }

    async fn generate(&self, request: InferenceRequest<'_>) -> Result<String, AnnotationError> {
        let body = self.build_request(&request);
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(AnnotationError::HttpStatus {
                status: status.as_u16(),
                body: truncate(&text, 200),
            });
        }

        parse_chat_response(&text)
    }
}

fn parse_chat_response(body: &str) -> Result<String, AnnotationError> {
    let parsed: OllamaChatResponse = serde_json::from_str(body)
        .map_err(|e| AnnotationError::InvalidResponse(e.to_string()))?;

    if let Some(error) = parsed.error {
        return Err(AnnotationError::InvalidResponse(error));
    }
    let message = parsed
        .message
        .ok_or_else(|| AnnotationError::InvalidResponse("missing 'message' field".into()))?;
    debug!("Ollama returned {} chars", message.content.len());
    Ok(message.content)
}

fn map_reqwest_error(e: reqwest::Error) -> AnnotationError {
    if e.is_timeout() {
        // The exact budget is enforced and reported by the annotator.
        AnnotationError::Timeout { elapsed_ms: 0 }
    } else {
        AnnotationError::Transport(e.to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Backend over a pre-built [`LLMProvider`].
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    options: GenerationOptions,
}

impl ProviderBackend {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        label: impl Into<String>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            provider,
            label: label.into(),
            options,
        }
    }

    fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.options.temperature,
            max_tokens: Some(self.options.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl InferenceBackend for ProviderBackend {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn generate(&self, request: InferenceRequest<'_>) -> Result<String, AnnotationError> {
        let message = match request.image {
            Some(image) => ChatMessage::user_with_images(
                request.prompt,
                vec![ImageData::new(image.data.clone(), image.mime_type)],
            ),
            None => ChatMessage::user(request.prompt),
        };

        let options = self.completion_options();
        let response = self
            .provider
            .chat(&[message], Some(&options))
            .await
            .map_err(|e| AnnotationError::Provider(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}
