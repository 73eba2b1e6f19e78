//! Wire types and validators for the Ollama HTTP API.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Request types
// ──────────────────────────────────────────────

/// Generation parameters for Ollama `/api/generate` and `/api/chat`.
///
/// Low temperature keeps extraction output reproducible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// None = model default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.9,
            top_k: 40,
            num_predict: None,
            num_ctx: None,
        }
    }
}

/// Request body for `/api/generate`.
#[derive(Debug, Serialize)]
pub(crate) struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub system: &'a str,
    pub stream: bool,
    pub options: &'a GenerationOptions,
}

/// Chat-based request for `/api/chat`.
///
/// Vision models with chat templates expect images inside a user message;
/// `/api/generate` rejects them.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded images (user messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
            images: None,
        }
    }

    pub fn user_with_images(content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
            images: Some(images),
        }
    }
}

// ──────────────────────────────────────────────
// Response types
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagModel {
    pub name: String,
}

// ──────────────────────────────────────────────
// Model name helpers
// ──────────────────────────────────────────────

/// Known vision-capable model name prefixes.
pub const VISION_MODEL_PREFIXES: &[&str] = &[
    "llava",
    "llama3.2-vision",
    "moondream",
    "bakllava",
    "minicpm-v",
    "qwen2.5vl",
    "gemma3",
    "medgemma",
];

/// Name-prefix heuristic; no network call.
pub fn is_vision_model(model_name: &str) -> bool {
    let component = extract_model_component(model_name);
    VISION_MODEL_PREFIXES
        .iter()
        .any(|prefix| component.starts_with(prefix))
}

/// Strip namespace and tag: `"library/llava:13b"` → `"llava"`.
pub fn extract_model_component(full_name: &str) -> String {
    let without_tag = full_name.split(':').next().unwrap_or(full_name);
    let model_part = without_tag.rsplit('/').next().unwrap_or(without_tag);
    model_part.to_lowercase()
}

/// True when an installed model satisfies a configured name.
///
/// `"llava"` matches `"llava:latest"`; a tagged name must match exactly.
pub fn model_matches(configured: &str, installed: &str) -> bool {
    if configured.contains(':') {
        configured == installed
    } else {
        installed.split(':').next() == Some(configured)
    }
}

// ──────────────────────────────────────────────
// Validators
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OllamaConfigError {
    #[error("Invalid URL format: '{0}'")]
    InvalidUrl(String),

    #[error("Only loopback Ollama endpoints are allowed: '{0}'")]
    NonLocalEndpoint(String),

    #[error("Invalid model name: '{0}'")]
    InvalidModelName(String),
}

/// Check that a base URL is well formed, and loopback unless `allow_remote`.
///
/// Accepts: localhost, 127.0.0.1, [::1].
pub fn validate_base_url(url: &str, allow_remote: bool) -> Result<(), OllamaConfigError> {
    let after_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| OllamaConfigError::InvalidUrl(url.to_string()))?;

    let host = if after_scheme.starts_with('[') {
        after_scheme
            .split(']')
            .next()
            .unwrap_or("")
            .trim_start_matches('[')
    } else {
        after_scheme
            .split(['/', ':'])
            .next()
            .unwrap_or("")
    };

    if host.is_empty() {
        return Err(OllamaConfigError::InvalidUrl(url.to_string()));
    }
    if allow_remote {
        return Ok(());
    }

    match host {
        "localhost" | "127.0.0.1" | "::1" => Ok(()),
        _ => Err(OllamaConfigError::NonLocalEndpoint(url.to_string())),
    }
}

/// Validate a model name: `[namespace/]model[:tag]`, at most one `/`.
pub fn validate_model_name(name: &str) -> Result<(), OllamaConfigError> {
    static MODEL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*(/[a-zA-Z0-9][a-zA-Z0-9._-]*)?(:[a-zA-Z0-9._-]+)?$")
            .expect("static regex")
    });

    if MODEL_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(OllamaConfigError::InvalidModelName(name.to_string()))
    }
}
