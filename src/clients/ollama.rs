use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;

use super::http::UpstreamClient;
use super::ollama_types::{
    model_matches, ChatMessage, ChatRequest, GenerateRequest, GenerateResponse, ChatResponse,
    GenerationOptions, TagsResponse,
};
use super::UpstreamError;
use crate::models::ImagePayload;
use crate::pipeline::traits::{TextGeneration, VisionGeneration};

/// Ollama HTTP client for local LLM inference.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: UpstreamClient,
    options: GenerationOptions,
}

impl OllamaClient {
    pub fn new(http: UpstreamClient) -> Self {
        Self {
            http,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Non-streaming `/api/generate`.
    pub async fn generate(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String, UpstreamError> {
        let body = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            options: &self.options,
        };
        let parsed: GenerateResponse = self.http.post_json("/api/generate", &body).await?;
        Ok(parsed.response)
    }

    /// Non-streaming `/api/chat` with base64 images attached to the user turn.
    pub async fn chat_with_images(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        images: Vec<String>,
    ) -> Result<String, UpstreamError> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user_with_images(prompt, images));

        let body = ChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
            options: Some(self.options.clone()),
        };
        let parsed: ChatResponse = self.http.post_json("/api/chat", &body).await?;
        Ok(parsed.message.content)
    }

    /// Installed model names from `/api/tags`.
    pub async fn list_models(&self) -> Result<Vec<String>, UpstreamError> {
        let parsed: TagsResponse = self.http.get_json("/api/tags", &[]).await?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    pub async fn is_model_available(&self, model: &str) -> Result<bool, UpstreamError> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| model_matches(model, m)))
    }
}

/// `TextGeneration` bound to one Ollama model.
#[derive(Debug, Clone)]
pub struct OllamaTextGenerator {
    client: Arc<OllamaClient>,
    model: String,
}

impl OllamaTextGenerator {
    pub fn new(client: Arc<OllamaClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGeneration for OllamaTextGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, UpstreamError> {
        self.client.generate(&self.model, system, prompt).await
    }
}

/// `VisionGeneration` bound to one vision-capable Ollama model.
#[derive(Debug, Clone)]
pub struct OllamaVisionGenerator {
    client: Arc<OllamaClient>,
    model: String,
}

impl OllamaVisionGenerator {
    pub fn new(client: Arc<OllamaClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl VisionGeneration for OllamaVisionGenerator {
    async fn generate_with_image(
        &self,
        system: &str,
        prompt: &str,
        image: &ImagePayload,
    ) -> Result<String, UpstreamError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&image.bytes);
        self.client
            .chat_with_images(&self.model, system, prompt, vec![encoded])
            .await
    }
}
