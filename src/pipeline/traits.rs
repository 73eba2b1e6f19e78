//! Capabilities the pipeline consumes.
//!
//! One trait per collaborator so stages can be tested against mocks. All
//! implementations must be cheap to share (`Send + Sync`) because a single
//! instance serves every concurrent mention.

use async_trait::async_trait;

use crate::clients::UpstreamError;
use crate::models::{ImagePayload, InteractionReport, LabelExcerpt};

/// Free-text generation (extraction prompts, summary synthesis).
#[async_trait]
pub trait TextGeneration: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, UpstreamError>;
}

/// Generation over an image plus prompt.
#[async_trait]
pub trait VisionGeneration: Send + Sync {
    async fn generate_with_image(
        &self,
        system: &str,
        prompt: &str,
        image: &ImagePayload,
    ) -> Result<String, UpstreamError>;
}

/// Medication name → candidate identifiers, in service order.
#[async_trait]
pub trait NameLookup: Send + Sync {
    async fn candidates(&self, name: &str) -> Result<Vec<String>, UpstreamError>;
}

/// One grouped block of a composition response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientGroup {
    pub term_type: String,
    pub names: Vec<String>,
}

/// Identifier → grouped ingredient names.
#[async_trait]
pub trait CompositionLookup: Send + Sync {
    async fn ingredient_groups(&self, id: &str) -> Result<Vec<IngredientGroup>, UpstreamError>;
}

/// Ingredient name → label entries, at most `limit`.
///
/// "No entry" is reported as `UpstreamError::NotFound`.
#[async_trait]
pub trait LabelSearch: Send + Sync {
    async fn search(&self, ingredient: &str, limit: usize) -> Result<Vec<LabelExcerpt>, UpstreamError>;
}

/// Identifier → raw interaction payload.
#[async_trait]
pub trait InteractionSource: Send + Sync {
    async fn interactions(&self, id: &str) -> Result<InteractionReport, UpstreamError>;
}
