//! NLM RxNav adapter: name resolution, ingredient composition and
//! interaction lookup.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::UpstreamClient;
use super::UpstreamError;
use crate::models::InteractionReport;
use crate::pipeline::traits::{CompositionLookup, IngredientGroup, InteractionSource, NameLookup};

/// Term type requested from `related.json` (ingredient).
const INGREDIENT_TERM_TYPE: &str = "IN";

/// Historical RxNav interaction endpoint. NLM retired it in January 2024;
/// deployments point `with_interaction_endpoint` at a compatible mirror.
pub const DEFAULT_INTERACTION_PATH: &str = "/REST/interaction/interaction.json";

#[derive(Debug, Clone)]
pub struct RxNavClient {
    http: UpstreamClient,
    interaction_http: UpstreamClient,
    interaction_path: String,
}

impl RxNavClient {
    pub fn new(http: UpstreamClient) -> Self {
        Self {
            interaction_http: http.clone(),
            interaction_path: DEFAULT_INTERACTION_PATH.to_string(),
            http,
        }
    }

    /// Serve interaction lookups from another host and/or path. The path
    /// receives the identifier as the `rxcui` query parameter.
    pub fn with_interaction_endpoint(mut self, http: UpstreamClient, path: impl Into<String>) -> Self {
        self.interaction_http = http;
        self.interaction_path = path.into();
        self
    }
}

// ──────────────────────────────────────────────
// Response shapes
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RxcuiResponse {
    #[serde(default)]
    id_group: IdGroup,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdGroup {
    #[serde(default)]
    rxnorm_id: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelatedResponse {
    #[serde(default)]
    related_group: RelatedGroup,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelatedGroup {
    #[serde(default)]
    concept_group: Vec<ConceptGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConceptGroup {
    #[serde(default)]
    tty: String,
    #[serde(default)]
    concept_properties: Vec<ConceptProperties>,
}

#[derive(Debug, Deserialize)]
struct ConceptProperties {
    name: String,
}

// ──────────────────────────────────────────────
// Capabilities
// ──────────────────────────────────────────────

#[async_trait]
impl NameLookup for RxNavClient {
    async fn candidates(&self, name: &str) -> Result<Vec<String>, UpstreamError> {
        // search=2: exact match first, then normalized match.
        let parsed: RxcuiResponse = self
            .http
            .get_json(
                "/REST/rxcui.json",
                &[("name", name.to_string()), ("search", "2".to_string())],
            )
            .await?;
        Ok(parsed.id_group.rxnorm_id)
    }
}

#[async_trait]
impl CompositionLookup for RxNavClient {
    async fn ingredient_groups(&self, id: &str) -> Result<Vec<IngredientGroup>, UpstreamError> {
        let path = format!("/REST/rxcui/{id}/related.json");
        let parsed: RelatedResponse = self
            .http
            .get_json(&path, &[("tty", INGREDIENT_TERM_TYPE.to_string())])
            .await?;

        Ok(parsed
            .related_group
            .concept_group
            .into_iter()
            .map(|group| IngredientGroup {
                term_type: group.tty,
                names: group.concept_properties.into_iter().map(|c| c.name).collect(),
            })
            .collect())
    }
}

#[async_trait]
impl InteractionSource for RxNavClient {
    async fn interactions(&self, id: &str) -> Result<InteractionReport, UpstreamError> {
        let payload: serde_json::Value = self
            .interaction_http
            .get_json(&self.interaction_path, &[("rxcui", id.to_string())])
            .await?;
        Ok(InteractionReport(payload))
    }
}
