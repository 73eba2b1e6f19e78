//! openFDA drug label adapter.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::UpstreamClient;
use super::UpstreamError;
use crate::models::LabelExcerpt;
use crate::pipeline::traits::LabelSearch;

#[derive(Debug, Clone)]
pub struct OpenFdaClient {
    http: UpstreamClient,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

impl OpenFdaClient {
    pub fn new(http: UpstreamClient, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Escape a value for use inside a quoted openFDA search term.
    pub fn escape_query_value(value: &str) -> String {
        value.replace('\\', "\\\\").replace('"', "\\\"")
    }

    fn search_expression(ingredient: &str) -> String {
        let escaped = Self::escape_query_value(ingredient.trim());
        format!("openfda.generic_name:\"{escaped}\" OR openfda.substance_name:\"{escaped}\"")
    }
}

#[async_trait]
impl LabelSearch for OpenFdaClient {
    async fn search(&self, ingredient: &str, limit: usize) -> Result<Vec<LabelExcerpt>, UpstreamError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut query = vec![
            ("search", Self::search_expression(ingredient)),
            ("limit", limit.to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.clone()));
        }

        let parsed: LabelResponse = self.http.get_json("/drug/label.json", &query).await?;
        Ok(parsed
            .results
            .into_iter()
            .take(limit)
            .map(LabelExcerpt)
            .collect())
    }
}
