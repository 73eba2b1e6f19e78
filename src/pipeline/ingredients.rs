//! Stage 3: canonical identity → active ingredients.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::error::PipelineError;
use super::traits::{CompositionLookup, IngredientGroup};
use crate::models::{IngredientName, MedicationMention, PharmacologicalIdentity};

pub struct IngredientExpander {
    lookup: Arc<dyn CompositionLookup>,
}

/// Flatten grouped names into a sorted, de-duplicated set.
pub fn flatten_groups(groups: Vec<IngredientGroup>) -> Vec<IngredientName> {
    groups
        .into_iter()
        .flat_map(|group| group.names)
        .filter_map(|name| IngredientName::normalize(&name))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl IngredientExpander {
    pub fn new(lookup: Arc<dyn CompositionLookup>) -> Self {
        Self { lookup }
    }

    /// Unresolved identities expand to nothing without an outbound call.
    pub async fn expand(
        &self,
        mention: &MedicationMention,
        identity: &PharmacologicalIdentity,
    ) -> Result<Vec<IngredientName>, PipelineError> {
        let Some(id) = identity.id() else {
            return Ok(Vec::new());
        };

        let groups = self.lookup.ingredient_groups(id).await.map_err(|source| {
            PipelineError::ExpansionUnavailable {
                mention: mention.raw_name.clone(),
                source,
            }
        })?;

        let ingredients = flatten_groups(groups);
        tracing::debug!(mention = %mention.raw_name, id, count = ingredients.len(), "Ingredients expanded");
        Ok(ingredients)
    }
}
