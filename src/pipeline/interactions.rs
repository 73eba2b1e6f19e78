//! Stage 6: drug-drug interaction lookup for a resolved identity.

use std::sync::Arc;

use super::error::PipelineError;
use super::traits::InteractionSource;
use crate::models::{InteractionReport, MedicationMention, PharmacologicalIdentity};

pub struct InteractionLookup {
    source: Arc<dyn InteractionSource>,
}

impl InteractionLookup {
    pub fn new(source: Arc<dyn InteractionSource>) -> Self {
        Self { source }
    }

    /// `None` for unresolved identities, without an outbound call.
    pub async fn lookup(
        &self,
        mention: &MedicationMention,
        identity: &PharmacologicalIdentity,
    ) -> Result<Option<InteractionReport>, PipelineError> {
        let Some(id) = identity.id() else {
            return Ok(None);
        };

        self.source
            .interactions(id)
            .await
            .map(Some)
            .map_err(|source| PipelineError::InteractionUnavailable {
                mention: mention.raw_name.clone(),
                source,
            })
    }
}
