use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::enums::PipelineStage;

/// A medication as named in the user's input, before any normalization.
///
/// `strength` and `form` are only filled in when the source was an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationMention {
    pub raw_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
}

impl MedicationMention {
    pub fn named(raw_name: impl Into<String>) -> Self {
        Self {
            raw_name: raw_name.into(),
            strength: None,
            form: None,
        }
    }
}

/// Canonical pharmacological identity of a mention.
///
/// Serialized as the identifier string, or `null` when unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum PharmacologicalIdentity {
    Resolved(String),
    Unresolved,
}

impl PharmacologicalIdentity {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Resolved(id) => Some(id),
            Self::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

impl From<Option<String>> for PharmacologicalIdentity {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(id) if !id.trim().is_empty() => Self::Resolved(id),
            _ => Self::Unresolved,
        }
    }
}

impl From<PharmacologicalIdentity> for Option<String> {
    fn from(identity: PharmacologicalIdentity) -> Self {
        match identity {
            PharmacologicalIdentity::Resolved(id) => Some(id),
            PharmacologicalIdentity::Unresolved => None,
        }
    }
}

/// Normalized active-ingredient name: trimmed, whitespace collapsed, lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngredientName(String);

impl IngredientName {
    /// Returns `None` for blank input.
    pub fn normalize(raw: &str) -> Option<Self> {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            None
        } else {
            Some(Self(collapsed.to_lowercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IngredientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Regulatory label entry for an ingredient. The pipeline never looks inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelExcerpt(pub serde_json::Value);

/// Raw interaction payload for a resolved identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionReport(pub serde_json::Value);

/// A stage that failed for one mention while the pipeline kept going.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    pub stage: PipelineStage,
    pub reason: String,
}

/// Everything the pipeline learned about one mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationAnalysis {
    pub mention: MedicationMention,
    pub identity: PharmacologicalIdentity,
    pub ingredients: Vec<IngredientName>,
    pub allergy_hits: Vec<IngredientName>,
    pub labels_by_ingredient: BTreeMap<IngredientName, Vec<LabelExcerpt>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactions: Option<InteractionReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,
}

impl MedicationAnalysis {
    /// Starting point for a mention: unresolved, nothing enriched.
    pub fn pending(mention: MedicationMention) -> Self {
        Self {
            mention,
            identity: PharmacologicalIdentity::Unresolved,
            ingredients: Vec::new(),
            allergy_hits: Vec::new(),
            labels_by_ingredient: BTreeMap::new(),
            interactions: None,
            degraded: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Final output of one pipeline call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Mentions as extracted, in input order.
    pub mentions: Vec<MedicationMention>,
    pub analyses: Vec<MedicationAnalysis>,
    pub narrative_summary: String,
    pub disclaimer: String,
}
