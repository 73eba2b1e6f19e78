use serde::{Deserialize, Serialize};

use super::enums::AllergySeverity;

/// A declared allergy from the user's profile.
///
/// The analysis only reads `name`. Severity is optional because the text
/// flow receives bare allergen names from the chat layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllergyRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<AllergySeverity>,
    #[serde(default)]
    pub description: String,
}

impl AllergyRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            severity: None,
            description: String::new(),
        }
    }
}

/// Inbound allergy entry: either a bare allergen name or a full record.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AllergyInput {
    Name(String),
    Record(AllergyRecord),
}

impl From<AllergyInput> for AllergyRecord {
    fn from(input: AllergyInput) -> Self {
        match input {
            AllergyInput::Name(name) => AllergyRecord::named(name),
            AllergyInput::Record(record) => record,
        }
    }
}

/// Convert inbound entries to records, dropping blank names.
pub fn collect_allergies(inputs: Vec<AllergyInput>) -> Vec<AllergyRecord> {
    inputs
        .into_iter()
        .map(AllergyRecord::from)
        .filter(|a| !a.name.trim().is_empty())
        .collect()
}
