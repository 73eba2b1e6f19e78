//! Stage 7: narrative risk summary over the aggregated analyses.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use super::error::PipelineError;
use super::sanitize::sanitize_llm_output;
use super::traits::TextGeneration;
use crate::models::{AllergyRecord, MedicationAnalysis};

/// Fixed text attached to every result.
pub const DISCLAIMER: &str = "This analysis is generated automatically from public drug \
databases and an AI model. It is not medical advice. Always confirm with your doctor or \
pharmacist before starting, stopping or changing any medication.";

/// Longest string kept from label or interaction payloads in the prompt.
const MAX_PROMPT_STRING_CHARS: usize = 600;

const SYNTHESIS_SYSTEM: &str = "You are a careful pharmacist assistant. \
You explain medication risks to patients in plain language. \
Never invent facts that are not in the data you are given.";

const SYNTHESIS_INSTRUCTIONS: &str = "Using only the data below, write a short summary for the patient. \
First state any allergy conflicts (allergyHits) clearly. \
Then mention important warnings from the labels and any drug interactions. \
If no medications were found, say so and suggest listing them again.";

fn format_allergies(allergies: &[AllergyRecord]) -> String {
    let names: Vec<&str> = allergies
        .iter()
        .map(|a| a.name.trim())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return "None recorded".to_string();
    }
    names.join(", ")
}

/// Shorten long strings anywhere in a JSON tree.
fn truncate_strings(value: &mut Value, max_chars: usize) {
    match value {
        Value::String(s) if s.chars().count() > max_chars => {
            let mut short: String = s.chars().take(max_chars).collect();
            short.push('…');
            *s = short;
        }
        Value::Array(items) => items.iter_mut().for_each(|v| truncate_strings(v, max_chars)),
        Value::Object(map) => map.values_mut().for_each(|v| truncate_strings(v, max_chars)),
        _ => {}
    }
}

pub fn build_prompt(allergies: &[AllergyRecord], analyses: &[MedicationAnalysis]) -> String {
    let mut data = serde_json::to_value(analyses).unwrap_or(Value::Array(Vec::new()));
    truncate_strings(&mut data, MAX_PROMPT_STRING_CHARS);
    let data = serde_json::to_string_pretty(&data).unwrap_or_else(|_| "[]".to_string());

    format!(
        "{SYNTHESIS_INSTRUCTIONS}\n\nPatient allergies: {}\n\nMedication analysis:\n{data}",
        format_allergies(allergies)
    )
}

pub struct SummarySynthesizer {
    text: Arc<dyn TextGeneration>,
}

impl SummarySynthesizer {
    pub fn new(text: Arc<dyn TextGeneration>) -> Self {
        Self { text }
    }

    pub async fn synthesize(
        &self,
        allergies: &[AllergyRecord],
        analyses: &[MedicationAnalysis],
    ) -> Result<String, PipelineError> {
        let start = Instant::now();
        let prompt = build_prompt(allergies, analyses);
        let raw = self
            .text
            .generate(SYNTHESIS_SYSTEM, &prompt)
            .await
            .map_err(PipelineError::SynthesisUnavailable)?;

        let narrative = sanitize_llm_output(&raw);
        tracing::info!(
            medications = analyses.len(),
            chars = narrative.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Summary synthesized"
        );
        Ok(narrative)
    }
}
