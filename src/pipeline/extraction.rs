//! Stage 1: turn raw user input into a list of medication mentions.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;

use super::error::PipelineError;
use super::sanitize::{extract_json_block, sanitize_llm_output};
use super::traits::{TextGeneration, VisionGeneration};
use crate::models::{ImagePayload, InputSource, MedicationMention};

const TEXT_EXTRACTION_SYSTEM: &str = "You extract medication names from patient messages. \
Reply with JSON only, no prose.";

const TEXT_EXTRACTION_PROMPT: &str = "List every medication the patient mentions, as written. \
Do not add medications that are not mentioned. \
Reply exactly in this shape: {\"medicines\": [{\"name\": \"...\"}]}. \
If there are none, reply {\"medicines\": []}.\n\nMessage:\n";

const IMAGE_EXTRACTION_SYSTEM: &str = "You read prescriptions and medication packaging. \
Reply with JSON only, no prose.";

const IMAGE_EXTRACTION_PROMPT: &str = "Identify every medication visible in this image. \
For each one give the name as printed, the strength (e.g. 500 mg) and the dosage form \
(e.g. tablet), or null when not visible. \
Reply exactly in this shape: \
{\"medicines\": [{\"name\": \"...\", \"strength\": \"...\", \"form\": \"...\"}]}. \
If there are none, reply {\"medicines\": []}.";

// ──────────────────────────────────────────────
// Lenient parsing
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExtractionPayload {
    Wrapped { medicines: Vec<MentionEntry> },
    Bare(Vec<MentionEntry>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MentionEntry {
    Name(String),
    Detailed {
        #[serde(alias = "rawName", alias = "medicine", alias = "medication")]
        name: Option<String>,
        #[serde(default, alias = "dose", alias = "dosage")]
        strength: Option<String>,
        #[serde(default, alias = "dosageForm")]
        form: Option<String>,
    },
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

impl MentionEntry {
    fn into_mention(self, source: InputSource) -> Option<MedicationMention> {
        let (name, strength, form) = match self {
            Self::Name(name) => (Some(name), None, None),
            Self::Detailed {
                name,
                strength,
                form,
            } => (name, strength, form),
        };
        let raw_name = non_blank(name)?;
        let (strength, form) = match source {
            InputSource::Image => (non_blank(strength), non_blank(form)),
            InputSource::Text => (None, None),
        };
        Some(MedicationMention {
            raw_name,
            strength,
            form,
        })
    }
}

/// Parse a generation response into mentions.
///
/// Blank names are dropped. `strength`/`form` are kept only for images.
pub fn parse_mentions(
    raw: &str,
    source: InputSource,
) -> Result<Vec<MedicationMention>, PipelineError> {
    let cleaned = sanitize_llm_output(raw);
    let payload: ExtractionPayload = match serde_json::from_str(&cleaned) {
        Ok(payload) => payload,
        Err(_) => {
            let block = extract_json_block(&cleaned).unwrap_or(cleaned.as_str());
            serde_json::from_str(block)
                .map_err(|e| PipelineError::MalformedExtraction(e.to_string()))?
        }
    };

    let entries = match payload {
        ExtractionPayload::Wrapped { medicines } => medicines,
        ExtractionPayload::Bare(entries) => entries,
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| entry.into_mention(source))
        .collect())
}

// ──────────────────────────────────────────────
// Extractor
// ──────────────────────────────────────────────

pub struct MedicationExtractor {
    text: Arc<dyn TextGeneration>,
    vision: Arc<dyn VisionGeneration>,
    max_mentions: usize,
}

impl MedicationExtractor {
    pub fn new(
        text: Arc<dyn TextGeneration>,
        vision: Arc<dyn VisionGeneration>,
        max_mentions: usize,
    ) -> Self {
        Self {
            text,
            vision,
            max_mentions,
        }
    }

    pub async fn from_text(&self, message: &str) -> Result<Vec<MedicationMention>, PipelineError> {
        let start = Instant::now();
        let prompt = format!("{TEXT_EXTRACTION_PROMPT}{message}");
        let raw = self
            .text
            .generate(TEXT_EXTRACTION_SYSTEM, &prompt)
            .await
            .map_err(PipelineError::ExtractionUnavailable)?;

        Ok(self.finish(&raw, InputSource::Text, start))
    }

    pub async fn from_image(
        &self,
        image: &ImagePayload,
    ) -> Result<Vec<MedicationMention>, PipelineError> {
        image.validate()?;

        let start = Instant::now();
        let raw = self
            .vision
            .generate_with_image(IMAGE_EXTRACTION_SYSTEM, IMAGE_EXTRACTION_PROMPT, image)
            .await
            .map_err(PipelineError::ExtractionUnavailable)?;

        Ok(self.finish(&raw, InputSource::Image, start))
    }

    fn finish(&self, raw: &str, source: InputSource, start: Instant) -> Vec<MedicationMention> {
        let mut mentions = match parse_mentions(raw, source) {
            Ok(mentions) => mentions,
            Err(err) => {
                tracing::warn!(%source, error = %err, "Extraction output unparseable, continuing with no medications");
                Vec::new()
            }
        };

        if mentions.len() > self.max_mentions {
            tracing::warn!(
                %source,
                found = mentions.len(),
                kept = self.max_mentions,
                "Too many medications extracted, truncating"
            );
            mentions.truncate(self.max_mentions);
        }

        tracing::info!(
            %source,
            count = mentions.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Extraction complete"
        );
        mentions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mock::{MockTextGenerator, MockVisionGenerator};

    fn extractor(text: MockTextGenerator, vision: MockVisionGenerator) -> MedicationExtractor {
        MedicationExtractor::new(Arc::new(text), Arc::new(vision), 20)
    }

    fn names(mentions: &[MedicationMention]) -> Vec<&str> {
        mentions.iter().map(|m| m.raw_name.as_str()).collect()
    }

    #[test]
    fn parses_wrapped_objects_and_strings() {
        let raw = r#"{"medicines": [{"name": "Metformin"}, "Lisinopril", {"rawName": "Advil"}]}"#;
        let mentions = parse_mentions(raw, InputSource::Text).unwrap();
        assert_eq!(names(&mentions), vec!["Metformin", "Lisinopril", "Advil"]);
    }

    #[test]
    fn parses_bare_array_in_fence() {
        let raw = "```json\n[{\"medicine\": \"Aspirin\"}]\n```";
        let mentions = parse_mentions(raw, InputSource::Text).unwrap();
        assert_eq!(names(&mentions), vec!["Aspirin"]);
    }

    #[test]
    fn parses_unfenced_bare_object_array() {
        let raw = r#"[{"name": "Aspirin"}, {"name": "Metformin"}]"#;
        let mentions = parse_mentions(raw, InputSource::Text).unwrap();
        assert_eq!(names(&mentions), vec!["Aspirin", "Metformin"]);
    }

    #[test]
    fn parses_bare_array_after_prose() {
        let raw = r#"Found these: [{"name": "Aspirin"}, "Warfarin"]"#;
        let mentions = parse_mentions(raw, InputSource::Text).unwrap();
        assert_eq!(names(&mentions), vec!["Aspirin", "Warfarin"]);
    }

    #[test]
    fn drops_blank_names() {
        let raw = r#"{"medicines": [{"name": "  "}, {"strength": "5 mg"}, ""]}"#;
        assert!(parse_mentions(raw, InputSource::Image).unwrap().is_empty());
    }

    #[test]
    fn strength_and_form_only_for_images() {
        let raw = r#"{"medicines": [{"name": "Amoxicillin", "strength": "500 mg", "form": "capsule"}]}"#;

        let image = parse_mentions(raw, InputSource::Image).unwrap();
        assert_eq!(image[0].strength.as_deref(), Some("500 mg"));
        assert_eq!(image[0].form.as_deref(), Some("capsule"));

        let text = parse_mentions(raw, InputSource::Text).unwrap();
        assert!(text[0].strength.is_none());
        assert!(text[0].form.is_none());
    }

    #[test]
    fn null_fields_are_absent() {
        let raw = r#"{"medicines": [{"name": "Warfarin", "strength": null, "form": "null"}]}"#;
        let mentions = parse_mentions(raw, InputSource::Image).unwrap();
        assert_eq!(mentions[0], MedicationMention::named("Warfarin"));
    }

    #[test]
    fn prose_is_malformed() {
        let err = parse_mentions("I see no medicines here.", InputSource::Text).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedExtraction(_)));
    }

    #[tokio::test]
    async fn malformed_output_becomes_empty_list() {
        let ex = extractor(
            MockTextGenerator::replying("Sorry, I cannot help with that."),
            MockVisionGenerator::replying("{}"),
        );
        assert!(ex.from_text("I take aspirin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_extraction_unavailable() {
        let ex = extractor(MockTextGenerator::failing(), MockVisionGenerator::replying("{}"));
        let err = ex.from_text("I take aspirin").await.unwrap_err();
        assert_eq!(err.kind(), "extraction_unavailable");
    }

    #[tokio::test]
    async fn message_is_embedded_in_prompt() {
        let text = Arc::new(MockTextGenerator::replying(r#"{"medicines": []}"#));
        let ex = MedicationExtractor::new(text.clone(), Arc::new(MockVisionGenerator::replying("{}")), 20);

        ex.from_text("I take Metformin").await.unwrap();
        assert!(text.prompts()[0].ends_with("I take Metformin"));
    }

    #[tokio::test]
    async fn list_is_capped() {
        let many: Vec<String> = (0..30).map(|i| format!("\"drug{i}\"")).collect();
        let reply = format!("{{\"medicines\": [{}]}}", many.join(","));
        let ex = MedicationExtractor::new(
            Arc::new(MockTextGenerator::replying(&reply)),
            Arc::new(MockVisionGenerator::replying("{}")),
            5,
        );
        let mentions = ex.from_text("lots").await.unwrap();
        assert_eq!(mentions.len(), 5);
        assert_eq!(mentions[4].raw_name, "drug4");
    }

    #[tokio::test]
    async fn image_is_validated_before_any_call() {
        let vision = Arc::new(MockVisionGenerator::replying(r#"{"medicines": []}"#));
        let ex = MedicationExtractor::new(
            Arc::new(MockTextGenerator::replying("")),
            vision.clone(),
            20,
        );
        let pdf = ImagePayload::new(b"%PDF-1.7".to_vec(), "application/pdf");

        let err = ex.from_image(&pdf).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert_eq!(vision.tracker.calls(), 0);
    }

    #[tokio::test]
    async fn image_extraction_keeps_details() {
        let ex = extractor(
            MockTextGenerator::replying(""),
            MockVisionGenerator::replying(
                r#"<think>reading label</think>{"medicines": [{"name": "Lipitor", "strength": "20 mg", "form": "tablet"}]}"#,
            ),
        );
        let image = ImagePayload::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg");

        let mentions = ex.from_image(&image).await.unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].strength.as_deref(), Some("20 mg"));
    }
}
