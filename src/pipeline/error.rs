use crate::clients::UpstreamError;
use crate::models::{IngredientName, PipelineStage};

/// Failures of one analysis call.
///
/// `MalformedExtraction` is absorbed inside the extractor and only exists
/// so the absorption is typed and logged. Label "not found" is not an error
/// at all.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Medication extraction returned unparseable output: {0}")]
    MalformedExtraction(String),

    #[error("Medication extraction is unavailable")]
    ExtractionUnavailable(#[source] UpstreamError),

    #[error("Could not resolve '{mention}'")]
    ResolutionUnavailable {
        mention: String,
        #[source]
        source: UpstreamError,
    },

    #[error("Could not expand ingredients for '{mention}'")]
    ExpansionUnavailable {
        mention: String,
        #[source]
        source: UpstreamError,
    },

    #[error("Label lookup failed for '{ingredient}'")]
    LabelLookupFailed {
        ingredient: IngredientName,
        #[source]
        source: UpstreamError,
    },

    #[error("Interaction lookup failed for '{mention}'")]
    InteractionUnavailable {
        mention: String,
        #[source]
        source: UpstreamError,
    },

    #[error("Summary synthesis is unavailable")]
    SynthesisUnavailable(#[source] UpstreamError),

    #[error("Analysis was cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    /// Stable error-kind code exposed to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedExtraction(_) => "malformed_extraction",
            Self::ExtractionUnavailable(_) => "extraction_unavailable",
            Self::ResolutionUnavailable { .. } => "resolution_unavailable",
            Self::ExpansionUnavailable { .. } => "expansion_unavailable",
            Self::LabelLookupFailed { .. } => "label_lookup_failed",
            Self::InteractionUnavailable { .. } => "interaction_unavailable",
            Self::SynthesisUnavailable(_) => "synthesis_unavailable",
            Self::Cancelled => "cancelled",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    /// Stage that produced the failure, if it came from one.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::MalformedExtraction(_) | Self::ExtractionUnavailable(_) => {
                Some(PipelineStage::Extraction)
            }
            Self::ResolutionUnavailable { .. } => Some(PipelineStage::Resolution),
            Self::ExpansionUnavailable { .. } => Some(PipelineStage::Expansion),
            Self::LabelLookupFailed { .. } => Some(PipelineStage::Labels),
            Self::InteractionUnavailable { .. } => Some(PipelineStage::Interactions),
            Self::SynthesisUnavailable(_) => Some(PipelineStage::Synthesis),
            Self::Cancelled | Self::InvalidInput(_) => None,
        }
    }

    /// Human-readable message including the upstream cause.
    pub fn detail(&self) -> String {
        match std::error::Error::source(self) {
            Some(source) => format!("{self}: {source}"),
            None => self.to_string(),
        }
    }
}

impl From<crate::models::ImageRejected> for PipelineError {
    fn from(err: crate::models::ImageRejected) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
