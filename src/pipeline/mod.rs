pub mod allergy;
pub mod cancel;
pub mod error;
pub mod extraction;
pub mod ingredients;
pub mod interactions;
pub mod labels;
pub mod orchestrator; // Extraction → enrichment fan-out → synthesis
pub mod resolver;
pub mod sanitize;
pub mod synthesis;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use error::PipelineError;
pub use orchestrator::{AnalysisPipeline, PipelineDeps};
pub use synthesis::DISCLAIMER;
