//! Analysis aggregator: extraction → per-mention enrichment → synthesis.
//!
//! Mentions fan out with a bounded in-flight count and are reassembled in
//! input order. Under `FailurePolicy::Abort` the first per-mention failure
//! fails the whole call and drops the remaining work. Under `Degrade` the
//! failing mention is kept with a `degraded` marker.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use tracing::Instrument;

use super::allergy::match_allergies;
use super::cancel::CancelSignal;
use super::error::PipelineError;
use super::extraction::MedicationExtractor;
use super::ingredients::IngredientExpander;
use super::interactions::InteractionLookup;
use super::labels::LabelEnricher;
use super::resolver::IdentityResolver;
use super::synthesis::{SummarySynthesizer, DISCLAIMER};
use super::traits::{
    CompositionLookup, InteractionSource, LabelSearch, NameLookup, TextGeneration,
    VisionGeneration,
};
use crate::models::{
    AllergyRecord, AnalysisResult, Degradation, FailurePolicy, ImagePayload, InputSource,
    MedicationAnalysis, MedicationMention,
};
use crate::pipeline_config::PipelineConfig;

/// Capabilities the pipeline is built from.
#[derive(Clone)]
pub struct PipelineDeps {
    pub text: Arc<dyn TextGeneration>,
    pub vision: Arc<dyn VisionGeneration>,
    pub names: Arc<dyn NameLookup>,
    pub composition: Arc<dyn CompositionLookup>,
    pub labels: Arc<dyn LabelSearch>,
    pub interactions: Arc<dyn InteractionSource>,
}

pub struct AnalysisPipeline {
    extractor: MedicationExtractor,
    resolver: IdentityResolver,
    expander: IngredientExpander,
    labels: LabelEnricher,
    interactions: InteractionLookup,
    synthesizer: SummarySynthesizer,
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        Self {
            extractor: MedicationExtractor::new(deps.text.clone(), deps.vision, config.max_mentions),
            resolver: IdentityResolver::new(deps.names, config.identity_cache_ttl()),
            expander: IngredientExpander::new(deps.composition),
            labels: LabelEnricher::new(deps.labels, config.max_concurrent_labels),
            interactions: InteractionLookup::new(deps.interactions),
            synthesizer: SummarySynthesizer::new(deps.text),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze a free-text message.
    pub async fn analyze_text(
        &self,
        message: &str,
        allergies: &[AllergyRecord],
        cancel: &CancelSignal,
    ) -> Result<AnalysisResult, PipelineError> {
        if message.trim().is_empty() {
            return Err(PipelineError::InvalidInput("message must not be empty".into()));
        }

        let span = tracing::info_span!("analysis", source = %InputSource::Text);
        let work = async {
            let mentions = self.extractor.from_text(message).await?;
            self.complete(mentions, allergies, InputSource::Text).await
        };
        with_cancel(cancel, work.instrument(span)).await
    }

    /// Analyze a prescription or packaging photo. The extractor validates
    /// the payload before any generation call.
    pub async fn analyze_image(
        &self,
        image: &ImagePayload,
        allergies: &[AllergyRecord],
        cancel: &CancelSignal,
    ) -> Result<AnalysisResult, PipelineError> {
        let span = tracing::info_span!("analysis", source = %InputSource::Image);
        let work = async {
            let mentions = self.extractor.from_image(image).await?;
            self.complete(mentions, allergies, InputSource::Image).await
        };
        with_cancel(cancel, work.instrument(span)).await
    }

    async fn complete(
        &self,
        mentions: Vec<MedicationMention>,
        allergies: &[AllergyRecord],
        source: InputSource,
    ) -> Result<AnalysisResult, PipelineError> {
        let start = Instant::now();
        let analyses = self.analyze_mentions(&mentions, allergies, source).await?;
        tracing::info!(
            medications = analyses.len(),
            degraded = analyses.iter().filter(|a| a.is_degraded()).count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Enrichment complete"
        );

        let narrative_summary = self.synthesizer.synthesize(allergies, &analyses).await?;

        Ok(AnalysisResult {
            mentions,
            analyses,
            narrative_summary,
            disclaimer: DISCLAIMER.to_string(),
        })
    }

    /// Enrich every mention concurrently; output order matches `mentions`.
    pub async fn analyze_mentions(
        &self,
        mentions: &[MedicationMention],
        allergies: &[AllergyRecord],
        source: InputSource,
    ) -> Result<Vec<MedicationAnalysis>, PipelineError> {
        let label_cap = self.config.label_cap(source);

        // Boxed up front so the handler future stays `Send`.
        let tasks: Vec<BoxFuture<'_, (usize, Result<MedicationAnalysis, PipelineError>)>> = mentions
            .iter()
            .enumerate()
            .map(|(idx, mention)| {
                let span = tracing::info_span!("mention", name = %mention.raw_name);
                async move { (idx, self.analyze_one(mention, allergies, label_cap).await) }
                    .instrument(span)
                    .boxed()
            })
            .collect();
        let mut pending = stream::iter(tasks).buffer_unordered(self.config.max_concurrent_mentions.max(1));

        let mut slots: Vec<Option<MedicationAnalysis>> = vec![None; mentions.len()];
        while let Some((idx, result)) = pending.next().await {
            slots[idx] = Some(result?);
        }
        Ok(slots.into_iter().flatten().collect())
    }

    async fn analyze_one(
        &self,
        mention: &MedicationMention,
        allergies: &[AllergyRecord],
        label_cap: usize,
    ) -> Result<MedicationAnalysis, PipelineError> {
        let mut analysis = MedicationAnalysis::pending(mention.clone());

        analysis.identity = match self.resolver.resolve(mention).await {
            Ok(identity) => identity,
            Err(err) => return self.absorb(analysis, err),
        };

        analysis.ingredients = match self.expander.expand(mention, &analysis.identity).await {
            Ok(ingredients) => ingredients,
            Err(err) => return self.absorb(analysis, err),
        };

        analysis.allergy_hits = match_allergies(&analysis.ingredients, allergies);
        if !analysis.allergy_hits.is_empty() {
            tracing::info!(hits = analysis.allergy_hits.len(), "Allergy conflict found");
        }

        let fetched = self
            .labels
            .fetch_all(&analysis.ingredients, label_cap, self.config.failure_policy)
            .await?;
        analysis.labels_by_ingredient = fetched.labels;
        for err in fetched.failures {
            analysis = self.absorb(analysis, err)?;
        }

        match self.interactions.lookup(mention, &analysis.identity).await {
            Ok(report) => analysis.interactions = report,
            Err(err) => return self.absorb(analysis, err),
        }

        Ok(analysis)
    }

    /// Apply the failure policy to a stage error for one mention.
    fn absorb(
        &self,
        mut analysis: MedicationAnalysis,
        err: PipelineError,
    ) -> Result<MedicationAnalysis, PipelineError> {
        match (self.config.failure_policy, err.stage()) {
            (FailurePolicy::Degrade, Some(stage)) => {
                let reason = err.detail();
                tracing::warn!(%stage, %reason, "Stage failed, keeping degraded result");
                analysis.degraded.push(Degradation { stage, reason });
                Ok(analysis)
            }
            _ => Err(err),
        }
    }
}

/// Run `work` until it finishes or `cancel` trips, whichever is first.
async fn with_cancel<T>(
    cancel: &CancelSignal,
    work: impl std::future::Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("Analysis cancelled");
            Err(PipelineError::Cancelled)
        }
        result = work => result,
    }
}
