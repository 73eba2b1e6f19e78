//! Test doubles for the pipeline capabilities.
//!
//! Each mock counts calls and tracks peak concurrency so tests can assert on
//! short-circuits and fan-out bounds.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{
    CompositionLookup, IngredientGroup, InteractionSource, LabelSearch, NameLookup, TextGeneration,
    VisionGeneration,
};
use crate::clients::{Upstream, UpstreamError};
use crate::models::{ImagePayload, InteractionReport, LabelExcerpt};

pub fn unavailable(service: Upstream) -> UpstreamError {
    UpstreamError::Status {
        service,
        status: 503,
        body: "service unavailable".into(),
    }
}

/// Call counter with in-flight tracking.
#[derive(Debug, Default)]
pub struct CallTracker {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

pub struct TrackerGuard<'a>(&'a CallTracker);

impl CallTracker {
    pub fn enter(&self) -> TrackerGuard<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        TrackerGuard(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for TrackerGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// ──────────────────────────────────────────────
// Generation
// ──────────────────────────────────────────────

type TextHandler = dyn Fn(&str, &str) -> Result<String, UpstreamError> + Send + Sync;

pub struct MockTextGenerator {
    handler: Box<TextHandler>,
    pub tracker: CallTracker,
    prompts: Mutex<Vec<String>>,
}

impl MockTextGenerator {
    /// Responds per call from `(system, prompt)`.
    pub fn from_fn(
        handler: impl Fn(&str, &str) -> Result<String, UpstreamError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            tracker: CallTracker::default(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(response: &str) -> Self {
        let response = response.to_string();
        Self::from_fn(move |_, _| Ok(response.clone()))
    }

    pub fn failing() -> Self {
        Self::from_fn(|_, _| Err(unavailable(Upstream::Ollama)))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGeneration for MockTextGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, UpstreamError> {
        let _guard = self.tracker.enter();
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.handler)(system, prompt)
    }
}

pub struct MockVisionGenerator {
    response: Result<String, UpstreamError>,
    pub tracker: CallTracker,
    seen_mime: Mutex<Option<String>>,
}

impl MockVisionGenerator {
    pub fn replying(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            tracker: CallTracker::default(),
            seen_mime: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: Err(unavailable(Upstream::Ollama)),
            tracker: CallTracker::default(),
            seen_mime: Mutex::new(None),
        }
    }

    pub fn seen_mime(&self) -> Option<String> {
        self.seen_mime.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionGeneration for MockVisionGenerator {
    async fn generate_with_image(
        &self,
        _system: &str,
        _prompt: &str,
        image: &ImagePayload,
    ) -> Result<String, UpstreamError> {
        let _guard = self.tracker.enter();
        *self.seen_mime.lock().unwrap() = Some(image.mime.clone());
        self.response.clone()
    }
}

// ──────────────────────────────────────────────
// Lookups
// ──────────────────────────────────────────────

#[derive(Default)]
pub struct MockNameLookup {
    ids: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    pub tracker: CallTracker,
}

impl MockNameLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys are matched case-insensitively.
    pub fn with(mut self, name: &str, ids: &[&str]) -> Self {
        self.ids
            .insert(name.to_lowercase(), ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_failure(mut self, name: &str) -> Self {
        self.failing.insert(name.to_lowercase());
        self
    }

    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_lowercase(), delay);
        self
    }
}

#[async_trait]
impl NameLookup for MockNameLookup {
    async fn candidates(&self, name: &str) -> Result<Vec<String>, UpstreamError> {
        let _guard = self.tracker.enter();
        let key = name.to_lowercase();
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&key) {
            return Err(unavailable(Upstream::RxNav));
        }
        Ok(self.ids.get(&key).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MockComposition {
    groups: HashMap<String, Vec<IngredientGroup>>,
    failing: HashSet<String>,
    pub tracker: CallTracker,
}

impl MockComposition {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `IN` group holding `names`.
    pub fn with(mut self, id: &str, names: &[&str]) -> Self {
        self.groups.insert(
            id.to_string(),
            vec![IngredientGroup {
                term_type: "IN".into(),
                names: names.iter().map(|s| s.to_string()).collect(),
            }],
        );
        self
    }

    pub fn with_groups(mut self, id: &str, groups: Vec<IngredientGroup>) -> Self {
        self.groups.insert(id.to_string(), groups);
        self
    }

    pub fn with_failure(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }
}

#[async_trait]
impl CompositionLookup for MockComposition {
    async fn ingredient_groups(&self, id: &str) -> Result<Vec<IngredientGroup>, UpstreamError> {
        let _guard = self.tracker.enter();
        if self.failing.contains(id) {
            return Err(unavailable(Upstream::RxNav));
        }
        Ok(self.groups.get(id).cloned().unwrap_or_default())
    }
}

/// Label search: known ingredients get `count` excerpts, unknown ones 404.
#[derive(Default)]
pub struct MockLabelSearch {
    known: HashMap<String, usize>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    pub tracker: CallTracker,
    limits: Mutex<Vec<usize>>,
}

impl MockLabelSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ingredient: &str, count: usize) -> Self {
        self.known.insert(ingredient.to_string(), count);
        self
    }

    pub fn with_failure(mut self, ingredient: &str) -> Self {
        self.failing.insert(ingredient.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn limits(&self) -> Vec<usize> {
        self.limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl LabelSearch for MockLabelSearch {
    async fn search(&self, ingredient: &str, limit: usize) -> Result<Vec<LabelExcerpt>, UpstreamError> {
        let _guard = self.tracker.enter();
        self.limits.lock().unwrap().push(limit);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(ingredient) {
            return Err(unavailable(Upstream::OpenFda));
        }
        match self.known.get(ingredient) {
            Some(count) => Ok((0..*count)
                .take(limit)
                .map(|i| LabelExcerpt(serde_json::json!({"ingredient": ingredient, "n": i})))
                .collect()),
            None => Err(UpstreamError::NotFound {
                service: Upstream::OpenFda,
            }),
        }
    }
}

#[derive(Default)]
pub struct MockInteractions {
    failing: HashSet<String>,
    pub tracker: CallTracker,
}

impl MockInteractions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }
}

#[async_trait]
impl InteractionSource for MockInteractions {
    async fn interactions(&self, id: &str) -> Result<InteractionReport, UpstreamError> {
        let _guard = self.tracker.enter();
        if self.failing.contains(id) {
            return Err(unavailable(Upstream::RxNav));
        }
        Ok(InteractionReport(serde_json::json!({"rxcui": id, "interactionTypeGroup": []})))
    }
}

/// Shared handles to every mock, plus the deps built from them.
pub struct MockSet {
    pub text: Arc<MockTextGenerator>,
    pub vision: Arc<MockVisionGenerator>,
    pub names: Arc<MockNameLookup>,
    pub composition: Arc<MockComposition>,
    pub labels: Arc<MockLabelSearch>,
    pub interactions: Arc<MockInteractions>,
}

impl MockSet {
    pub fn deps(&self) -> super::PipelineDeps {
        super::PipelineDeps {
            text: self.text.clone(),
            vision: self.vision.clone(),
            names: self.names.clone(),
            composition: self.composition.clone(),
            labels: self.labels.clone(),
            interactions: self.interactions.clone(),
        }
    }
}
