//! Shared state and wire types for the HTTP layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::models::{AllergyInput, AnalysisResult, MedicationAnalysis, MedicationMention};
use crate::pipeline::AnalysisPipeline;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<AnalysisPipeline>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    /// Deadline applied to every analysis request.
    pub request_timeout: Duration,
    /// Honor `X-Forwarded-For` when keying rate limits.
    pub trust_proxy: bool,
}

impl ApiContext {
    pub fn new(pipeline: Arc<AnalysisPipeline>, request_timeout: Duration) -> Self {
        Self {
            pipeline,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::default())),
            request_timeout,
            trust_proxy: false,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Arc::new(Mutex::new(limiter));
        self
    }

    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }
}

// ═══════════════════════════════════════════════════════════
// Rate limiter: per-client sliding window
// ═══════════════════════════════════════════════════════════

/// Per-client rate limiter with per-minute and per-hour limits.
pub struct RateLimiter {
    windows: HashMap<String, Vec<Instant>>,
    per_minute: u32,
    per_hour: u32,
}

impl RateLimiter {
    pub fn new(per_minute: u32, per_hour: u32) -> Self {
        Self {
            windows: HashMap::new(),
            per_minute,
            per_hour,
        }
    }

    /// Check if a client is within rate limits. Returns `Ok(())` or
    /// `Err(retry_after_secs)` if exceeded.
    pub fn check(&mut self, client: &str) -> Result<(), u64> {
        let now = Instant::now();

        // Drop clients with no activity in the last hour
        if self.windows.len() > 1000 {
            self.windows.retain(|_, entries| {
                entries
                    .last()
                    .is_some_and(|ts| now.duration_since(*ts) < Duration::from_secs(3600))
            });
        }

        let entries = self.windows.entry(client.to_string()).or_default();
        entries.retain(|ts| now.duration_since(*ts) < Duration::from_secs(3600));

        let last_minute = entries
            .iter()
            .filter(|ts| now.duration_since(**ts) < Duration::from_secs(60))
            .count() as u32;
        if last_minute >= self.per_minute {
            return Err(60);
        }

        if entries.len() as u32 >= self.per_hour {
            return Err(3600);
        }

        entries.push(now);
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(30, 300)
    }
}

// ═══════════════════════════════════════════════════════════
// Request / response bodies
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnalysisRequest {
    pub message: String,
    #[serde(default)]
    pub user_allergies: Vec<AllergyInput>,
}

#[derive(Debug, Serialize)]
pub struct ExtractedMedicines {
    pub medicines: Vec<MedicationMention>,
}

/// Success body for both analysis routes.
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub analysis: Vec<MedicationAnalysis>,
    pub reply: String,
    pub disclaimer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted: Option<ExtractedMedicines>,
}

impl AnalysisResponse {
    pub fn from_text(result: AnalysisResult) -> Self {
        Self {
            analysis: result.analyses,
            reply: result.narrative_summary,
            disclaimer: result.disclaimer,
            extracted: None,
        }
    }

    /// Image responses echo what was read off the photo.
    pub fn from_image(result: AnalysisResult) -> Self {
        Self {
            extracted: Some(ExtractedMedicines {
                medicines: result.mentions,
            }),
            analysis: result.analyses,
            reply: result.narrative_summary,
            disclaimer: result.disclaimer,
        }
    }
}
