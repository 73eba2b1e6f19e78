//! Pipeline-facing configuration.
//!
//! The subset of `AppConfig` that the analysis pipeline reads: fan-out
//! bounds, label caps per flow, the partial-failure policy and the
//! identity cache lifetime.

use std::time::Duration;

use serde::Serialize;

use crate::models::{FailurePolicy, InputSource};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    /// Mentions analyzed concurrently within one call.
    pub max_concurrent_mentions: usize,
    /// Label lookups in flight per mention.
    pub max_concurrent_labels: usize,
    /// Label excerpts fetched per ingredient in the text flow.
    pub label_cap_text: usize,
    /// Label excerpts fetched per ingredient in the image flow.
    pub label_cap_image: usize,
    /// Extraction output is truncated to this many mentions.
    pub max_mentions: usize,
    pub failure_policy: FailurePolicy,
    /// 0 disables the identity cache.
    pub identity_cache_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_mentions: 4,
            max_concurrent_labels: 4,
            label_cap_text: 1,
            label_cap_image: 1,
            max_mentions: 20,
            failure_policy: FailurePolicy::Abort,
            identity_cache_ttl_secs: 600,
        }
    }
}

impl PipelineConfig {
    pub fn label_cap(&self, source: InputSource) -> usize {
        match source {
            InputSource::Text => self.label_cap_text,
            InputSource::Image => self.label_cap_image,
        }
    }

    /// `None` when caching is disabled.
    pub fn identity_cache_ttl(&self) -> Option<Duration> {
        (self.identity_cache_ttl_secs > 0).then(|| Duration::from_secs(self.identity_cache_ttl_secs))
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = PipelineConfig::default();
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.label_cap(InputSource::Text), 1);
        assert_eq!(config.label_cap(InputSource::Image), 1);
        assert_eq!(config.max_mentions, 20);
    }

    #[test]
    fn label_cap_is_per_flow() {
        let config = PipelineConfig {
            label_cap_text: 2,
            label_cap_image: 5,
            ..PipelineConfig::default()
        };
        assert_eq!(config.label_cap(InputSource::Text), 2);
        assert_eq!(config.label_cap(InputSource::Image), 5);
    }

    #[test]
    fn zero_ttl_disables_cache() {
        let config = PipelineConfig {
            identity_cache_ttl_secs: 0,
            ..PipelineConfig::default()
        };
        assert!(config.identity_cache_ttl().is_none());
        assert_eq!(
            PipelineConfig::default().identity_cache_ttl(),
            Some(Duration::from_secs(600))
        );
    }

    #[test]
    fn serializes_policy_snake_case() {
        let json = serde_json::to_string(&PipelineConfig::default()).unwrap();
        assert!(json.contains("\"failure_policy\":\"abort\""));
    }
}
