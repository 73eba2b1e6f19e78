//! Service configuration.
//!
//! Everything is read from `MEDSAFE_*` environment variables once at
//! startup (after an optional `.env` is loaded) and then passed into
//! constructors. Unset keys fall back to the defaults below.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::clients::ollama_types::{
    is_vision_model, validate_base_url, validate_model_name, OllamaConfigError,
};
use crate::clients::rxnav::DEFAULT_INTERACTION_PATH;
use crate::clients::RetryPolicy;
use crate::models::{FailurePolicy, InvalidEnum};
use crate::pipeline_config::PipelineConfig;

/// Application-level constants
pub const APP_NAME: &str = "medsafe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_TEXT_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_VISION_MODEL: &str = "llava:13b";
pub const DEFAULT_RXNAV_URL: &str = "https://rxnav.nlm.nih.gov";
pub const DEFAULT_OPENFDA_URL: &str = "https://api.fda.gov";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=info,tower_http=info,warn")
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: expected a number, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key}: must be greater than zero")]
    NotPositive { key: &'static str },

    #[error("{key}: invalid socket address '{value}'")]
    InvalidAddress { key: &'static str, value: String },

    #[error("{key}: expected true or false, got '{value}'")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key}: {source}")]
    InvalidChoice {
        key: &'static str,
        #[source]
        source: InvalidEnum,
    },

    #[error(transparent)]
    Ollama(#[from] OllamaConfigError),
}

// ═══════════════════════════════════════════════════════════
// AppConfig
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,

    pub ollama_url: String,
    pub text_model: String,
    pub vision_model: String,
    pub allow_remote_llm: bool,

    pub rxnav_base_url: String,
    /// Interaction lookups; `None` reuses `rxnav_base_url`.
    pub interaction_base_url: Option<String>,
    pub interaction_path: String,
    pub openfda_base_url: String,
    pub openfda_api_key: Option<String>,

    /// Per-request timeout for RxNav and openFDA.
    pub http_timeout: Duration,
    /// Per-request timeout for Ollama generation.
    pub ollama_timeout: Duration,
    /// Deadline for one whole analysis request.
    pub request_timeout: Duration,

    pub ollama_concurrency: usize,
    pub rxnav_concurrency: usize,
    pub openfda_concurrency: usize,
    pub retry: RetryPolicy,

    pub rate_per_minute: u32,
    pub rate_per_hour: u32,
    /// Key rate limits on `X-Forwarded-For`. Only safe behind a proxy
    /// that overwrites the header.
    pub trust_proxy: bool,

    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            allow_remote_llm: false,
            rxnav_base_url: DEFAULT_RXNAV_URL.to_string(),
            interaction_base_url: None,
            interaction_path: DEFAULT_INTERACTION_PATH.to_string(),
            openfda_base_url: DEFAULT_OPENFDA_URL.to_string(),
            openfda_api_key: None,
            http_timeout: Duration::from_secs(30),
            ollama_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(600),
            ollama_concurrency: 2,
            rxnav_concurrency: 8,
            openfda_concurrency: 4,
            retry: RetryPolicy::default(),
            rate_per_minute: 30,
            rate_per_hour: 300,
            trust_proxy: false,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let d = Self::default();

        let config = Self {
            bind_addr: env.parsed_addr("MEDSAFE_BIND_ADDR", d.bind_addr)?,
            ollama_url: env
                .string("MEDSAFE_OLLAMA_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(d.ollama_url),
            text_model: env.string("MEDSAFE_TEXT_MODEL").unwrap_or(d.text_model),
            vision_model: env.string("MEDSAFE_VISION_MODEL").unwrap_or(d.vision_model),
            allow_remote_llm: env.flag("MEDSAFE_ALLOW_REMOTE_LLM", d.allow_remote_llm)?,
            rxnav_base_url: env.string("MEDSAFE_RXNAV_URL").unwrap_or(d.rxnav_base_url),
            interaction_base_url: env.string("MEDSAFE_INTERACTION_URL"),
            interaction_path: env.string("MEDSAFE_INTERACTION_PATH").unwrap_or(d.interaction_path),
            openfda_base_url: env.string("MEDSAFE_OPENFDA_URL").unwrap_or(d.openfda_base_url),
            openfda_api_key: env.string("MEDSAFE_OPENFDA_API_KEY"),
            http_timeout: env.secs("MEDSAFE_HTTP_TIMEOUT_SECS", d.http_timeout)?,
            ollama_timeout: env.secs("MEDSAFE_OLLAMA_TIMEOUT_SECS", d.ollama_timeout)?,
            request_timeout: env.secs("MEDSAFE_REQUEST_TIMEOUT_SECS", d.request_timeout)?,
            ollama_concurrency: env.positive("MEDSAFE_OLLAMA_CONCURRENCY", d.ollama_concurrency)?,
            rxnav_concurrency: env.positive("MEDSAFE_RXNAV_CONCURRENCY", d.rxnav_concurrency)?,
            openfda_concurrency: env.positive("MEDSAFE_OPENFDA_CONCURRENCY", d.openfda_concurrency)?,
            retry: RetryPolicy {
                max_retries: env.number("MEDSAFE_RETRY_MAX", d.retry.max_retries)?,
                backoff: Duration::from_millis(
                    env.number("MEDSAFE_RETRY_BACKOFF_MS", d.retry.backoff.as_millis() as u64)?,
                ),
            },
            rate_per_minute: env.positive("MEDSAFE_RATE_PER_MINUTE", d.rate_per_minute)?,
            rate_per_hour: env.positive("MEDSAFE_RATE_PER_HOUR", d.rate_per_hour)?,
            trust_proxy: env.flag("MEDSAFE_TRUST_PROXY", d.trust_proxy)?,
            pipeline: PipelineConfig {
                max_concurrent_mentions: env
                    .positive("MEDSAFE_MAX_CONCURRENT_MENTIONS", d.pipeline.max_concurrent_mentions)?,
                max_concurrent_labels: env
                    .positive("MEDSAFE_MAX_CONCURRENT_LABELS", d.pipeline.max_concurrent_labels)?,
                label_cap_text: env.number("MEDSAFE_LABEL_CAP_TEXT", d.pipeline.label_cap_text)?,
                label_cap_image: env.number("MEDSAFE_LABEL_CAP_IMAGE", d.pipeline.label_cap_image)?,
                max_mentions: env.positive("MEDSAFE_MAX_MENTIONS", d.pipeline.max_mentions)?,
                failure_policy: env.choice("MEDSAFE_FAILURE_POLICY", d.pipeline.failure_policy)?,
                identity_cache_ttl_secs: env
                    .number("MEDSAFE_IDENTITY_CACHE_TTL_SECS", d.pipeline.identity_cache_ttl_secs)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check endpoint and model names. A vision model that does not look
    /// vision-capable is only a warning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url(&self.ollama_url, self.allow_remote_llm)?;
        validate_model_name(&self.text_model)?;
        validate_model_name(&self.vision_model)?;

        if !is_vision_model(&self.vision_model) {
            tracing::warn!(
                model = %self.vision_model,
                "Configured vision model is not a known vision family"
            );
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Typed lookups
// ──────────────────────────────────────────────

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn number<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.string(key) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { key, value }),
        }
    }

    fn positive<T: FromStr + PartialOrd + Default>(
        &self,
        key: &'static str,
        default: T,
    ) -> Result<T, ConfigError> {
        let value = self.number(key, default)?;
        if value <= T::default() {
            return Err(ConfigError::NotPositive { key });
        }
        Ok(value)
    }

    fn secs(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.positive(key, default.as_secs()).map(Duration::from_secs)
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.string(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(value) => Err(ConfigError::InvalidBool { key, value }),
        }
    }

    fn parsed_addr(&self, key: &'static str, default: SocketAddr) -> Result<SocketAddr, ConfigError> {
        match self.string(key) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidAddress { key, value }),
        }
    }

    fn choice<T: FromStr<Err = InvalidEnum>>(
        &self,
        key: &'static str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.string(key) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|source| ConfigError::InvalidChoice { key, source }),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
