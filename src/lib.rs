pub mod api; // HTTP surface: analyze text/image, health
pub mod clients; // Ollama, RxNav and openFDA adapters
pub mod config;
pub mod models;
pub mod pipeline; // Extraction → enrichment → synthesis
pub mod pipeline_config;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::clients::{
    ConcurrencyCap, OllamaClient, OllamaTextGenerator, OllamaVisionGenerator, OpenFdaClient,
    RxNavClient, Upstream, UpstreamClient,
};
use crate::config::{AppConfig, ConfigError};
use crate::pipeline::{AnalysisPipeline, PipelineDeps};

/// Failures that stop the service before it starts serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Failed to start API server: {0}")]
    Bind(#[from] std::io::Error),
}

/// Wire the upstream adapters into a pipeline.
///
/// One concurrency cap per upstream service, shared by every adapter
/// that talks to it.
pub fn build_pipeline(config: &AppConfig) -> Result<(AnalysisPipeline, Arc<OllamaClient>), StartupError> {
    let ollama_cap = ConcurrencyCap::new(Upstream::Ollama, config.ollama_concurrency);
    let rxnav_cap = ConcurrencyCap::new(Upstream::RxNav, config.rxnav_concurrency);
    let openfda_cap = ConcurrencyCap::new(Upstream::OpenFda, config.openfda_concurrency);

    let ollama = Arc::new(OllamaClient::new(UpstreamClient::new(
        &config.ollama_url,
        config.ollama_timeout,
        ollama_cap,
        config.retry,
    )?));
    let interaction_http = UpstreamClient::new(
        config.interaction_base_url.as_deref().unwrap_or(&config.rxnav_base_url),
        config.http_timeout,
        rxnav_cap.clone(),
        config.retry,
    )?;
    let rxnav = Arc::new(
        RxNavClient::new(UpstreamClient::new(
            &config.rxnav_base_url,
            config.http_timeout,
            rxnav_cap,
            config.retry,
        )?)
        .with_interaction_endpoint(interaction_http, config.interaction_path.clone()),
    );
    let openfda = Arc::new(OpenFdaClient::new(
        UpstreamClient::new(&config.openfda_base_url, config.http_timeout, openfda_cap, config.retry)?,
        config.openfda_api_key.clone(),
    ));

    let deps = PipelineDeps {
        text: Arc::new(OllamaTextGenerator::new(ollama.clone(), config.text_model.clone())),
        vision: Arc::new(OllamaVisionGenerator::new(ollama.clone(), config.vision_model.clone())),
        names: rxnav.clone(),
        composition: rxnav.clone(),
        labels: openfda,
        interactions: rxnav,
    };

    Ok((AnalysisPipeline::new(deps, config.pipeline.clone()), ollama))
}

/// Warn (without failing) when configured models are not installed.
async fn check_models(ollama: &OllamaClient, config: &AppConfig) {
    for model in [&config.text_model, &config.vision_model] {
        match ollama.is_model_available(model).await {
            Ok(true) => tracing::info!(%model, "Ollama model available"),
            Ok(false) => tracing::warn!(%model, "Ollama model not installed; run `ollama pull {model}`"),
            Err(e) => {
                tracing::warn!(url = ollama.base_url(), error = %e, "Ollama not reachable at startup");
                return;
            }
        }
    }
}

/// Load config, start the API server, and serve until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env()?;
    tracing::info!(
        bind = %config.bind_addr,
        ollama = %config.ollama_url,
        text_model = %config.text_model,
        vision_model = %config.vision_model,
        policy = %config.pipeline.failure_policy,
        "Configuration loaded"
    );

    let (pipeline, ollama) = build_pipeline(&config)?;
    check_models(&ollama, &config).await;

    let ctx = api::ApiContext::new(Arc::new(pipeline), config.request_timeout)
        .with_rate_limiter(api::RateLimiter::new(config.rate_per_minute, config.rate_per_hour))
        .with_trust_proxy(config.trust_proxy);
    let server = api::start_server(ctx, config.bind_addr).await?;
    tracing::info!(addr = %server.local_addr(), "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
    }
    server.stop().await;
    Ok(())
}
