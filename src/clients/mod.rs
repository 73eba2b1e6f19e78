//! HTTP adapters for the upstream services the pipeline consumes.
//!
//! Each adapter wraps an [`http::UpstreamClient`] (timeouts, retry, shared
//! concurrency cap) and implements one or more of the pipeline traits in
//! `crate::pipeline::traits`.

pub mod http;
pub mod limiter;
pub mod ollama;
pub mod ollama_types;
pub mod openfda;
pub mod rxnav;

pub use http::{RetryPolicy, UpstreamClient};
pub use limiter::ConcurrencyCap;
pub use ollama::{OllamaClient, OllamaTextGenerator, OllamaVisionGenerator};
pub use openfda::OpenFdaClient;
pub use rxnav::RxNavClient;

/// Upstream services, one concurrency cap each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Upstream {
    Ollama,
    RxNav,
    OpenFda,
}

impl Upstream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::RxNav => "rxnav",
            Self::OpenFda => "openfda",
        }
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter-level failure. Carried as the `source` of pipeline errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} is not reachable: {detail}")]
    NotReachable { service: Upstream, detail: String },

    #[error("{service} request timed out after {secs}s")]
    Timeout { service: Upstream, secs: u64 },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: Upstream,
        status: u16,
        body: String,
    },

    #[error("{service} returned a malformed response: {detail}")]
    Malformed { service: Upstream, detail: String },

    #[error("{service} has no entry for this query")]
    NotFound { service: Upstream },
}

impl UpstreamError {
    pub fn service(&self) -> Upstream {
        match self {
            Self::NotReachable { service, .. }
            | Self::Timeout { service, .. }
            | Self::Status { service, .. }
            | Self::Malformed { service, .. }
            | Self::NotFound { service } => *service,
        }
    }

    /// Connect errors, timeouts, 429 and 5xx. 404 never is.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotReachable { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed { .. } | Self::NotFound { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Serve `router` on an ephemeral loopback port and return its base URL.
#[cfg(test)]
pub(crate) async fn spawn_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}
