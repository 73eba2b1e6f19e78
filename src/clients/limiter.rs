use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{Upstream, UpstreamError};

/// Process-wide cap on in-flight requests to one upstream service.
///
/// Cloned into every client that talks to the same service, so all
/// concurrent pipeline calls share the same permits.
#[derive(Debug, Clone)]
pub struct ConcurrencyCap {
    service: Upstream,
    permits: usize,
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyCap {
    pub fn new(service: Upstream, permits: usize) -> Self {
        let permits = permits.max(1);
        Self {
            service,
            permits,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn service(&self) -> Upstream {
        self.service
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a permit. Released when the guard drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, UpstreamError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| UpstreamError::NotReachable {
                service: self.service,
                detail: "request pool closed".into(),
            })
    }
}
