//! Stage 2: medication name → canonical identity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use super::error::PipelineError;
use super::traits::NameLookup;
use crate::models::{MedicationMention, PharmacologicalIdentity};

/// Entries kept before the cache starts evicting.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Process-lifetime TTL cache of successful lookups, keyed by case-folded name.
///
/// Unresolved results are cached too. Size is capped: when full, expired
/// entries are swept and then the oldest entry is evicted. The lock is never
/// held across `.await`.
#[derive(Debug)]
pub struct IdentityCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, (PharmacologicalIdentity, Instant)>>,
}

impl IdentityCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn get(&self, name: &str) -> Option<PharmacologicalIdentity> {
        let key = Self::key(name);
        let mut entries = self.entries.lock().ok()?;
        match entries.get(&key) {
            Some((identity, stored)) if stored.elapsed() < self.ttl => Some(identity.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, name: &str, identity: PharmacologicalIdentity) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let key = Self::key(name);

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, (_, stored)| stored.elapsed() < ttl);

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, (_, stored))| *stored)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(key, (identity, Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct IdentityResolver {
    lookup: Arc<dyn NameLookup>,
    cache: Option<IdentityCache>,
}

impl IdentityResolver {
    pub fn new(lookup: Arc<dyn NameLookup>, cache_ttl: Option<Duration>) -> Self {
        Self {
            lookup,
            cache: cache_ttl.map(IdentityCache::new),
        }
    }

    /// First candidate in service order wins; none means unresolved.
    pub async fn resolve(
        &self,
        mention: &MedicationMention,
    ) -> Result<PharmacologicalIdentity, PipelineError> {
        let name = mention.raw_name.trim();
        if name.is_empty() {
            return Ok(PharmacologicalIdentity::Unresolved);
        }

        if let Some(identity) = self.cache.as_ref().and_then(|c| c.get(name)) {
            tracing::debug!(mention = %name, ?identity, "Identity cache hit");
            return Ok(identity);
        }

        let candidates = self.lookup.candidates(name).await.map_err(|source| {
            PipelineError::ResolutionUnavailable {
                mention: mention.raw_name.clone(),
                source,
            }
        })?;

        let identity = PharmacologicalIdentity::from(candidates.into_iter().next());
        if let Some(cache) = &self.cache {
            cache.insert(name, identity.clone());
        }

        tracing::debug!(mention = %name, ?identity, "Identity resolved");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mock::MockNameLookup;

    fn resolver(lookup: Arc<MockNameLookup>, ttl: Option<Duration>) -> IdentityResolver {
        IdentityResolver::new(lookup, ttl)
    }

    #[tokio::test]
    async fn first_candidate_wins() {
        let lookup = Arc::new(MockNameLookup::new().with("Glucophage", &["151827", "6809"]));
        let identity = resolver(lookup, None)
            .resolve(&MedicationMention::named("Glucophage"))
            .await
            .unwrap();
        assert_eq!(identity, PharmacologicalIdentity::Resolved("151827".into()));
    }

    #[tokio::test]
    async fn no_candidates_is_unresolved() {
        let lookup = Arc::new(MockNameLookup::new());
        let identity = resolver(lookup, None)
            .resolve(&MedicationMention::named("Unknownium"))
            .await
            .unwrap();
        assert_eq!(identity, PharmacologicalIdentity::Unresolved);
    }

    #[tokio::test]
    async fn transport_failure_names_the_mention() {
        let lookup = Arc::new(MockNameLookup::new().with_failure("Lipitor"));
        let err = resolver(lookup, None)
            .resolve(&MedicationMention::named("Lipitor"))
            .await
            .unwrap_err();
        match err {
            PipelineError::ResolutionUnavailable { mention, .. } => assert_eq!(mention, "Lipitor"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cache_is_case_insensitive_and_includes_unresolved() {
        let lookup = Arc::new(MockNameLookup::new().with("aspirin", &["1191"]));
        let resolver = resolver(lookup.clone(), Some(Duration::from_secs(600)));

        resolver.resolve(&MedicationMention::named("Aspirin")).await.unwrap();
        resolver.resolve(&MedicationMention::named(" ASPIRIN ")).await.unwrap();
        resolver.resolve(&MedicationMention::named("Unknownium")).await.unwrap();
        resolver.resolve(&MedicationMention::named("unknownium")).await.unwrap();

        assert_eq!(lookup.tracker.calls(), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let lookup = Arc::new(MockNameLookup::new().with_failure("Lipitor"));
        let resolver = resolver(lookup.clone(), Some(Duration::from_secs(600)));

        assert!(resolver.resolve(&MedicationMention::named("Lipitor")).await.is_err());
        assert!(resolver.resolve(&MedicationMention::named("Lipitor")).await.is_err());
        assert_eq!(lookup.tracker.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_entries_expire() {
        let lookup = Arc::new(MockNameLookup::new().with("aspirin", &["1191"]));
        let resolver = resolver(lookup.clone(), Some(Duration::from_secs(60)));
        let mention = MedicationMention::named("Aspirin");

        resolver.resolve(&mention).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        resolver.resolve(&mention).await.unwrap();
        assert_eq!(lookup.tracker.calls(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        resolver.resolve(&mention).await.unwrap();
        assert_eq!(lookup.tracker.calls(), 2);
    }

    #[tokio::test]
    async fn disabled_cache_always_calls() {
        let lookup = Arc::new(MockNameLookup::new().with("aspirin", &["1191"]));
        let resolver = resolver(lookup.clone(), None);

        resolver.resolve(&MedicationMention::named("Aspirin")).await.unwrap();
        resolver.resolve(&MedicationMention::named("Aspirin")).await.unwrap();
        assert_eq!(lookup.tracker.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_stays_within_capacity() {
        let cache = IdentityCache::with_capacity(Duration::from_secs(600), 3);
        for i in 0..10 {
            cache.insert(&format!("drug{i}"), PharmacologicalIdentity::Unresolved);
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.get("drug0").is_none());
        assert!(cache.get("drug9").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_swept_before_eviction() {
        let cache = IdentityCache::with_capacity(Duration::from_secs(60), 2);
        cache.insert("old", PharmacologicalIdentity::Unresolved);
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.insert("fresh", PharmacologicalIdentity::Resolved("1".into()));
        tokio::time::advance(Duration::from_secs(31)).await;

        cache.insert("new", PharmacologicalIdentity::Resolved("2".into()));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("fresh").is_some());
        assert!(cache.get("new").is_some());
    }

    #[tokio::test]
    async fn refreshing_a_key_does_not_evict() {
        let cache = IdentityCache::with_capacity(Duration::from_secs(600), 2);
        cache.insert("a", PharmacologicalIdentity::Unresolved);
        cache.insert("b", PharmacologicalIdentity::Unresolved);
        cache.insert("A ", PharmacologicalIdentity::Resolved("7".into()));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(PharmacologicalIdentity::Resolved("7".into())));
        assert!(cache.get("b").is_some());
    }
}
