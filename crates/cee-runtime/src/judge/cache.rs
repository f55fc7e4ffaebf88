//! Judge outcome cache.
//!
//! Identical (prompt, output, reference) triples scored by the same judge
//! model reuse the earlier outcome instead of paying for another call.
//! Only successful outcomes are cached.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use cee_core::Tier2Outcome;
use moka::future::Cache;

use super::{JudgeClient, JudgeError};
use crate::config::CacheConfig;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    model: String,
    input_hash: u64,
}

impl CacheKey {
    fn new(model: &str, prompt: &str, output: &str, reference: Option<&str>) -> Self {
        let mut hasher = DefaultHasher::new();
        prompt.hash(&mut hasher);
        output.hash(&mut hasher);
        reference.hash(&mut hasher);
        Self {
            model: model.to_string(),
            input_hash: hasher.finish(),
        }
    }
}

/// Caching decorator over any [`JudgeClient`].
pub struct CachedJudge<J> {
    inner: J,
    cache: Cache<CacheKey, Tier2Outcome>,
}

impl<J: JudgeClient> CachedJudge<J> {
    pub fn new(inner: J, max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }

    pub fn from_config(inner: J, config: &CacheConfig) -> Self {
        Self::new(inner, config.max_entries, config.ttl)
    }

    pub fn inner(&self) -> &J {
        &self.inner
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl<J: JudgeClient> JudgeClient for CachedJudge<J> {
    async fn judge(
        &self,
        prompt: &str,
        output: &str,
        reference: Option<&str>,
    ) -> Result<Tier2Outcome, JudgeError> {
        let key = CacheKey::new(self.inner.model(), prompt, output, reference);
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!(model = self.inner.model(), "Judge cache hit");
            return Ok(hit);
        }

        let outcome = self.inner.judge(prompt, output, reference).await?;
        self.cache.insert(key, outcome.clone()).await;
        Ok(outcome)
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
