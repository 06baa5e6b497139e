//! Scalar views: one key resolves to at most one entity.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{trace, warn};

use crate::batch::{Batcher, Dispatch};
use crate::cache::{CacheEntry, CacheMetrics, CacheMetricsSnapshot, CacheStore};
use crate::collate::match_by_key;
use crate::error::{LoadError, LoadResult};

use super::{CriteriaOf, KeyOf, PrimeSink, SourceCore};

/// A scalar keyed view over a query source.
///
/// `load` consults the view's cache first; misses join the current batch
/// window and are fetched together at the next scheduling boundary.
/// Entities fetched by sibling views of the same source appear here
/// without another fetch, and keys the source confirmed absent are
/// remembered as negative entries so they are not asked for again.
pub struct ScalarView<K, C, E> {
    core: Arc<ScalarCore<K, C, E>>,
}

impl<K, C, E> Clone for ScalarView<K, C, E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

pub(crate) struct ScalarCore<K, C, E> {
    name: String,
    /// Position in the source's sink registry; dispatches skip priming
    /// their own view.
    id: usize,
    source: Arc<SourceCore<C, E>>,
    cache: CacheStore<K, E>,
    batcher: Batcher<K, Option<E>>,
    key_of: KeyOf<E, K>,
    criteria_of: CriteriaOf<K, C>,
    metrics: CacheMetrics,
}

impl<K, C, E> ScalarView<K, C, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    C: Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        name: String,
        id: usize,
        source: Arc<SourceCore<C, E>>,
        key_of: KeyOf<E, K>,
        criteria_of: CriteriaOf<K, C>,
    ) -> Self {
        let config = source.config.clone();
        Self {
            core: Arc::new(ScalarCore {
                name,
                id,
                source,
                cache: CacheStore::new(),
                batcher: Batcher::new(config),
                key_of,
                criteria_of,
                metrics: CacheMetrics::default(),
            }),
        }
    }

    pub(crate) fn sink(&self) -> Arc<dyn PrimeSink<E>> {
        let sink: Arc<dyn PrimeSink<E>> = self.core.clone();
        sink
    }

    /// Loads the entity for `key`, `None` if the source has none.
    ///
    /// Missing keys resolve to `Ok(None)`, never to an error, and the
    /// absence is cached.
    pub async fn load(&self, key: K) -> LoadResult<Option<E>> {
        if let Some(entry) = self.core.cache.get(&key) {
            self.core.metrics.record_hit();
            return Ok(match entry {
                CacheEntry::Resolved(entity) => Some(entity),
                CacheEntry::Negative => None,
            });
        }
        self.core.metrics.record_miss();
        let (rx, opened) = self.core.batcher.enqueue(key);
        if opened {
            let core = Arc::clone(&self.core);
            tokio::spawn(async move {
                core.batcher.run(core.as_ref()).await;
            });
        }
        rx.await.unwrap_or_else(|_| Err(LoadError::DispatchAborted))
    }

    /// Loads many keys; output is aligned to the input order, duplicates
    /// included, regardless of cache state and fetch return order.
    pub async fn load_many(&self, keys: Vec<K>) -> LoadResult<Vec<Option<E>>> {
        try_join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    /// The view's registration name (diagnostics only).
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Returns a snapshot of the view's cache metrics.
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.core.metrics.snapshot()
    }
}

#[async_trait]
impl<K, C, E> Dispatch<K, Option<E>> for ScalarCore<K, C, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    C: Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn dispatch(&self, keys: &[K]) -> LoadResult<Vec<Option<E>>> {
        trace!(view = %self.name, keys = keys.len(), "dispatching scalar fetch");
        let criteria = (self.criteria_of)(keys);
        let entities = self.source.fetch(criteria).await.map_err(|error| {
            warn!(view = %self.name, %error, "bulk fetch failed");
            error
        })?;
        let matched = match_by_key(keys, &entities, |entity| (self.key_of)(entity))?;

        // Commit this view's entries, then let the siblings observe the
        // batch. Priming covers the whole fetched batch, not only the
        // matched keys: an over-returning fetch still yields complete
        // single entities.
        for (key, slot) in keys.iter().zip(&matched) {
            match slot {
                Some(entity) => self.cache.put(key.clone(), entity.clone()),
                None => self.cache.put_negative(key.clone()),
            };
        }
        self.source.prime_siblings(self.id, &entities);
        Ok(matched)
    }
}

impl<K, C, E> PrimeSink<E> for ScalarCore<K, C, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    C: Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn prime_many(&self, entities: &[E]) {
        let mut committed = 0;
        for entity in entities {
            if self.cache.put((self.key_of)(entity), entity.clone()) {
                committed += 1;
            }
        }
        self.metrics.record_primes(committed);
    }
}
