//! Group views: one key resolves to the complete, ordered list of
//! entities sharing that key.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{trace, warn};

use crate::batch::{Batcher, Dispatch};
use crate::cache::{CacheEntry, CacheMetrics, CacheMetricsSnapshot, CacheStore};
use crate::collate::group_by_key;
use crate::error::{LoadError, LoadResult};

use super::{CriteriaOf, KeyOf, PrimeSink, SortCmp, SourceCore};

/// A group keyed view over a query source.
///
/// A cached group asserts completeness: it is only ever committed by a
/// dispatch that asked for exactly that group key and therefore received
/// every member. Confirmed-empty groups are cached as negative entries
/// and load as empty lists.
pub struct GroupView<K, C, E> {
    core: Arc<GroupCore<K, C, E>>,
}

impl<K, C, E> Clone for GroupView<K, C, E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

pub(crate) struct GroupCore<K, C, E> {
    name: String,
    id: usize,
    source: Arc<SourceCore<C, E>>,
    cache: CacheStore<K, Vec<E>>,
    batcher: Batcher<K, Vec<E>>,
    key_of: KeyOf<E, K>,
    cmp: SortCmp<E>,
    criteria_of: CriteriaOf<K, C>,
    metrics: CacheMetrics,
}

impl<K, C, E> GroupView<K, C, E>
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
        cmp: SortCmp<E>,
        criteria_of: CriteriaOf<K, C>,
    ) -> Self {
        let config = source.config.clone();
        Self {
            core: Arc::new(GroupCore {
                name,
                id,
                source,
                cache: CacheStore::new(),
                batcher: Batcher::new(config),
                key_of,
                cmp,
                criteria_of,
                metrics: CacheMetrics::default(),
            }),
        }
    }

    pub(crate) fn sink(&self) -> Arc<dyn PrimeSink<E>> {
        let sink: Arc<dyn PrimeSink<E>> = self.core.clone();
        sink
    }

    /// Loads the complete group for `key`, sorted by the view's
    /// comparator. A group the source has no members for resolves to an
    /// empty list, and that emptiness is cached.
    pub async fn load(&self, key: K) -> LoadResult<Vec<E>> {
        if let Some(entry) = self.core.cache.get(&key) {
            self.core.metrics.record_hit();
            return Ok(match entry {
                CacheEntry::Resolved(group) => group,
                CacheEntry::Negative => Vec::new(),
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

    /// Loads many groups; output is aligned to the input order,
    /// duplicates included.
    pub async fn load_many(&self, keys: Vec<K>) -> LoadResult<Vec<Vec<E>>> {
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
impl<K, C, E> Dispatch<K, Vec<E>> for GroupCore<K, C, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    C: Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn dispatch(&self, keys: &[K]) -> LoadResult<Vec<Vec<E>>> {
        trace!(view = %self.name, keys = keys.len(), "dispatching group fetch");
        let criteria = (self.criteria_of)(keys);
        let entities = self.source.fetch(criteria).await.map_err(|error| {
            warn!(view = %self.name, %error, "bulk fetch failed");
            error
        })?;
        let groups = group_by_key(
            keys,
            &entities,
            |entity| (self.key_of)(entity),
            |a, b| (self.cmp)(a, b),
        );

        // This dispatch asked for exactly these group keys, so each group
        // is known complete and may be committed, empty ones as negative
        // entries.
        for (key, group) in keys.iter().zip(&groups) {
            if group.is_empty() {
                self.cache.put_negative(key.clone());
            } else {
                self.cache.put(key.clone(), group.clone());
            }
        }
        self.source.prime_siblings(self.id, &entities);
        Ok(groups)
    }
}

impl<K, C, E> PrimeSink<E> for GroupCore<K, C, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    C: Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Foreign batches are never committed here: even when a sibling's
    /// fetch happens to return members of a group, only a dispatch that
    /// asked for that exact group key proves the group is complete.
    fn prime_many(&self, _entities: &[E]) {}
}
