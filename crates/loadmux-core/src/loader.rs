//! Standalone batching loader over an aligned batch function.
//!
//! [`BatchLoader`] exists separate from the `QuerySource` machinery: it
//! batches and caches calls to a single caller-supplied function without
//! any cross-view coherency, for data that is only ever keyed one way.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::batch::{BatchConfig, Batcher, Dispatch};
use crate::cache::{CacheEntry, CacheMetrics, CacheMetricsSnapshot, CacheStore};
use crate::error::{LoadError, LoadResult};

/// An aligned batch function: one value per key, in key order.
///
/// The returned vector **must** have the same length as `keys`; a
/// mismatch fails the whole dispatch with [`LoadError::ShapeMismatch`].
#[async_trait]
pub trait BatchFn<K, V>: Send + Sync {
    async fn load(&self, keys: &[K]) -> LoadResult<Vec<V>>;
}

/// Any async closure over a key slice is a batch function.
///
/// The closure must copy the keys it needs before returning its future
/// (`let keys = keys.to_vec()`), since the future may not borrow them.
#[async_trait]
impl<K, V, F, Fut> BatchFn<K, V> for F
where
    K: Sync,
    F: Fn(&[K]) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = LoadResult<Vec<V>>> + Send,
{
    async fn load(&self, keys: &[K]) -> LoadResult<Vec<V>> {
        self(keys).await
    }
}

/// A caching, batching loader over one aligned batch function.
///
/// `load` calls issued within one scheduling segment collapse into a
/// single batch-function invocation; resolved values are cached for the
/// life of the loader. Because the aligned contract always produces a
/// value for every key, there are no negative entries here.
pub struct BatchLoader<K, V> {
    core: Arc<LoaderCore<K, V>>,
}

impl<K, V> Clone for BatchLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

struct LoaderCore<K, V> {
    batch_fn: Arc<dyn BatchFn<K, V>>,
    cache: CacheStore<K, V>,
    batcher: Batcher<K, V>,
    metrics: CacheMetrics,
}

impl<K, V> BatchLoader<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a loader over the given batch function.
    pub fn new(batch_fn: impl BatchFn<K, V> + 'static) -> Self {
        Self::with_config(batch_fn, BatchConfig::default())
    }

    /// Creates a loader with custom scheduling configuration.
    pub fn with_config(batch_fn: impl BatchFn<K, V> + 'static, config: BatchConfig) -> Self {
        Self {
            core: Arc::new(LoaderCore {
                batch_fn: Arc::new(batch_fn),
                cache: CacheStore::new(),
                batcher: Batcher::new(config),
                metrics: CacheMetrics::default(),
            }),
        }
    }

    /// Loads the value for `key`, batching with concurrent loads.
    pub async fn load(&self, key: K) -> LoadResult<V> {
        if let Some(CacheEntry::Resolved(value)) = self.core.cache.get(&key) {
            self.core.metrics.record_hit();
            return Ok(value);
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

    /// Loads many keys; output is aligned to the input, duplicates
    /// included.
    pub async fn load_many(&self, keys: Vec<K>) -> LoadResult<Vec<V>> {
        try_join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    /// Returns a snapshot of the loader's cache metrics.
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.core.metrics.snapshot()
    }
}

#[async_trait]
impl<K, V> Dispatch<K, V> for LoaderCore<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn dispatch(&self, keys: &[K]) -> LoadResult<Vec<V>> {
        let values = self.batch_fn.load(keys).await?;
        if values.len() != keys.len() {
            return Err(LoadError::ShapeMismatch {
                expected: keys.len(),
                actual: values.len(),
            });
        }
        for (key, value) in keys.iter().zip(&values) {
            self.cache.put(key.clone(), value.clone());
        }
        Ok(values)
    }
}
