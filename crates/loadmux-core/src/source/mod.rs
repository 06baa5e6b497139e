//! Query sources and their keyed views.
//!
//! A [`QuerySource`] owns one caller-supplied bulk fetch function and the
//! set of views registered against it. Views come in two shapes:
//!
//! - [`ScalarView`]: one key maps to at most one entity. Any entity
//!   observed on any dispatch of the source is complete information under
//!   a scalar key, so every scalar view is primed from every fetch.
//! - [`GroupView`]: one key maps to the complete, ordered list of entities
//!   sharing that key. Completeness is only known for group keys a
//!   dispatch explicitly asked for, so group views never accept entities
//!   observed on foreign dispatches.
//!
//! Negative knowledge is never propagated between views: absence under
//! one key says nothing about absence under another view's extractor.

mod group;
mod scalar;
mod traits;

#[cfg(test)]
mod tests;

use std::cmp::Ordering as CmpOrdering;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::batch::BatchConfig;
use crate::error::LoadResult;

pub use group::GroupView;
pub use scalar::ScalarView;
pub use traits::Fetch;

pub(crate) use traits::PrimeSink;

/// A query source: one bulk fetch function plus the keyed views
/// registered against it.
///
/// Create one source per logical entity family at service construction
/// and register its views once; the source lives for the service's (or
/// request scope's) lifetime and its caches never expire within it.
pub struct QuerySource<C, E> {
    core: Arc<SourceCore<C, E>>,
}

impl<C, E> Clone for QuerySource<C, E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

pub(crate) struct SourceCore<C, E> {
    fetcher: Arc<dyn Fetch<C, E>>,
    pub(crate) config: BatchConfig,
    /// Registered views in registration order. Written only while views
    /// are being registered, read on every dispatch. Held weakly: each
    /// view owns its own state and already holds the source, so a strong
    /// registry would cycle; a dropped view simply stops receiving
    /// primes.
    sinks: RwLock<Vec<Weak<dyn PrimeSink<E>>>>,
    /// Bulk fetch invocations across all views of this source.
    fetches: AtomicU64,
}

impl<C, E> SourceCore<C, E>
where
    C: Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Runs the bulk fetch once, counting the invocation.
    pub(crate) async fn fetch(&self, criteria: C) -> LoadResult<Vec<E>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.fetcher.fetch(criteria).await
    }

    /// Offers the entities of a successful dispatch to every registered
    /// view except the one that dispatched (it commits its own entries,
    /// negative ones included, during distribution).
    pub(crate) fn prime_siblings(&self, origin: usize, entities: &[E]) {
        for (id, sink) in self.sinks.read().iter().enumerate() {
            if id == origin {
                continue;
            }
            if let Some(sink) = sink.upgrade() {
                sink.prime_many(entities);
            }
        }
    }

    fn prime_all(&self, entities: &[E]) {
        for sink in self.sinks.read().iter() {
            if let Some(sink) = sink.upgrade() {
                sink.prime_many(entities);
            }
        }
    }
}

impl<C, E> QuerySource<C, E>
where
    C: Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a source over the given bulk fetch function.
    pub fn new(fetcher: impl Fetch<C, E> + 'static) -> Self {
        Self::with_config(fetcher, BatchConfig::default())
    }

    /// Creates a source with custom scheduling configuration, shared by
    /// every view registered against it.
    pub fn with_config(fetcher: impl Fetch<C, E> + 'static, config: BatchConfig) -> Self {
        Self {
            core: Arc::new(SourceCore {
                fetcher: Arc::new(fetcher),
                config,
                sinks: RwLock::new(Vec::new()),
                fetches: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a scalar view: one key maps to at most one entity.
    ///
    /// `key_of` extracts the view's key from an entity; `criteria_of`
    /// builds the fetch criteria for one deduplicated key set. The
    /// extractor must identify at most one entity per key within any
    /// fetch, otherwise dispatches fail with a key collision.
    pub fn scalar_view<K>(
        &self,
        name: impl Into<String>,
        key_of: impl Fn(&E) -> K + Send + Sync + 'static,
        criteria_of: impl Fn(&[K]) -> C + Send + Sync + 'static,
    ) -> ScalarView<K, C, E>
    where
        K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    {
        let mut sinks = self.core.sinks.write();
        let view = ScalarView::new(
            name.into(),
            sinks.len(),
            Arc::clone(&self.core),
            Box::new(key_of),
            Box::new(criteria_of),
        );
        sinks.push(Arc::downgrade(&view.sink()));
        view
    }

    /// Registers a group view: one key maps to the complete, ordered list
    /// of entities sharing that key.
    ///
    /// `sort_of` orders entities within a group. For output that is
    /// identical across fetches it must not tie distinct entities of one
    /// group; derive it from a component that is unique per entity.
    pub fn group_view<K, S>(
        &self,
        name: impl Into<String>,
        key_of: impl Fn(&E) -> K + Send + Sync + 'static,
        sort_of: impl Fn(&E) -> S + Send + Sync + 'static,
        criteria_of: impl Fn(&[K]) -> C + Send + Sync + 'static,
    ) -> GroupView<K, C, E>
    where
        K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
        S: Ord,
    {
        let cmp = move |a: &E, b: &E| -> CmpOrdering { sort_of(a).cmp(&sort_of(b)) };
        let mut sinks = self.core.sinks.write();
        let view = GroupView::new(
            name.into(),
            sinks.len(),
            Arc::clone(&self.core),
            Box::new(key_of),
            Box::new(cmp),
            Box::new(criteria_of),
        );
        sinks.push(Arc::downgrade(&view.sink()));
        view
    }

    /// Runs the bulk fetch once with arbitrary criteria and primes every
    /// registered view with the returned entities.
    ///
    /// This is the escape hatch for list-shaped queries that don't fit a
    /// keyed view: the caller gets the raw result, and scalar views of
    /// the source answer later loads for these entities from cache.
    pub async fn query(&self, criteria: C) -> LoadResult<Vec<E>> {
        let entities = self.core.fetch(criteria).await?;
        self.core.prime_all(&entities);
        Ok(entities)
    }

    /// Number of bulk fetch invocations so far, across all views.
    pub fn fetch_count(&self) -> u64 {
        self.core.fetches.load(Ordering::Relaxed)
    }
}

/// Boxed key extractor shared by both view shapes.
pub(crate) type KeyOf<E, K> = Box<dyn Fn(&E) -> K + Send + Sync>;
/// Boxed criteria builder shared by both view shapes.
pub(crate) type CriteriaOf<K, C> = Box<dyn Fn(&[K]) -> C + Send + Sync>;
/// Boxed entity comparator for group ordering.
pub(crate) type SortCmp<E> = Box<dyn Fn(&E, &E) -> CmpOrdering + Send + Sync>;
