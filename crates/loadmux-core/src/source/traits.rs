//! Seam traits between the access layer and the backing data source.

use async_trait::async_trait;

use crate::error::LoadResult;

/// The opaque bulk-fetch function a query source is built over.
///
/// `criteria` describes one dispatch's filter and is built by the view
/// that dispatched (via its `criteria_of` closure) or passed verbatim by
/// [`QuerySource::query`](super::QuerySource::query). The returned
/// entities may be in any order; views collate them against the requested
/// keys. This is the only external I/O boundary the layer depends on.
#[async_trait]
pub trait Fetch<C, E>: Send + Sync {
    async fn fetch(&self, criteria: C) -> LoadResult<Vec<E>>;
}

/// Any async closure `criteria -> entities` is a fetch function.
#[async_trait]
impl<C, E, F, Fut> Fetch<C, E> for F
where
    C: Send + 'static,
    F: Fn(C) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = LoadResult<Vec<E>>> + Send,
{
    async fn fetch(&self, criteria: C) -> LoadResult<Vec<E>> {
        self(criteria).await
    }
}

/// Cross-view cache priming: entities observed by one view's dispatch are
/// offered to every sibling view of the same source.
pub(crate) trait PrimeSink<E>: Send + Sync {
    /// Commits cache entries for entities observed on another dispatch.
    fn prime_many(&self, entities: &[E]);
}
