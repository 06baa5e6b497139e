//! loadmux-core: cache-coherent, auto-batching data access.
//!
//! A single logical query source is exposed through several differently-keyed
//! views (load by id, load by email, load by group, ...). Loads issued within
//! one scheduling segment coalesce into one bulk fetch per view, results are
//! cached per key, and entities fetched through one view become visible to
//! sibling views without another round trip, where that is safe:
//!
//! - A single entity is complete information under any scalar key, so every
//!   scalar view of the source is primed from every fetch.
//! - A group entry asserts completeness of the whole group, so group views
//!   only commit entries from their own dispatches.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                loadmux-core                  │
//! ├─────────────────────────────────────────────┤
//! │  source/  - QuerySource, scalar/group views  │
//! │  batch    - batch windows and dispatch       │
//! │  cache    - per-view stores and metrics      │
//! │  collate  - result matching and grouping     │
//! │  loader   - standalone aligned batch loader  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The only external I/O boundary is the caller-supplied [`Fetch`] function;
//! query protocols, transports, and cache persistence live outside this
//! crate. Cached entries never expire within the life of a `QuerySource`;
//! callers wanting per-request freshness construct one source per scope.
//!
//! # Example
//!
//! ```rust,ignore
//! let source = QuerySource::new(PageStore::new());
//! let by_id = source.scalar_view("by_id", |p: &Page| p.id, PageCriteria::ids);
//! let by_slug = source.scalar_view("by_slug", |p: &Page| p.slug.clone(), PageCriteria::slugs);
//!
//! // One fetch covers both keys; the result also primes `by_slug`.
//! let (a, b) = tokio::join!(by_id.load(1), by_id.load(2));
//! ```

pub mod batch;
pub mod cache;
pub mod collate;
pub mod error;
pub mod loader;
pub mod source;

// Re-export commonly used types at the crate root
pub use batch::BatchConfig;
pub use cache::{CacheEntry, CacheMetrics, CacheMetricsSnapshot};
pub use error::{LoadError, LoadResult};
pub use loader::{BatchFn, BatchLoader};
pub use source::{Fetch, GroupView, QuerySource, ScalarView};
