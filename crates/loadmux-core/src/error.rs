//! Error types for load operations.

use thiserror::Error;

/// Errors surfaced to `load`/`load_many` callers.
///
/// The type is `Clone` because one failed dispatch is reported to every
/// waiter that joined the batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// The caller-supplied bulk fetch reported a failure.
    ///
    /// Every waiter in the failing dispatch receives this error and the
    /// affected keys are left uncached, so a later `load` retries.
    #[error("bulk fetch failed: {message}")]
    FetchFailed { message: String },

    /// Two distinct entities in one fetch mapped to the same scalar key.
    ///
    /// This is a contract violation in the view's key extractor or in the
    /// backing data, not a retryable failure. Nothing from the offending
    /// batch is cached or primed.
    #[error("key collision: multiple entities in one fetch share key {key}")]
    KeyCollision { key: String },

    /// An aligned batch function returned the wrong number of values.
    #[error("batch function returned {actual} values for {expected} keys")]
    ShapeMismatch { expected: usize, actual: usize },

    /// The dispatch task terminated before delivering a result.
    #[error("batch dispatch aborted before delivering a result")]
    DispatchAborted,
}

impl LoadError {
    /// Creates a `FetchFailed` error from any displayable cause.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::FetchFailed {
            message: message.into(),
        }
    }
}

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;
