//! Tests for query sources and keyed views.
//!
//! Organized by functionality:
//! - Batching and deduplication within one scheduling segment
//! - Cache commits, negative entries, and retries
//! - Cross-view priming and the group completeness rule
//! - Direct queries and metrics


#[cfg(test)]
mod view_tests;
