//! Batch windows and the deferred dispatcher.
//!
//! A window opens on the first cache miss against a view and accumulates
//! every further miss issued before the scheduling boundary: loads count as
//! concurrent when they are requested without an intervening suspension, so
//! the boundary is "the current synchronous execution segment has finished
//! and control has returned to the scheduler". It is implemented as a task
//! spawned at window-open time that yields back to the scheduler a
//! configured number of times before closing the window, which lets every
//! already-runnable task enqueue its own keys first.
//!
//! Within one dispatch, waiters are resolved in registration order (window
//! key order, then per-key arrival order). Across dispatches no ordering is
//! promised. Dropping a waiter's receiver cancels only that waiter: the key
//! stays in the window and an in-flight fetch is never aborted.
//!
//! Under a multi-threaded runtime the dispatch task can close the window
//! while a sibling worker is still enqueueing, splitting a would-be batch
//! in two. Every waiter is still resolved exactly once; only the batching
//! becomes less aggressive. The single-fetch guarantee holds on the
//! cooperative single-threaded scheduling the contract is defined against.

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{LoadError, LoadResult};

/// Scheduling knobs for batch windows.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Number of times the dispatch task yields back to the scheduler
    /// before closing its window.
    ///
    /// Each yield re-enqueues the dispatch behind every task that is
    /// already runnable, so higher values absorb more layers of
    /// immediately-ready awaits between sibling `load` calls at the cost
    /// of dispatch latency. One yield is enough for loads issued
    /// back-to-back in a single segment.
    pub dispatch_yields: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { dispatch_yields: 10 }
    }
}

impl BatchConfig {
    /// Creates a configuration with the given number of pre-dispatch yields.
    pub fn with_dispatch_yields(mut self, dispatch_yields: usize) -> Self {
        self.dispatch_yields = dispatch_yields;
        self
    }
}

/// One dispatch cycle: turns a deduplicated key set into one value per
/// key, in key order.
///
/// Implementations run the underlying fetch, collate the result, and
/// commit cache entries before returning; the window then fans the values
/// back out to the waiters.
#[async_trait]
pub(crate) trait Dispatch<K, V>: Send + Sync {
    async fn dispatch(&self, keys: &[K]) -> LoadResult<Vec<V>>;
}

/// Pending state accumulated between window open and dispatch.
struct Window<K, V> {
    /// Deduplicated keys in first-request order.
    keys: Vec<K>,
    /// Pending waiters per key, in registration order.
    waiters: HashMap<K, Vec<oneshot::Sender<LoadResult<V>>>>,
}

impl<K, V> Window<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn new() -> Self {
        Self {
            keys: Vec::new(),
            waiters: HashMap::new(),
        }
    }

    fn register(&mut self, key: K) -> oneshot::Receiver<LoadResult<V>> {
        use std::collections::hash_map::Entry;

        let (tx, rx) = oneshot::channel();
        match self.waiters.entry(key) {
            Entry::Occupied(mut slot) => slot.get_mut().push(tx),
            Entry::Vacant(slot) => {
                self.keys.push(slot.key().clone());
                slot.insert(vec![tx]);
            }
        }
        rx
    }

    /// Delivers one outcome to every waiter. A failed send means the
    /// waiter canceled; the remaining waiters still get their result.
    fn deliver(self, outcome: LoadResult<Vec<V>>) {
        let Window { keys, mut waiters } = self;
        match outcome {
            Ok(values) => {
                if values.len() != keys.len() {
                    warn!(
                        expected = keys.len(),
                        actual = values.len(),
                        "dispatch arity mismatch"
                    );
                    let error = LoadError::ShapeMismatch {
                        expected: keys.len(),
                        actual: values.len(),
                    };
                    fail_all(&keys, &mut waiters, &error);
                    return;
                }
                for (key, value) in keys.iter().zip(values) {
                    if let Some(senders) = waiters.remove(key) {
                        for tx in senders {
                            let _ = tx.send(Ok(value.clone()));
                        }
                    }
                }
            }
            Err(error) => fail_all(&keys, &mut waiters, &error),
        }
    }
}

fn fail_all<K, V>(
    keys: &[K],
    waiters: &mut HashMap<K, Vec<oneshot::Sender<LoadResult<V>>>>,
    error: &LoadError,
) where
    K: Eq + Hash,
{
    for key in keys {
        if let Some(senders) = waiters.remove(key) {
            for tx in senders {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }
}

/// Accumulates load requests for one view between scheduling boundaries.
pub(crate) struct Batcher<K, V> {
    window: Mutex<Option<Window<K, V>>>,
    config: BatchConfig,
}

impl<K, V> Batcher<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new(config: BatchConfig) -> Self {
        Self {
            window: Mutex::new(None),
            config,
        }
    }

    /// Registers a waiter for `key` under the current window.
    ///
    /// Returns the waiter's receiver and whether this call opened the
    /// window: the opener is responsible for spawning the dispatch task
    /// that will close it.
    pub(crate) fn enqueue(&self, key: K) -> (oneshot::Receiver<LoadResult<V>>, bool) {
        let mut slot = self.window.lock();
        let opened = slot.is_none();
        if opened {
            trace!("batch window opened");
        }
        let rx = slot.get_or_insert_with(Window::new).register(key);
        (rx, opened)
    }

    /// Runs one dispatch cycle: waits for the scheduling boundary, closes
    /// the window, and fans the outcome back out to every waiter.
    pub(crate) async fn run<D>(&self, dispatcher: &D)
    where
        D: Dispatch<K, V> + ?Sized,
    {
        for _ in 0..self.config.dispatch_yields {
            tokio::task::yield_now().await;
        }
        let window = self.window.lock().take();
        let Some(window) = window else {
            return;
        };
        debug!(keys = window.keys.len(), "dispatching batch window");
        let outcome = dispatcher.dispatch(&window.keys).await;
        window.deliver(outcome);
    }
}
