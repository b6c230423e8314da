//! # Request-Scoped Loader
//!
//! Collapses many single-key lookups made while building one response into as
//! few bulk fetches as possible. Keys requested within the same coalescing
//! window are fetched together, equal keys share one slot, and successful
//! results are memoized for the lifetime of the loader.
//!
//! ## Lifecycle
//!
//! 1. The first cache miss opens a batch and starts its window timer
//! 2. Later misses join the open batch (equal keys coalesce)
//! 3. The batch closes when the window elapses or `max_batch` keys are queued;
//!    a new batch opens for subsequent misses
//! 4. The fetcher runs once per closed batch on its own task, then every
//!    waiting thunk is woken and reads its slot
//! 5. Successful values are written to the cache when the thunk resolves;
//!    failures are never cached
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dataloader_core::config::LoaderConfig;
//! use dataloader_core::loader::{fetch_fn, FetchResult, Loader};
//!
//! # #[derive(Debug)] struct StoreError;
//! # impl std::fmt::Display for StoreError {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("store") }
//! # }
//! # impl std::error::Error for StoreError {}
//! # async fn example() {
//! let loader = Loader::new(
//!     "user",
//!     fetch_fn(|ids: Vec<u64>| async move {
//!         FetchResult::<String, StoreError>::Ok(ids.iter().map(|id| Ok(format!("user-{id}"))).collect())
//!     }),
//!     LoaderConfig::default(),
//! );
//!
//! // Both keys land in the same fetch
//! let (a, b) = tokio::join!(loader.load(1), loader.load(2));
//! assert_eq!(a.unwrap(), "user-1");
//! assert_eq!(b.unwrap(), "user-2");
//! # }
//! ```

mod batch;
pub mod fetch;
mod stats;

pub use fetch::{fetch_fn, BatchFetcher, FetchResult, FnFetcher};
pub use stats::LoaderStats;

use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::logging::log_batch_operation;
use batch::{Batch, BatchWaiter, ClosingBatch};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use stats::StatsRecorder;
use std::collections::HashMap;
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of loading a single key
pub type LoadResult<F> = Result<<F as BatchFetcher>::Value, LoadError<<F as BatchFetcher>::Error>>;

/// Batching, caching loader for one entity type within one request.
///
/// Cloning is cheap and every clone shares the same cache and open batch.
pub struct Loader<F: BatchFetcher> {
    inner: Arc<LoaderInner<F>>,
}

struct LoaderInner<F: BatchFetcher> {
    name: String,
    fetcher: Arc<F>,
    config: LoaderConfig,
    state: Mutex<LoaderState<F>>,
    stats: StatsRecorder,
}

struct LoaderState<F: BatchFetcher> {
    /// Created on first successful resolution or prime
    cache: Option<HashMap<F::Key, F::Value>>,
    /// The open batch, if any; at most one at a time
    batch: Option<Batch<F::Key, F::Value, F::Error>>,
    batches_opened: u64,
}

impl<F: BatchFetcher> Loader<F> {
    pub fn new(name: impl Into<String>, fetcher: F, config: LoaderConfig) -> Self {
        Self::with_shared(name, Arc::new(fetcher), config)
    }

    /// Build a loader around a fetcher shared with other loaders
    pub fn with_shared(name: impl Into<String>, fetcher: Arc<F>, config: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                name: name.into(),
                fetcher,
                config,
                state: Mutex::new(LoaderState {
                    cache: None,
                    batch: None,
                    batches_opened: 0,
                }),
                stats: StatsRecorder::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> LoaderStats {
        self.inner.stats.snapshot()
    }

    /// Load a key, waiting for its batch if it is not cached
    pub async fn load(&self, key: F::Key) -> LoadResult<F> {
        self.load_thunk(key).get().await
    }

    /// Queue a key and return a handle that resolves it later.
    ///
    /// The key joins the open batch immediately; only resolving the thunk
    /// waits. Unresolved thunks never write to the cache.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, since the batch window
    /// timer runs as a spawned task.
    pub fn load_thunk(&self, key: F::Key) -> Thunk<F> {
        let inner = &self.inner;
        inner.stats.record_load();

        let mut guard = inner.state.lock();
        if let Some(value) = guard.cache.as_ref().and_then(|cache| cache.get(&key)) {
            inner.stats.record_cache_hit();
            return Thunk::ready(value.clone());
        }

        let LoaderState {
            batch: open_slot,
            batches_opened,
            ..
        } = &mut *guard;
        let open = open_slot.get_or_insert_with(|| {
            *batches_opened += 1;
            Batch::new(*batches_opened)
        });

        let (position, inserted) = open.key_index(key.clone());
        let waiter = open.subscribe();
        let batch_id = open.id();
        let full = inner.config.is_bounded() && open.len() >= inner.config.max_batch;

        if !inserted {
            inner.stats.record_coalesced();
        } else if position == 0 {
            debug!(loader = %inner.name, batch_id, "Opened batch");
            start_window(inner, batch_id);
        }

        let flushed = if full { open_slot.take() } else { None };
        drop(guard);

        if let Some(batch) = flushed {
            inner.stats.record_early_flush();
            debug!(
                loader = %inner.name,
                batch_id,
                max_batch = inner.config.max_batch,
                "Batch full, flushing before window elapses"
            );
            tokio::spawn(dispatch(Arc::clone(inner), batch.close()));
        }

        Thunk {
            state: ThunkState::Pending {
                inner: Arc::clone(inner),
                key,
                position,
                waiter,
            },
        }
    }

    /// Load every key, returning results in input order
    pub async fn load_all<I>(&self, keys: I) -> Vec<LoadResult<F>>
    where
        I: IntoIterator<Item = F::Key>,
    {
        self.load_all_thunk(keys).await
    }

    /// Queue every key now and resolve them all later, in input order
    pub fn load_all_thunk<I>(&self, keys: I) -> BoxFuture<'static, Vec<LoadResult<F>>>
    where
        I: IntoIterator<Item = F::Key>,
    {
        let thunks: Vec<Thunk<F>> = keys.into_iter().map(|key| self.load_thunk(key)).collect();
        join_all(thunks.into_iter().map(Thunk::get)).boxed()
    }

    /// Seed the cache if the key is absent; returns whether the value was stored
    pub fn prime(&self, key: F::Key, value: F::Value) -> bool {
        let mut state = self.inner.state.lock();
        let cache = state.cache.get_or_insert_with(HashMap::new);
        if cache.contains_key(&key) {
            return false;
        }
        cache.insert(key, value);
        true
    }

    /// Evict one key so the next load fetches it again
    pub fn clear(&self, key: &F::Key) {
        let mut state = self.inner.state.lock();
        if let Some(cache) = state.cache.as_mut() {
            cache.remove(key);
        }
    }

    pub fn is_cached(&self, key: &F::Key) -> bool {
        let state = self.inner.state.lock();
        state
            .cache
            .as_ref()
            .is_some_and(|cache| cache.contains_key(key))
    }

    pub fn cached_len(&self) -> usize {
        let state = self.inner.state.lock();
        state.cache.as_ref().map_or(0, HashMap::len)
    }
}

impl<F: BatchFetcher> LoaderInner<F> {
    fn remember(&self, key: F::Key, value: F::Value) {
        let mut state = self.state.lock();
        state
            .cache
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
    }
}

impl<F: BatchFetcher> Clone for Loader<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: BatchFetcher> fmt::Debug for Loader<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Close the batch when its window elapses, unless `max_batch` already did
fn start_window<F: BatchFetcher>(inner: &Arc<LoaderInner<F>>, batch_id: u64) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        tokio::time::sleep(inner.config.wait()).await;

        let expired = {
            let mut state = inner.state.lock();
            let current = state.batch.as_ref().map(Batch::id);
            if current == Some(batch_id) {
                state.batch.take()
            } else {
                None
            }
        };

        if let Some(batch) = expired {
            dispatch(inner, batch.close()).await;
        }
    });
}

/// Run the fetcher for a closed batch and broadcast the outcome
async fn dispatch<F: BatchFetcher>(
    inner: Arc<LoaderInner<F>>,
    batch: ClosingBatch<F::Key, F::Value, F::Error>,
) {
    let key_count = batch.keys.len();
    inner.stats.record_dispatch(key_count);
    debug!(
        loader = %inner.name,
        batch_id = batch.id,
        keys = key_count,
        "📦 Dispatching batch"
    );

    let started = Instant::now();
    let outcome = match inner.fetcher.fetch(&batch.keys).await {
        Ok(mut results) => {
            if results.len() != key_count {
                warn!(
                    loader = %inner.name,
                    batch_id = batch.id,
                    keys = key_count,
                    results = results.len(),
                    "Fetcher returned a result count that does not match the batch"
                );
                // Surplus entries have no key to answer
                results.truncate(key_count);
            }

            let failures = results.iter().filter(|result| result.is_err()).count();
            if failures > 0 {
                inner.stats.record_key_failures(failures);
            }

            Ok(results
                .into_iter()
                .map(|result| result.map_err(Arc::new))
                .collect())
        }
        Err(err) => {
            inner.stats.record_fetch_failure();
            warn!(
                loader = %inner.name,
                batch_id = batch.id,
                keys = key_count,
                error = %err,
                "Batch fetch failed"
            );
            Err(Arc::new(err))
        }
    };

    let status = if outcome.is_ok() { "completed" } else { "failed" };
    log_batch_operation(
        &inner.name,
        batch.id,
        key_count,
        status,
        started.elapsed(),
    );

    batch.complete(outcome);
}

/// Deferred result of [`Loader::load_thunk`].
///
/// Resolve with [`Thunk::get`] or by awaiting it directly.
pub struct Thunk<F: BatchFetcher> {
    state: ThunkState<F>,
}

enum ThunkState<F: BatchFetcher> {
    Ready(F::Value),
    Pending {
        inner: Arc<LoaderInner<F>>,
        key: F::Key,
        position: usize,
        waiter: BatchWaiter<F::Value, F::Error>,
    },
}

impl<F: BatchFetcher> Thunk<F> {
    fn ready(value: F::Value) -> Self {
        Self {
            state: ThunkState::Ready(value),
        }
    }

    /// True when the value came straight from the cache
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ThunkState::Ready(_))
    }

    /// Wait for the owning batch and return this key's result
    pub async fn get(self) -> LoadResult<F> {
        match self.state {
            ThunkState::Ready(value) => Ok(value),
            ThunkState::Pending {
                inner,
                key,
                position,
                waiter,
            } => {
                let result = waiter.resolve(position).await;
                if let Ok(value) = &result {
                    inner.remember(key, value.clone());
                }
                result
            }
        }
    }
}

impl<F: BatchFetcher> IntoFuture for Thunk<F> {
    type Output = LoadResult<F>;
    type IntoFuture = BoxFuture<'static, LoadResult<F>>;

    fn into_future(self) -> Self::IntoFuture {
        self.get().boxed()
    }
}

impl<F: BatchFetcher> fmt::Debug for Thunk<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            ThunkState::Ready(_) => f.write_str("Thunk::Ready"),
            ThunkState::Pending { position, .. } => {
                f.debug_struct("Thunk::Pending").field("position", position).finish()
            }
        }
    }
}
