//! Shared fixtures for loader integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dataloader_core::loader::{BatchFetcher, FetchResult, Loader};
use dataloader_core::LoaderConfig;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

/// Fetcher that answers `v<key>` and records every batch it receives
#[derive(Debug, Default)]
pub struct RecordingFetcher {
    calls: Mutex<Vec<Vec<String>>>,
    failing_keys: Mutex<HashSet<String>>,
    failing_batches: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fetcher that takes `delay` to answer each batch
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    /// Report a per-key failure for `key` until [`Self::recover_key`]
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().insert(key.to_string());
    }

    pub fn recover_key(&self, key: &str) {
        self.failing_keys.lock().remove(key);
    }

    /// Fail the next `count` batches as a whole
    pub fn fail_next_batches(&self, count: usize) {
        self.failing_batches.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every key that was ever fetched
    pub fn fetched_keys(&self) -> HashSet<String> {
        self.calls.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl BatchFetcher for RecordingFetcher {
    type Key = String;
    type Value = String;
    type Error = StoreError;

    async fn fetch(&self, keys: &[String]) -> FetchResult<String, StoreError> {
        self.calls.lock().push(keys.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let fail_batch = self
            .failing_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail_batch {
            return Err(StoreError("connection reset".to_string()));
        }

        let failing = self.failing_keys.lock().clone();
        Ok(keys
            .iter()
            .map(|key| {
                if failing.contains(key) {
                    Err(StoreError(format!("{key} unavailable")))
                } else {
                    Ok(format!("v{key}"))
                }
            })
            .collect())
    }
}

pub fn loader(fetcher: &Arc<RecordingFetcher>, max_batch: usize, wait_ms: u64) -> Loader<RecordingFetcher> {
    Loader::with_shared(
        "recording",
        Arc::clone(fetcher),
        LoaderConfig::new(max_batch, Duration::from_millis(wait_ms)),
    )
}

pub fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}
