//! # Fetch Boundary
//!
//! The bulk lookup a loader calls once per batch. Implementations receive the
//! batch keys in insertion order and must answer positionally.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;

/// Result of one bulk fetch.
///
/// `Err` fails every key in the batch with the same error. `Ok` carries one
/// result per key, in the order the keys were given.
pub type FetchResult<V, E> = Result<Vec<Result<V, E>>, E>;

/// Bulk lookup backing a [`Loader`](super::Loader)
#[async_trait]
pub trait BatchFetcher: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn fetch(&self, keys: &[Self::Key]) -> FetchResult<Self::Value, Self::Error>;
}

/// [`BatchFetcher`] backed by an async closure
pub struct FnFetcher<K, V, E, F> {
    func: F,
    _marker: PhantomData<fn(K) -> (V, E)>,
}

/// Wrap an async closure taking the batch keys as a [`BatchFetcher`]
///
/// ```rust,no_run
/// use dataloader_core::loader::{fetch_fn, FetchResult};
///
/// # #[derive(Debug)] struct StoreError;
/// # impl std::fmt::Display for StoreError {
/// #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("store") }
/// # }
/// # impl std::error::Error for StoreError {}
/// let fetcher = fetch_fn(|ids: Vec<u64>| async move {
///     let names = ids.iter().map(|id| Ok(format!("item-{id}"))).collect();
///     FetchResult::<String, StoreError>::Ok(names)
/// });
/// ```
pub fn fetch_fn<K, V, E, F, Fut>(func: F) -> FnFetcher<K, V, E, F>
where
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult<V, E>> + Send + 'static,
{
    FnFetcher {
        func,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<K, V, E, F, Fut> BatchFetcher for FnFetcher<K, V, E, F>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult<V, E>> + Send + 'static,
{
    type Key = K;
    type Value = V;
    type Error = E;

    async fn fetch(&self, keys: &[K]) -> FetchResult<V, E> {
        (self.func)(keys.to_vec()).await
    }
}

impl<K, V, E, F> fmt::Debug for FnFetcher<K, V, E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFetcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("lookup failed")]
    struct LookupError;

    #[tokio::test]
    async fn test_fn_fetcher_passes_keys_in_order() {
        let fetcher = fetch_fn(|keys: Vec<&'static str>| async move {
            Ok::<_, LookupError>(keys.into_iter().map(|k| Ok(k.len())).collect())
        });

        let result = fetcher.fetch(&["bb", "a", "ccc"]).await.expect("fetch");
        let lengths: Vec<usize> = result.into_iter().map(|r| r.expect("value")).collect();
        assert_eq!(lengths, vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn test_fn_fetcher_shared_failure() {
        let fetcher =
            fetch_fn(|_keys: Vec<u32>| async move { FetchResult::<u32, LookupError>::Err(LookupError) });

        assert!(fetcher.fetch(&[1, 2]).await.is_err());
    }
}
