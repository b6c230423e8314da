//! # Batch
//!
//! One coalescing window. While a batch is attached to its loader it is open
//! and accepts keys; once detached (timer elapsed or `max_batch` reached) it is
//! closing and its keys are handed to the fetcher exactly once. Publishing the
//! outcome on the watch channel completes it and wakes every waiting thunk.

use crate::error::LoadError;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::watch;

/// Fetch outcome shared by every caller of a batch
pub(crate) type BatchOutcome<V, E> = Result<Vec<Result<V, Arc<E>>>, Arc<E>>;

type Signal<V, E> = Option<Arc<BatchOutcome<V, E>>>;

/// Keys collected during one window plus the completion broadcast
pub(crate) struct Batch<K, V, E> {
    id: u64,
    keys: Vec<K>,
    positions: HashMap<K, usize>,
    done: watch::Sender<Signal<V, E>>,
}

impl<K, V, E> Batch<K, V, E>
where
    K: Clone + Eq + Hash,
{
    pub(crate) fn new(id: u64) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            id,
            keys: Vec::new(),
            positions: HashMap::new(),
            done,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    /// Position of `key` in this batch, appending it if absent.
    ///
    /// Returns the position and whether the key was newly appended. Equal keys
    /// always map to the same position so they share one fetch slot.
    pub(crate) fn key_index(&mut self, key: K) -> (usize, bool) {
        if let Some(&position) = self.positions.get(&key) {
            return (position, false);
        }

        let position = self.keys.len();
        self.positions.insert(key.clone(), position);
        self.keys.push(key);
        (position, true)
    }

    /// Waiter for this batch's outcome
    pub(crate) fn subscribe(&self) -> BatchWaiter<V, E> {
        BatchWaiter {
            done: self.done.subscribe(),
        }
    }

    /// Detach the keys for dispatch; the batch no longer accepts keys after this
    pub(crate) fn close(self) -> ClosingBatch<K, V, E> {
        ClosingBatch {
            id: self.id,
            keys: self.keys,
            done: self.done,
        }
    }
}

/// A batch that has left its loader and is waiting on the fetcher
pub(crate) struct ClosingBatch<K, V, E> {
    pub(crate) id: u64,
    pub(crate) keys: Vec<K>,
    done: watch::Sender<Signal<V, E>>,
}

impl<K, V, E> ClosingBatch<K, V, E> {
    /// Publish the outcome, waking every waiter
    pub(crate) fn complete(self, outcome: BatchOutcome<V, E>) {
        self.done.send_replace(Some(Arc::new(outcome)));
    }
}

/// Receiving end of a batch's completion broadcast
pub(crate) struct BatchWaiter<V, E> {
    done: watch::Receiver<Signal<V, E>>,
}

impl<V, E> BatchWaiter<V, E>
where
    V: Clone,
{
    /// Wait for the batch to complete and read the slot at `position`
    pub(crate) async fn resolve(mut self, position: usize) -> Result<V, LoadError<E>> {
        let outcome = match self.done.wait_for(Option::is_some).await {
            Ok(signal) => (*signal).clone(),
            Err(_) => None,
        };

        match outcome {
            Some(outcome) => read_slot(&outcome, position),
            None => Err(LoadError::BatchAbandoned),
        }
    }
}

fn read_slot<V: Clone, E>(outcome: &BatchOutcome<V, E>, position: usize) -> Result<V, LoadError<E>> {
    match outcome {
        Err(shared) => Err(LoadError::Fetch(Arc::clone(shared))),
        Ok(results) => match results.get(position) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(err)) => Err(LoadError::Key(Arc::clone(err))),
            None => Err(LoadError::MissingResult {
                position,
                returned: results.len(),
            }),
        },
    }
}
