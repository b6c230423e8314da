//! # Request Loader Registry
//!
//! Gives every inbound request its own set of fresh loaders, one per entity
//! type, reachable by resolvers without threading each loader by hand.
//!
//! ## Architecture
//!
//! ```text
//! LoaderMiddleware          (process lifetime: fetchers + batching config)
//! └── scope(request)        (builds a fresh LoaderRegistry per request)
//!     └── LoaderRegistry    (request lifetime: one Loader per Entity)
//!         ├── Loader<BundleFetcher>
//!         └── Loader<DocumentFetcher>
//! ```
//!
//! Entities are zero-sized marker types implementing [`Entity`]; the registry
//! is keyed by the marker's `TypeId`, so lookups are typed and a missing
//! attachment is reported as [`RegistryError::NotAttached`] rather than a
//! failed cast.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use dataloader_core::config::LoaderConfig;
//! use dataloader_core::loader::{BatchFetcher, FetchResult};
//! use dataloader_core::loader_entity;
//! use dataloader_core::registry::{loader_for, LoaderMiddleware};
//!
//! # #[derive(Debug)] struct StoreError;
//! # impl std::fmt::Display for StoreError {
//! #     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("store") }
//! # }
//! # impl std::error::Error for StoreError {}
//! struct NameFetcher;
//!
//! #[async_trait]
//! impl BatchFetcher for NameFetcher {
//!     type Key = u64;
//!     type Value = String;
//!     type Error = StoreError;
//!
//!     async fn fetch(&self, ids: &[u64]) -> FetchResult<String, StoreError> {
//!         Ok(ids.iter().map(|id| Ok(format!("name-{id}"))).collect())
//!     }
//! }
//!
//! loader_entity!(Name => NameFetcher, "name");
//!
//! # async fn example() {
//! let middleware = LoaderMiddleware::new().attach::<Name>(NameFetcher, LoaderConfig::default());
//!
//! let name = middleware
//!     .scope(async { loader_for::<Name>().expect("attached").load(7).await })
//!     .await;
//! assert_eq!(name.unwrap(), "name-7");
//! # }
//! ```

pub mod metrics;
pub mod scope;

pub use metrics::{EntityMetrics, LoaderMetrics};
pub use scope::{current_registry, loader_for, require_loader, LoaderMiddleware};

use crate::error::RegistryError;
use crate::loader::{BatchFetcher, Loader, LoaderStats};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use uuid::Uuid;

/// Marker for an entity type that gets its own loader per request
pub trait Entity: Send + Sync + 'static {
    /// Stable name used in logs, metrics and configuration overrides
    const NAME: &'static str;

    type Fetcher: BatchFetcher;
}

/// The loader type for an entity marker
pub type EntityLoader<T> = Loader<<T as Entity>::Fetcher>;

/// Type-erased view of a registered loader
trait RegisteredLoader: Send + Sync {
    fn entity(&self) -> &'static str;
    fn stats(&self) -> LoaderStats;
    fn as_any(&self) -> &dyn Any;
}

struct Registered<T: Entity> {
    loader: EntityLoader<T>,
}

impl<T: Entity> RegisteredLoader for Registered<T> {
    fn entity(&self) -> &'static str {
        T::NAME
    }

    fn stats(&self) -> LoaderStats {
        self.loader.stats()
    }

    fn as_any(&self) -> &dyn Any {
        &self.loader
    }
}

/// Loaders for one request, at most one per entity type
pub struct LoaderRegistry {
    request_id: Uuid,
    loaders: HashMap<TypeId, Box<dyn RegisteredLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::with_request_id(Uuid::new_v4())
    }

    pub fn with_request_id(request_id: Uuid) -> Self {
        Self {
            request_id,
            loaders: HashMap::new(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Register the loader for `T`, returning any loader it replaced
    pub fn insert<T: Entity>(&mut self, loader: EntityLoader<T>) -> Option<EntityLoader<T>> {
        let previous = self
            .loaders
            .insert(TypeId::of::<T>(), Box::new(Registered::<T> { loader }));

        previous.and_then(|entry| entry.as_any().downcast_ref::<EntityLoader<T>>().cloned())
    }

    /// The loader attached for `T`
    pub fn get<T: Entity>(&self) -> Result<EntityLoader<T>, RegistryError> {
        self.loaders
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.as_any().downcast_ref::<EntityLoader<T>>())
            .cloned()
            .ok_or(RegistryError::NotAttached { entity: T::NAME })
    }

    /// The loader attached for `T`.
    ///
    /// # Panics
    ///
    /// Panics when `T` was not attached. This is a wiring bug in the request
    /// pipeline, not a condition resolvers are expected to recover from.
    pub fn require<T: Entity>(&self) -> EntityLoader<T> {
        match self.get::<T>() {
            Ok(loader) => loader,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn contains<T: Entity>(&self) -> bool {
        self.loaders.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Stats for every registered loader, keyed by entity name
    pub fn stats(&self) -> Vec<(&'static str, LoaderStats)> {
        let mut stats: Vec<_> = self
            .loaders
            .values()
            .map(|entry| (entry.entity(), entry.stats()))
            .collect();
        stats.sort_by_key(|(entity, _)| *entity);
        stats
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entities: Vec<_> = self.loaders.values().map(|entry| entry.entity()).collect();
        entities.sort_unstable();
        f.debug_struct("LoaderRegistry")
            .field("request_id", &self.request_id)
            .field("entities", &entities)
            .finish()
    }
}
