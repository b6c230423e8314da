//! # Request Scope
//!
//! The middleware that attaches fresh loaders to every request, and the
//! accessors resolvers use to reach them. The registry lives in a Tokio
//! task-local for the duration of [`LoaderMiddleware::scope`]; task-locals do
//! not follow `tokio::spawn`, so resolvers that spawn work should pass the
//! `Arc<LoaderRegistry>` from [`current_registry`] along explicitly.

use super::metrics::LoaderMetrics;
use super::{Entity, EntityLoader, LoaderRegistry};
use crate::config::{LoaderConfig, LoaderSettings};
use crate::error::RegistryError;
use crate::loader::Loader;
use crate::logging::log_request_scope;
use std::any::TypeId;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

tokio::task_local! {
    static REQUEST_LOADERS: Arc<LoaderRegistry>;
}

/// Builds one entity's loader into a fresh registry
trait Attachment: Send + Sync {
    fn entity_type(&self) -> TypeId;
    fn entity(&self) -> &'static str;
    fn attach(&self, registry: &mut LoaderRegistry);
}

struct SharedFetcher<T: Entity> {
    fetcher: Arc<T::Fetcher>,
    config: LoaderConfig,
}

impl<T: Entity> Attachment for SharedFetcher<T> {
    fn entity_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn entity(&self) -> &'static str {
        T::NAME
    }

    fn attach(&self, registry: &mut LoaderRegistry) {
        registry.insert::<T>(Loader::with_shared(
            T::NAME,
            Arc::clone(&self.fetcher),
            self.config.clone(),
        ));
    }
}

struct FetcherFactory<T, M> {
    make: M,
    config: LoaderConfig,
    _entity: PhantomData<fn() -> T>,
}

impl<T, M> Attachment for FetcherFactory<T, M>
where
    T: Entity,
    M: Fn(Uuid) -> T::Fetcher + Send + Sync + 'static,
{
    fn entity_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn entity(&self) -> &'static str {
        T::NAME
    }

    fn attach(&self, registry: &mut LoaderRegistry) {
        let fetcher = (self.make)(registry.request_id());
        registry.insert::<T>(Loader::new(T::NAME, fetcher, self.config.clone()));
    }
}

/// Attaches a fresh loader per entity to every request it scopes.
///
/// Built once at startup and cloned cheaply into request handlers.
#[derive(Clone, Default)]
pub struct LoaderMiddleware {
    attachments: Vec<Arc<dyn Attachment>>,
    metrics: Arc<LoaderMetrics>,
}

impl LoaderMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a loader for `T` backed by `fetcher`, shared across requests
    pub fn attach<T: Entity>(self, fetcher: T::Fetcher, config: LoaderConfig) -> Self {
        self.attach_shared::<T>(Arc::new(fetcher), config)
    }

    pub fn attach_shared<T: Entity>(self, fetcher: Arc<T::Fetcher>, config: LoaderConfig) -> Self {
        self.push(Arc::new(SharedFetcher::<T> { fetcher, config }))
    }

    /// Attach using the entity's settings, falling back to the default
    pub fn attach_configured<T: Entity>(self, fetcher: T::Fetcher, settings: &LoaderSettings) -> Self {
        let config = settings.for_entity(T::NAME);
        self.attach::<T>(fetcher, config)
    }

    /// Attach a loader whose fetcher is built per request from the request id
    pub fn attach_with<T, M>(self, config: LoaderConfig, make: M) -> Self
    where
        T: Entity,
        M: Fn(Uuid) -> T::Fetcher + Send + Sync + 'static,
    {
        self.push(Arc::new(FetcherFactory::<T, M> {
            make,
            config,
            _entity: PhantomData,
        }))
    }

    fn push(mut self, attachment: Arc<dyn Attachment>) -> Self {
        let entity = attachment.entity();
        let entity_type = attachment.entity_type();
        if let Some(existing) = self
            .attachments
            .iter_mut()
            .find(|existing| existing.entity_type() == entity_type)
        {
            warn!(entity, "Loader attached twice; replacing the earlier attachment");
            *existing = attachment;
        } else {
            debug!(entity, "Attached loader");
            self.attachments.push(attachment);
        }
        self
    }

    /// Names of attached entities, in attachment order
    pub fn entities(&self) -> Vec<&'static str> {
        self.attachments.iter().map(|a| a.entity()).collect()
    }

    /// Process-wide totals folded in at the end of every scope
    pub fn metrics(&self) -> Arc<LoaderMetrics> {
        Arc::clone(&self.metrics)
    }

    /// A registry holding a fresh loader for every attached entity
    pub fn build_registry(&self) -> LoaderRegistry {
        let mut registry = LoaderRegistry::new();
        for attachment in &self.attachments {
            attachment.attach(&mut registry);
        }
        registry
    }

    /// Run one request with its own loaders in scope.
    ///
    /// Loaders created here are dropped with the registry once `request`
    /// completes and any batches still in flight have finished.
    pub async fn scope<Fut>(&self, request: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        let registry = Arc::new(self.build_registry());
        let span = tracing::debug_span!("request", request_id = %registry.request_id());

        let output = REQUEST_LOADERS
            .scope(Arc::clone(&registry), request)
            .instrument(span)
            .await;

        self.metrics.record_request(&registry);
        let totals = registry
            .stats()
            .into_iter()
            .fold((0, 0), |(batches, keys), (_, stats)| {
                (batches + stats.batches_dispatched, keys + stats.keys_fetched)
            });
        log_request_scope(
            &registry.request_id().to_string(),
            registry.len(),
            totals.0,
            totals.1,
        );

        output
    }
}

impl fmt::Debug for LoaderMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderMiddleware")
            .field("entities", &self.entities())
            .finish_non_exhaustive()
    }
}

/// The registry of the request currently in scope
pub fn current_registry() -> Result<Arc<LoaderRegistry>, RegistryError> {
    REQUEST_LOADERS
        .try_with(Arc::clone)
        .map_err(|_| RegistryError::NoRequestScope)
}

/// The loader for `T` in the current request
pub fn loader_for<T: Entity>() -> Result<EntityLoader<T>, RegistryError> {
    current_registry()?.get::<T>()
}

/// The loader for `T` in the current request.
///
/// # Panics
///
/// Panics outside [`LoaderMiddleware::scope`] or when `T` was not attached.
pub fn require_loader<T: Entity>() -> EntityLoader<T> {
    match loader_for::<T>() {
        Ok(loader) => loader,
        Err(err) => panic!("{err}"),
    }
}
