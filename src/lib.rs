#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Dataloader Core
//!
//! Request-scoped, batching key-value loaders for API resolvers.
//!
//! ## Overview
//!
//! Resolving one composite response usually issues many single-object
//! lookups. A [`Loader`] collects the keys requested during a short
//! coalescing window, hands them to a bulk [`BatchFetcher`] in one call, and
//! memoizes successful results for the rest of the request. Equal keys in the
//! same window share a single slot.
//!
//! ## Module Organization
//!
//! - [`loader`] - The generic loader, its batches and the fetch boundary
//! - [`registry`] - Per-request loader registry, middleware and accessors
//! - [`entities`] - Key shapes used by the API layer
//! - [`config`] - Batching configuration and settings loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dataloader_core::config::LoaderSettings;
//! use dataloader_core::registry::LoaderMiddleware;
//!
//! # async fn example() {
//! dataloader_core::logging::init_structured_logging();
//!
//! let settings = LoaderSettings::from_environment();
//! settings.log_configuration();
//!
//! // Attach one loader per entity at startup, then run each request in a scope
//! let middleware = LoaderMiddleware::new();
//! middleware.scope(async { /* resolvers call loader_for::<Entity>() */ }).await;
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - Within one batch, keys reach the fetcher in insertion order and results
//!   map back positionally
//! - Failures are never cached; a later load retries
//! - Nothing is shared between requests except counters in
//!   [`registry::LoaderMetrics`]
//!
//! Loads cannot be cancelled or timed out independently of their fetch.

pub mod config;
pub mod entities;
pub mod error;
pub mod loader;
pub mod logging;
pub mod registry;

pub use config::{LoaderConfig, LoaderSettings, SettingsManager};
pub use entities::{FetchRequestParams, FormationStatusParams, PageCursor, PageParams};
pub use error::{ConfigurationError, LoadError, RegistryError};
pub use loader::{fetch_fn, BatchFetcher, FetchResult, Loader, LoaderStats, Thunk};
pub use registry::{
    current_registry, loader_for, require_loader, Entity, EntityLoader, LoaderMiddleware,
    LoaderRegistry,
};
