//! # Error Types
//!
//! Errors surfaced by loaders, the request registry and configuration loading.
//! Loader errors wrap the fetcher's own error type in an `Arc` because a single
//! failure is shared by every caller waiting on the same batch.

use std::sync::Arc;

/// Error returned when resolving a key through a [`Loader`](crate::loader::Loader).
///
/// None of these outcomes are cached: a later load of the same key issues a
/// fresh fetch.
#[derive(Debug, thiserror::Error)]
pub enum LoadError<E> {
    /// The fetcher failed the whole batch; every key in it sees this error
    #[error("batch fetch failed: {0}")]
    Fetch(Arc<E>),

    /// The fetcher reported a failure for this specific key
    #[error("fetch failed for key: {0}")]
    Key(Arc<E>),

    /// The fetcher returned fewer results than keys it was given
    #[error("fetch returned {returned} results, no result at position {position}")]
    MissingResult { position: usize, returned: usize },

    /// The batch task went away without publishing a result, e.g. the
    /// fetcher panicked. Requires `panic = "unwind"`; under `abort` the
    /// process ends instead.
    #[error("batch was abandoned before completing")]
    BatchAbandoned,
}

impl<E> LoadError<E> {
    /// True when the failure was shared by the whole batch
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, LoadError::Fetch(_))
    }

    /// The fetcher's error, if this failure came from one
    pub fn source_error(&self) -> Option<&E> {
        match self {
            LoadError::Fetch(err) | LoadError::Key(err) => Some(err.as_ref()),
            LoadError::MissingResult { .. } | LoadError::BatchAbandoned => None,
        }
    }
}

impl<E> Clone for LoadError<E> {
    fn clone(&self) -> Self {
        match self {
            LoadError::Fetch(err) => LoadError::Fetch(Arc::clone(err)),
            LoadError::Key(err) => LoadError::Key(Arc::clone(err)),
            LoadError::MissingResult { position, returned } => LoadError::MissingResult {
                position: *position,
                returned: *returned,
            },
            LoadError::BatchAbandoned => LoadError::BatchAbandoned,
        }
    }
}

/// Misuse of the request registry: asking for a loader that was never wired up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Called outside a future run through `LoaderMiddleware::scope`
    #[error("no loader registry in scope; the request did not pass through the loader middleware")]
    NoRequestScope,

    /// The middleware ran but this entity was never attached
    #[error("no loader attached for entity '{entity}'")]
    NotAttached { entity: &'static str },
}

/// Errors raised while building or validating loader settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid loader configuration: {0}")]
    Invalid(String),

    #[error("failed to read loader configuration: {0}")]
    Source(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("store unavailable")]
    struct StoreError;

    #[test]
    fn test_load_error_display() {
        let shared: LoadError<StoreError> = LoadError::Fetch(Arc::new(StoreError));
        assert_eq!(shared.to_string(), "batch fetch failed: store unavailable");
        assert!(shared.is_fetch_failure());

        let missing: LoadError<StoreError> = LoadError::MissingResult {
            position: 2,
            returned: 1,
        };
        assert!(missing.source_error().is_none());
        assert!(missing.to_string().contains("position 2"));
    }

    #[test]
    fn test_clone_shares_source() {
        let original: LoadError<StoreError> = LoadError::Key(Arc::new(StoreError));
        let cloned = original.clone();
        match (&original, &cloned) {
            (LoadError::Key(a), LoadError::Key(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("clone changed the variant"),
        }
    }

    #[test]
    fn test_registry_error_names_entity() {
        let err = RegistryError::NotAttached { entity: "bundle" };
        assert_eq!(err.to_string(), "no loader attached for entity 'bundle'");
    }
}
