//! # Entity Keys
//!
//! Key shapes the API layer loads by. Keys are compared by value: two loads
//! share a batch slot only when every field is equal, so a page request for
//! the same parent with a different cursor is a distinct key.
//!
//! | Key | Used for |
//! |-----|----------|
//! | [`PageParams`] | paginated children of a parent (bundles, API and event definitions, documents, runtime contexts, formation assignments and constraints, integration dependencies) |
//! | [`FetchRequestParams`] | fetch requests by owning API definition id |
//! | [`FormationStatusParams`] | formation status by formation and its reported state |
//!
//! Declare one entity per loader with [`loader_entity!`](crate::loader_entity):
//!
//! ```rust,ignore
//! loader_entity!(pub BundleEntity => BundleFetcher, "bundle");
//! loader_entity!(pub DocumentEntity => DocumentFetcher, "document");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque pagination cursor handed back to clients
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(cursor: impl Into<String>) -> Self {
        Self(cursor.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Page of children owned by the object with `id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageParams {
    pub id: String,
    pub first: Option<u32>,
    pub after: Option<PageCursor>,
}

impl PageParams {
    pub fn new(id: impl Into<String>, first: Option<u32>, after: Option<PageCursor>) -> Self {
        Self {
            id: id.into(),
            first,
            after,
        }
    }

    /// Page size, which every paginated fetch requires
    pub fn validate_first(&self) -> Result<u32, MissingPageSize> {
        self.first.ok_or(MissingPageSize)
    }

    /// The cursor as the store expects it, empty for the first page
    pub fn cursor(&self) -> &str {
        self.after.as_ref().map_or("", PageCursor::as_str)
    }
}

/// A paginated load arrived without a page size
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("missing required parameter 'first'")]
pub struct MissingPageSize;

/// Fetch request belonging to the API definition with `id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchRequestParams {
    pub id: String,
}

impl FetchRequestParams {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Status of the formation with `id`, given its last reported state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormationStatusParams {
    pub id: String,
    pub state: String,
    pub message: Option<String>,
    pub error_code: Option<i32>,
}

/// Collect the parent ids of a batch of page keys, in batch order.
///
/// Paginated fetchers query by parent id with the page size and cursor of
/// the batch; keys in one batch normally share those.
pub fn parent_ids(keys: &[PageParams]) -> Vec<&str> {
    keys.iter().map(|key| key.id.as_str()).collect()
}

/// Declare an [`Entity`](crate::registry::Entity) marker in one line.
///
/// ```rust,ignore
/// loader_entity!(pub BundleEntity => BundleFetcher, "bundle");
/// ```
#[macro_export]
macro_rules! loader_entity {
    ($(#[$meta:meta])* $vis:vis $name:ident => $fetcher:ty, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;

        impl $crate::registry::Entity for $name {
            const NAME: &'static str = $label;
            type Fetcher = $fetcher;
        }
    };
}
