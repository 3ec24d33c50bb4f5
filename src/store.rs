//! Seams to the remote collaborators the sync layer depends on.
//!
//! The reconciler, metadata cache and search cache only ever see these
//! traits. Three implementations ship with the crate:
//!
//! - [`memory::MemoryStore`]: in-process shelves and books, with an outage switch
//! - [`sqlite::SqliteStore`]: durable shelves and books over SQLite
//! - [`google::GoogleBooks`]: the Google Books volumes API as a [`SearchApi`]

pub mod google;
pub mod memory;
pub mod sqlite;

use crate::domain::{BookMetadata, BookSummary, ShelfEntry, ShelfStatus};
use crate::error::BarnResult;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Per-(user, book) membership records.
#[async_trait]
pub trait ShelfStore: Send + Sync {
    /// Creates or updates the membership for `(user_id, book_id)` and returns its id.
    ///
    /// An existing record keeps its id and `date_added`; only the status (and
    /// first-transition dates) change.
    async fn upsert_membership(
        &self,
        user_id: &str,
        book_id: &str,
        status: ShelfStatus,
    ) -> BarnResult<String>;

    /// Deletes the membership for `(user_id, book_id)`. Missing records are not an error.
    async fn delete_membership(&self, user_id: &str, book_id: &str) -> BarnResult<()>;

    /// Lists a user's memberships, optionally restricted to one status.
    async fn list_memberships(
        &self,
        user_id: &str,
        status: Option<ShelfStatus>,
    ) -> BarnResult<Vec<ShelfEntry>>;

    async fn find_membership(&self, user_id: &str, book_id: &str)
    -> BarnResult<Option<ShelfEntry>>;
}

/// Persisted book metadata, keyed by book id.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Returns `BarnError::NotFound` when the book was never stored.
    async fn get(&self, book_id: &str) -> BarnResult<BookMetadata>;

    /// Idempotent upsert.
    async fn put(&self, book: &BookMetadata) -> BarnResult<()>;
}

/// The external book search service.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, text: &str) -> BarnResult<Vec<BookSummary>>;

    /// Full details for one book, `None` if the service does not know it.
    async fn lookup(&self, book_id: &str) -> BarnResult<Option<BookMetadata>>;
}

/// An externally originated change to a shelf membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShelfChange {
    Upserted(ShelfEntry),
    Removed { user_id: String, book_id: String },
}

impl ShelfChange {
    pub fn user_id(&self) -> &str {
        match self {
            ShelfChange::Upserted(entry) => &entry.user_id,
            ShelfChange::Removed { user_id, .. } => user_id,
        }
    }
}

/// Notifies subscribers of committed shelf changes.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<ShelfChange>;
}
