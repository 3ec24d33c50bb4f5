use crate::domain::{BookMetadata, ShelfEntry, ShelfStatus};
use crate::error::{BarnError, BarnResult};
use crate::store::{BookStore, ChangeFeed, ShelfChange, ShelfStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

const CHANGE_CAPACITY: usize = 256;

/// Shelves and books held in process memory.
///
/// Every committed shelf write is broadcast to [`ChangeFeed`] subscribers.
/// [`MemoryStore::set_available`] simulates an outage: while unavailable,
/// every call fails with [`BarnError::RemoteUnavailable`].
pub struct MemoryStore {
    shelves: RwLock<Vec<ShelfEntry>>,
    books: RwLock<HashMap<String, BookMetadata>>,
    available: AtomicBool,
    changes: broadcast::Sender<ShelfChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        MemoryStore {
            shelves: RwLock::new(Vec::new()),
            books: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            changes,
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Inserts a fully formed entry as-is, without broadcasting.
    ///
    /// Replaces any existing entry for the same (user, book) pair.
    pub fn seed(&self, entry: ShelfEntry) {
        let mut shelves = self.shelves.write().unwrap_or_else(PoisonError::into_inner);
        shelves.retain(|e| !(e.user_id == entry.user_id && e.book_id == entry.book_id));
        shelves.push(entry);
    }

    pub fn seed_book(&self, book: BookMetadata) {
        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        books.insert(book.book_id.clone(), book);
    }

    fn ensure_available(&self) -> BarnResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BarnError::RemoteUnavailable("memory store is offline".into()))
        }
    }

    fn publish(&self, change: ShelfChange) {
        // No receivers is fine.
        let _ = self.changes.send(change);
    }
}

#[async_trait]
impl ShelfStore for MemoryStore {
    async fn upsert_membership(
        &self,
        user_id: &str,
        book_id: &str,
        status: ShelfStatus,
    ) -> BarnResult<String> {
        self.ensure_available()?;
        let now = Utc::now();

        let entry = {
            let mut shelves = self.shelves.write().unwrap_or_else(PoisonError::into_inner);
            match shelves
                .iter_mut()
                .find(|e| e.user_id == user_id && e.book_id == book_id)
            {
                Some(existing) => {
                    *existing = existing.with_status(status, now);
                    existing.clone()
                }
                None => {
                    let mut entry = ShelfEntry::provisional(user_id, book_id, status, now);
                    entry.id = Uuid::new_v4().to_string();
                    shelves.push(entry.clone());
                    entry
                }
            }
        };

        debug!("memory store: {user_id}/{book_id} -> {status}");
        let id = entry.id.clone();
        self.publish(ShelfChange::Upserted(entry));
        Ok(id)
    }

    async fn delete_membership(&self, user_id: &str, book_id: &str) -> BarnResult<()> {
        self.ensure_available()?;
        let removed = {
            let mut shelves = self.shelves.write().unwrap_or_else(PoisonError::into_inner);
            let before = shelves.len();
            shelves.retain(|e| !(e.user_id == user_id && e.book_id == book_id));
            before != shelves.len()
        };

        if removed {
            self.publish(ShelfChange::Removed {
                user_id: user_id.to_owned(),
                book_id: book_id.to_owned(),
            });
        }
        Ok(())
    }

    async fn list_memberships(
        &self,
        user_id: &str,
        status: Option<ShelfStatus>,
    ) -> BarnResult<Vec<ShelfEntry>> {
        self.ensure_available()?;
        let shelves = self.shelves.read().unwrap_or_else(PoisonError::into_inner);
        Ok(shelves
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter(|e| status.is_none_or(|s| e.status == s))
            .cloned()
            .collect())
    }

    async fn find_membership(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> BarnResult<Option<ShelfEntry>> {
        self.ensure_available()?;
        let shelves = self.shelves.read().unwrap_or_else(PoisonError::into_inner);
        Ok(shelves
            .iter()
            .find(|e| e.user_id == user_id && e.book_id == book_id)
            .cloned())
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn get(&self, book_id: &str) -> BarnResult<BookMetadata> {
        self.ensure_available()?;
        let books = self.books.read().unwrap_or_else(PoisonError::into_inner);
        books
            .get(book_id)
            .cloned()
            .ok_or_else(|| BarnError::NotFound(format!("book {book_id}")))
    }

    async fn put(&self, book: &BookMetadata) -> BarnResult<()> {
        self.ensure_available()?;
        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        books.insert(book.book_id.clone(), book.clone());
        Ok(())
    }
}

impl ChangeFeed for MemoryStore {
    fn subscribe(&self) -> broadcast::Receiver<ShelfChange> {
        self.changes.subscribe()
    }
}
