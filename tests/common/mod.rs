#![allow(dead_code)]

use async_trait::async_trait;
use barn_core::domain::{BookMetadata, BookSummary, ShelfEntry, ShelfStatus};
use barn_core::store::memory::MemoryStore;
use barn_core::store::{SearchApi, ShelfStore};
use barn_core::{BarnError, BarnResult};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

pub const USER: &str = "alice";

/// A settled entry with a fixed id.
pub fn entry(id: &str, book_id: &str, status: ShelfStatus) -> ShelfEntry {
    ShelfEntry {
        id: id.to_owned(),
        ..ShelfEntry::provisional(USER, book_id, status, Utc::now())
    }
}

pub fn book(book_id: &str, title: &str) -> BookMetadata {
    BookMetadata {
        book_id: book_id.to_owned(),
        title: title.to_owned(),
        authors: vec!["Frank Herbert".to_owned()],
        thumbnail: format!("https://books.example/{book_id}.jpg"),
        page_count: 412,
        published_date: "1965".to_owned(),
        categories: vec!["Fiction".to_owned()],
        description: String::new(),
    }
}

/// A [`MemoryStore`] whose writes can be held open, counted and failed per book.
pub struct TestStore {
    pub memory: Arc<MemoryStore>,
    gate: watch::Sender<bool>,
    failing: Mutex<HashSet<(String, Option<ShelfStatus>)>>,
    upserts: AtomicUsize,
    deletes: AtomicUsize,
}

impl TestStore {
    pub fn new(memory: Arc<MemoryStore>) -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(TestStore {
            memory,
            gate,
            failing: Mutex::new(HashSet::new()),
            upserts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        })
    }

    /// Writes block until [`TestStore::open`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Upserts of `book_id` to `status` fail.
    pub fn fail_upsert(&self, book_id: &str, status: ShelfStatus) {
        self.failing.lock().unwrap().insert((book_id.to_owned(), Some(status)));
    }

    pub fn fail_delete(&self, book_id: &str) {
        self.failing.lock().unwrap().insert((book_id.to_owned(), None));
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.upserts() + self.deletes()
    }

    async fn pass_gate(&self, book_id: &str, status: Option<ShelfStatus>) -> BarnResult<()> {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        if self.failing.lock().unwrap().contains(&(book_id.to_owned(), status)) {
            return Err(BarnError::RemoteUnavailable(format!("write for {book_id} rejected")));
        }
        Ok(())
    }
}

#[async_trait]
impl ShelfStore for TestStore {
    async fn upsert_membership(
        &self,
        user_id: &str,
        book_id: &str,
        status: ShelfStatus,
    ) -> BarnResult<String> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.pass_gate(book_id, Some(status)).await?;
        self.memory.upsert_membership(user_id, book_id, status).await
    }

    async fn delete_membership(&self, user_id: &str, book_id: &str) -> BarnResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.pass_gate(book_id, None).await?;
        self.memory.delete_membership(user_id, book_id).await
    }

    async fn list_memberships(
        &self,
        user_id: &str,
        status: Option<ShelfStatus>,
    ) -> BarnResult<Vec<ShelfEntry>> {
        self.memory.list_memberships(user_id, status).await
    }

    async fn find_membership(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> BarnResult<Option<ShelfEntry>> {
        self.memory.find_membership(user_id, book_id).await
    }
}

/// A scripted search service that records every call.
#[derive(Default)]
pub struct FakeSearch {
    books: Mutex<Vec<BookMetadata>>,
    searches: Mutex<Vec<String>>,
    lookups: Mutex<HashMap<String, usize>>,
    latency: Mutex<Duration>,
    failure: Mutex<Option<BarnError>>,
}

impl FakeSearch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_books(books: impl IntoIterator<Item = BookMetadata>) -> Arc<Self> {
        let fake = Self::default();
        fake.books.lock().unwrap().extend(books);
        Arc::new(fake)
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn fail_with(&self, error: Option<BarnError>) {
        *self.failure.lock().unwrap() = error;
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    pub fn lookups(&self, book_id: &str) -> usize {
        self.lookups.lock().unwrap().get(book_id).copied().unwrap_or(0)
    }

    async fn respond(&self) -> BarnResult<()> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SearchApi for FakeSearch {
    async fn search(&self, text: &str) -> BarnResult<Vec<BookSummary>> {
        self.searches.lock().unwrap().push(text.to_owned());
        self.respond().await?;
        let books = self.books.lock().unwrap();
        Ok(books
            .iter()
            .filter(|b| b.title.to_lowercase().contains(text))
            .map(BookSummary::from)
            .collect())
    }

    async fn lookup(&self, book_id: &str) -> BarnResult<Option<BookMetadata>> {
        *self.lookups.lock().unwrap().entry(book_id.to_owned()).or_insert(0) += 1;
        self.respond().await?;
        let books = self.books.lock().unwrap();
        Ok(books.iter().find(|b| b.book_id == book_id).cloned())
    }
}
