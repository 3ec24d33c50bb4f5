//! Process-scoped cache of book metadata shared by every view.
//!
//! Entries are written at most once per book and never evicted. A miss kicks
//! off a single read-through fetch (book store first, then the search
//! service's detail lookup, persisting what it finds back to the book store);
//! every caller asking for the same book while that fetch is outstanding
//! waits on the same future.
//!
//! There is no global instance: construct one at start-up and
//! hand clones to whoever needs it.

use crate::domain::BookMetadata;
use crate::error::{BarnError, BarnResult};
use crate::store::{BookStore, SearchApi};
use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const RESOLVED_CAPACITY: usize = 256;

type FetchOutcome = BarnResult<Option<Arc<BookMetadata>>>;
type FetchFuture = Shared<BoxFuture<'static, FetchOutcome>>;

/// Result of a synchronous [`MetadataCache::get`].
pub enum Lookup {
    Ready(Arc<BookMetadata>),
    Loading(PendingMetadata),
}

impl Lookup {
    pub fn ready(&self) -> Option<&Arc<BookMetadata>> {
        match self {
            Lookup::Ready(meta) => Some(meta),
            Lookup::Loading(_) => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Lookup::Loading(_))
    }
}

/// A fetch in flight, shared with every other caller waiting on the same book.
pub struct PendingMetadata {
    book_id: String,
    fetch: FetchFuture,
}

impl PendingMetadata {
    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    /// Waits for the fetch; `None` means no collaborator knows the book.
    pub async fn resolve(self) -> FetchOutcome {
        self.fetch.await
    }
}

#[derive(Clone)]
pub struct MetadataCache {
    inner: Arc<Inner>,
}

struct Inner {
    books: Arc<dyn BookStore>,
    search: Arc<dyn SearchApi>,
    state: Mutex<CacheState>,
    resolved: broadcast::Sender<String>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Arc<BookMetadata>>,
    pending: HashMap<String, FetchFuture>,
}

impl MetadataCache {
    pub fn new(books: Arc<dyn BookStore>, search: Arc<dyn SearchApi>) -> Self {
        let (resolved, _) = broadcast::channel(RESOLVED_CAPACITY);
        MetadataCache {
            inner: Arc::new(Inner {
                books,
                search,
                state: Mutex::new(CacheState::default()),
                resolved,
            }),
        }
    }

    /// Cached metadata for `book_id`, without triggering a fetch.
    pub fn peek(&self, book_id: &str) -> Option<Arc<BookMetadata>> {
        self.inner.lock().entries.get(book_id).cloned()
    }

    /// Returns cached metadata immediately, or starts (or joins) a fetch.
    ///
    /// When called inside a Tokio runtime the fetch is driven in the
    /// background, so it completes even if the returned handle is dropped;
    /// resolution is announced on [`MetadataCache::subscribe`].
    pub fn get(&self, book_id: &str) -> Lookup {
        let (fetch, started) = {
            let mut state = self.inner.lock();
            if let Some(meta) = state.entries.get(book_id) {
                return Lookup::Ready(meta.clone());
            }
            self.pending_fetch(&mut state, book_id)
        };

        if started {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(fetch.clone().map(|_| ()));
            }
        }

        Lookup::Loading(PendingMetadata {
            book_id: book_id.to_owned(),
            fetch,
        })
    }

    /// Cached or fetched metadata; concurrent calls for one book share a fetch.
    ///
    /// # Errors
    /// Propagates store and search failures other than "not found", which
    /// resolves to `Ok(None)`.
    pub async fn fetch(&self, book_id: &str) -> FetchOutcome {
        let fetch = {
            let mut state = self.inner.lock();
            if let Some(meta) = state.entries.get(book_id) {
                return Ok(Some(meta.clone()));
            }
            self.pending_fetch(&mut state, book_id).0
        };
        fetch.await
    }

    /// Fetches several books, one underlying fetch per distinct id.
    ///
    /// The result has one slot per input id, in input order.
    pub async fn get_batch(&self, book_ids: &[&str]) -> BarnResult<Vec<Option<Arc<BookMetadata>>>> {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = book_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let outcomes = join_all(unique.iter().map(|id| self.fetch(id))).await;

        let mut resolved = HashMap::with_capacity(unique.len());
        for (id, outcome) in unique.into_iter().zip(outcomes) {
            resolved.insert(id, outcome?);
        }

        Ok(book_ids
            .iter()
            .map(|id| resolved.get(id).cloned().flatten())
            .collect())
    }

    /// Idempotent upsert of metadata the caller already holds.
    pub fn insert(&self, meta: BookMetadata) -> Arc<BookMetadata> {
        let meta = Arc::new(meta);
        self.inner
            .lock()
            .entries
            .insert(meta.book_id.clone(), meta.clone());
        meta
    }

    /// Book ids whose fetch just completed successfully.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inner.resolved.subscribe()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Joins the outstanding fetch for `book_id` or registers a new one.
    ///
    /// The flag is true when this call created the fetch.
    fn pending_fetch(&self, state: &mut CacheState, book_id: &str) -> (FetchFuture, bool) {
        if let Some(fetch) = state.pending.get(book_id) {
            debug!("joining in-flight metadata fetch for {book_id}");
            return (fetch.clone(), false);
        }

        debug!("metadata cache miss for {book_id}");
        let inner = self.inner.clone();
        let id = book_id.to_owned();
        let fetch = async move {
            let outcome = inner.load(&id).await.map(|found| found.map(Arc::new));
            inner.settle(&id, &outcome);
            outcome
        }
        .boxed()
        .shared();

        state.pending.insert(book_id.to_owned(), fetch.clone());
        (fetch, true)
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn load(&self, book_id: &str) -> BarnResult<Option<BookMetadata>> {
        match self.books.get(book_id).await {
            Ok(meta) => return Ok(Some(meta)),
            Err(BarnError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        match self.search.lookup(book_id).await {
            Ok(Some(meta)) => {
                if let Err(e) = self.books.put(&meta).await {
                    warn!("failed to persist metadata for {book_id}: {e}");
                }
                Ok(Some(meta))
            }
            Ok(None) | Err(BarnError::NotFound(_)) => {
                debug!("no metadata anywhere for {book_id}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn settle(&self, book_id: &str, outcome: &FetchOutcome) {
        {
            let mut state = self.lock();
            state.pending.remove(book_id);
            if let Ok(Some(meta)) = outcome {
                state.entries.insert(book_id.to_owned(), meta.clone());
            }
        }

        match outcome {
            Ok(Some(_)) => {
                let _ = self.resolved.send(book_id.to_owned());
            }
            Ok(None) => {}
            Err(e) => warn!("metadata fetch for {book_id} failed: {e}"),
        }
    }
}
