//! Keystroke-driven book search with debouncing, coalescing and a TTL cache.
//!
//! [`SearchCache::search`] turns raw input into at most one remote lookup:
//!
//! 1. Input is trimmed and case-folded; anything shorter than the minimum
//!    length is answered immediately with [`SearchOutcome::NotSearched`].
//! 2. The call waits out the debounce window. A newer keystroke inside the
//!    window supersedes it and it returns [`SearchOutcome::Superseded`]
//!    without touching anything.
//! 3. A fresh cached result for the same normalized text is returned as-is.
//! 4. Otherwise any in-flight request for the same text is cancelled and a
//!    new one is issued. A cancelled request never updates state and is
//!    never reported as an error.
//! 5. Successful results (empty ones included) are cached with a capture
//!    time; other failures are returned to the caller.
//!
//! Expired results are treated as absent on read, and a background
//! [`Sweeper`] drops them periodically so memory tracks only recent queries.
//!
//! ```rust,no_run
//! use barn_core::config::SearchConfig;
//! use barn_core::search::SearchCache;
//! # use barn_core::store::SearchApi;
//! # use std::sync::Arc;
//! # async fn demo(api: Arc<dyn SearchApi>) -> barn_core::BarnResult<()> {
//! let cache = SearchCache::new(api, SearchConfig::default());
//! let _sweeper = cache.spawn_sweeper();
//!
//! let outcome = cache.search("dune").await?;
//! for book in outcome.results() {
//!     println!("{} by {}", book.title, book.authors.join(", "));
//! }
//! # Ok(())
//! # }
//! ```

pub mod debounce;
pub mod query;
pub mod sweeper;

pub use query::{QueryKey, SearchOutcome, SearchState};
pub use sweeper::Sweeper;

use crate::config::SearchConfig;
use crate::domain::BookSummary;
use crate::error::BarnResult;
use crate::store::SearchApi;
use debounce::Debouncer;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SearchCache {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn SearchApi>,
    config: SearchConfig,
    debouncer: Debouncer,
    state: Mutex<CacheState>,
    view: watch::Sender<SearchState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKey, CachedQueryResult>,
    in_flight: HashMap<QueryKey, InFlight>,
    next_request: u64,
}

struct CachedQueryResult {
    results: Arc<Vec<BookSummary>>,
    captured_at: Instant,
}

struct InFlight {
    request: u64,
    cancel: CancellationToken,
}

/// Holds a key's in-flight slot until the response is handled.
///
/// Dropping it early (the caller abandoned the search) frees the slot and
/// clears the loading flag the request raised.
struct InFlightGuard<'a> {
    inner: &'a Inner,
    key: QueryKey,
    request: u64,
    ticket: u64,
    cancel: CancellationToken,
    finished: bool,
}

impl InFlightGuard<'_> {
    /// Releases the slot; false if a newer request for the key owns it.
    fn finish(&mut self) -> bool {
        self.finished = true;
        self.inner.finish(&self.key, self.request)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.finished || !self.inner.finish(&self.key, self.request) {
            return;
        }
        debug!("search request #{} for '{}' abandoned", self.request, self.key);
        if self.inner.debouncer.is_current(self.ticket) {
            self.inner.view.send_modify(|state| state.loading = false);
        }
    }
}

enum ViewUpdate {
    Loading,
    Loaded(Arc<Vec<BookSummary>>),
    Failed(String),
}

impl SearchCache {
    pub fn new(api: Arc<dyn SearchApi>, config: SearchConfig) -> Self {
        let (view, _) = watch::channel(SearchState::default());
        SearchCache {
            inner: Arc::new(Inner {
                api,
                debouncer: Debouncer::new(config.debounce()),
                config,
                state: Mutex::new(CacheState::default()),
                view,
            }),
        }
    }

    /// Runs one keystroke through normalization, debounce, cache and coalescing.
    ///
    /// # Errors
    /// Returns the search service's error for a non-cancelled failed lookup.
    /// Superseded and cancelled calls resolve to [`SearchOutcome::Superseded`].
    pub async fn search(&self, raw_input: &str) -> BarnResult<SearchOutcome> {
        let inner = &self.inner;

        let Some(key) = QueryKey::normalize(raw_input, inner.config.min_query_len) else {
            inner.debouncer.interrupt();
            inner.publish(SearchState {
                query: raw_input.trim().to_owned(),
                ..SearchState::default()
            });
            return Ok(SearchOutcome::NotSearched);
        };

        let Some(ticket) = inner.debouncer.settle().await else {
            debug!("search '{key}' superseded during debounce");
            return Ok(SearchOutcome::Superseded);
        };

        if let Some(results) = inner.cached(&key) {
            debug!("search cache hit for '{key}'");
            inner.publish_if_current(ticket, &key, ViewUpdate::Loaded(results.clone()));
            return Ok(SearchOutcome::Results(results));
        }

        let mut flight = inner.begin(&key, ticket);
        inner.publish_if_current(ticket, &key, ViewUpdate::Loading);

        let response = tokio::select! {
            biased;
            _ = flight.cancel.cancelled() => None,
            res = inner.api.search(key.as_str()) => Some(res),
        };

        let request = flight.request;
        let Some(response) = response else {
            debug!("search request #{request} for '{key}' aborted");
            return Ok(SearchOutcome::Superseded);
        };

        // A newer request for this key owns the slot now; drop this answer.
        if !flight.finish() {
            debug!("ignoring stale response #{request} for '{key}'");
            return Ok(SearchOutcome::Superseded);
        }

        match response {
            Ok(results) => {
                let results = Arc::new(results);
                info!("search '{key}' returned {} results", results.len());
                inner.store(key.clone(), results.clone());
                inner.publish_if_current(ticket, &key, ViewUpdate::Loaded(results.clone()));
                Ok(SearchOutcome::Results(results))
            }
            Err(e) if e.is_cancelled() => Ok(SearchOutcome::Superseded),
            Err(e) => {
                warn!("search '{key}' failed: {e}");
                inner.publish_if_current(ticket, &key, ViewUpdate::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// The state the view should render; updated by the latest keystroke only.
    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.inner.view.subscribe()
    }

    /// Drops every expired result and returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Starts the periodic TTL sweep at the configured interval.
    ///
    /// The sweeper holds only a weak reference and stops on its own once
    /// every clone of the cache is gone.
    pub fn spawn_sweeper(&self) -> Sweeper {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Sweeper::spawn(self.inner.config.sweep_interval(), move || match weak.upgrade() {
            Some(inner) => {
                inner.sweep();
                true
            }
            None => false,
        })
    }

    /// Number of cached results, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &CachedQueryResult, now: Instant) -> bool {
        now.saturating_duration_since(entry.captured_at) >= self.config.ttl()
    }

    fn cached(&self, key: &QueryKey) -> Option<Arc<Vec<BookSummary>>> {
        let state = self.lock();
        let entry = state.entries.get(key)?;
        if self.is_expired(entry, Instant::now()) {
            return None;
        }
        Some(entry.results.clone())
    }

    /// Registers a new request for `key`, aborting the one it replaces.
    fn begin(&self, key: &QueryKey, ticket: u64) -> InFlightGuard<'_> {
        let mut state = self.lock();
        state.next_request += 1;
        let request = state.next_request;
        let cancel = CancellationToken::new();

        let replaced = state.in_flight.insert(
            key.clone(),
            InFlight {
                request,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = replaced {
            debug!("aborting request #{} for '{key}'", previous.request);
            previous.cancel.cancel();
        }

        InFlightGuard {
            inner: self,
            key: key.clone(),
            request,
            ticket,
            cancel,
            finished: false,
        }
    }

    /// Clears the in-flight slot if `request` still owns it.
    fn finish(&self, key: &QueryKey, request: u64) -> bool {
        let mut state = self.lock();
        match state.in_flight.get(key) {
            Some(current) if current.request == request => {
                state.in_flight.remove(key);
                true
            }
            _ => false,
        }
    }

    fn store(&self, key: QueryKey, results: Arc<Vec<BookSummary>>) {
        self.lock().entries.insert(
            key,
            CachedQueryResult {
                results,
                captured_at: Instant::now(),
            },
        );
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !self.is_expired(entry, now));
        let evicted = before - state.entries.len();
        if evicted > 0 {
            debug!("swept {evicted} expired search results");
        }
        evicted
    }

    fn publish(&self, state: SearchState) {
        self.view.send_replace(state);
    }

    /// Publishes `update`, but only for the most recent keystroke.
    fn publish_if_current(&self, ticket: u64, key: &QueryKey, update: ViewUpdate) {
        if !self.debouncer.is_current(ticket) {
            return;
        }
        let state = match update {
            ViewUpdate::Loaded(results) => SearchState {
                query: key.to_string(),
                loading: false,
                results,
                searched: true,
                error: None,
            },
            ViewUpdate::Loading => SearchState {
                query: key.to_string(),
                loading: true,
                results: Arc::default(),
                searched: true,
                error: None,
            },
            ViewUpdate::Failed(message) => SearchState {
                query: key.to_string(),
                loading: false,
                results: Arc::default(),
                searched: true,
                error: Some(message),
            },
        };
        self.publish(state);
    }
}
