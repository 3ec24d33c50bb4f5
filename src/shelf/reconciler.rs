use crate::domain::{ShelfEntry, ShelfStatus};
use crate::error::{BarnError, BarnResult};
use crate::shelf::board::{ShelfBoard, not_shelved};
use crate::store::{ShelfChange, ShelfStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What the surrounding UI renders for the viewed user's shelves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShelfView {
    pub owner: Option<String>,
    pub shelves: ShelfBoard,
    pub loading: bool,
    /// True while any remote write is outstanding.
    pub syncing: bool,
    pub error: Option<String>,
}

/// Write-ahead projection of one user's shelves.
///
/// Every mutation is applied to the local board before its remote write is
/// issued, so callers (and [`ShelfReconciler::subscribe`] watchers) see it
/// immediately. A failed write rolls the board back:
///
/// - if nothing else changed the board since, the whole pre-mutation
///   snapshot is restored;
/// - otherwise only the failed book is put back on its former shelf, and
///   only if no later mutation touched that same book.
///
/// Confirmations never write to the board beyond swapping a provisional id
/// for the stored one, so a late confirmation cannot overwrite a newer local
/// change. There is no retry; the caller re-invokes.
#[derive(Clone)]
pub struct ShelfReconciler {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn ShelfStore>,
    viewer: String,
    state: Mutex<ReconcilerState>,
    view: watch::Sender<ShelfView>,
}

#[derive(Default)]
struct ReconcilerState {
    owner: Option<String>,
    board: ShelfBoard,
    loading: bool,
    error: Option<String>,
    /// Bumped by every load; mutations from an earlier load no longer apply.
    epoch: u64,
    revision: u64,
    /// Revision of the most recent mutation per book.
    touched: HashMap<String, u64>,
    /// Mutations awaiting their remote write, per book.
    pending: HashMap<String, usize>,
}

/// A local change awaiting its remote write.
struct Mutation {
    book_id: String,
    epoch: u64,
    revision: u64,
    snapshot: ShelfBoard,
    prior: Option<ShelfEntry>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Restore {
    /// Restore the snapshot, positions included, when nothing else changed.
    Snapshot,
    /// Put the entry back at the end of its former shelf.
    Append,
}

impl ShelfReconciler {
    /// Creates a reconciler acting on behalf of `viewer`.
    ///
    /// Any user's shelves can be loaded, but only the viewer's own can be
    /// mutated.
    pub fn new(store: Arc<dyn ShelfStore>, viewer: &str) -> Self {
        let (view, _) = watch::channel(ShelfView::default());
        ShelfReconciler {
            inner: Arc::new(Inner {
                store,
                viewer: viewer.to_owned(),
                state: Mutex::new(ReconcilerState::default()),
                view,
            }),
        }
    }

    pub fn viewer(&self) -> &str {
        &self.inner.viewer
    }

    /// The user whose shelves are loaded, if any.
    pub fn owner(&self) -> Option<String> {
        self.inner.lock().owner.clone()
    }

    /// Replaces local state with the three shelves of `user_id`.
    ///
    /// # Errors
    /// Propagates the store's failure (typically
    /// [`BarnError::RemoteUnavailable`]); the board is then left empty with
    /// the error recorded on the view.
    pub async fn load(&self, user_id: &str) -> BarnResult<()> {
        let epoch = {
            let mut state = self.inner.lock();
            if state.owner.as_deref() != Some(user_id) {
                state.board = ShelfBoard::new();
            }
            state.epoch += 1;
            state.touched.clear();
            state.pending.clear();
            state.owner = Some(user_id.to_owned());
            state.loading = true;
            state.error = None;
            self.inner.publish(&state);
            state.epoch
        };

        let store = &self.inner.store;
        let fetched = futures::try_join!(
            store.list_memberships(user_id, Some(ShelfStatus::WantToRead)),
            store.list_memberships(user_id, Some(ShelfStatus::CurrentlyReading)),
            store.list_memberships(user_id, Some(ShelfStatus::Read)),
        );

        let mut state = self.inner.lock();
        if state.epoch != epoch {
            debug!("discarding superseded load of {user_id}");
            return fetched.map(|_| ());
        }
        state.loading = false;
        state.revision += 1;
        match fetched {
            Ok((want, reading, read)) => {
                state.board = ShelfBoard::from_entries(want.into_iter().chain(reading).chain(read));
                info!(
                    "loaded shelves for {user_id}: {} entries",
                    state.board.len()
                );
                self.inner.publish(&state);
                Ok(())
            }
            Err(e) => {
                warn!("failed to load shelves for {user_id}: {e}");
                state.board = ShelfBoard::new();
                state.error = Some(e.to_string());
                self.inner.publish(&state);
                Err(e)
            }
        }
    }

    /// Puts a book on a shelf for the first time, or moves it if already shelved.
    ///
    /// The new entry carries a provisional id until the store confirms it.
    pub async fn add_to_shelf(
        &self,
        book_id: &str,
        status: ShelfStatus,
    ) -> BarnResult<ShelfEntry> {
        let existing = self.inner.lock().board.find_book(book_id).map(|e| e.id.clone());
        if let Some(entry_id) = existing {
            return self.move_to_shelf(&entry_id, status).await;
        }

        let (mutation, owner, provisional) = self.inner.begin(book_id, |board, owner| {
            let entry = ShelfEntry::provisional(owner, book_id, status, Utc::now());
            board.push(entry.clone());
            Ok(entry)
        })?;

        debug!("adding {book_id} to {status} for {owner}");
        match self.inner.store.upsert_membership(&owner, book_id, status).await {
            Ok(id) => {
                let local_id = provisional.id.clone();
                Ok(self.inner.confirm(mutation, &local_id, &id, provisional))
            }
            Err(e) => Err(self.inner.rollback(mutation, e, Restore::Snapshot)),
        }
    }

    /// Moves an entry to the end of `target`, even if it is already there.
    ///
    /// The local move is visible before this future first yields.
    ///
    /// # Errors
    /// - [`BarnError::Validation`] if the entry is not on any local shelf
    /// - [`BarnError::Unauthorized`] if the shelves are not the viewer's
    /// - the store's error, after rolling back
    pub async fn move_to_shelf(
        &self,
        entry_id: &str,
        target: ShelfStatus,
    ) -> BarnResult<ShelfEntry> {
        let book_id = self
            .inner
            .lock()
            .board
            .get(entry_id)
            .map(|e| e.book_id.clone())
            .ok_or_else(|| not_shelved(entry_id))?;

        let (mutation, owner, moved) = self.inner.begin(&book_id, |board, _| {
            let (entry, _) = board.take(entry_id).ok_or_else(|| not_shelved(entry_id))?;
            let moved = entry.with_status(target, Utc::now());
            board.push(moved.clone());
            Ok(moved)
        })?;

        debug!("moving {book_id} to {target} for {owner}");
        match self.inner.store.upsert_membership(&owner, &book_id, target).await {
            Ok(id) => {
                let local_id = moved.id.clone();
                Ok(self.inner.confirm(mutation, &local_id, &id, moved))
            }
            Err(e) => Err(self.inner.rollback(mutation, e, Restore::Snapshot)),
        }
    }

    /// Reorders one shelf locally; ordering is never sent to the store.
    ///
    /// A no-op when `from == to`.
    pub fn reorder_within_shelf(
        &self,
        status: ShelfStatus,
        from: usize,
        to: usize,
    ) -> BarnResult<()> {
        let mut state = self.inner.lock();
        state.board.reorder(status, from, to)?;
        if from != to {
            state.revision += 1;
            self.inner.publish(&state);
        }
        Ok(())
    }

    /// Removes an entry from its shelf.
    ///
    /// On remote failure the entry is appended back to its former shelf; its
    /// old position is not restored.
    pub async fn remove(&self, entry_id: &str) -> BarnResult<()> {
        let book_id = self
            .inner
            .lock()
            .board
            .get(entry_id)
            .map(|e| e.book_id.clone())
            .ok_or_else(|| not_shelved(entry_id))?;

        let (mutation, owner, ()) = self.inner.begin(&book_id, |board, _| {
            board
                .take(entry_id)
                .map(|_| ())
                .ok_or_else(|| not_shelved(entry_id))
        })?;

        debug!("removing {book_id} for {owner}");
        match self.inner.store.delete_membership(&owner, &book_id).await {
            Ok(()) => {
                self.inner.settle(&mutation);
                Ok(())
            }
            Err(e) => Err(self.inner.rollback(mutation, e, Restore::Append)),
        }
    }

    /// Merges an externally originated change into the local board.
    ///
    /// Changes for other users, and for books with a local write still in
    /// flight, are ignored; returns whether the board changed.
    pub fn apply_remote(&self, change: &ShelfChange) -> bool {
        let mut state = self.inner.lock();
        if state.owner.as_deref() != Some(change.user_id()) {
            return false;
        }

        let book_id = match change {
            ShelfChange::Upserted(entry) => entry.book_id.as_str(),
            ShelfChange::Removed { book_id, .. } => book_id.as_str(),
        };
        if state.pending.get(book_id).copied().unwrap_or(0) > 0 {
            debug!("ignoring remote change for {book_id}: local write in flight");
            return false;
        }

        let changed = match change {
            ShelfChange::Upserted(entry) => place(&mut state.board, entry.clone()),
            ShelfChange::Removed { book_id, .. } => state.board.take_book(book_id).is_some(),
        };

        if changed {
            state.revision += 1;
            self.inner.publish(&state);
        }
        changed
    }

    /// The shelf `book_id` is currently on, if any.
    pub fn status_of(&self, book_id: &str) -> Option<ShelfStatus> {
        self.inner.lock().board.find_book(book_id).map(|e| e.status)
    }

    /// A copy of the current board.
    pub fn shelves(&self) -> ShelfBoard {
        self.inner.lock().board.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShelfView> {
        self.inner.view.subscribe()
    }

    /// Whether any remote write is still outstanding.
    pub fn is_syncing(&self) -> bool {
        !self.inner.lock().pending.is_empty()
    }
}

/// Puts `entry` where its status says, replacing the same book's record.
///
/// A status change moves the book to the end of its new shelf; the same
/// status updates the record in place.
fn place(board: &mut ShelfBoard, entry: ShelfEntry) -> bool {
    let Some(current) = board.find_book(&entry.book_id).cloned() else {
        board.push(entry);
        return true;
    };
    if current == entry {
        return false;
    }

    match board.take(&current.id) {
        Some((_, idx)) if current.status == entry.status => board.insert_at(entry, idx),
        _ => board.push(entry),
    }
    true
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ReconcilerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ReconcilerState) {
        self.view.send_replace(ShelfView {
            owner: state.owner.clone(),
            shelves: state.board.clone(),
            loading: state.loading,
            syncing: !state.pending.is_empty(),
            error: state.error.clone(),
        });
    }

    /// Checks ownership, snapshots, and applies `apply` to the board.
    ///
    /// Nothing is changed when `apply` or the ownership check fails.
    fn begin<T>(
        &self,
        book_id: &str,
        apply: impl FnOnce(&mut ShelfBoard, &str) -> BarnResult<T>,
    ) -> BarnResult<(Mutation, String, T)> {
        let mut state = self.lock();
        let owner = match &state.owner {
            None => return Err(BarnError::Validation("no shelves loaded".into())),
            Some(owner) if *owner != self.viewer => {
                warn!("{} attempted to modify shelves of {owner}", self.viewer);
                return Err(BarnError::Unauthorized);
            }
            Some(owner) => owner.clone(),
        };

        let snapshot = state.board.clone();
        let prior = snapshot.find_book(book_id).cloned();

        let mut board = state.board.clone();
        let value = apply(&mut board, &owner)?;

        state.board = board;
        state.revision += 1;
        let revision = state.revision;
        state.touched.insert(book_id.to_owned(), revision);
        *state.pending.entry(book_id.to_owned()).or_insert(0) += 1;
        state.error = None;
        self.publish(&state);

        Ok((
            Mutation {
                book_id: book_id.to_owned(),
                epoch: state.epoch,
                revision,
                snapshot,
                prior,
            },
            owner,
            value,
        ))
    }

    fn release(state: &mut ReconcilerState, book_id: &str) {
        if let Some(count) = state.pending.get_mut(book_id) {
            *count -= 1;
            if *count == 0 {
                state.pending.remove(book_id);
            }
        }
    }

    /// Marks a successful write as no longer pending.
    fn settle(&self, mutation: &Mutation) {
        let mut state = self.lock();
        if state.epoch != mutation.epoch {
            return;
        }
        Self::release(&mut state, &mutation.book_id);
        self.publish(&state);
    }

    /// Records the stored id for `local_id` and returns the entry as now shown.
    ///
    /// If the shelves were reloaded since, the board is left alone and the
    /// caller gets its own entry back.
    fn confirm(
        &self,
        mutation: Mutation,
        local_id: &str,
        stored_id: &str,
        applied: ShelfEntry,
    ) -> ShelfEntry {
        let mut state = self.lock();
        if state.epoch != mutation.epoch {
            debug!("write for {} confirmed after a reload", mutation.book_id);
            return ShelfEntry {
                id: stored_id.to_owned(),
                ..applied
            };
        }
        Self::release(&mut state, &mutation.book_id);
        if local_id != stored_id {
            state.board.rename(local_id, stored_id);
        }
        let current = state
            .board
            .find_book(&mutation.book_id)
            .cloned()
            .unwrap_or(ShelfEntry {
                id: stored_id.to_owned(),
                ..applied
            });
        self.publish(&state);
        current
    }

    /// Undoes a failed mutation and hands the error back for the caller.
    fn rollback(&self, mutation: Mutation, err: BarnError, mode: Restore) -> BarnError {
        let mut state = self.lock();
        if state.epoch != mutation.epoch {
            warn!(
                "write for {} failed after the shelves were reloaded: {err}",
                mutation.book_id
            );
            return err;
        }
        Self::release(&mut state, &mutation.book_id);

        let untouched_since = state.revision == mutation.revision;
        let latest_for_book = state.touched.get(&mutation.book_id) == Some(&mutation.revision);

        if untouched_since && mode == Restore::Snapshot {
            warn!(
                "write for {} failed, restoring snapshot: {err}",
                mutation.book_id
            );
            state.board = mutation.snapshot;
        } else if latest_for_book {
            warn!("write for {} failed, reverting entry: {err}", mutation.book_id);
            state.board.take_book(&mutation.book_id);
            if let Some(entry) = mutation.prior {
                state.board.push(entry);
            }
        } else {
            warn!(
                "write for {} failed but a newer change supersedes it: {err}",
                mutation.book_id
            );
        }

        if latest_for_book {
            state.touched.remove(&mutation.book_id);
        }
        state.revision += 1;
        state.error = Some(err.to_string());
        self.publish(&state);
        err
    }
}
