use crate::metadata::MetadataCache;
use crate::shelf::reconciler::ShelfReconciler;
use crate::store::ShelfChange;
use tracing::debug;

/// Applies externally originated shelf changes to a reconciler.
#[derive(Clone)]
pub struct ShelfChangeHandler {
    reconciler: ShelfReconciler,
    metadata: Option<MetadataCache>,
}

impl ShelfChangeHandler {
    pub fn new(reconciler: ShelfReconciler) -> Self {
        Self {
            reconciler,
            metadata: None,
        }
    }

    /// Also warms `metadata` for books that newly appear on a shelf.
    pub fn with_metadata(mut self, metadata: MetadataCache) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn reconciler(&self) -> &ShelfReconciler {
        &self.reconciler
    }

    /// Returns whether the local board changed.
    pub fn handle(&self, change: &ShelfChange) -> bool {
        match change {
            ShelfChange::Upserted(entry) => {
                let changed = self.reconciler.apply_remote(change);
                if changed {
                    if let Some(metadata) = &self.metadata {
                        metadata.get(&entry.book_id);
                    }
                }
                changed
            }
            ShelfChange::Removed { book_id, .. } => {
                let changed = self.reconciler.apply_remote(change);
                if changed {
                    debug!("{book_id} removed remotely");
                }
                changed
            }
        }
    }

    /// Reloads the current owner's shelves after changes were missed.
    pub async fn resync(&self) {
        let Some(owner) = self.reconciler.owner() else {
            return;
        };
        // `load` records failures on the view; nothing more to do here.
        let _ = self.reconciler.load(&owner).await;
    }
}
