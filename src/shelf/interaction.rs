//! Gesture and button handling for the shelf view.
//!
//! [`Gesture`] is a device-independent state machine
//! (idle → dragging → hovering → committed or cancelled, plus a confirmation
//! step for removal) that resolves each interaction to at most one
//! [`ShelfCommand`]. [`InteractionAdapter`] drives a [`Gesture`] against a
//! live [`ShelfReconciler`] and supplies drag previews from the
//! [`MetadataCache`].

use crate::domain::{Adjacent, BookMetadata, Direction, ShelfEntry, ShelfStatus, adjacent_of};
use crate::error::{BarnError, BarnResult};
use crate::metadata::MetadataCache;
use crate::shelf::board::{ShelfBoard, not_shelved};
use crate::shelf::reconciler::ShelfReconciler;
use std::sync::Arc;
use tracing::debug;

/// What the pointer is over when a drag ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    /// Another entry, on any shelf.
    Entry(String),
    /// A shelf container with no entry under the pointer.
    Container(ShelfStatus),
}

/// A single reconciler call produced by an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShelfCommand {
    Reorder {
        status: ShelfStatus,
        from: usize,
        to: usize,
    },
    Move {
        entry_id: String,
        target: ShelfStatus,
    },
    Remove {
        entry_id: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Interaction {
    #[default]
    Idle,
    Dragging {
        entry_id: String,
        book_id: String,
        over: Option<DropTarget>,
    },
    ConfirmingRemoval {
        entry_id: String,
    },
}

#[derive(Debug, Default)]
pub struct Gesture {
    state: Interaction,
}

impl Gesture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &Interaction {
        &self.state
    }

    /// Starts dragging `entry_id`. Only valid from idle.
    pub fn grab<'b>(
        &mut self,
        board: &'b ShelfBoard,
        entry_id: &str,
    ) -> BarnResult<&'b ShelfEntry> {
        if self.state != Interaction::Idle {
            return Err(BarnError::Validation("another interaction is in progress".into()));
        }
        let entry = board.get(entry_id).ok_or_else(|| not_shelved(entry_id))?;

        self.state = Interaction::Dragging {
            entry_id: entry.id.clone(),
            book_id: entry.book_id.clone(),
            over: None,
        };
        Ok(entry)
    }

    /// Updates what the dragged item is hovering over; ignored unless dragging.
    pub fn hover(&mut self, target: Option<DropTarget>) {
        if let Interaction::Dragging { over, .. } = &mut self.state {
            *over = target;
        }
    }

    /// Ends the drag and resolves the drop into a command.
    ///
    /// Returns `None` (and discards the drag) when the drop is not actionable.
    pub fn release(&mut self, board: &ShelfBoard) -> Option<ShelfCommand> {
        let Interaction::Dragging { entry_id, over, .. } = std::mem::take(&mut self.state) else {
            return None;
        };
        let (origin, from) = board.locate(&entry_id)?;

        match over? {
            DropTarget::Entry(target_id) if target_id == entry_id => None,
            DropTarget::Entry(target_id) => {
                let (status, to) = board.locate(&target_id)?;
                if status == origin {
                    Some(ShelfCommand::Reorder { status, from, to })
                } else {
                    Some(ShelfCommand::Move {
                        entry_id,
                        target: status,
                    })
                }
            }
            DropTarget::Container(target) => Some(ShelfCommand::Move { entry_id, target }),
        }
    }

    /// Abandons a drag or a pending removal.
    pub fn cancel(&mut self) {
        self.state = Interaction::Idle;
    }

    /// Enters the removal confirmation step for `entry_id`.
    pub fn request_removal(&mut self, board: &ShelfBoard, entry_id: &str) -> BarnResult<()> {
        if self.state != Interaction::Idle {
            return Err(BarnError::Validation("another interaction is in progress".into()));
        }
        if board.get(entry_id).is_none() {
            return Err(not_shelved(entry_id));
        }
        self.state = Interaction::ConfirmingRemoval {
            entry_id: entry_id.to_owned(),
        };
        Ok(())
    }

    /// Confirms a pending removal.
    pub fn confirm(&mut self) -> Option<ShelfCommand> {
        match std::mem::take(&mut self.state) {
            Interaction::ConfirmingRemoval { entry_id } => Some(ShelfCommand::Remove { entry_id }),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Leaves the confirmation step without removing anything.
    pub fn dismiss(&mut self) {
        if matches!(self.state, Interaction::ConfirmingRemoval { .. }) {
            self.state = Interaction::Idle;
        }
    }
}

/// Directional buttons to offer for an entry; no wraparound at either end.
pub fn available_moves(board: &ShelfBoard, entry_id: &str) -> Option<Adjacent> {
    board.get(entry_id).map(|entry| adjacent_of(entry.status))
}

/// Resolves a button press; `None` when there is no shelf in that direction.
pub fn directional(
    board: &ShelfBoard,
    entry_id: &str,
    direction: Direction,
) -> Option<ShelfCommand> {
    let entry = board.get(entry_id)?;
    let target = entry.status.adjacent(direction)?;
    Some(ShelfCommand::Move {
        entry_id: entry.id.clone(),
        target,
    })
}

/// The lightweight card shown under the pointer while dragging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragPreview {
    pub entry_id: String,
    pub book_id: String,
    /// `None` until the metadata fetch resolves.
    pub metadata: Option<Arc<BookMetadata>>,
}

/// Binds a [`Gesture`] to a reconciler and the shared metadata cache.
pub struct InteractionAdapter {
    reconciler: ShelfReconciler,
    metadata: MetadataCache,
    gesture: Gesture,
}

impl InteractionAdapter {
    pub fn new(reconciler: ShelfReconciler, metadata: MetadataCache) -> Self {
        InteractionAdapter {
            reconciler,
            metadata,
            gesture: Gesture::new(),
        }
    }

    pub fn state(&self) -> &Interaction {
        self.gesture.state()
    }

    /// Starts a drag; the preview uses cached metadata or starts fetching it.
    pub fn grab(&mut self, entry_id: &str) -> BarnResult<DragPreview> {
        let board = self.reconciler.shelves();
        let entry = self.gesture.grab(&board, entry_id)?;
        let lookup = self.metadata.get(&entry.book_id);

        Ok(DragPreview {
            entry_id: entry.id.clone(),
            book_id: entry.book_id.clone(),
            metadata: lookup.ready().cloned(),
        })
    }

    /// The current drag preview, refreshed from the cache.
    ///
    /// A miss joins (or restarts) the fetch for the dragged book.
    pub fn drag_preview(&self) -> Option<DragPreview> {
        match self.gesture.state() {
            Interaction::Dragging {
                entry_id, book_id, ..
            } => Some(DragPreview {
                entry_id: entry_id.clone(),
                book_id: book_id.clone(),
                metadata: self.metadata.get(book_id).ready().cloned(),
            }),
            _ => None,
        }
    }

    pub fn hover(&mut self, target: Option<DropTarget>) {
        self.gesture.hover(target);
    }

    /// Drops the dragged entry and runs the resulting command, if any.
    pub async fn release(&mut self) -> BarnResult<Option<ShelfCommand>> {
        let board = self.reconciler.shelves();
        match self.gesture.release(&board) {
            Some(command) => {
                self.dispatch(&command).await?;
                Ok(Some(command))
            }
            None => {
                debug!("drop was not actionable");
                Ok(None)
            }
        }
    }

    pub fn cancel(&mut self) {
        self.gesture.cancel();
    }

    pub fn available_moves(&self, entry_id: &str) -> Option<Adjacent> {
        available_moves(&self.reconciler.shelves(), entry_id)
    }

    /// Moves an entry one shelf up or down.
    pub async fn press(
        &mut self,
        entry_id: &str,
        direction: Direction,
    ) -> BarnResult<Option<ShelfCommand>> {
        let Some(command) = directional(&self.reconciler.shelves(), entry_id, direction) else {
            return Ok(None);
        };
        self.dispatch(&command).await?;
        Ok(Some(command))
    }

    pub fn request_removal(&mut self, entry_id: &str) -> BarnResult<()> {
        let board = self.reconciler.shelves();
        self.gesture.request_removal(&board, entry_id)
    }

    /// Runs a confirmed removal; `None` if no removal was pending.
    pub async fn confirm_removal(&mut self) -> BarnResult<Option<ShelfCommand>> {
        let Some(command) = self.gesture.confirm() else {
            return Ok(None);
        };
        self.dispatch(&command).await?;
        Ok(Some(command))
    }

    pub fn dismiss(&mut self) {
        self.gesture.dismiss();
    }

    async fn dispatch(&self, command: &ShelfCommand) -> BarnResult<()> {
        debug!("dispatching {command:?}");
        match command {
            ShelfCommand::Reorder { status, from, to } => {
                self.reconciler.reorder_within_shelf(*status, *from, *to)
            }
            ShelfCommand::Move { entry_id, target } => {
                self.reconciler.move_to_shelf(entry_id, *target).await.map(|_| ())
            }
            ShelfCommand::Remove { entry_id } => self.reconciler.remove(entry_id).await,
        }
    }
}
