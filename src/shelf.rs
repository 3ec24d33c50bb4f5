//! The three reading shelves and everything that mutates them.
//!
//! - [`board`]: the ordered, in-memory shelves
//! - [`reconciler`]: optimistic mutations against a [`crate::store::ShelfStore`]
//! - [`interaction`]: drag/drop and button gestures resolved to reconciler calls

pub mod board;
pub mod interaction;
pub mod reconciler;

pub use board::ShelfBoard;
pub use interaction::{
    DragPreview, DropTarget, Gesture, Interaction, InteractionAdapter, ShelfCommand,
};
pub use reconciler::{ShelfReconciler, ShelfView};
