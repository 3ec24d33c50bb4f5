//! # barn_core
//!
//! Client-side synchronization for a personal reading tracker: three reading
//! shelves kept in step with a remote store, a shared book metadata cache,
//! and keystroke-driven book search.
//!
//! ## Features
//!
//! - **Optimistic Shelves**: Moves, adds and removals show up locally before the remote write, with rollback on failure
//! - **Drag and Drop**: A device-independent gesture state machine resolved to shelf commands
//! - **Metadata Cache**: One fetch per book no matter how many views ask for it
//! - **Search**: Debounced, cancellable, TTL-cached lookups against Google Books
//! - **Live Updates**: Changes committed elsewhere are merged into the local shelves
//! - **Storage**: SQLite-backed or in-memory stores behind async traits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use barn_core::config::Config;
//! use barn_core::domain::ShelfStatus;
//! use barn_core::shelf::ShelfReconciler;
//! use barn_core::store::sqlite::SqliteStore;
//! use std::sync::Arc;
//!
//! # async fn demo() -> barn_core::BarnResult<()> {
//! let config = Config::load_default()?;
//! let store = Arc::new(SqliteStore::open(&config.store.resolve_database_path()?).await?);
//!
//! let shelves = ShelfReconciler::new(store, "alice");
//! shelves.load("alice").await?;
//! shelves.add_to_shelf("zyTCAlFPjgYC", ShelfStatus::WantToRead).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **[`domain`]**: Shelf statuses, entries and book metadata
//! - **[`store`]**: Collaborator traits plus SQLite, in-memory and Google Books implementations
//! - **[`shelf`]**: The optimistic reconciler and the interaction adapter
//! - **[`metadata`]**: The process-wide book metadata cache
//! - **[`search`]**: Debounced, coalesced, TTL-cached search
//! - **[`watcher`]**: Applies externally committed changes
//! - **[`config`]**: JSON configuration with environment overrides
//! - **[`error`]**: Unified error handling
//!
//! ## Shelves
//!
//! Every mutation is applied to the local board first, and the remote write is
//! issued afterwards. When the write fails, the board goes back to how it was,
//! the error lands on the view, and the caller gets the error exactly once.
//! Ordering within a shelf is purely local.
//!
//! ```rust,no_run
//! use barn_core::domain::ShelfStatus;
//! use barn_core::shelf::ShelfReconciler;
//!
//! # async fn demo(shelves: ShelfReconciler) -> barn_core::BarnResult<()> {
//! let entry = shelves.shelves().shelf(ShelfStatus::WantToRead)[0].clone();
//! shelves.move_to_shelf(&entry.id, ShelfStatus::CurrentlyReading).await?;
//! shelves.reorder_within_shelf(ShelfStatus::CurrentlyReading, 0, 1)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`BarnResult<T>`] which wraps the unified [`BarnError`] type.
//! Database, HTTP, I/O and JSON errors convert into it automatically, so `?`
//! works throughout.

pub mod config;
pub mod domain;
pub mod error;
pub mod metadata;
pub mod search;
pub mod shelf;
pub mod store;
pub mod watcher;

/// Re-exports the most commonly used types for convenience.
pub use error::{BarnError, BarnResult};
