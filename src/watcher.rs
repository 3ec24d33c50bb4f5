//! Live updates: changes committed elsewhere flow into the local shelves.

pub mod handler;
pub mod service;

pub use handler::ShelfChangeHandler;
pub use service::WatcherService;
