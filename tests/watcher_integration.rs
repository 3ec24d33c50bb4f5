mod common;

use barn_core::domain::ShelfStatus::{CurrentlyReading, Read, WantToRead};
use barn_core::metadata::MetadataCache;
use barn_core::shelf::ShelfReconciler;
use barn_core::store::memory::MemoryStore;
use barn_core::store::{ShelfChange, ShelfStore};
use barn_core::watcher::{ShelfChangeHandler, WatcherService};
use barn_core::BarnResult;
use common::{FakeSearch, USER, book, entry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_test::traced_test;

async fn viewing(memory: Arc<MemoryStore>) -> BarnResult<ShelfReconciler> {
    let reconciler = ShelfReconciler::new(memory, USER);
    reconciler.load(USER).await?;
    Ok(reconciler)
}

#[tokio::test]
#[traced_test]
async fn writes_from_another_session_reach_the_view() -> BarnResult<()> {
    let memory = Arc::new(MemoryStore::new());
    memory.seed(entry("w1", "book-w1", WantToRead));
    let local = viewing(memory.clone()).await?;
    let service = WatcherService::start(memory.as_ref(), ShelfChangeHandler::new(local.clone()));

    // A second device sharing the same store.
    let remote = viewing(memory.clone()).await?;
    remote.move_to_shelf("w1", Read).await?;
    remote.add_to_shelf("book-new", CurrentlyReading).await?;

    let mut view = local.subscribe();
    let seen = tokio::time::timeout(
        Duration::from_secs(5),
        view.wait_for(|v| v.shelves.count(Read) == 1 && v.shelves.count(CurrentlyReading) == 1),
    )
    .await
    .is_ok();
    assert!(seen);
    assert_eq!(local.status_of("book-new"), Some(CurrentlyReading));

    assert!(service.is_running());
    service.shutdown().await;
    assert!(logs_contain("shelf watcher stopped"));
    Ok(())
}

#[tokio::test]
async fn new_books_are_prefetched() -> BarnResult<()> {
    let memory = Arc::new(MemoryStore::new());
    let local = viewing(memory.clone()).await?;
    let search = FakeSearch::with_books([book("book-new", "Dune")]);
    let metadata = MetadataCache::new(memory.clone(), search);
    let handler = ShelfChangeHandler::new(local.clone()).with_metadata(metadata.clone());

    let mut resolved = metadata.subscribe();
    let added = entry("e1", "book-new", WantToRead);
    assert!(handler.handle(&ShelfChange::Upserted(added)));

    assert_eq!(resolved.recv().await.unwrap(), "book-new");
    assert_eq!(metadata.peek("book-new").unwrap().title, "Dune");
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn a_lagging_feed_triggers_a_reload() -> BarnResult<()> {
    let memory = Arc::new(MemoryStore::new());
    let local = viewing(memory.clone()).await?;

    let (tx, rx) = broadcast::channel(1);
    // Overflow the channel before the watcher reads anything.
    for book_id in ["a", "b", "c"] {
        memory.upsert_membership(USER, book_id, WantToRead).await?;
        let stored = memory.find_membership(USER, book_id).await?.unwrap();
        let _ = tx.send(ShelfChange::Upserted(stored));
    }

    let service = WatcherService::run(rx, ShelfChangeHandler::new(local.clone()));
    let mut view = local.subscribe();
    let seen = tokio::time::timeout(
        Duration::from_secs(5),
        view.wait_for(|v| v.shelves.count(WantToRead) == 3),
    )
    .await
    .is_ok();
    assert!(seen);
    assert!(logs_contain("reloading"));

    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn closing_the_feed_stops_the_watcher() -> BarnResult<()> {
    let memory = Arc::new(MemoryStore::new());
    let local = viewing(memory).await?;

    let (tx, rx) = broadcast::channel(8);
    let service = WatcherService::run(rx, ShelfChangeHandler::new(local));
    drop(tx);

    for _ in 0..50 {
        if !service.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!service.is_running());
    Ok(())
}
