mod common;

use barn_core::metadata::{Lookup, MetadataCache};
use barn_core::store::BookStore;
use barn_core::store::memory::MemoryStore;
use barn_core::{BarnError, BarnResult};
use common::{FakeSearch, book};
use std::sync::Arc;
use std::time::Duration;

fn cache_with(search: Arc<FakeSearch>) -> (Arc<MemoryStore>, MetadataCache) {
    let books = Arc::new(MemoryStore::new());
    let cache = MetadataCache::new(books.clone(), search);
    (books, cache)
}

#[tokio::test(start_paused = true)]
async fn concurrent_gets_share_one_fetch() -> BarnResult<()> {
    let search = FakeSearch::with_books([book("id1", "Dune")]);
    search.set_latency(Duration::from_millis(50));
    let (_, cache) = cache_with(search.clone());

    let first = cache.get("id1");
    let second = cache.get("id1");
    assert!(first.is_loading());
    assert!(second.is_loading());

    let (a, b, c) = tokio::join!(
        async {
            match first {
                Lookup::Loading(pending) => pending.resolve().await,
                Lookup::Ready(meta) => Ok(Some(meta)),
            }
        },
        async {
            match second {
                Lookup::Loading(pending) => pending.resolve().await,
                Lookup::Ready(meta) => Ok(Some(meta)),
            }
        },
        cache.fetch("id1"),
    );

    assert_eq!(a?.unwrap().title, "Dune");
    assert_eq!(b?.unwrap().title, "Dune");
    assert_eq!(c?.unwrap().title, "Dune");
    assert_eq!(search.lookups("id1"), 1);
    assert_eq!(cache.get("id1").ready().map(|m| m.title.as_str()), Some("Dune"));
    Ok(())
}

#[tokio::test]
async fn batch_deduplicates_and_keeps_order() -> BarnResult<()> {
    let search = FakeSearch::with_books([book("id1", "Dune"), book("id2", "Emma")]);
    let (_, cache) = cache_with(search.clone());

    let results = cache.get_batch(&["id1", "id1", "id2"]).await?;

    assert_eq!(results.len(), 3);
    let titles: Vec<_> = results.iter().map(|m| m.as_ref().map(|m| m.title.as_str())).collect();
    assert_eq!(titles, vec![Some("Dune"), Some("Dune"), Some("Emma")]);
    assert_eq!(search.lookups("id1"), 1);
    assert_eq!(search.lookups("id2"), 1);

    // Everything is cached now.
    cache.get_batch(&["id2", "id1"]).await?;
    assert_eq!(search.lookups("id1"), 1);
    assert_eq!(search.lookups("id2"), 1);
    Ok(())
}

#[tokio::test]
async fn book_store_is_read_first_and_filled_from_search() -> BarnResult<()> {
    let search = FakeSearch::with_books([book("id2", "Emma")]);
    let (books, cache) = cache_with(search.clone());
    books.seed_book(book("id1", "Dune"));

    let dune = cache.fetch("id1").await?.unwrap();
    assert_eq!(dune.title, "Dune");
    assert_eq!(search.lookups("id1"), 0);

    cache.fetch("id2").await?;
    assert_eq!(books.get("id2").await?.title, "Emma");
    Ok(())
}

#[tokio::test]
async fn unknown_books_resolve_to_none_and_are_not_cached() -> BarnResult<()> {
    let search = FakeSearch::new();
    let (_, cache) = cache_with(search.clone());

    assert!(cache.fetch("ghost").await?.is_none());
    assert!(cache.fetch("ghost").await?.is_none());
    assert_eq!(search.lookups("ghost"), 2);
    assert!(cache.is_empty());
    Ok(())
}

#[tokio::test]
async fn failures_propagate_and_leave_no_entry() -> BarnResult<()> {
    let search = FakeSearch::with_books([book("id1", "Dune")]);
    search.fail_with(Some(BarnError::RemoteUnavailable("down".into())));
    let (_, cache) = cache_with(search.clone());

    let err = cache.get_batch(&["id1"]).await.unwrap_err();
    assert!(matches!(err, BarnError::RemoteUnavailable(_)));
    assert!(cache.peek("id1").is_none());

    search.fail_with(None);
    assert!(cache.fetch("id1").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn resolutions_are_announced() -> BarnResult<()> {
    let search = FakeSearch::with_books([book("id1", "Dune")]);
    let (_, cache) = cache_with(search);
    let mut resolved = cache.subscribe();

    assert!(cache.get("id1").is_loading());
    assert_eq!(resolved.recv().await.unwrap(), "id1");
    assert!(cache.peek("id1").is_some());
    Ok(())
}

#[tokio::test]
async fn inserted_metadata_is_served_without_fetching() -> BarnResult<()> {
    let search = FakeSearch::new();
    let (_, cache) = cache_with(search.clone());

    cache.insert(book("id1", "Dune"));
    cache.insert(book("id1", "Dune"));

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.fetch("id1").await?.unwrap().title, "Dune");
    assert_eq!(search.lookups("id1"), 0);
    Ok(())
}
