//! End-to-end tests for the cache coordinator over the wire protocol

mod support;

use content_cache::cache::{cache_key, CacheEntry};
use content_cache::{
    BatchEntry, CacheConfig, CacheCoordinator, EngineConfig, HealthStatus, HotColdStore,
    ManualClock, NewsItem, SourceKind, SourceMetadata,
};
use std::sync::Arc;
use std::time::Duration;
use support::{init_tracing, unused_port, MockEngine};
use tokio_test::assert_ok;

const NOW: i64 = 1_700_000_000;

fn reddit_item() -> NewsItem {
    NewsItem::new("Rust 2.0 announced", "https://x/1", SourceKind::Reddit, NOW - 60)
        .with_summary("Big news")
        .with_source("r/rust")
        .with_relevance(0.92)
        .with_metadata(SourceMetadata::Reddit {
            subreddit: "rust".to_string(),
            upvotes: 1234,
            comment_count: 56,
        })
}

async fn connected(engine: &MockEngine) -> (CacheCoordinator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(NOW));
    let coordinator = CacheCoordinator::connect(engine.config(), CacheConfig::default())
        .await
        .with_clock(clock.clone());
    (coordinator, clock)
}

#[tokio::test]
async fn test_connect_creates_schema() {
    init_tracing();
    let engine = MockEngine::start().await;
    let (coordinator, _) = connected(&engine).await;

    assert!(!coordinator.is_degraded());
    assert_eq!(coordinator.backend_name(), "engine");
    assert_eq!(
        engine.queries(),
        vec![
            "CREATE SPACE IF NOT EXISTS content_cache".to_string(),
            "CREATE MODEL IF NOT EXISTS content_cache.entries(k: string, v: binary)".to_string(),
        ]
    );
    assert_eq!(coordinator.health_check().await.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_cache_get_expire_end_to_end() {
    init_tracing();
    let engine = MockEngine::start().await;
    let (coordinator, clock) = connected(&engine).await;
    let url = "https://x/1";
    let key = cache_key("content_cache", url, SourceKind::Reddit);

    coordinator.cache(url, SourceKind::Reddit, &[reddit_item()]).await;
    assert!(engine.raw(&key).is_some());

    let hit = coordinator.get_cached(url, SourceKind::Reddit).await;
    assert_eq!(hit, Some(vec![reddit_item()]));

    clock.advance(4 * 3600 + 1);
    assert_eq!(coordinator.get_cached(url, SourceKind::Reddit).await, None);

    assert!(engine.raw(&key).is_none());
    let raw = assert_ok!(coordinator.backend().get_raw(&key).await);
    assert!(raw.is_none());

    let stats = coordinator.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn test_stored_bytes_use_entry_layout() {
    let engine = MockEngine::start().await;
    let (coordinator, _) = connected(&engine).await;

    coordinator.cache("https://x/1", SourceKind::Research, &[reddit_item()]).await;
    let raw = engine
        .raw(&coordinator.key_for("https://x/1", SourceKind::Research))
        .unwrap();

    let entry = assert_ok!(CacheEntry::decode(&raw));
    assert_eq!(entry.timestamp, NOW);
    assert_eq!(entry.ttl_seconds, 7 * 24 * 3600);
    assert_eq!(entry.source_kind, SourceKind::Research);
    let items: Vec<NewsItem> = serde_json::from_slice(&entry.content).unwrap();
    assert_eq!(items, vec![reddit_item()]);
}

#[tokio::test]
async fn test_corrupt_entry_is_removed() {
    let engine = MockEngine::start().await;
    let (coordinator, _) = connected(&engine).await;
    let key = coordinator.key_for("https://x/1", SourceKind::Reddit);

    engine.put_raw(&key, vec![0xAB; 12]);
    assert!(!coordinator.is_cached("https://x/1", SourceKind::Reddit).await);
    assert!(engine.raw(&key).is_none());
    assert_eq!(coordinator.stats().corrupt, 1);
}

#[tokio::test]
async fn test_invalidate_missing_key_is_not_an_error() {
    let engine = MockEngine::start().await;
    let (coordinator, _) = connected(&engine).await;

    coordinator.invalidate("https://never/cached", SourceKind::Blog).await;
    assert_eq!(coordinator.stats().errors, 0);

    coordinator.cache("https://x/1", SourceKind::Blog, &[]).await;
    assert!(coordinator.is_cached("https://x/1", SourceKind::Blog).await);
    coordinator.invalidate("https://x/1", SourceKind::Blog).await;
    assert!(!coordinator.is_cached("https://x/1", SourceKind::Blog).await);
}

#[tokio::test]
async fn test_batch_cache_and_store_persistence() {
    let engine = MockEngine::start().await;
    let (coordinator, _) = connected(&engine).await;

    let entries: Vec<BatchEntry> = SourceKind::ALL
        .iter()
        .map(|kind| BatchEntry::new(format!("https://{}/feed", kind), *kind, vec![reddit_item()]))
        .collect();
    assert_eq!(coordinator.batch_cache(&entries).await, entries.len());
    assert_eq!(engine.len(), entries.len());

    let mut store = HotColdStore::with_capacity(8);
    for i in 0..4 {
        let item = NewsItem::new(format!("t{}", i % 2), format!("https://s/{}", i), SourceKind::Rss, NOW + i)
            .with_relevance(0.5);
        store.add_item(&item).unwrap();
    }
    store.deduplicate_hot();
    store.sort_by_timestamp();
    coordinator.cache_store("https://s", SourceKind::Rss, &store).await;

    let cached = coordinator.get_cached("https://s", SourceKind::Rss).await.unwrap();
    let titles: Vec<&str> = cached.iter().map(|item| item.title.as_str()).collect();
    assert_eq!(titles, vec!["t1", "t0"]);
}

#[tokio::test]
async fn test_degraded_mode_never_raises() {
    init_tracing();
    let engine = EngineConfig::builder()
        .port(unused_port().await)
        .connection_timeout(Duration::from_millis(200))
        .build();
    let config = CacheConfig::builder()
        .init_max_retries(3)
        .init_backoff(Duration::from_millis(5))
        .build();

    let coordinator = CacheCoordinator::connect(engine, config).await;
    assert!(coordinator.is_degraded());
    assert_eq!(coordinator.backend_name(), "dummy");

    coordinator.cache("https://x/1", SourceKind::Reddit, &[reddit_item()]).await;
    assert_eq!(coordinator.get_cached("https://x/1", SourceKind::Reddit).await, None);
    assert!(!coordinator.is_cached("https://x/1", SourceKind::Reddit).await);
    assert_eq!(
        coordinator
            .batch_cache(&[BatchEntry::new("https://x/2", SourceKind::Rss, vec![])])
            .await,
        1
    );

    let health = coordinator.health_check().await;
    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert_eq!(coordinator.stats().errors, 0);
}

#[tokio::test]
async fn test_engine_lost_after_connect() {
    init_tracing();
    let engine = MockEngine::start().await;
    let (coordinator, _) = connected(&engine).await;
    coordinator.cache("https://x/1", SourceKind::Reddit, &[reddit_item()]).await;

    drop(engine);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // the idle pooled connection is dead and no new one can be opened
    assert_eq!(coordinator.get_cached("https://x/1", SourceKind::Reddit).await, None);
    coordinator.cache("https://x/1", SourceKind::Reddit, &[reddit_item()]).await;
    assert_eq!(coordinator.stats().errors, 2);
    assert!(!coordinator.is_degraded());
}
