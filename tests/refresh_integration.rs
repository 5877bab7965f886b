//! Refresh engine and scheduler against a mock subscription server.
//!
//! Every source is served by wiremock on loopback; no external network.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine as _;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stash_rule::cache::{RefreshEngine, RefreshScheduler};
use stash_rule::store::{
    CacheEntry, CacheStore, SourceStore, SqliteStore, StoreError,
};
use stash_rule::subscription::{decode, SubscriptionFetcher, DEFAULT_USER_AGENT};

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

const CLASH_YAML: &str = r#"
proxies:
  - name: "🇯🇵 Tokyo 01"
    type: ss
    server: jp.example.com
    port: 8388
    cipher: aes-256-gcm
    password: "placeholder"
  - name: "US-01"
    type: trojan
    server: us.example.com
    port: 443
    password: "placeholder"
"#;

fn uri_list_body() -> String {
    let list = "trojan://pw@hk1.example.com:443#HK%2001\ntrojan://pw@hk2.example.com:443#HK%2002\n";
    base64::engine::general_purpose::STANDARD.encode(list)
}

fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

fn engine_with(cache: Arc<dyn CacheStore>, max_concurrent: usize) -> RefreshEngine {
    let fetcher = SubscriptionFetcher::new(Duration::from_secs(5), DEFAULT_USER_AGENT).unwrap();
    RefreshEngine::new(cache, fetcher, max_concurrent)
}

async fn mount_body(server: &MockServer, route: &str, body: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected)
        .mount(server)
        .await;
}

fn names(nodes: &[stash_rule::subscription::ProxyNode]) -> Vec<&str> {
    nodes.iter().filter_map(|n| n.name()).collect()
}

/// Cache store whose every call fails, to exercise error propagation.
struct UnavailableCache;

impl CacheStore for UnavailableCache {
    fn get_entry(&self, _url: &str) -> Result<Option<CacheEntry>, StoreError> {
        Err(StoreError::Unavailable("cache offline".into()))
    }

    fn put_entry(&self, _url: &str, _entry: &CacheEntry) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("cache offline".into()))
    }

    fn last_run_at(&self) -> Result<i64, StoreError> {
        Err(StoreError::Unavailable("cache offline".into()))
    }

    fn set_last_run_at(&self, _at: i64) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("cache offline".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Batch refresh
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_with_one_failing_source_keeps_its_old_entry() {
    let server = MockServer::start().await;
    mount_body(&server, "/a", uri_list_body(), 1).await;
    mount_body(&server, "/b", CLASH_YAML.to_string(), 1).await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let store = store();
    let url_c = format!("{}/c", server.uri());
    let stale = CacheEntry {
        nodes: vec![decode("trojan://pw@old.example.com:443#Old").unwrap()],
        updated_at: 100,
    };
    store.put_entry(&url_c, &stale).unwrap();

    let engine = engine_with(store.clone(), 4);
    let urls = [
        format!("{}/a", server.uri()),
        format!("{}/b", server.uri()),
        url_c.clone(),
    ];
    let result = engine.refresh_many(&urls).await.unwrap();

    assert_eq!((result.total, result.success, result.failed), (3, 2, 1));
    let item_urls: Vec<&str> = result.items.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(item_urls, urls.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(result.items[0].count, 2);
    assert_eq!(result.items[1].count, 2);
    assert_eq!(result.items[2].count, 0);
    let error = result.items[2].error.as_deref().unwrap();
    assert!(error.contains("500"), "{error}");

    assert_eq!(store.get_entry(&url_c).unwrap(), Some(stale));
    let fresh = store.get_entry(&urls[0]).unwrap().unwrap();
    assert_eq!(fresh.updated_at, result.refreshed_at);
    assert_eq!(names(&fresh.nodes), vec!["HK 01", "HK 02"]);
    assert_eq!(store.last_run_at().unwrap(), result.refreshed_at);
}

#[tokio::test]
async fn duplicate_urls_are_fetched_once() {
    let server = MockServer::start().await;
    mount_body(&server, "/a", uri_list_body(), 1).await;

    let url = format!("{}/a", server.uri());
    let engine = engine_with(store(), 4);
    let result = engine
        .refresh_many(&[url.clone(), format!("  {url}  "), String::new()])
        .await
        .unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.items[0].url, url);
}

#[tokio::test]
async fn fetches_send_the_configured_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ua"))
        .and(header("user-agent", DEFAULT_USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_string(uri_list_body()))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_with(store(), 1);
    let result = engine
        .refresh_many(&[format!("{}/ua", server.uri())])
        .await
        .unwrap();
    assert_eq!(result.success, 1);
}

#[tokio::test]
async fn single_permit_serializes_fetches() {
    let server = MockServer::start().await;
    for route in ["/s1", "/s2", "/s3"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(uri_list_body())
                    .set_delay(Duration::from_millis(150)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let engine = engine_with(store(), 1);
    let urls: Vec<String> = ["/s1", "/s2", "/s3"]
        .iter()
        .map(|r| format!("{}{r}", server.uri()))
        .collect();

    let started = Instant::now();
    let result = engine.refresh_many(&urls).await.unwrap();
    assert_eq!(result.success, 3);
    assert!(started.elapsed() >= Duration::from_millis(450));
}

#[tokio::test]
async fn concurrent_batches_do_not_interleave() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(uri_list_body())
                .set_delay(Duration::from_millis(150)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let engine = Arc::new(engine_with(store(), 8));
    let url = format!("{}/slow", server.uri());

    let started = Instant::now();
    let (first, second) = tokio::join!(
        engine.refresh_many(std::slice::from_ref(&url)),
        engine.refresh_many(std::slice::from_ref(&url)),
    );
    assert_eq!(first.unwrap().success, 1);
    assert_eq!(second.unwrap().success, 1);
    assert!(started.elapsed() >= Duration::from_millis(300));
}

// ─────────────────────────────────────────────────────────────────────────────
// Build from cache
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn build_serves_cached_sources_without_fetching() {
    let server = MockServer::start().await;
    mount_body(&server, "/cached", uri_list_body(), 0).await;
    mount_body(&server, "/missing", CLASH_YAML.to_string(), 1).await;

    let store = store();
    let cached = format!("{}/cached", server.uri());
    let missing = format!("{}/missing", server.uri());
    store
        .put_entry(
            &cached,
            &CacheEntry {
                nodes: vec![decode("trojan://pw@sg.example.com:443#SG%2001").unwrap()],
                updated_at: 1,
            },
        )
        .unwrap();

    let engine = engine_with(store.clone(), 4);
    let nodes = engine.build_from_cache(&[&cached, &missing]).await.unwrap();

    assert_eq!(names(&nodes), vec!["SG 01", "🇯🇵 Tokyo 01", "US-01"]);
    assert!(store.get_entry(&missing).unwrap().is_some());
}

#[tokio::test]
async fn build_skips_sources_that_cannot_be_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let engine = engine_with(store(), 4);
    let nodes = engine
        .build_from_cache(&[format!("{}/down", server.uri())])
        .await
        .unwrap();
    assert!(nodes.is_empty());
}

#[tokio::test]
async fn store_failures_propagate() {
    let engine = engine_with(Arc::new(UnavailableCache), 4);

    let err = engine.build_from_cache(&["https://a.example.com/sub"]).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));

    let err = engine.status(&["https://a.example.com/sub"]).unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
}

#[tokio::test]
async fn failing_last_run_write_fails_the_batch() {
    let server = MockServer::start().await;
    mount_body(&server, "/a", uri_list_body(), 1).await;

    let engine = engine_with(Arc::new(UnavailableCache), 4);
    let err = engine
        .refresh_many(&[format!("{}/a", server.uri())])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scheduler_refreshes_on_startup_then_waits_for_interval() {
    let server = MockServer::start().await;
    mount_body(&server, "/sched", uri_list_body(), 1).await;

    let store = store();
    store
        .save_sources(&[format!("{}/sched", server.uri())])
        .unwrap();

    let engine = Arc::new(engine_with(store.clone(), 4));
    let scheduler = Arc::new(
        RefreshScheduler::new(engine, store.clone()).with_tick(Duration::from_millis(20)),
    );
    let token = CancellationToken::new();
    let handle = scheduler.spawn(token.clone());

    let deadline = Instant::now() + Duration::from_secs(5);
    while store.last_run_at().unwrap() == 0 {
        assert!(Instant::now() < deadline, "startup refresh never ran");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // several more ticks; the interval has not elapsed so nothing refetches
    tokio::time::sleep(Duration::from_millis(100)).await;

    token.cancel();
    handle.await.unwrap();
}
