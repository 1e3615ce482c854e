//! Integration tests for `RedisCacheStore` using testcontainers.
//!
//! Docker must be running. Run with `cargo test -p reporting-redis -- --ignored`.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code uses expect for clear failure messages

use reporting_core::cache::CacheStore;
use reporting_redis::RedisCacheStore;
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;

async fn setup_cache() -> (ContainerAsync<Redis>, RedisCacheStore) {
    let container = Redis::default()
        .start()
        .await
        .expect("Failed to start redis container");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get redis port");

    let cache = RedisCacheStore::new(&format!("redis://127.0.0.1:{port}"))
        .await
        .expect("Failed to connect to redis");
    (container, cache)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn set_get_delete() {
    let (_container, cache) = setup_cache().await;

    cache.set("report-R1", br#"{"id":"R1"}"#).await.unwrap();
    assert_eq!(
        cache.get("report-R1").await.unwrap(),
        Some(br#"{"id":"R1"}"#.to_vec())
    );

    cache.delete("report-R1").await.unwrap();
    assert_eq!(cache.get("report-R1").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn deleting_absent_key_succeeds() {
    let (_container, cache) = setup_cache().await;

    cache.delete("report-missing").await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn entries_expire_after_ttl() {
    let (_container, cache) = setup_cache().await;
    let cache = cache.with_ttl(Duration::from_secs(1));

    cache.set("report-R1", b"{}").await.unwrap();
    assert!(cache.get("report-R1").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(cache.get("report-R1").await.unwrap(), None);
}
