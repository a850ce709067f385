//! Plugging a custom store into the memoizer.
//!
//! The store below keeps values in a `tokio::sync::RwLock<HashMap>` and
//! records every operation, which makes the SWR traffic visible.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use swr_memo::{
    backend::CacheBackend, error::Result, observability::CounterMetrics, Error, SwrBuilder,
};
use tokio::sync::RwLock;

#[derive(Clone, Default)]
struct TracingStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    log: Arc<RwLock<Vec<String>>>,
}

impl TracingStore {
    async fn record(&self, line: String) {
        println!("  [STORE] {}", line);
        self.log.write().await.push(line);
    }
}

impl CacheBackend for TracingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.entries.read().await.get(key).cloned();
        self.record(format!(
            "GET {} -> {}",
            key,
            if value.is_some() { "hit" } else { "miss" }
        ))
        .await;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.record(format!("SET {} ({} bytes, ttl {:?})", key, value.len(), ttl))
            .await;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();

    println!("\n=== swr-memo - Custom Backend Example ===\n");

    let store = TracingStore::default();
    let metrics = Arc::new(CounterMetrics::default());

    let lookup = SwrBuilder::new(|(user, region): (u64, String)| async move {
        if region.is_empty() {
            return Err(Error::fetch("region required"));
        }
        Ok(format!("profile of user {} in {}", user, region))
    })
    .ttl(Duration::from_millis(500))
    .store_ttl(Duration::from_secs(5))
    .namespace("profiles")
    .metrics(Box::new(Arc::clone(&metrics)))
    .backend_factory(|| async { Ok(store.clone()) })
    .await?
    .build()?;

    for round in 1..=3 {
        println!("Round {}:", round);
        let response = lookup.call_detailed((7, "eu".to_string())).await?;
        println!("  -> {} ({})\n", response.value, response.outcome);
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    lookup.shutdown();

    let snapshot = metrics.snapshot();
    println!(
        "Hits: {}, stale: {}, misses: {}, refreshes: {}",
        snapshot.hits, snapshot.stale, snapshot.misses, snapshot.refreshes
    );
    println!("Store operations: {}", store.log.read().await.len());

    println!("\n=== Example Complete ===\n");

    Ok(())
}
