//! # swr-memo
//!
//! Stale-while-revalidate memoization for async fetch functions.
//!
//! Wrap an idempotent async operation once; every call with the same logical
//! arguments is then answered from the cache, while a per-key background
//! task re-runs the operation every `ttl` and overwrites the cached value.
//! Callers only ever wait on the very first fetch of a key.
//!
//! ## Features
//!
//! - **Non-blocking reads:** warm keys return immediately, refreshes happen off the call path
//! - **Backend Agnostic:** bounded in-memory store by default, Redis and Memcached behind features, or any [`CacheBackend`]
//! - **One refresh per key:** explicit `Idle / Scheduled / Refreshing` state, never two overlapping refreshes
//! - **Failure tolerant:** store errors degrade to misses, refresh errors keep the previous value
//! - **Production Ready:** built-in logging, metrics hooks, and error handling
//!
//! ## Quick Start
//!
//! ```
//! use swr_memo::{create_swr, CallOutcome, Error};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> swr_memo::Result<()> {
//! // 1. The operation to memoize
//! let fetch_user = |id: u64| async move {
//!     Ok::<_, Error>(format!("user-{}", id))
//! };
//!
//! // 2. Wrap it; the handle is Clone and can be shared across tasks
//! let get_user = create_swr(fetch_user, Duration::from_secs(30))?;
//!
//! // 3. First call fetches, later calls are served from the cache
//! assert_eq!(get_user.call(7).await?, "user-7");
//! let again = get_user.call_detailed(7).await?;
//! assert_eq!(again.outcome, CallOutcome::Hit);
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Setup
//!
//! Use [`SwrBuilder`] for namespaces, custom keys, metrics, or another store:
//!
//! ```ignore
//! use swr_memo::{SwrBuilder, backend::RedisBackend, observability::LogMetrics};
//!
//! let get_report = SwrBuilder::new(fetch_report)
//!     .ttl(Duration::from_secs(60))
//!     .store_ttl(Duration::from_secs(300))
//!     .namespace("reports")
//!     .key_deriver(|(team, _verbose): &(String, bool)| team.clone())
//!     .metrics(Box::new(LogMetrics))
//!     .backend(RedisBackend::from_connection_string("redis://localhost:6379").await?)
//!     .build()?;
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod key;
pub mod observability;
pub mod scheduler;
pub mod serialization;
pub mod service;
pub mod state;

// Re-exports for convenience
pub use backend::{CacheBackend, EvictionPolicy, InMemoryBackend};
pub use builder::{create_swr, SwrBuilder};
pub use config::SwrConfig;
pub use engine::{SwrEngine, SwrResponse};
pub use error::{Error, Result};
pub use fetcher::Fetcher;
pub use key::KeyDeriver;
pub use service::SwrService;
pub use state::{CallOutcome, RefreshState};

/// Canonical string identity of one call's arguments.
pub type CacheKey = String;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
