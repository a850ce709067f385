//! The wrapped fetch function.
//!
//! A [`Fetcher`] is the idempotent async operation being memoized. Any
//! closure `Fn(A) -> impl Future<Output = Result<R>>` already is one:
//!
//! ```
//! use swr_memo::{Fetcher, Result};
//!
//! # async fn demo() -> Result<()> {
//! let fetch = |id: u32| async move { Ok::<_, swr_memo::Error>(format!("data:{}", id)) };
//! assert_eq!(fetch.fetch(1).await?, "data:1");
//! # Ok(())
//! # }
//! ```
//!
//! Implement the trait directly for clients that carry state (a connection
//! pool, an HTTP client). Return `Error::FetchError` (see
//! [`Error::fetch`](crate::Error::fetch)) for upstream failures.
//!
//! # Concurrency
//!
//! The engine may call `fetch` for the same arguments concurrently: once per
//! concurrent cold caller (unless single-flight is enabled) and once from the
//! background refresh. Fetchers must tolerate that.

use crate::error::Result;
use std::future::Future;

/// Trait for the wrapped fetch operation.
pub trait Fetcher<A, R>: Send + Sync {
    /// Produce a fresh value for `args`.
    ///
    /// # Errors
    ///
    /// Any error is returned to a cold caller, or logged and absorbed when
    /// the call came from a background refresh.
    fn fetch(&self, args: A) -> impl Future<Output = Result<R>> + Send;
}

impl<A, R, F, Fut> Fetcher<A, R> for F
where
    F: Fn(A) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R>> + Send,
{
    fn fetch(&self, args: A) -> impl Future<Output = Result<R>> + Send {
        (self)(args)
    }
}
