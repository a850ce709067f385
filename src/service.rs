//! High-level memoized function handle.
//!
//! Provides a convenient wrapper around [`SwrEngine`] with `Arc` for easy
//! sharing.

use crate::backend::{CacheBackend, InMemoryBackend};
use crate::config::SwrConfig;
use crate::engine::{SwrEngine, SwrResponse};
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::state::RefreshState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// The memoized function.
///
/// Wraps `SwrEngine` in `Arc`, so clones are cheap and all of them share one
/// store and one refresh scheduler. Background refreshes stop when the last
/// clone is dropped or [`shutdown`](Self::shutdown) is called.
///
/// # Example
///
/// ```ignore
/// use swr_memo::{create_swr, Error};
/// use std::time::Duration;
///
/// let get_user = create_swr(
///     |id: u64| async move { users_api::get(id).await.map_err(Error::fetch) },
///     Duration::from_secs(30),
/// )?;
///
/// // In your web service struct
/// pub struct UserService {
///     get_user: SwrService<u64, User, UserFetcher>,
/// }
///
/// let user = get_user.call(42).await?;
/// ```
pub struct SwrService<A, R, F, B = InMemoryBackend> {
    engine: Arc<SwrEngine<A, R, F, B>>,
}

impl<A, R, F, B> Clone for SwrService<A, R, F, B> {
    fn clone(&self) -> Self {
        SwrService {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<A, R, F, B> SwrService<A, R, F, B>
where
    A: Serialize + Clone + Send + Sync + 'static,
    R: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fetcher<A, R> + 'static,
    B: CacheBackend + 'static,
{
    pub fn from_engine(engine: SwrEngine<A, R, F, B>) -> Self {
        SwrService {
            engine: Arc::new(engine),
        }
    }

    /// Call the memoized function.
    ///
    /// # Errors
    ///
    /// See [`SwrEngine::call`].
    pub async fn call(&self, args: A) -> Result<R> {
        self.engine.call(args).await
    }

    /// Call and report whether the value was a hit, a stale read, or a miss.
    ///
    /// # Errors
    ///
    /// See [`SwrEngine::call`].
    pub async fn call_detailed(&self, args: A) -> Result<SwrResponse<R>> {
        self.engine.call_detailed(args).await
    }

    /// # Errors
    ///
    /// Returns `Error::KeyDerivationError` if `args` cannot be keyed.
    pub fn refresh_state(&self, args: &A) -> Result<RefreshState> {
        self.engine.refresh_state(args)
    }

    pub fn active_refreshes(&self) -> usize {
        self.engine.active_refreshes()
    }

    /// Stop every background refresh for all clones of this handle.
    pub fn shutdown(&self) -> usize {
        self.engine.shutdown()
    }

    pub fn is_shut_down(&self) -> bool {
        self.engine.is_shut_down()
    }

    pub fn backend(&self) -> &B {
        self.engine.backend()
    }

    pub fn config(&self) -> &SwrConfig {
        self.engine.config()
    }

    /// Access the underlying engine (for advanced use).
    pub fn engine(&self) -> &SwrEngine<A, R, F, B> {
        &self.engine
    }
}
