//! Per-key background refresh scheduling.
//!
//! Each active key owns exactly one tokio task that loops:
//!
//! ```text
//! sleep(delay)            state = Scheduled
//! job().await             state = Refreshing
//! delay = returned window (re-armed only after the job finished)
//! ```
//!
//! The window for the next cycle is whatever the job returns once its fetch
//! has landed, so a slow refresh pushes the next one out instead of
//! overlapping it. A job returning `None` ends the loop; the engine does that
//! once it has been dropped.
//!
//! The scheduler is an ordinary value owned by one engine. Dropping it aborts
//! every task it spawned, including any refresh that is mid-fetch.

use crate::state::{AtomicRefreshState, RefreshState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

/// One refresh attempt. Resolves to the delay before the next attempt, or
/// `None` to stop refreshing the key.
pub type RefreshJob = Arc<dyn Fn() -> BoxFuture<'static, Option<Duration>> + Send + Sync>;

struct Slot {
    id: u64,
    state: Arc<AtomicRefreshState>,
    handle: AbortHandle,
}

impl Slot {
    fn state(&self) -> RefreshState {
        if self.handle.is_finished() {
            RefreshState::Idle
        } else {
            self.state.load()
        }
    }
}

/// Owns the timer table of one engine.
pub struct RefreshScheduler {
    slots: Arc<DashMap<String, Slot>>,
    next_id: AtomicU64,
    shut_down: Arc<AtomicBool>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        RefreshScheduler {
            slots: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Schedule `job` to run after `delay`, replacing any scheduled timer
    /// for `key` (last writer wins; the replaced task is aborted).
    ///
    /// A refresh that is already in flight is left alone: it re-arms the key
    /// itself once it lands.
    ///
    /// Returns `false` once the scheduler has been shut down.
    pub fn arm(&self, key: &str, delay: Duration, job: RefreshJob) -> bool {
        if self.is_shut_down() {
            return false;
        }

        let id = match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().state() == RefreshState::Refreshing {
                    debug!("» Refresh already in flight for {}, keeping it", key);
                    return true;
                }
                let slot = self.spawn(key, delay, job);
                let id = slot.id;
                occupied.insert(slot).handle.abort();
                debug!("» Re-armed refresh timer for {} (previous timer cancelled)", key);
                id
            }
            Entry::Vacant(vacant) => {
                let slot = self.spawn(key, delay, job);
                let id = slot.id;
                vacant.insert(slot);
                debug!("» Armed refresh timer for {} in {:?}", key, delay);
                id
            }
        };

        !self.undo_if_shut_down(key, id)
    }

    /// Schedule `job` to run after `delay`, but only if nothing is scheduled
    /// or in flight for `key`. Returns whether this call armed it.
    pub fn arm_if_idle(&self, key: &str, delay: Duration, job: RefreshJob) -> bool {
        self.start_if_idle(key, delay, job)
    }

    /// Start refreshing `key` right away, but only if nothing is scheduled
    /// or in flight for it.
    ///
    /// The check and the insert happen under the key's shard lock, so two
    /// racing callers start at most one refresh. Returns whether this call
    /// started it.
    pub fn ensure_refresh(&self, key: &str, job: RefreshJob) -> bool {
        let started = self.start_if_idle(key, Duration::ZERO, job);
        if started {
            debug!("» Background refresh triggered for {}", key);
        }
        started
    }

    /// Current refresh state of `key`.
    pub fn state(&self, key: &str) -> RefreshState {
        self.slots
            .get(key)
            .map(|slot| slot.state())
            .unwrap_or_default()
    }

    /// Whether `key` has a live timer or refresh.
    pub fn is_active(&self, key: &str) -> bool {
        self.state(key) != RefreshState::Idle
    }

    /// Cancel the timer (and any in-flight refresh) for `key`.
    pub fn cancel(&self, key: &str) -> bool {
        match self.slots.remove(key) {
            Some((_, slot)) => {
                slot.handle.abort();
                debug!("» Cancelled refresh timer for {}", key);
                true
            }
            None => false,
        }
    }

    /// Cancel every timer and refuse to arm new ones.
    ///
    /// Returns the number of timers cancelled.
    pub fn shutdown(&self) -> usize {
        self.shut_down.store(true, Ordering::SeqCst);
        self.cancel_all()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Number of keys with a live timer.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !slot.handle.is_finished())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cancel_all(&self) -> usize {
        let keys: Vec<String> = self.slots.iter().map(|slot| slot.key().clone()).collect();
        keys.iter().filter(|key| self.cancel(key)).count()
    }

    fn start_if_idle(&self, key: &str, delay: Duration, job: RefreshJob) -> bool {
        if self.is_shut_down() {
            return false;
        }

        let id = match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().handle.is_finished() {
                    return false;
                }
                // Leftover slot of a loop that already exited
                let slot = self.spawn(key, delay, job);
                let id = slot.id;
                occupied.insert(slot);
                id
            }
            Entry::Vacant(vacant) => {
                let slot = self.spawn(key, delay, job);
                let id = slot.id;
                vacant.insert(slot);
                id
            }
        };

        !self.undo_if_shut_down(key, id)
    }

    /// Remove slot `id` again if `shutdown` ran while it was being inserted.
    ///
    /// `shutdown` raises the flag before sweeping the table, so an insert the
    /// sweep missed always sees the flag here.
    fn undo_if_shut_down(&self, key: &str, id: u64) -> bool {
        if !self.is_shut_down() {
            return false;
        }

        if let Some((_, slot)) = self.slots.remove_if(key, |_, slot| slot.id == id) {
            slot.handle.abort();
            debug!("» Dropped refresh timer for {} armed during shutdown", key);
        }
        true
    }

    fn spawn(&self, key: &str, delay: Duration, job: RefreshJob) -> Slot {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let initial = if delay.is_zero() {
            RefreshState::Refreshing
        } else {
            RefreshState::Scheduled
        };
        let state = Arc::new(AtomicRefreshState::new(initial));

        let task = refresh_loop(
            Arc::clone(&self.slots),
            Arc::clone(&self.shut_down),
            key.to_string(),
            id,
            Arc::clone(&state),
            delay,
            job,
        );
        let handle = tokio::spawn(task).abort_handle();

        Slot { id, state, handle }
    }
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        let cancelled = self.cancel_all();
        if cancelled > 0 {
            debug!("» Scheduler dropped, {} refresh timers cancelled", cancelled);
        }
    }
}

async fn refresh_loop(
    slots: Arc<DashMap<String, Slot>>,
    shut_down: Arc<AtomicBool>,
    key: String,
    id: u64,
    state: Arc<AtomicRefreshState>,
    mut delay: Duration,
    job: RefreshJob,
) {
    loop {
        if !delay.is_zero() {
            state.store(RefreshState::Scheduled);
            tokio::time::sleep(delay).await;
        }

        if shut_down.load(Ordering::SeqCst) {
            break;
        }

        state.store(RefreshState::Refreshing);
        match job().await {
            Some(next) => delay = next,
            None => break,
        }
    }

    state.store(RefreshState::Idle);
    // Only remove our own slot; the key may have been re-armed meanwhile
    slots.remove_if(&key, |_, slot| slot.id == id);
    debug!("» Refresh loop for {} stopped", key);
}
