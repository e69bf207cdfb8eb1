//! Request coalescing: at most one in-flight computation per key.
//!
//! The first caller for a key becomes the leader and runs the computation.
//! Callers arriving while it runs subscribe to the leader's result instead of
//! starting their own. The entry is cleared once the leader finishes, so the
//! next call after that computes afresh.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    hash::Hash,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::watch;
use tracing::debug;

use crate::error::{MediaError, Result};

type Shared<V> = std::result::Result<V, Arc<MediaError>>;
type Slot<V> = watch::Receiver<Option<Shared<V>>>;

pub struct SingleFlight<K, V> {
    calls: Mutex<HashMap<K, Slot<V>>>,
    leaders: AtomicU64,
    waiters: AtomicU64,
}

enum Role<V> {
    Lead(watch::Sender<Option<Shared<V>>>),
    Wait(Slot<V>),
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            leaders: AtomicU64::new(0),
            waiters: AtomicU64::new(0),
        }
    }

    /// Run `f` for `key`, or join the run already in flight.
    ///
    /// Every caller sharing a run gets the same value. Errors are shared too
    /// and come back as [`MediaError::Shared`]. If the leader is dropped
    /// before finishing, its waiters get [`MediaError::Cancelled`].
    pub async fn run<F, Fut>(&self, key: K, f: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        match self.join(&key) {
            Role::Wait(mut rx) => {
                let outcome = rx
                    .wait_for(Option::is_some)
                    .await
                    .map(|slot| slot.clone())
                    .map_err(|_| {
                        MediaError::Cancelled(format!("leader for {key:?} went away"))
                    })?;
                match outcome {
                    Some(shared) => shared.map_err(MediaError::Shared),
                    None => Err(MediaError::Internal(format!(
                        "singleflight for {key:?} resolved empty"
                    ))),
                }
            }
            Role::Lead(tx) => {
                let _clear = ClearOnDrop { flight: self, key: &key };
                let shared: Shared<V> = f().await.map_err(Arc::new);
                // Waiters may all have gone; that is fine.
                let _ = tx.send(Some(shared.clone()));
                debug!(key = ?key, "singleflight complete");
                shared.map_err(MediaError::Shared)
            }
        }
    }

    /// Keys currently being computed.
    pub fn in_flight(&self) -> usize {
        self.lock_calls().len()
    }

    fn join(&self, key: &K) -> Role<V> {
        let mut calls = self.lock_calls();
        if let Some(rx) = calls.get(key) {
            let waiters = self.waiters.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                key = ?key,
                leaders = self.leaders.load(Ordering::Relaxed),
                waiters,
                "singleflight wait"
            );
            return Role::Wait(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        calls.insert(key.clone(), rx);
        let leaders = self.leaders.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            key = ?key,
            leaders,
            waiters = self.waiters.load(Ordering::Relaxed),
            "singleflight lead"
        );
        Role::Lead(tx)
    }

    fn lock_calls(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the leader's entry whether it finishes or is dropped mid-run.
struct ClearOnDrop<'a, K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    flight: &'a SingleFlight<K, V>,
    key: &'a K,
}

impl<K, V> Drop for ClearOnDrop<'_, K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    fn drop(&mut self) {
        self.flight.lock_calls().remove(self.key);
    }
}

impl<K, V> fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_flight = self.calls.lock().ok().map(|calls| calls.len());
        f.debug_struct("SingleFlight")
            .field("in_flight", &in_flight)
            .field("leaders", &self.leaders.load(Ordering::Relaxed))
            .field("waiters", &self.waiters.load(Ordering::Relaxed))
            .finish()
    }
}
