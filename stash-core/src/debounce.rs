//! Trailing-edge debouncing of a single action.
//!
//! A [`Debouncer`] is a two-state machine, `Idle` and `Pending`. The first
//! trigger moves it to `Pending` and spawns one timer task; later triggers
//! only push the deadline out. When the timer finds that `wait` has passed
//! since the latest trigger, the machine returns to `Idle` and the action
//! runs once. A trigger after that starts a fresh cycle.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::time::{Instant, sleep_until};
use tokio_util::task::TaskTracker;
use tracing::debug;

type Action = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Pending { last_trigger: Instant },
}

pub struct Debouncer {
    inner: Arc<Inner>,
}

struct Inner {
    wait: Duration,
    state: Mutex<State>,
    action: Action,
    tracker: Option<TaskTracker>,
}

impl Debouncer {
    pub fn new<F, Fut>(wait: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::build(wait, action, None)
    }

    /// Same as [`Debouncer::new`], but timer tasks (and the action they run)
    /// are spawned on `tracker` so an owner can wait for them to drain.
    pub fn tracked<F, Fut>(wait: Duration, tracker: TaskTracker, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::build(wait, action, Some(tracker))
    }

    fn build<F, Fut>(wait: Duration, action: F, tracker: Option<TaskTracker>) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: Action = Arc::new(move || Box::pin(action()));
        Self {
            inner: Arc::new(Inner {
                wait,
                state: Mutex::new(State::Idle),
                action,
                tracker,
            }),
        }
    }

    /// Record a trigger now. Schedules the action if nothing is pending.
    pub fn trigger(&self) {
        let now = Instant::now();
        {
            let mut state = self.inner.lock_state();
            let was_idle = *state == State::Idle;
            *state = State::Pending { last_trigger: now };
            if !was_idle {
                return;
            }
        }

        let inner = Arc::clone(&self.inner);
        let task = async move { inner.run().await };
        match &self.inner.tracker {
            Some(tracker) => {
                tracker.spawn(task);
            }
            None => {
                tokio::spawn(task);
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.lock_state(), State::Pending { .. })
    }

    pub fn wait(&self) -> Duration {
        self.inner.wait
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run(&self) {
        loop {
            let deadline = match *self.lock_state() {
                State::Pending { last_trigger } => last_trigger + self.wait,
                State::Idle => return,
            };
            sleep_until(deadline).await;

            let mut state = self.lock_state();
            match *state {
                State::Pending { last_trigger } if Instant::now() >= last_trigger + self.wait => {
                    *state = State::Idle;
                    break;
                }
                State::Pending { .. } => {
                    debug!("debounce rescheduled");
                }
                State::Idle => return,
            }
        }

        (self.action)().await;
    }
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.state.try_lock() {
            Ok(guard) => format!("{:?}", *guard),
            Err(_) => "<locked>".to_string(),
        };
        f.debug_struct("Debouncer")
            .field("wait", &self.inner.wait)
            .field("state", &state)
            .field("tracked", &self.inner.tracker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::{advance, sleep};

    use super::*;

    fn counting(wait: Duration) -> (Debouncer, Arc<AtomicUsize>, Arc<Mutex<Vec<Instant>>>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let fired = Arc::new(Mutex::new(Vec::new()));
        let debouncer = {
            let runs = Arc::clone(&runs);
            let fired = Arc::clone(&fired);
            Debouncer::new(wait, move || {
                runs.fetch_add(1, Ordering::SeqCst);
                fired.lock().unwrap().push(Instant::now());
                async {}
            })
        };
        (debouncer, runs, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_triggers_runs_once_after_quiet_period() {
        let wait = Duration::from_secs(5);
        let (debouncer, runs, fired) = counting(wait);
        let start = Instant::now();

        for _ in 0..10 {
            debouncer.trigger();
            advance(Duration::from_secs(1)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        sleep(Duration::from_secs(30)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let last_trigger = start + Duration::from_secs(9);
        assert!(fired.lock().unwrap()[0] >= last_trigger + wait);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_after_firing_starts_new_cycle() {
        let (debouncer, runs, _) = counting(Duration::from_millis(500));

        debouncer.trigger();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        debouncer.trigger();
        debouncer.trigger();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tracked_runs_can_be_drained() {
        let tracker = TaskTracker::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let debouncer = {
            let runs = Arc::clone(&runs);
            Debouncer::tracked(Duration::from_secs(2), tracker.clone(), move || {
                let runs = Arc::clone(&runs);
                async move {
                    sleep(Duration::from_secs(1)).await;
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        debouncer.trigger();
        tracker.close();
        tracker.wait().await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
