//! Throttle — bounded-frequency delivery that keeps the latest sample.
//!
//! DESIGN
//! ======
//! Leading edge plus a single trailing timer:
//! - If `delay` has elapsed since the last delivery, `submit` calls the sink
//!   synchronously and restarts the clock.
//! - Otherwise the sample is parked. One timer is armed for the *remaining*
//!   wait; later submissions overwrite the parked sample instead of queueing.
//! - When the timer fires it delivers whatever is parked and restarts the
//!   clock at the firing instant.
//!
//! Intermediate samples inside a collapsed window are dropped. Position data
//! is stale-tolerant, so only the newest one matters.
//!
//! LIFECYCLE
//! =========
//! `cancel` is terminal: it aborts the armed timer, discards the parked
//! sample, and turns later submissions into no-ops. A timer that wakes up
//! re-checks the cancelled flag under the lock, so no delivery *starts* after
//! `cancel` returns. The sink runs outside the lock, though: on a
//! multi-thread runtime a delivery that already took its sample may still
//! be inside the sink when `cancel` returns. Sinks that must not act after
//! teardown need their own guard (the channel handle checks its state under
//! its own lock). Dropping the throttle cancels.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

// =============================================================================
// THROTTLE
// =============================================================================

pub struct Throttle<T> {
    delay: Duration,
    sink: Sink<T>,
    inner: Arc<Mutex<ThrottleInner<T>>>,
}

struct ThrottleInner<T> {
    /// When the sink last ran. `None` until the first delivery.
    last_invoked: Option<Instant>,
    /// Newest sample waiting for the trailing timer.
    pending: Option<T>,
    /// The single armed trailing timer, if any.
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever an armed timer is superseded; stale timers bail out.
    generation: u64,
    cancelled: bool,
}

impl<T: Send + 'static> Throttle<T> {
    /// Create a throttle delivering to `sink` at most once per `delay`.
    /// A zero delay delivers every submission immediately.
    pub fn new<F>(delay: Duration, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            delay,
            sink: Arc::new(sink),
            inner: Arc::new(Mutex::new(ThrottleInner {
                last_invoked: None,
                pending: None,
                timer: None,
                generation: 0,
                cancelled: false,
            })),
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Offer a sample. Delivers now or parks it for the trailing timer.
    ///
    /// Arming the trailing timer needs a Tokio runtime; without one the
    /// sample stays parked until a later submission can arm it.
    pub fn submit(&self, args: T) {
        let now = Instant::now();
        let mut inner = self.lock();
        if inner.cancelled {
            return;
        }

        let remaining = match inner.last_invoked {
            Some(last) => self.delay.saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        };

        if remaining.is_zero() {
            if let Some(timer) = inner.timer.take() {
                timer.abort();
            }
            inner.generation = inner.generation.wrapping_add(1);
            inner.pending = None;
            inner.last_invoked = Some(now);
            drop(inner);
            (self.sink)(args);
            return;
        }

        inner.pending = Some(args);
        if inner.timer.is_none() {
            let generation = inner.generation;
            inner.timer = self.arm(remaining, generation);
        }
    }

    /// Abort the trailing timer and refuse further submissions. Idempotent.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        inner.cancelled = true;
        inner.pending = None;
        inner.generation = inner.generation.wrapping_add(1);
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Whether a sample is parked waiting for the trailing timer.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    fn arm(&self, wait: Duration, generation: u64) -> Option<JoinHandle<()>> {
        let Ok(runtime) = Handle::try_current() else {
            warn!("throttle: no tokio runtime, trailing sample parked");
            return None;
        };
        let inner = Arc::clone(&self.inner);
        let sink = Arc::clone(&self.sink);

        Some(runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            let args = {
                let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                if inner.cancelled || inner.generation != generation {
                    return;
                }
                inner.timer = None;
                let args = inner.pending.take();
                if args.is_some() {
                    inner.last_invoked = Some(Instant::now());
                }
                args
            };
            if let Some(args) = args {
                sink(args);
            }
        }))
    }
}

impl<T> Throttle<T> {
    fn lock(&self) -> MutexGuard<'_, ThrottleInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for Throttle<T> {
    fn drop(&mut self) {
        let mut inner = self.lock();
        inner.cancelled = true;
        inner.pending = None;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "throttle_test.rs"]
mod tests;
