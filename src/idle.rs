use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Tracks request activity so an idle worker can shut itself down.
#[derive(Clone, Debug)]
pub(crate) struct IdleTracker {
    inner: Arc<IdleState>,
}

#[derive(Debug)]
struct IdleState {
    timeout: Option<Duration>,
    in_flight: AtomicUsize,
    last_activity: Mutex<Instant>,
    released: Notify,
}

/// Marks one request as in flight until dropped.
pub(crate) struct ActivityGuard {
    tracker: IdleTracker,
}

impl IdleTracker {
    /// A zero `timeout` disables idle shutdown.
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(IdleState {
                timeout: (!timeout.is_zero()).then_some(timeout),
                in_flight: AtomicUsize::new(0),
                last_activity: Mutex::new(Instant::now()),
                released: Notify::new(),
            }),
        }
    }

    pub(crate) fn begin(&self) -> ActivityGuard {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        ActivityGuard {
            tracker: self.clone(),
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        if let Ok(mut last) = self.inner.last_activity.lock() {
            *last = Instant::now();
        }
    }

    fn last_activity(&self) -> Instant {
        match self.inner.last_activity.lock() {
            Ok(last) => *last,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Resolves once no request is in flight and none finished for the whole
    /// timeout. Never resolves when idle shutdown is disabled.
    pub(crate) async fn wait_idle(&self) {
        let Some(timeout) = self.inner.timeout else {
            return std::future::pending().await;
        };

        loop {
            let released = self.inner.released.notified();
            if self.in_flight() > 0 {
                released.await;
                continue;
            }

            let deadline = self.last_activity() + timeout;
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.tracker.touch();
        self.tracker.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.tracker.inner.released.notify_waiters();
    }
}

pub(crate) async fn track_activity(
    State(tracker): State<IdleTracker>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = tracker.begin();
    next.run(request).await
}
