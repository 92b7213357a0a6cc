//! A minimal cancellation scope, standing in for the host's outer context.
//!
//! The scheduler derives one [`Cancellation`] per `simulate` call. Any fiber
//! that observes it becomes a no-op; `Scheduler::step` checks it before
//! taking any action (spec §5, "Cancellation").

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's outer context was cancelled before or during the run.
    Caller,
    /// An operation body returned an error.
    OpFailure,
}

struct Inner {
    flag: AtomicBool,
    reason: std::sync::Mutex<Option<CancelReason>>,
    notify: Notify,
}

/// Handle used to trigger cancellation.
#[derive(Clone)]
pub struct Canceller(Arc<Inner>);

/// Handle used to observe cancellation. Cheap to clone; shared by every
/// fiber and the scheduler's own step loop.
#[derive(Clone)]
pub struct Cancellation(Arc<Inner>);

pub fn scope() -> (Canceller, Cancellation) {
    let inner = Arc::new(Inner {
        flag: AtomicBool::new(false),
        reason: std::sync::Mutex::new(None),
        notify: Notify::new(),
    });
    (Canceller(inner.clone()), Cancellation(inner))
}

impl Canceller {
    /// Cancels the scope. Idempotent: only the first call's reason sticks.
    pub fn cancel(&self, reason: CancelReason) {
        if !self.0.flag.swap(true, Ordering::SeqCst) {
            *self.0.reason.lock().unwrap() = Some(reason);
        }
        self.0.notify.notify_waiters();
    }
}

impl Cancellation {
    pub fn is_cancelled(&self) -> bool {
        self.0.flag.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.0.reason.lock().unwrap()
    }

    /// Resolves once the scope is cancelled. A no-op future if already
    /// cancelled at the time of the call.
    pub fn cancelled(&self) -> impl Future<Output = ()> + '_ {
        let notified = self.0.notify.notified();
        let already = self.is_cancelled();
        async move {
            if already {
                return;
            }
            notified.await;
        }
    }
}
