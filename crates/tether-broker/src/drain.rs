//! In-flight connection tracking for graceful shutdown
//!
//! Every dial/listen invocation holds a guard for its lifetime; the
//! server waits for the group to empty before exiting.

use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    active: Mutex<usize>,
    idle: Notify,
}

/// Counted group of in-flight tunnel invocations.
#[derive(Clone, Default)]
pub struct ConnectionGroup {
    inner: Arc<Inner>,
}

impl ConnectionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the group. The returned guard leaves it on drop.
    pub fn acquire(&self) -> ConnectionGuard {
        let mut active = self.inner.active.lock().unwrap();
        *active += 1;
        ConnectionGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn active(&self) -> usize {
        *self.inner.active.lock().unwrap()
    }

    /// Wait until no invocation holds a guard.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if *self.inner.active.lock().unwrap() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Membership in a [`ConnectionGroup`].
pub struct ConnectionGuard {
    inner: Arc<Inner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut active = self.inner.active.lock().unwrap();
        *active -= 1;
        if *active == 0 {
            self.inner.idle.notify_waiters();
        }
    }
}
