// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `EnsureBefore` coalescing: requests the engine schedule an ensure pass
//! within some duration. Idempotent — a later, less urgent request never
//! pushes an already-pending deadline further out.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Default)]
pub struct EnsureSignal {
    deadline: Mutex<Option<Instant>>,
    notify: Notify,
}

impl EnsureSignal {
    pub fn new() -> Self {
        Self { deadline: Mutex::new(None), notify: Notify::new() }
    }

    /// Request an ensure pass within `within`. Only updates (and wakes the
    /// engine loop) if this request is sooner than any already pending.
    pub fn request(&self, within: Duration) {
        let candidate = Instant::now() + within;
        let mut deadline = self.deadline.lock();
        let should_wake = match *deadline {
            None => true,
            Some(existing) => candidate < existing,
        };
        if should_wake {
            *deadline = Some(candidate);
        }
        drop(deadline);
        if should_wake {
            // `notify_one`, not `notify_waiters`: it stores a permit when
            // nobody is currently waiting, so a request arriving between
            // two loop iterations (engine not yet back inside `select!`)
            // isn't lost.
            self.notify.notify_one();
        }
    }

    /// Take the pending deadline, if any, clearing it.
    pub fn take_deadline(&self) -> Option<Instant> {
        self.deadline.lock().take()
    }

    /// Look at the pending deadline without clearing it.
    pub fn peek_deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
