// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `(do, undo)` pair a task kind is registered with.

use ovl_core::id::TaskId;
use ovl_core::Clock;
use ovl_state::StateStore;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A handler's failure, logged onto the task and surfaced as the
/// enclosing change's `err` before teardown.
#[derive(Debug, Error, Clone)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// What a handler is given to do its work: the task it's driving, shared
/// state access, a clock for timestamping log entries, and a cancellation
/// token it must observe cooperatively once its change starts tearing
/// down.
pub struct TaskContext<C: Clock> {
    pub task_id: TaskId,
    pub state: Arc<StateStore>,
    pub tomb: CancellationToken,
    pub clock: C,
}

impl<C: Clock> TaskContext<C> {
    /// Append an info log entry to the task under the state lock.
    pub fn logf(&self, message: impl Into<String>) {
        let now_ms = self.clock.epoch_ms();
        let mut data = self.state.lock();
        if let Some(task) = data.tasks.get_mut(&self.task_id) {
            task.logf(now_ms, message);
        }
    }

    /// Append an error log entry to the task under the state lock.
    pub fn errorf(&self, message: impl Into<String>) {
        let now_ms = self.clock.epoch_ms();
        let mut data = self.state.lock();
        if let Some(task) = data.tasks.get_mut(&self.task_id) {
            task.errorf(now_ms, message);
        }
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// One direction of work for a task kind.
pub type HandlerFn<C> = Arc<dyn Fn(TaskContext<C>) -> HandlerFuture + Send + Sync>;

/// The pair registered for a task kind via [`crate::registry::HandlerRegistry::add`].
/// `do_fn` performs forward work; `undo_fn` is invoked to compensate for a
/// task that had already completed when its lane gets rolled back.
#[derive(Clone)]
pub struct Handler<C: Clock> {
    pub do_fn: HandlerFn<C>,
    pub undo_fn: HandlerFn<C>,
}

impl<C: Clock> Handler<C> {
    pub fn new(do_fn: HandlerFn<C>, undo_fn: HandlerFn<C>) -> Self {
        Self { do_fn, undo_fn }
    }

    /// A handler with no compensating action; `undo` is a no-op success.
    pub fn without_undo(do_fn: HandlerFn<C>) -> Self {
        Self { do_fn, undo_fn: Arc::new(|_ctx| Box::pin(async { Ok::<(), HandlerError>(()) })) }
    }
}
