// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine's driving loop: runs one [`ensure`] pass whenever an
//! `EnsureBefore` deadline arrives, a task completes, or a default
//! periodic tick elapses, until told to shut down.

use crate::ensure::{ensure, Tombs};
use crate::registry::HandlerRegistry;
use ovl_core::Clock;
use ovl_state::{EnsureSignal, StateStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fallback tick when nothing else has woken the loop, matching the state
/// store's "at least every five minutes" persistence cadence.
pub const DEFAULT_TICK: Duration = Duration::from_secs(5 * 60);

pub struct EngineLoop<C: Clock> {
    state: Arc<StateStore>,
    registry: Arc<HandlerRegistry<C>>,
    clock: C,
    ensure_signal: Arc<EnsureSignal>,
    completion: Arc<Notify>,
    tombs: Tombs,
    shutdown: CancellationToken,
}

impl<C: Clock> EngineLoop<C> {
    pub fn new(
        state: Arc<StateStore>,
        registry: Arc<HandlerRegistry<C>>,
        clock: C,
        ensure_signal: Arc<EnsureSignal>,
        completion: Arc<Notify>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { state, registry, clock, ensure_signal, completion, tombs: Arc::new(Mutex::new(HashMap::new())), shutdown }
    }

    /// Run a single `Ensure` pass directly, bypassing the wait. Used by
    /// callers (e.g. `RunCheck`-style out-of-band probes) that need an
    /// immediate pass without waiting for the next wake reason.
    pub fn ensure_now(&self) {
        ensure(&self.state, &self.registry, &self.clock, &self.completion, &self.tombs);
    }

    /// Run until the shutdown token fires. Every wake reason funnels into
    /// the same `Ensure` pass; there is no separate code path per trigger.
    pub async fn run(&self) {
        loop {
            let sleep_for = self
                .ensure_signal
                .peek_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(DEFAULT_TICK);

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("engine loop stopping");
                    return;
                }
                _ = self.ensure_signal.notified() => {
                    // A (possibly sooner) deadline just landed; loop back
                    // around to recompute `sleep_for` instead of running
                    // `Ensure` on this wake.
                    continue;
                }
                _ = self.completion.notified() => {}
                _ = tokio::time::sleep(sleep_for) => {
                    self.ensure_signal.take_deadline();
                }
            }

            self.ensure_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use ovl_core::clock::FakeClock;
    use ovl_state::TaskSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn completion_notification_drives_another_ensure_pass() {
        let state = Arc::new(StateStore::in_memory("boot-1"));
        let mut registry = HandlerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        registry.add(
            "start",
            Handler::without_undo(Arc::new(move |_ctx| {
                let calls = Arc::clone(&calls_clone);
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })),
        );
        let registry = Arc::new(registry);
        let ensure_signal = Arc::new(EnsureSignal::new());
        let completion = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        {
            let mut data = state.lock();
            let change_id = data.new_change("start", "s", 0);
            let task_id = data.new_task("start", "s", 0);
            data.add_tasks_to_change(change_id, &TaskSet::new([task_id]));
        }

        let engine =
            EngineLoop::new(Arc::clone(&state), registry, FakeClock::new(), ensure_signal, Arc::clone(&completion), shutdown.clone());

        let run = tokio::spawn(async move { engine.run().await });
        tokio::task::yield_now().await;
        completion.notify_waiters();
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_millis(500), run).await;

        assert!(calls.load(Ordering::SeqCst) >= 1);
    }
}
