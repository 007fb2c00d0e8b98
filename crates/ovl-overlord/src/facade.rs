// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The overlord facade: the single object that owns every collaborator
//! (state store, state engine, service manager, check manager, log
//! broker, access resolver) and correlates them — most visibly, turning
//! a check's down transition into the service action its plan entry
//! asked for.

use ovl_access::{resolve_access as resolve_access_level, PairingWindow, PeerCredentials, Transport};
use ovl_checks::{CheckManager, CheckSnapshot};
use ovl_core::id::ChangeId;
use ovl_core::{AccessLevel, Clock, CoreError, ErrorKind};
use ovl_engine::{EngineLoop, HandlerRegistry};
use ovl_logs::LogBroker;
use ovl_plan::{FailureAction, Plan};
use ovl_services::{ServiceManager, ServiceSnapshot};
use ovl_state::{ChangeStatus, StateStore, TaskStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// How the daemon's run loop ended, so the binary entrypoint knows
/// whether to exec itself again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Shutdown,
    Restart,
}

/// A point-in-time view of a tracked change, for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeSnapshot {
    pub id: ChangeId,
    pub kind: String,
    pub summary: String,
    pub status: ChangeStatus,
    pub err: Option<String>,
}

/// How often the background correlator checks for down events and
/// restart requests left by the service and check managers.
const CORRELATOR_TICK: Duration = Duration::from_millis(250);

/// Upper bound on how long a dirty state can go unflushed even if nothing
/// ever wakes the writer's `Notify` (belt-and-braces against a missed
/// notification racing a fresh lock/unlock).
const WRITER_MAX_INTERVAL: Duration = Duration::from_secs(5);

pub struct Overlord<C: Clock> {
    plan: Mutex<Arc<Plan>>,
    state: Arc<StateStore>,
    services: Arc<ServiceManager<C>>,
    checks: Arc<CheckManager>,
    broker: Arc<LogBroker>,
    engine: EngineLoop<C>,
    pairing: PairingWindow,
    daemon_uid: u32,
    ensure_signal: Arc<ovl_state::EnsureSignal>,
    completion: Arc<Notify>,
    shutdown: CancellationToken,
    restart_requested: AtomicBool,
    clock: C,
}

impl<C: Clock> Overlord<C> {
    pub fn new(plan: Arc<Plan>, state: Arc<StateStore>, broker: Arc<LogBroker>, clock: C, daemon_uid: u32) -> Arc<Self> {
        let ensure_signal = Arc::new(ovl_state::EnsureSignal::new());
        let completion = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let services = ServiceManager::new(Arc::clone(&plan), Arc::clone(&state), Arc::clone(&broker), Arc::clone(&ensure_signal), clock.clone());
        let checks = CheckManager::new(Arc::clone(&plan));

        let mut registry = HandlerRegistry::new();
        services.register_handlers(&mut registry);
        let registry = Arc::new(registry);

        let engine = EngineLoop::new(
            Arc::clone(&state),
            registry,
            clock.clone(),
            Arc::clone(&ensure_signal),
            Arc::clone(&completion),
            shutdown.clone(),
        );

        Arc::new(Self {
            plan: Mutex::new(plan),
            state,
            services,
            checks,
            broker,
            engine,
            pairing: PairingWindow::new(),
            daemon_uid,
            ensure_signal,
            completion,
            shutdown,
            restart_requested: AtomicBool::new(false),
            clock,
        })
    }

    /// Start the engine loop and the correlator, autostart the plan's
    /// default services and checks, and block until a shutdown is
    /// requested (by a caller or by a correlated `on-check-failure:
    /// shutdown`/service restart request). Always leaves running
    /// services stopped and the state store saved before returning.
    pub async fn run(self: &Arc<Self>) -> RunOutcome {
        let engine_loop = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.engine.run().await })
        };
        let correlator = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.correlate().await })
        };
        let writer = {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_writer().await })
        };

        match self.services.autostart() {
            Ok(_) => {}
            Err(e) if e.kind == Some(ErrorKind::NoDefaultServices) => {}
            Err(e) => tracing::warn!(error = %e, "failed to autostart services"),
        }
        self.checks.autostart();

        self.shutdown.cancelled().await;
        correlator.abort();
        writer.abort();
        let _ = engine_loop.await;

        self.graceful_shutdown().await;

        if self.restart_requested.load(Ordering::SeqCst) {
            RunOutcome::Restart
        } else {
            RunOutcome::Shutdown
        }
    }

    /// Stop every live service and persist the state store, in that
    /// order, mirroring the lock-acquire-then-bind-last sequencing
    /// used at startup but inverted for teardown.
    async fn graceful_shutdown(self: &Arc<Self>) {
        let live: Vec<String> =
            self.services.services().into_iter().filter(|s| s.state.is_live()).map(|s| s.name).collect();
        if !live.is_empty() {
            let change_id = self.services.stop_services(&live);
            self.ensure_signal.request(Duration::ZERO);
            let _ = tokio::time::timeout(Duration::from_secs(30), self.wait_change(change_id)).await;
        }
        if let Err(e) = self.state.save() {
            tracing::warn!(error = %e, "failed to save state during shutdown");
        }
    }

    /// Request an orderly shutdown from any caller (e.g. a signal
    /// handler installed by the binary entrypoint).
    pub fn request_shutdown(self: &Arc<Self>) {
        self.shutdown.cancel();
    }

    /// Wake on every unlock (or, failing that, every `WRITER_MAX_INTERVAL`)
    /// and flush the state store if it's dirty. This is what turns "every
    /// unlock marks the state dirty" into an actual persisted snapshot
    /// during normal operation, rather than only on clean shutdown.
    async fn run_writer(self: &Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.state.dirty_changed() => {}
                _ = tokio::time::sleep(WRITER_MAX_INTERVAL) => {}
            }
            if let Err(e) = self.state.save_if_dirty() {
                tracing::warn!(error = %e, "background state writer failed to save");
            }
        }
    }

    /// Periodically drain the managers' event outboxes and act on them:
    /// a check crossing its threshold is matched against every service's
    /// `on-check-failure` map; a service's own `on-failure: shutdown`
    /// request tears the whole daemon down for a restart.
    async fn correlate(self: &Arc<Self>) {
        loop {
            tokio::time::sleep(CORRELATOR_TICK).await;

            for check_name in self.checks.take_down_events() {
                self.apply_check_failure(&check_name);
            }

            if !self.services.take_restart_requests().is_empty() {
                self.restart_requested.store(true, Ordering::SeqCst);
                self.shutdown.cancel();
                return;
            }
        }
    }

    fn apply_check_failure(self: &Arc<Self>, check_name: &str) {
        let plan = Arc::clone(&self.plan.lock());
        let mut to_restart = Vec::new();
        let mut shutdown_requested = false;

        for (service_name, cfg) in plan.services.iter() {
            match cfg.on_check_failure.get(check_name) {
                Some(FailureAction::Restart) => to_restart.push(service_name.clone()),
                Some(FailureAction::Shutdown) => shutdown_requested = true,
                Some(FailureAction::Ignore) | None => {}
            }
        }

        if !to_restart.is_empty() {
            self.services.restart_services(&to_restart);
            self.ensure_signal.request(Duration::ZERO);
        }
        if shutdown_requested {
            self.restart_requested.store(true, Ordering::SeqCst);
            self.shutdown.cancel();
        }
    }

    pub fn start_services(self: &Arc<Self>, names: &[String]) -> ChangeId {
        let id = self.services.start_services(names);
        self.ensure_signal.request(Duration::ZERO);
        id
    }

    pub fn stop_services(self: &Arc<Self>, names: &[String]) -> ChangeId {
        let id = self.services.stop_services(names);
        self.ensure_signal.request(Duration::ZERO);
        id
    }

    /// Stop-then-start `names` as one wait-chained change: every start task
    /// waits on every stop task.
    pub fn restart_services(self: &Arc<Self>, names: &[String]) -> ChangeId {
        let id = self.services.restart_services(names);
        self.ensure_signal.request(Duration::ZERO);
        id
    }

    pub fn send_signal(self: &Arc<Self>, names: &[String], signal_name: &str) -> Result<(), CoreError> {
        self.services.send_signal(names, signal_name)
    }

    pub fn services(self: &Arc<Self>) -> Vec<ServiceSnapshot> {
        self.services.services()
    }

    pub fn checks(self: &Arc<Self>) -> Vec<CheckSnapshot> {
        self.checks.checks()
    }

    pub async fn refresh_check(self: &Arc<Self>, name: &str) -> Result<(), CoreError> {
        self.checks.run_check(name).await
    }

    /// Re-point both managers at a new plan and diff their running sets
    /// against it. Each manager keeps its own copy for its own handlers
    /// to read without locking the facade; this is the one place that
    /// keeps all three in sync.
    pub fn replan(self: &Arc<Self>, new_plan: Arc<Plan>) -> (ChangeId, Option<ChangeId>) {
        *self.plan.lock() = Arc::clone(&new_plan);
        let outcome = self.services.replan(Arc::clone(&new_plan));
        self.checks.replan(new_plan);
        self.ensure_signal.request(Duration::ZERO);
        outcome
    }

    pub fn changes(self: &Arc<Self>) -> Vec<ChangeSnapshot> {
        let data = self.state.lock();
        data.changes
            .values()
            .map(|change| ChangeSnapshot {
                id: change.id,
                kind: change.kind.clone(),
                summary: change.summary.clone(),
                status: change.status(&data.tasks),
                err: change.err.clone(),
            })
            .collect()
    }

    /// Suspend until `id` reaches a ready status, surfacing its first
    /// task error if it finished that way.
    pub async fn wait_change(self: &Arc<Self>, id: ChangeId) -> Result<(), CoreError> {
        loop {
            let (ready, err) = {
                let data = self.state.lock();
                let Some(change) = data.changes.get(&id) else {
                    return Err(CoreError::with_kind(format!("no such change {id}"), ErrorKind::NotFound));
                };
                (change.status(&data.tasks).is_ready(), change.err.clone())
            };
            if ready {
                return match err {
                    Some(message) => Err(CoreError::new(message)),
                    None => Ok(()),
                };
            }
            self.completion.notified().await;
        }
    }

    /// Hold every non-terminal task in `id`, then recompute the change's
    /// status from the held tasks. There is no cooperative-cancellation
    /// primitive reachable from here, so a task already `Doing` finishes
    /// its handler; only tasks that have not yet started are actually
    /// stopped from running.
    pub fn abort_change(self: &Arc<Self>, id: ChangeId) -> Result<(), CoreError> {
        let now_ms = self.clock.epoch_ms();
        let mut data = self.state.lock();
        let Some(change) = data.changes.get(&id).cloned() else {
            return Err(CoreError::with_kind(format!("no such change {id}"), ErrorKind::NotFound));
        };
        if change.status(&data.tasks).is_ready() {
            return Err(CoreError::new(format!("change {id} is already ready")));
        }
        for task_id in change.tasks.clone() {
            if let Some(task) = data.tasks.get_mut(&task_id) {
                if !task.status.is_terminal() {
                    task.set_status(TaskStatus::Hold, now_ms);
                }
            }
        }
        if let Some(change) = data.changes.get_mut(&id) {
            change.recompute(&data.tasks, now_ms);
        }
        drop(data);
        self.completion.notify_waiters();
        Ok(())
    }

    pub fn tail_logs(self: &Arc<Self>, services: &[String], n: i64, follow: bool) -> ovl_logs::MergeStream {
        self.broker.merge(services, n, follow)
    }

    pub fn resolve_access(self: &Arc<Self>, peer: &PeerCredentials, transport: Transport) -> AccessLevel {
        let identities = self.state.lock().identities.clone();
        resolve_access_level(peer, transport, &identities, self.daemon_uid, &self.pairing)
    }

    pub fn pairing_window(self: &Arc<Self>) -> &PairingWindow {
        &self.pairing
    }
}
