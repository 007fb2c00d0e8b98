// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ties the plan, per-service runtime state, and process table together:
//! registers the `start-service`/`stop-service` task handlers, computes
//! lane-ordered changes for explicit start/stop/replan requests, and
//! answers `SendSignal`.

use crate::backoff::next_delay;
use crate::lanes::{start_order, stop_order};
use crate::machine::{ServiceRuntime, ServiceState};
use crate::process::ServiceProcess;
use ovl_core::id::{ChangeId, LaneId};
use ovl_core::{Clock, CoreError, ErrorKind};
use ovl_engine::{Handler, HandlerError, HandlerFn, HandlerRegistry, TaskContext};
use ovl_logs::LogBroker;
use ovl_plan::{FailureAction, Plan, ServiceConfig, Startup};
use ovl_state::{EnsureSignal, StateStore, TaskSet};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const START_TASK_KIND: &str = "start-service";
pub const STOP_TASK_KIND: &str = "stop-service";

/// A point-in-time view of a tracked service, for the facade's `Services()`
/// query.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub restart_count: u32,
}

pub struct ServiceManager<C: Clock> {
    plan: Mutex<Arc<Plan>>,
    runtimes: Mutex<HashMap<String, ServiceRuntime>>,
    processes: Mutex<HashMap<String, ServiceProcess>>,
    /// Causes (e.g. "service X failed") a `Shutdown`-action failure asked
    /// for; the facade drains this to drive a daemon restart.
    restart_requests: Mutex<Vec<String>>,
    broker: Arc<LogBroker>,
    state: Arc<StateStore>,
    ensure_signal: Arc<EnsureSignal>,
    clock: C,
}

impl<C: Clock> ServiceManager<C> {
    pub fn new(
        plan: Arc<Plan>,
        state: Arc<StateStore>,
        broker: Arc<LogBroker>,
        ensure_signal: Arc<EnsureSignal>,
        clock: C,
    ) -> Arc<Self> {
        Arc::new(Self {
            plan: Mutex::new(plan),
            runtimes: Mutex::new(HashMap::new()),
            processes: Mutex::new(HashMap::new()),
            restart_requests: Mutex::new(Vec::new()),
            broker,
            state,
            ensure_signal,
            clock,
        })
    }

    pub fn register_handlers(self: &Arc<Self>, registry: &mut HandlerRegistry<C>) {
        let start = Arc::clone(self);
        let start_do: HandlerFn<C> = Arc::new(move |ctx| {
            let manager = Arc::clone(&start);
            Box::pin(async move { manager.run_start(ctx).await })
        });
        registry.add(START_TASK_KIND, Handler::without_undo(start_do));

        let stop = Arc::clone(self);
        let stop_do: HandlerFn<C> = Arc::new(move |ctx| {
            let manager = Arc::clone(&stop);
            Box::pin(async move { manager.run_stop(ctx).await })
        });
        registry.add(STOP_TASK_KIND, Handler::without_undo(stop_do));
    }

    fn service_name_of(&self, ctx: &TaskContext<C>) -> Option<String> {
        let data = ctx.state.lock();
        data.tasks.get(&ctx.task_id).and_then(|t| t.data.get("service")).and_then(|v| v.as_str()).map(str::to_string)
    }

    async fn run_start(self: &Arc<Self>, ctx: TaskContext<C>) -> Result<(), HandlerError> {
        let name = self.service_name_of(&ctx).ok_or_else(|| HandlerError::new("start task missing service name"))?;

        {
            let runtimes = self.runtimes.lock();
            if runtimes.get(&name).map(|rt| rt.state.is_live()).unwrap_or(false) {
                return Ok(());
            }
        }

        let cfg = {
            let plan = self.plan.lock();
            plan.service(&name).cloned().ok_or_else(|| HandlerError::new(format!("no such service {name:?}")))?
        };

        let process = ServiceProcess::spawn(&name, &cfg, &self.broker, &self.clock)
            .map_err(|e| HandlerError::new(e.to_string()))?;
        let pid = process.pid;
        self.processes.lock().insert(name.clone(), process);
        self.runtimes.lock().entry(name.clone()).or_default().mark_starting();
        ctx.logf(format!("spawned pid {pid}"));

        tokio::select! {
            _ = tokio::time::sleep(cfg.okay_delay) => {}
            _ = ctx.tomb.cancelled() => {
                return Err(HandlerError::new("cancelled during the okay window"));
            }
        }

        let exited = self.processes.lock().get_mut(&name).and_then(|p| p.try_wait());
        match exited {
            None => {
                self.runtimes.lock().entry(name.clone()).or_default().mark_running(pid);
                ctx.logf("okay window elapsed, service is running");
                Ok(())
            }
            Some(exit_code) => {
                self.processes.lock().remove(&name);
                self.runtimes.lock().entry(name.clone()).or_default().mark_exited(exit_code, false, false);
                self.handle_failure(&name, &cfg).await;
                Err(HandlerError::new(format!("{name} exited during the okay window (code {exit_code:?})")))
            }
        }
    }

    async fn run_stop(self: &Arc<Self>, ctx: TaskContext<C>) -> Result<(), HandlerError> {
        let name = self.service_name_of(&ctx).ok_or_else(|| HandlerError::new("stop task missing service name"))?;
        let kill_delay =
            { self.plan.lock().service(&name).map(|c| c.kill_delay).unwrap_or(Duration::from_secs(5)) };

        {
            let mut runtimes = self.runtimes.lock();
            let Some(rt) = runtimes.get_mut(&name) else { return Ok(()) };
            if !rt.state.is_live() {
                return Ok(());
            }
            rt.mark_terminating();
        }

        let Some(mut process) = self.processes.lock().remove(&name) else {
            self.runtimes.lock().entry(name.clone()).or_default().mark_exited(None, true, false);
            return Ok(());
        };

        process.signal("TERM").map_err(|e| HandlerError::new(e.to_string()))?;

        let (exit_code, killed) = match tokio::time::timeout(kill_delay, process.wait()).await {
            Ok(code) => (code, false),
            Err(_) => {
                let _ = process.signal("KILL");
                (process.wait().await, true)
            }
        };

        self.runtimes.lock().entry(name.clone()).or_default().mark_exited(exit_code, true, killed);
        ctx.logf(format!("stopped (killed={killed}, exit_code={exit_code:?})"));
        Ok(())
    }

    async fn handle_failure(self: &Arc<Self>, name: &str, cfg: &ServiceConfig) {
        match cfg.on_failure {
            FailureAction::Restart => {
                let restart_count = {
                    let mut runtimes = self.runtimes.lock();
                    let rt = runtimes.entry(name.to_string()).or_default();
                    rt.mark_backoff();
                    rt.restart_count
                };
                let delay = next_delay(cfg, restart_count);
                self.schedule_restart(name, delay);
            }
            FailureAction::Shutdown => {
                self.restart_requests.lock().push(format!("service {name} failed during its okay window"));
                self.ensure_signal.request(Duration::ZERO);
            }
            FailureAction::Ignore => {}
        }
    }

    fn schedule_restart(self: &Arc<Self>, name: &str, delay: Duration) {
        let manager = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.spawn_start_task(&name);
        });
    }

    fn spawn_start_task(self: &Arc<Self>, name: &str) {
        let now_ms = self.clock.epoch_ms();
        let mut data = self.state.lock();
        let change_id = data.new_change("restart", format!("Restart \"{name}\""), now_ms);
        let task_id = data.new_task(START_TASK_KIND, format!("Start \"{name}\""), now_ms);
        if let Some(task) = data.tasks.get_mut(&task_id) {
            task.data.insert("service".to_string(), json!(name));
        }
        data.add_tasks_to_change(change_id, &TaskSet::new([task_id]));
        if let Some(change) = data.changes.get_mut(&change_id) {
            change.tag_service(name);
        }
        drop(data);
        self.ensure_signal.request(Duration::ZERO);
    }

    /// Build a change with one lane of tasks per entry in `lanes`, each
    /// lane waiting on the previous one to finish. Every lane's tasks are
    /// also tagged with their own `LaneId`, so an `Error` task aborts only
    /// the other tasks sharing its lane rather than the whole change.
    fn build_lane_change(
        self: &Arc<Self>,
        kind: &str,
        summary: impl Into<String>,
        lanes: Vec<Vec<String>>,
        task_kind: &str,
    ) -> ChangeId {
        let now_ms = self.clock.epoch_ms();
        let mut data = self.state.lock();
        let change_id = data.new_change(kind, summary, now_ms);
        let mut previous: Option<TaskSet> = None;
        for lane in &lanes {
            let mut ids = Vec::new();
            for name in lane {
                let task_id = data.new_task(task_kind, format!("{task_kind} \"{name}\""), now_ms);
                if let Some(task) = data.tasks.get_mut(&task_id) {
                    task.data.insert("service".to_string(), json!(name));
                }
                ids.push(task_id);
            }
            let set = TaskSet::new(ids);
            set.assign_lane(LaneId::new(), &mut data.tasks);
            data.add_tasks_to_change(change_id, &set);
            if let Some(prev) = &previous {
                prev.wait_all(&set, &mut data.tasks);
            }
            previous = Some(set);
        }
        if let Some(change) = data.changes.get_mut(&change_id) {
            for name in lanes.iter().flatten() {
                change.tag_service(name);
            }
        }
        drop(data);
        self.ensure_signal.request(Duration::ZERO);
        change_id
    }

    /// Build a single change that stops `names` then starts them again,
    /// with every start task waiting on every stop task: a restart is
    /// stop-then-start composed as one wait-chained operation, not two
    /// independent changes a caller could observe half-applied.
    pub fn restart_services(self: &Arc<Self>, names: &[String]) -> ChangeId {
        let plan = Arc::clone(&self.plan.lock());
        let start_lanes = start_order(&plan, names);
        // `requires` pulls dependencies into the services that get started
        // back up, but restarting "a" has no business stopping "a"'s
        // dependency "b" just because "a" required it — stops stay scoped
        // to exactly what the caller named.
        let requested: std::collections::HashSet<&String> = names.iter().collect();
        let stop_lanes: Vec<Vec<String>> = start_lanes
            .iter()
            .rev()
            .map(|lane| lane.iter().filter(|n| requested.contains(n)).cloned().collect::<Vec<_>>())
            .filter(|lane: &Vec<String>| !lane.is_empty())
            .collect();

        let now_ms = self.clock.epoch_ms();
        let mut data = self.state.lock();
        let change_id = data.new_change("restart", format!("Restart {}", names.join(", ")), now_ms);

        let mut stop_sets = Vec::new();
        let mut previous: Option<TaskSet> = None;
        for lane in &stop_lanes {
            let mut ids = Vec::new();
            for name in lane {
                let task_id = data.new_task(STOP_TASK_KIND, format!("{STOP_TASK_KIND} \"{name}\""), now_ms);
                if let Some(task) = data.tasks.get_mut(&task_id) {
                    task.data.insert("service".to_string(), json!(name));
                }
                ids.push(task_id);
            }
            let set = TaskSet::new(ids);
            set.assign_lane(LaneId::new(), &mut data.tasks);
            data.add_tasks_to_change(change_id, &set);
            if let Some(prev) = &previous {
                prev.wait_all(&set, &mut data.tasks);
            }
            previous = Some(set.clone());
            stop_sets.push(set);
        }
        let all_stops = TaskSet::new(stop_sets.iter().flat_map(|s| s.ids().iter().copied()));

        let mut previous: Option<TaskSet> = None;
        for lane in &start_lanes {
            let mut ids = Vec::new();
            for name in lane {
                let task_id = data.new_task(START_TASK_KIND, format!("{START_TASK_KIND} \"{name}\""), now_ms);
                if let Some(task) = data.tasks.get_mut(&task_id) {
                    task.data.insert("service".to_string(), json!(name));
                }
                ids.push(task_id);
            }
            let set = TaskSet::new(ids);
            set.assign_lane(LaneId::new(), &mut data.tasks);
            data.add_tasks_to_change(change_id, &set);
            all_stops.wait_all(&set, &mut data.tasks);
            if let Some(prev) = &previous {
                prev.wait_all(&set, &mut data.tasks);
            }
            previous = Some(set);
        }

        if let Some(change) = data.changes.get_mut(&change_id) {
            for name in start_lanes.iter().flatten() {
                change.tag_service(name);
            }
        }
        drop(data);
        self.ensure_signal.request(Duration::ZERO);
        change_id
    }

    /// Start the named services, honoring dependency lanes.
    pub fn start_services(self: &Arc<Self>, names: &[String]) -> ChangeId {
        let lanes = { start_order(&self.plan.lock(), names) };
        self.build_lane_change("start", format!("Start {}", names.join(", ")), lanes, START_TASK_KIND)
    }

    /// Stop the named services, in reverse dependency order.
    pub fn stop_services(self: &Arc<Self>, names: &[String]) -> ChangeId {
        let lanes = { stop_order(&self.plan.lock(), names) };
        self.build_lane_change("stop", format!("Stop {}", names.join(", ")), lanes, STOP_TASK_KIND)
    }

    /// Start every `startup: enabled` service. Errors with
    /// `ErrorKind::NoDefaultServices` if the plan names none.
    pub fn autostart(self: &Arc<Self>) -> Result<ChangeId, CoreError> {
        let names: Vec<String> = { self.plan.lock().auto_start_services().into_iter().map(String::from).collect() };
        if names.is_empty() {
            return Err(CoreError::with_kind("no services are configured to start automatically", ErrorKind::NoDefaultServices));
        }
        Ok(self.start_services(&names))
    }

    /// Diff the running set against `new_plan`: services removed or
    /// reconfigured are stopped, services added or reconfigured with
    /// `startup: enabled` are (re)started. An empty diff still produces a
    /// zero-task change, so callers always get something to wait on.
    pub fn replan(self: &Arc<Self>, new_plan: Arc<Plan>) -> (ChangeId, Option<ChangeId>) {
        let old_plan = { Arc::clone(&self.plan.lock()) };
        let running: Vec<String> =
            { self.runtimes.lock().iter().filter(|(_, rt)| rt.state.is_live()).map(|(n, _)| n.clone()).collect() };

        let mut to_stop = Vec::new();
        let mut to_start = Vec::new();

        for name in &running {
            let old_cfg = old_plan.service(name);
            let new_cfg = new_plan.service(name);
            match new_cfg {
                None => to_stop.push(name.clone()),
                Some(cfg) if old_cfg != Some(cfg) => {
                    to_stop.push(name.clone());
                    if cfg.startup == Startup::Enabled {
                        to_start.push(name.clone());
                    }
                }
                Some(_) => {}
            }
        }

        for (name, cfg) in new_plan.services.iter() {
            if cfg.startup == Startup::Enabled && !running.contains(name) && old_plan.service(name) != Some(cfg) {
                to_start.push(name.clone());
            }
        }

        *self.plan.lock() = Arc::clone(&new_plan);

        if to_stop.is_empty() && to_start.is_empty() {
            let now_ms = self.clock.epoch_ms();
            let mut data = self.state.lock();
            let change_id = data.new_change("replan", "Replan - no services", now_ms);
            drop(data);
            return (change_id, None);
        }

        let stop_change = if to_stop.is_empty() {
            None
        } else {
            let lanes = stop_order(&new_plan, &to_stop);
            Some(self.build_lane_change("replan-stop", "Replan - stop services", lanes, STOP_TASK_KIND))
        };
        let start_change = if to_start.is_empty() {
            None
        } else {
            let lanes = start_order(&new_plan, &to_start);
            Some(self.build_lane_change("replan-start", "Replan - start services", lanes, START_TASK_KIND))
        };

        match (stop_change, start_change) {
            (Some(stop), start) => (stop, start),
            (None, Some(start)) => (start, None),
            (None, None) => unreachable!("handled by the empty-diff branch above"),
        }
    }

    /// Send a named signal directly to a running service's process group,
    /// bypassing the task engine.
    pub fn send_signal(self: &Arc<Self>, names: &[String], signal_name: &str) -> Result<(), CoreError> {
        let processes = self.processes.lock();
        for name in names {
            let Some(process) = processes.get(name) else {
                return Err(CoreError::with_kind(format!("service {name:?} is not running"), ErrorKind::NotFound));
            };
            process.signal(signal_name).map_err(|e| CoreError::new(e.to_string()))?;
        }
        Ok(())
    }

    /// A point-in-time snapshot of every tracked service.
    pub fn services(self: &Arc<Self>) -> Vec<ServiceSnapshot> {
        self.runtimes
            .lock()
            .iter()
            .map(|(name, rt)| ServiceSnapshot { name: name.clone(), state: rt.state, pid: rt.pid, restart_count: rt.restart_count })
            .collect()
    }

    /// Drain pending `Shutdown`-action restart requests for the facade to
    /// act on.
    pub fn take_restart_requests(self: &Arc<Self>) -> Vec<String> {
        std::mem::take(&mut *self.restart_requests.lock())
    }
}
