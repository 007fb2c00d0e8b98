// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Check Manager: runs each enabled check on its own periodic loop,
//! independent of the task engine (a check has no natural "done" state —
//! it just keeps probing until stopped), tracking an up/down threshold
//! state machine per check and surfacing down transitions for the facade
//! to correlate against `on-check-failure`.

use crate::machine::{CheckRuntime, CheckStatus};
use crate::probe::run_probe;
use ovl_core::{CoreError, ErrorKind};
use ovl_plan::{CheckConfig, Plan, Startup};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Serialize)]
pub struct CheckSnapshot {
    pub name: String,
    pub status: CheckStatus,
    pub failures: u32,
    pub last_error: Option<String>,
}

pub struct CheckManager {
    plan: Mutex<Arc<Plan>>,
    runtimes: Mutex<HashMap<String, CheckRuntime>>,
    loops: Mutex<HashMap<String, JoinHandle<()>>>,
    down_events: Mutex<Vec<String>>,
}

impl CheckManager {
    pub fn new(plan: Arc<Plan>) -> Arc<Self> {
        Arc::new(Self {
            plan: Mutex::new(plan),
            runtimes: Mutex::new(HashMap::new()),
            loops: Mutex::new(HashMap::new()),
            down_events: Mutex::new(Vec::new()),
        })
    }

    async fn run_once(self: &Arc<Self>, name: &str, cfg: &CheckConfig) {
        let result = run_probe(&cfg.probe, cfg.timeout).await;
        let went_down = {
            let mut runtimes = self.runtimes.lock();
            let rt = runtimes.entry(name.to_string()).or_default();
            match result {
                Ok(()) => {
                    rt.record_success();
                    false
                }
                Err(e) => rt.record_failure(e.to_string(), cfg.threshold),
            }
        };
        if went_down {
            self.down_events.lock().push(name.to_string());
        }
    }

    fn spawn_loop(self: &Arc<Self>, name: &str, cfg: CheckConfig) {
        let manager = Arc::clone(self);
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(cfg.period).await;
                manager.run_once(&task_name, &cfg).await;
            }
        });
        self.loops.lock().insert(name.to_string(), handle);
    }

    /// Start periodic probing for the named checks. A check already running
    /// is left alone.
    pub fn start_checks(self: &Arc<Self>, names: &[String]) {
        for name in names {
            if self.loops.lock().contains_key(name) {
                continue;
            }
            let Some(cfg) = self.plan.lock().check(name).cloned() else { continue };
            self.runtimes.lock().entry(name.clone()).or_default();
            self.spawn_loop(name, cfg);
        }
    }

    /// Stop periodic probing for the named checks, aborting their loops.
    pub fn stop_checks(self: &Arc<Self>, names: &[String]) {
        let mut loops = self.loops.lock();
        for name in names {
            if let Some(handle) = loops.remove(name) {
                handle.abort();
            }
        }
    }

    /// Start every `startup: enabled` check. Unlike service autostart, an
    /// empty set is not an error — a plan with no checks is ordinary.
    pub fn autostart(self: &Arc<Self>) {
        let names: Vec<String> = { self.plan.lock().auto_start_checks().into_iter().map(String::from).collect() };
        self.start_checks(&names);
    }

    /// Diff the running set against `new_plan`, mirroring
    /// `ovl_services::ServiceManager::replan`'s stop-then-start shape.
    pub fn replan(self: &Arc<Self>, new_plan: Arc<Plan>) {
        let old_plan = { Arc::clone(&self.plan.lock()) };
        let running: Vec<String> = { self.loops.lock().keys().cloned().collect() };

        let mut to_stop = Vec::new();
        let mut to_start = Vec::new();

        for name in &running {
            let old_cfg = old_plan.check(name);
            let new_cfg = new_plan.check(name);
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

        for (name, cfg) in new_plan.checks.iter() {
            if cfg.startup == Startup::Enabled && !running.contains(name) && old_plan.check(name) != Some(cfg) {
                to_start.push(name.clone());
            }
        }

        *self.plan.lock() = Arc::clone(&new_plan);
        self.stop_checks(&to_stop);
        self.start_checks(&to_start);
    }

    /// Run a check immediately, out of band from its periodic schedule.
    pub async fn run_check(self: &Arc<Self>, name: &str) -> Result<(), CoreError> {
        let cfg = {
            self.plan
                .lock()
                .check(name)
                .cloned()
                .ok_or_else(|| CoreError::with_kind(format!("no such check {name:?}"), ErrorKind::NotFound))?
        };
        self.run_once(name, &cfg).await;
        Ok(())
    }

    pub fn checks(self: &Arc<Self>) -> Vec<CheckSnapshot> {
        self.runtimes
            .lock()
            .iter()
            .map(|(name, rt)| CheckSnapshot {
                name: name.clone(),
                status: rt.status,
                failures: rt.failures,
                last_error: rt.last_error.clone(),
            })
            .collect()
    }

    /// Drain the checks that just crossed their failure threshold, for the
    /// facade to correlate against services' `on-check-failure` maps.
    pub fn take_down_events(self: &Arc<Self>) -> Vec<String> {
        std::mem::take(&mut *self.down_events.lock())
    }
}

impl Drop for CheckManager {
    fn drop(&mut self) {
        for (_, handle) in self.loops.lock().drain() {
            handle.abort();
        }
    }
}
