// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-service state machine.
//!
//! ```text
//! initial/stopped/killed/exited/errored/backoff --start--> starting
//!    starting --(okay window elapses)--> running
//!    starting --(exits during okay window)--> exited/errored
//!    running --stop--> terminating
//!    terminating --(clean exit)--> stopped
//!    terminating --(kill-delay elapses, SIGKILL sent)--> killed
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceState {
    Initial,
    Starting,
    Running,
    Terminating,
    Backoff,
    Stopped,
    Killed,
    Exited,
    Errored,
}

impl ServiceState {
    /// Whether `start` can be invoked without first going through `stop`.
    pub fn is_startable(self) -> bool {
        matches!(
            self,
            ServiceState::Initial
                | ServiceState::Stopped
                | ServiceState::Killed
                | ServiceState::Exited
                | ServiceState::Errored
                | ServiceState::Backoff
        )
    }

    /// Whether this service already has a live process, so `start` is a
    /// no-op.
    pub fn is_live(self) -> bool {
        matches!(self, ServiceState::Starting | ServiceState::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRuntime {
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub last_exit_code: Option<i32>,
}

impl Default for ServiceRuntime {
    fn default() -> Self {
        Self { state: ServiceState::Initial, pid: None, restart_count: 0, last_exit_code: None }
    }
}

impl ServiceRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clean okay-window survival: a successful start forgives past
    /// failures, so the restart counter resets.
    pub fn mark_running(&mut self, pid: u32) {
        self.state = ServiceState::Running;
        self.pid = Some(pid);
        self.restart_count = 0;
    }

    pub fn mark_starting(&mut self) {
        self.state = ServiceState::Starting;
    }

    pub fn mark_terminating(&mut self) {
        self.state = ServiceState::Terminating;
    }

    /// The process exited. `expected` is true for a deliberate stop,
    /// `killed` is true if it had to be force-killed after `kill-delay`.
    pub fn mark_exited(&mut self, exit_code: Option<i32>, expected: bool, killed: bool) {
        self.pid = None;
        self.last_exit_code = exit_code;
        self.state = if killed {
            ServiceState::Killed
        } else if expected {
            ServiceState::Stopped
        } else if exit_code == Some(0) {
            ServiceState::Exited
        } else {
            ServiceState::Errored
        };
    }

    pub fn mark_backoff(&mut self) {
        self.restart_count += 1;
        self.state = ServiceState::Backoff;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_is_startable_and_not_live() {
        let rt = ServiceRuntime::new();
        assert!(rt.state.is_startable());
        assert!(!rt.state.is_live());
    }

    #[test]
    fn mark_running_resets_restart_count() {
        let mut rt = ServiceRuntime::new();
        rt.restart_count = 3;
        rt.mark_running(1234);
        assert_eq!(rt.restart_count, 0);
        assert_eq!(rt.pid, Some(1234));
        assert_eq!(rt.state, ServiceState::Running);
    }

    #[test]
    fn mark_backoff_increments_restart_count() {
        let mut rt = ServiceRuntime::new();
        rt.mark_backoff();
        rt.mark_backoff();
        assert_eq!(rt.restart_count, 2);
    }

    #[test]
    fn a_stop_requested_exit_lands_in_stopped() {
        let mut rt = ServiceRuntime::new();
        rt.mark_running(1);
        rt.mark_terminating();
        rt.mark_exited(Some(0), true, false);
        assert_eq!(rt.state, ServiceState::Stopped);
    }

    #[test]
    fn an_unexpected_clean_exit_lands_in_exited() {
        let mut rt = ServiceRuntime::new();
        rt.mark_running(1);
        rt.mark_exited(Some(0), false, false);
        assert_eq!(rt.state, ServiceState::Exited);
    }

    #[test]
    fn an_unexpected_error_exit_lands_in_errored() {
        let mut rt = ServiceRuntime::new();
        rt.mark_running(1);
        rt.mark_exited(Some(1), false, false);
        assert_eq!(rt.state, ServiceState::Errored);
    }

    #[test]
    fn a_timed_out_stop_lands_in_killed() {
        let mut rt = ServiceRuntime::new();
        rt.mark_running(1);
        rt.mark_terminating();
        rt.mark_exited(None, true, true);
        assert_eq!(rt.state, ServiceState::Killed);
    }
}
