// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The up/down threshold state machine for a single check.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRuntime {
    pub status: CheckStatus,
    pub failures: u32,
    pub last_error: Option<String>,
}

impl Default for CheckRuntime {
    fn default() -> Self {
        Self { status: CheckStatus::Up, failures: 0, last_error: None }
    }
}

impl CheckRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A probe succeeded: immediately back to `Up`, clearing the streak.
    pub fn record_success(&mut self) {
        self.status = CheckStatus::Up;
        self.failures = 0;
        self.last_error = None;
    }

    /// A probe failed. Returns true exactly on the failure that crosses
    /// `threshold` and flips the check `Down` — the caller fires
    /// `on-check-failure` once per down transition, not on every
    /// subsequent failure while already down.
    pub fn record_failure(&mut self, error: impl Into<String>, threshold: u32) -> bool {
        self.failures += 1;
        self.last_error = Some(error.into());
        if self.failures >= threshold && self.status == CheckStatus::Up {
            self.status = CheckStatus::Down;
            return true;
        }
        false
    }
}
