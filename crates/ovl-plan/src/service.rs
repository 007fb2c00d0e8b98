// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service entry of a plan, keyed by `services.<name>`.

use crate::action::{FailureAction, Override, Startup};
use indexmap::IndexMap;
use ovl_core::duration::serde_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default)]
    pub r#override: Override,

    pub command: String,

    #[serde(default)]
    pub startup: Startup,

    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub environment: IndexMap<String, String>,

    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, rename = "user-id")]
    pub user_id: Option<u32>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default, rename = "group-id")]
    pub group_id: Option<u32>,
    #[serde(default, rename = "working-dir")]
    pub working_dir: Option<String>,

    #[serde(default, rename = "on-success")]
    pub on_success: FailureAction,
    #[serde(default, rename = "on-failure")]
    pub on_failure: FailureAction,
    #[serde(default, rename = "on-check-failure")]
    pub on_check_failure: IndexMap<String, FailureAction>,

    #[serde(default = "default_backoff_delay", rename = "backoff-delay", with = "serde_ms")]
    pub backoff_delay: Duration,
    #[serde(default = "default_backoff_factor", rename = "backoff-factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_backoff_limit", rename = "backoff-limit", with = "serde_ms")]
    pub backoff_limit: Duration,
    #[serde(default = "default_kill_delay", rename = "kill-delay", with = "serde_ms")]
    pub kill_delay: Duration,

    /// The "okay window": how long a freshly started process must survive
    /// before its start task succeeds. Not part of the wire plan schema;
    /// kept as a field with a sane default so tests can override it
    /// without reaching into the service manager.
    #[serde(default = "default_okay_delay", rename = "okay-delay", with = "serde_ms")]
    pub okay_delay: Duration,
}

fn default_backoff_delay() -> Duration {
    Duration::from_millis(500)
}
fn default_backoff_factor() -> f64 {
    1.0
}
fn default_backoff_limit() -> Duration {
    Duration::from_secs(30)
}
fn default_kill_delay() -> Duration {
    Duration::from_secs(5)
}
fn default_okay_delay() -> Duration {
    Duration::from_secs(1)
}

impl ServiceConfig {
    /// Convenience constructor for tests and defaults.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            r#override: Override::Merge,
            command: command.into(),
            startup: Startup::Disabled,
            requires: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            environment: IndexMap::new(),
            user: None,
            user_id: None,
            group: None,
            group_id: None,
            working_dir: None,
            on_success: FailureAction::Restart,
            on_failure: FailureAction::Restart,
            on_check_failure: IndexMap::new(),
            backoff_delay: default_backoff_delay(),
            backoff_factor: default_backoff_factor(),
            backoff_limit: default_backoff_limit(),
            kill_delay: default_kill_delay(),
            okay_delay: default_okay_delay(),
        }
    }
}
