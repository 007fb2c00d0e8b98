// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared small enums used across service and check configuration.

use serde::{Deserialize, Serialize};

/// How a layer's definition combines with a previous one for the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Override {
    Replace,
    Merge,
}

impl Default for Override {
    fn default() -> Self {
        Override::Merge
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Startup {
    Enabled,
    Disabled,
}

impl Default for Startup {
    fn default() -> Self {
        Startup::Disabled
    }
}

/// `on-success` / `on-failure` / `on-check-failure` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureAction {
    Restart,
    Shutdown,
    Ignore,
}

impl Default for FailureAction {
    fn default() -> Self {
        FailureAction::Restart
    }
}
