// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Check entry of a plan, keyed by `checks.<name>`.

use crate::action::{Override, Startup};
use indexmap::IndexMap;
use ovl_core::duration::serde_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckLevel {
    Alive,
    Ready,
    Unset,
}

impl Default for CheckLevel {
    fn default() -> Self {
        CheckLevel::Unset
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecProbe {
    pub command: String,
    #[serde(default, rename = "service-context")]
    pub service_context: Option<String>,
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
    #[serde(default)]
    pub environment: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpProbe {
    pub url: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TcpProbe {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Probe {
    Exec(ExecProbe),
    Http(HttpProbe),
    Tcp(TcpProbe),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckConfig {
    #[serde(default)]
    pub r#override: Override,
    #[serde(default)]
    pub startup: Startup,
    #[serde(default)]
    pub level: CheckLevel,

    #[serde(with = "serde_ms")]
    pub period: Duration,
    #[serde(with = "serde_ms")]
    pub timeout: Duration,
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    #[serde(flatten)]
    pub probe: Probe,
}

fn default_threshold() -> u32 {
    3
}

impl CheckConfig {
    pub fn new(period: Duration, timeout: Duration, probe: Probe) -> Self {
        Self {
            r#override: Override::Merge,
            startup: Startup::Enabled,
            level: CheckLevel::Unset,
            period,
            timeout,
            threshold: default_threshold(),
            probe,
        }
    }
}
