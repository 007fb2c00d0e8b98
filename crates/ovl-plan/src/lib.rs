// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The already-validated `Plan` data model consumed by the overlord core.
//!
//! YAML/HCL layer parsing and plan validation are external collaborators:
//! something upstream turns a stack of layers into one of these structs and
//! guarantees the invariants already hold (durations positive,
//! `backoff-factor >= 1.0`, `timeout < period`, and so on). This crate only
//! defines the shapes and a handful of read-only accessors the core needs.

pub mod action;
pub mod check;
pub mod log_target;
pub mod service;

pub use action::{FailureAction, Override, Startup};
pub use check::{CheckConfig, CheckLevel, ExecProbe, HttpProbe, Probe, TcpProbe};
pub use log_target::{LogTargetConfig, LogTargetType};
pub use service::ServiceConfig;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The effective, merged configuration describing services, checks, and
/// log targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    #[serde(default)]
    pub services: IndexMap<String, ServiceConfig>,
    #[serde(default, rename = "checks")]
    pub checks: IndexMap<String, CheckConfig>,
    #[serde(default, rename = "log-targets")]
    pub log_targets: IndexMap<String, LogTargetConfig>,
}

impl Plan {
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.get(name)
    }

    pub fn check(&self, name: &str) -> Option<&CheckConfig> {
        self.checks.get(name)
    }

    /// Names of services with `startup: enabled`, in declaration order.
    pub fn auto_start_services(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, cfg)| cfg.startup == Startup::Enabled)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of checks with `startup: enabled`, in declaration order.
    pub fn auto_start_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, cfg)| cfg.startup == Startup::Enabled)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_start_services_preserves_declaration_order() {
        let mut plan = Plan::default();
        plan.services.insert("b".into(), ServiceConfig { startup: Startup::Enabled, ..ServiceConfig::new("true") });
        plan.services.insert("a".into(), ServiceConfig { startup: Startup::Enabled, ..ServiceConfig::new("true") });
        plan.services.insert("c".into(), ServiceConfig { startup: Startup::Disabled, ..ServiceConfig::new("true") });
        assert_eq!(plan.auto_start_services(), vec!["b", "a"]);
    }
}
