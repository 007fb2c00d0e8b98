// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log target entry of a plan, keyed by `log-targets.<name>`.
//!
//! Forwarding log entries to Loki/syslog is an external collaborator (the
//! core's `ovl-logs` crate only owns the in-process ring buffer and
//! streaming); this struct exists so the core can filter which services'
//! entries a target subscribes to, per its `services` list.

use crate::action::Override;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogTargetType {
    Loki,
    Syslog,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogTargetConfig {
    #[serde(default)]
    pub r#override: Override,
    pub r#type: LogTargetType,
    pub location: String,
    /// Service names this target subscribes to, or the literal `"all"`.
    #[serde(default)]
    pub services: Vec<String>,
}

impl LogTargetConfig {
    /// Whether this target wants entries from the named service.
    pub fn wants(&self, service: &str) -> bool {
        self.services.iter().any(|s| s == "all" || s == service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_keyword_subscribes_to_every_service() {
        let target = LogTargetConfig {
            r#override: Override::Merge,
            r#type: LogTargetType::Loki,
            location: "http://localhost:3100".into(),
            services: vec!["all".into()],
        };
        assert!(target.wants("anything"));
    }

    #[test]
    fn named_services_are_exact_match() {
        let target = LogTargetConfig {
            r#override: Override::Merge,
            r#type: LogTargetType::Syslog,
            location: "udp://localhost:514".into(),
            services: vec!["web".into()],
        };
        assert!(target.wants("web"));
        assert!(!target.wants("worker"));
    }
}
