// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warning store. Warnings are optional metadata: nothing else in the core
//! requires them to be populated, and `latest_warning_time` is `None` when
//! there are none.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    pub first_added_ms: u64,
    pub last_added_ms: u64,
    pub last_shown_ms: Option<u64>,
    pub expire_after_ms: Option<u64>,
    pub repeat_after_ms: Option<u64>,
}

impl Warning {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expire_after_ms {
            Some(expire_after) => now_ms.saturating_sub(self.first_added_ms) > expire_after,
            None => false,
        }
    }

    /// Whether this warning should be surfaced again: never shown yet, or
    /// `repeat_after` has elapsed since it last was.
    pub fn is_due(&self, now_ms: u64) -> bool {
        match (self.last_shown_ms, self.repeat_after_ms) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(shown), Some(repeat_after)) => now_ms.saturating_sub(shown) >= repeat_after,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarningStore {
    warnings: Vec<Warning>,
}

impl WarningStore {
    /// Add a warning, or, if the same message is already present, bump its
    /// `last_added` timestamp in place (warnings dedupe by message).
    pub fn add(
        &mut self,
        message: impl Into<String>,
        now_ms: u64,
        expire_after_ms: Option<u64>,
        repeat_after_ms: Option<u64>,
    ) {
        let message = message.into();
        if let Some(existing) = self.warnings.iter_mut().find(|w| w.message == message) {
            existing.last_added_ms = now_ms;
            return;
        }
        self.warnings.push(Warning {
            message,
            first_added_ms: now_ms,
            last_added_ms: now_ms,
            last_shown_ms: None,
            expire_after_ms,
            repeat_after_ms,
        });
    }

    pub fn prune_expired(&mut self, now_ms: u64) {
        self.warnings.retain(|w| !w.is_expired(now_ms));
    }

    pub fn all(&self) -> &[Warning] {
        &self.warnings
    }

    /// Mark every currently-due warning as shown at `now_ms`.
    pub fn mark_shown(&mut self, now_ms: u64) {
        for w in self.warnings.iter_mut().filter(|w| w.is_due(now_ms)) {
            w.last_shown_ms = Some(now_ms);
        }
    }

    pub fn latest_warning_time(&self) -> Option<u64> {
        self.warnings.iter().map(|w| w.last_added_ms).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_the_same_message_twice_dedupes() {
        let mut store = WarningStore::default();
        store.add("disk almost full", 0, None, None);
        store.add("disk almost full", 100, None, None);
        assert_eq!(store.all().len(), 1);
        assert_eq!(store.all()[0].last_added_ms, 100);
    }

    #[test]
    fn expired_warnings_are_pruned() {
        let mut store = WarningStore::default();
        store.add("transient", 0, Some(1_000), None);
        store.prune_expired(500);
        assert_eq!(store.all().len(), 1);
        store.prune_expired(2_000);
        assert!(store.all().is_empty());
    }

    #[test]
    fn no_warnings_means_latest_time_is_none() {
        let store = WarningStore::default();
        assert_eq!(store.latest_warning_time(), None);
    }

    #[test]
    fn repeat_after_governs_whether_a_warning_is_due_again() {
        let mut w = Warning {
            message: "m".into(),
            first_added_ms: 0,
            last_added_ms: 0,
            last_shown_ms: None,
            expire_after_ms: None,
            repeat_after_ms: Some(1_000),
        };
        assert!(w.is_due(0));
        w.last_shown_ms = Some(0);
        assert!(!w.is_due(500));
        assert!(w.is_due(1_000));
    }
}
