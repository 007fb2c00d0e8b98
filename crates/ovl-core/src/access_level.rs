// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The access-level total order: `untrusted < metrics < read < admin`.
//!
//! Lives in `ovl-core` rather than `ovl-access` because `ovl-state`'s
//! `Identity` needs it and `ovl-access` itself needs to read identities back
//! out of `ovl-state` — putting the enum in the leaf crate avoids a cycle.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessLevel {
    Untrusted,
    Metrics,
    Read,
    Admin,
}

impl AccessLevel {
    /// Whether this level satisfies a `required` level for an endpoint.
    pub fn satisfies(self, required: AccessLevel) -> bool {
        self >= required
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccessLevel::Untrusted => "untrusted",
            AccessLevel::Metrics => "metrics",
            AccessLevel::Read => "read",
            AccessLevel::Admin => "admin",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order_is_untrusted_lt_metrics_lt_read_lt_admin() {
        assert!(AccessLevel::Untrusted < AccessLevel::Metrics);
        assert!(AccessLevel::Metrics < AccessLevel::Read);
        assert!(AccessLevel::Read < AccessLevel::Admin);
    }

    #[test]
    fn satisfies_is_reflexive_and_upward() {
        assert!(AccessLevel::Admin.satisfies(AccessLevel::Read));
        assert!(AccessLevel::Read.satisfies(AccessLevel::Read));
        assert!(!AccessLevel::Read.satisfies(AccessLevel::Admin));
    }
}
