// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ReadAccess` and `WriteAccess`, the two checkers every endpoint is
//! guarded by, plus the canonical check contract.
//!
//! The repository this was distilled from carries two divergent shapes for
//! this check (one keyed on raw ucred, one on a resolved transport +
//! user-state pair); the transport+UserState shape is the one treated as
//! authoritative here, with peer-credential extraction happening upstream
//! in request pre-processing rather than inside the checker itself.

use ovl_core::AccessLevel;
use thiserror::Error;

/// The two standing access checks every endpoint declares one of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checker {
    /// Read-only endpoints: any authenticated local user or higher.
    Read,
    /// Mutating endpoints: admin only.
    Write,
    /// Metrics-only endpoints (a third, lighter tier some deployments use).
    Metrics,
    /// No check at all — open endpoints like `system-info`/`health`.
    Open,
}

impl Checker {
    pub fn required_level(self) -> AccessLevel {
        match self {
            Checker::Open => AccessLevel::Untrusted,
            Checker::Metrics => AccessLevel::Metrics,
            Checker::Read => AccessLevel::Read,
            Checker::Write => AccessLevel::Admin,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("access denied")]
pub struct AccessDenied {
    pub required: AccessLevel,
    pub actual: AccessLevel,
}

/// `AccessChecker.CheckAccess(d, r, user) -> Response?`: given the level a
/// request resolved to and the level an endpoint requires, allow or deny.
pub fn check_access(checker: Checker, resolved: AccessLevel) -> Result<(), AccessDenied> {
    let required = checker.required_level();
    if resolved.satisfies(required) {
        Ok(())
    } else {
        Err(AccessDenied { required, actual: resolved })
    }
}
