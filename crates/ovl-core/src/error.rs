// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error-kind taxonomy shared by every crate's public error type.
//!
//! Every error carries a `message` sentence and, where applicable, a
//! `kind` drawn from the closed set below; callers pattern-match on
//! `kind`, never on the message text.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    LoginRequired,
    PermissionDenied,
    NotFound,
    GenericFileError,
    SystemRestart,
    DaemonRestart,
    NoDefaultServices,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::LoginRequired => "login-required",
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::NotFound => "not-found",
            ErrorKind::GenericFileError => "generic-file-error",
            ErrorKind::SystemRestart => "system-restart",
            ErrorKind::DaemonRestart => "daemon-restart",
            ErrorKind::NoDefaultServices => "no-default-services",
        };
        f.write_str(s)
    }
}

/// A generic error carrying a user-facing sentence and an optional
/// machine-matchable kind, used where a crate doesn't need a richer
/// `thiserror` enum of its own (mirrors the shape every crate-specific
/// error converts into at the facade boundary).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CoreError {
    pub message: String,
    pub kind: Option<ErrorKind>,
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: None }
    }

    pub fn with_kind(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self { message: message.into(), kind: Some(kind) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_matches_wire_format() {
        assert_eq!(ErrorKind::NoDefaultServices.to_string(), "no-default-services");
        assert_eq!(ErrorKind::LoginRequired.to_string(), "login-required");
    }

    #[test]
    fn core_error_without_kind_still_has_a_message() {
        let err = CoreError::new("service is not running");
        assert_eq!(err.to_string(), "service is not running");
        assert!(err.kind.is_none());
    }
}
