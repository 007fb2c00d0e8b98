// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the state store.

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("identity {0:?} already exists")]
    IdentityAlreadyExists(String),
    #[error("identity {0:?} does not exist")]
    IdentityNotFound(String),
    #[error("state is poisoned; a lock holder panicked while holding the write lock")]
    Poisoned,
    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("persistence serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
