// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The time-bounded window during which a new mTLS peer certificate may be
//! paired to an identity name.
//!
//! Once paired, the fingerprint is stored as an ordinary
//! `Credentials::Tls` identity and resolves like any other; the window
//! only gates the act of creating that pairing, not later lookups.

use parking_lot::Mutex;

pub struct PairingWindow {
    open_until_ms: Mutex<Option<u64>>,
}

impl Default for PairingWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl PairingWindow {
    pub fn new() -> Self {
        Self { open_until_ms: Mutex::new(None) }
    }

    /// Open the window for `duration_ms` starting at `now_ms`.
    pub fn open(&self, now_ms: u64, duration_ms: u64) {
        *self.open_until_ms.lock() = Some(now_ms + duration_ms);
    }

    pub fn close(&self) {
        *self.open_until_ms.lock() = None;
    }

    pub fn is_open(&self, now_ms: u64) -> bool {
        matches!(*self.open_until_ms.lock(), Some(deadline) if now_ms < deadline)
    }
}
