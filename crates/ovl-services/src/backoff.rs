// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart backoff, computed from a service's configured delay/factor/limit.

use ovl_plan::ServiceConfig;
use std::time::Duration;

/// `delay = min(limit, delay * factor^(restart_count - 1))`, zero for the
/// first attempt (`restart_count == 0`).
pub fn next_delay(cfg: &ServiceConfig, restart_count: u32) -> Duration {
    ovl_core::backoff_delay(cfg.backoff_delay, cfg.backoff_factor, cfg.backoff_limit, restart_count)
}
