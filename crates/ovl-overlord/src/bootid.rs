// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An id handed to [`ovl_state::StateStore::load`] so it can tell whether
//! the machine rebooted since the state was last saved, as opposed to
//! this process simply having been restarted on the same boot.
//!
//! On Linux this reads the kernel's own boot id, which is regenerated on
//! every boot and stable across any number of process restarts in
//! between. Anywhere else (and if the kernel file is unreadable) there is
//! no such primitive, so a fresh random id is generated and persisted to
//! a file under the state directory; this correctly treats "I don't know
//! whether we rebooted" as "assume we did," which just means a spurious
//! entry in whatever log cares about `system-restart-from-boot-id`.

use std::path::Path;

const LINUX_BOOT_ID_PATH: &str = "/proc/sys/kernel/random/boot_id";

/// Determine this boot's id, falling back to a freshly generated one
/// persisted at `fallback_path` when the kernel doesn't expose one.
pub fn current(fallback_path: &Path) -> String {
    if let Ok(id) = std::fs::read_to_string(LINUX_BOOT_ID_PATH) {
        let id = id.trim();
        if !id.is_empty() {
            return id.to_string();
        }
    }
    read_or_create_fallback(fallback_path)
}

fn read_or_create_fallback(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return existing.to_string();
        }
    }
    let fresh = format!("boot-{}", nanoid::nanoid!(16));
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(path, &fresh);
    fresh
}
