// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The exclusive in-memory state store, with atomic snapshot persistence.
//!
//! All mutable state — changes, tasks, identities, warnings — lives behind
//! one [`parking_lot::Mutex`], mirroring how the reference runtime holds its
//! whole materialized state behind a single lock rather than one per
//! collection: every `Ensure` pass needs a consistent view across changes,
//! tasks, and lanes at once, so finer-grained locking would just move the
//! coordination problem rather than remove it.

use crate::change::{Change, TaskSet};
use crate::error::StateError;
use crate::identity::Identity;
use crate::task::Task;
use crate::warning::WarningStore;
use ovl_core::id::{ChangeId, TaskId};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Schema version of the on-disk snapshot, bumped on incompatible layout changes.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const MAX_BAK_FILES: u32 = 3;

/// The complete in-memory state, as persisted to and restored from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateData {
    pub changes: HashMap<ChangeId, Change>,
    pub tasks: HashMap<TaskId, Task>,
    pub identities: HashMap<String, Identity>,
    #[serde(default)]
    pub warnings: WarningStore,
    /// Random id stamped at process start, used to detect whether the
    /// daemon came back up after a crash or an orderly restart.
    pub boot_id: String,
}

impl StateData {
    fn new(boot_id: impl Into<String>) -> Self {
        Self {
            changes: HashMap::new(),
            tasks: HashMap::new(),
            identities: HashMap::new(),
            warnings: WarningStore::default(),
            boot_id: boot_id.into(),
        }
    }

    /// Create and insert a new change, returning its id.
    pub fn new_change(&mut self, kind: impl Into<String>, summary: impl Into<String>, now_ms: u64) -> ChangeId {
        let change = Change::new(kind, summary, now_ms);
        let id = change.id;
        self.changes.insert(id, change);
        id
    }

    /// Create and insert a new task, returning its id. Callers attach it to
    /// a change with [`Change::add_all`] via a [`TaskSet`].
    pub fn new_task(&mut self, kind: impl Into<String>, summary: impl Into<String>, now_ms: u64) -> TaskId {
        let task = Task::new(kind, summary, now_ms);
        let id = task.id;
        self.tasks.insert(id, task);
        id
    }

    /// Attach every task in `set` to `change`.
    pub fn add_tasks_to_change(&mut self, change: ChangeId, set: &TaskSet) {
        if let Some(change) = self.changes.get_mut(&change) {
            change.add_all(set);
        }
    }

    /// Changes matching `kind`, most recently spawned first.
    pub fn changes_by_kind(&self, kind: &str) -> Vec<&Change> {
        let mut changes: Vec<&Change> =
            self.changes.values().filter(|c| c.kind == kind).collect();
        changes.sort_by(|a, b| b.spawn_time_ms.cmp(&a.spawn_time_ms));
        changes
    }

    /// Changes whose status is ready (i.e. not `Do`/`Doing`).
    pub fn ready_changes(&self) -> Vec<&Change> {
        self.changes.values().filter(|c| c.status(&self.tasks).is_ready()).collect()
    }

    /// Changes that tag the given service name.
    pub fn changes_for_service(&self, service: &str) -> Vec<&Change> {
        self.changes.values().filter(|c| c.tags_service(service)).collect()
    }

    pub fn add_identity(&mut self, identity: Identity) -> Result<(), StateError> {
        if self.identities.contains_key(&identity.name) {
            return Err(StateError::IdentityAlreadyExists(identity.name));
        }
        self.identities.insert(identity.name.clone(), identity);
        Ok(())
    }

    /// Update an existing identity in place; the access level and
    /// credentials are replaced wholesale, matching the CLI's single-shot
    /// `identity update` semantics.
    pub fn update_identity(&mut self, identity: Identity) -> Result<(), StateError> {
        if !self.identities.contains_key(&identity.name) {
            return Err(StateError::IdentityNotFound(identity.name));
        }
        self.identities.insert(identity.name.clone(), identity);
        Ok(())
    }

    /// Replace the entire identity set, e.g. from a bulk `identities.yaml` apply.
    pub fn replace_identities(&mut self, identities: Vec<Identity>) {
        self.identities = identities.into_iter().map(|i| (i.name.clone(), i)).collect();
    }

    pub fn remove_identity(&mut self, name: &str) -> Result<Identity, StateError> {
        self.identities.remove(name).ok_or_else(|| StateError::IdentityNotFound(name.to_string()))
    }

    pub fn identity(&self, name: &str) -> Option<&Identity> {
        self.identities.get(name)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    #[serde(rename = "v")]
    version: u32,
    state: StateData,
}

/// Exclusive access to the state. Unlike a plain `parking_lot::MutexGuard`,
/// dropping this guard mid-panic marks the store poisoned: `parking_lot`
/// locks don't poison on their own, but a handler that panics holding the
/// state half-mutated must not let the daemon carry on as if nothing
/// happened.
pub struct StateGuard<'a> {
    guard: MutexGuard<'a, StateData>,
    poisoned: &'a AtomicBool,
    dirty: &'a AtomicBool,
    dirty_notify: &'a Notify,
}

impl std::ops::Deref for StateGuard<'_> {
    type Target = StateData;
    fn deref(&self) -> &StateData {
        &self.guard
    }
}

impl std::ops::DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut StateData {
        &mut self.guard
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.poisoned.store(true, Ordering::SeqCst);
        }
        // Every unlock marks the state dirty, whether or not this
        // particular borrow actually mutated anything: a read-only
        // borrow is indistinguishable from a write-then-revert one from
        // out here, and the background writer flushing one extra,
        // unchanged snapshot is cheap next to losing a real one.
        self.dirty.store(true, Ordering::SeqCst);
        self.dirty_notify.notify_one();
    }
}

/// Owns the state and, if configured with a path, persists it atomically.
pub struct StateStore {
    path: Option<PathBuf>,
    data: Mutex<StateData>,
    poisoned: AtomicBool,
    /// Set on every unlock; cleared once the background writer has
    /// flushed a snapshot reflecting it. See [`StateStore::save_if_dirty`].
    dirty: AtomicBool,
    dirty_notify: Notify,
    /// Whether `boot_id` differed from the snapshot on load, i.e. the
    /// daemon restarted since the state was last saved.
    rebooted: bool,
}

impl StateStore {
    /// An in-memory-only store, useful for tests and embedding.
    pub fn in_memory(boot_id: impl Into<String>) -> Self {
        Self {
            path: None,
            data: Mutex::new(StateData::new(boot_id)),
            poisoned: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            dirty_notify: Notify::new(),
            rebooted: false,
        }
    }

    /// Load a store from `path`, creating an empty one if the file doesn't
    /// exist yet. `rebooted()` reports whether the persisted `boot_id`
    /// differs from `current_boot_id`.
    pub fn load(path: impl Into<PathBuf>, current_boot_id: impl Into<String>) -> Result<Self, StateError> {
        let path = path.into();
        let current_boot_id = current_boot_id.into();
        match fs::read(&path) {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                let rebooted = snapshot.state.boot_id != current_boot_id;
                let mut state = snapshot.state;
                state.boot_id = current_boot_id;
                Ok(Self {
                    path: Some(path),
                    data: Mutex::new(state),
                    poisoned: AtomicBool::new(false),
                    dirty: AtomicBool::new(false),
                    dirty_notify: Notify::new(),
                    rebooted,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self {
                path: Some(path),
                data: Mutex::new(StateData::new(current_boot_id)),
                poisoned: AtomicBool::new(false),
                dirty: AtomicBool::new(false),
                dirty_notify: Notify::new(),
                rebooted: true,
            }),
            Err(err) => Err(StateError::Io(err)),
        }
    }

    /// True if this store was loaded fresh (no prior snapshot) or the
    /// persisted `boot_id` didn't match the process's current one.
    pub fn rebooted(&self) -> bool {
        self.rebooted
    }

    /// True once a lock holder has panicked while holding the write lock.
    /// The facade's main loop checks this after every `Ensure` pass and
    /// exits the daemon rather than keep operating on possibly-inconsistent
    /// state.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Acquire exclusive access to the state.
    pub fn lock(&self) -> StateGuard<'_> {
        StateGuard {
            guard: self.data.lock(),
            poisoned: &self.poisoned,
            dirty: &self.dirty,
            dirty_notify: &self.dirty_notify,
        }
    }

    /// True if the state has changed since the last successful save.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Resolves the next time a lock holder unlocks the state, for the
    /// background writer to wait on instead of polling.
    pub async fn dirty_changed(&self) {
        self.dirty_notify.notified().await;
    }

    /// Save iff the state is dirty, clearing the flag first: a lock taken
    /// and dropped while `save()` is running just re-dirties the flag for
    /// the next pass rather than being lost.
    pub fn save_if_dirty(&self) -> Result<(), StateError> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(err) = self.save() {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    /// Write the current state to disk atomically: serialize to a temp
    /// file in the same directory, rotate the previous snapshot into
    /// `.bak`, then rename the temp file into place. A crash at any point
    /// leaves either the old snapshot or the new one fully intact, never a
    /// half-written file.
    pub fn save(&self) -> Result<(), StateError> {
        let Some(path) = &self.path else { return Ok(()) };
        let snapshot = {
            let data = self.data.lock();
            Snapshot { version: CURRENT_SNAPSHOT_VERSION, state: data.clone() }
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".ovl-state-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        use std::io::Write;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;

        if path.exists() {
            let bak = rotate_bak_path(path);
            fs::rename(path, bak)?;
        }
        tmp.persist(path).map_err(|e| StateError::Io(e.error))?;
        Ok(())
    }
}

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`. The
/// oldest backup is removed when the limit is reached.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}
