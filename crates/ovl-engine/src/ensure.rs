// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One `Ensure` pass: under the state lock, collect every ready task, mark
//! it `Doing`, and dispatch its handler off the lock. A task's failure
//! tears down its lane (or, for lane-less tasks, its whole change): `Do`
//! siblings move to `Hold` and the change's cancellation token fires so any
//! still-`Doing` sibling observes it.

use crate::handler::{HandlerError, TaskContext};
use crate::registry::HandlerRegistry;
use ovl_core::id::{ChangeId, TaskId};
use ovl_core::Clock;
use ovl_state::{StateStore, TaskStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Per-change cancellation tokens ("tombs"), created lazily the first time
/// a task in that change is dispatched and cancelled once any of its
/// siblings errors.
pub type Tombs = Arc<Mutex<HashMap<ChangeId, CancellationToken>>>;

struct Dispatch {
    task_id: TaskId,
    kind: String,
    change_id: Option<ChangeId>,
}

/// Run one synchronous collection step, then spawn each ready task's
/// handler as an independent concurrent worker.
pub fn ensure<C: Clock>(
    state: &Arc<StateStore>,
    registry: &Arc<HandlerRegistry<C>>,
    clock: &C,
    completion: &Arc<Notify>,
    tombs: &Tombs,
) {
    let now_ms = clock.epoch_ms();
    let mut to_dispatch = Vec::new();

    {
        let mut data = state.lock();

        let change_of: HashMap<TaskId, ChangeId> = data
            .changes
            .iter()
            .flat_map(|(cid, c)| c.tasks.iter().map(move |tid| (*tid, *cid)))
            .collect();

        let ready_ids: Vec<TaskId> = {
            let tasks = &data.tasks;
            tasks.values().filter(|t| t.is_ready(|id| tasks.get(id))).map(|t| t.id).collect()
        };

        for id in ready_ids {
            let kind = data.tasks[&id].kind.clone();
            data.tasks.get_mut(&id).expect("id came from this map").set_status(TaskStatus::Doing, now_ms);
            to_dispatch.push(Dispatch { task_id: id, kind, change_id: change_of.get(&id).copied() });
        }

        recompute_changes(&mut data, now_ms);
    }

    for Dispatch { task_id, kind, change_id } in to_dispatch {
        dispatch_one(state, registry, clock, completion, tombs, task_id, kind, change_id);
    }
}

fn dispatch_one<C: Clock>(
    state: &Arc<StateStore>,
    registry: &Arc<HandlerRegistry<C>>,
    clock: &C,
    completion: &Arc<Notify>,
    tombs: &Tombs,
    task_id: TaskId,
    kind: String,
    change_id: Option<ChangeId>,
) {
    let Some(handler) = registry.get(&kind) else {
        fail_task(state, clock, tombs, task_id, change_id, format!("no handler registered for task kind {kind:?}"));
        completion.notify_waiters();
        return;
    };

    let tomb = change_id
        .map(|cid| tombs.lock().entry(cid).or_insert_with(CancellationToken::new).clone())
        .unwrap_or_default();
    let ctx = TaskContext { task_id, state: Arc::clone(state), tomb, clock: clock.clone() };
    let do_fn = Arc::clone(&handler.do_fn);

    let state = Arc::clone(state);
    let clock = clock.clone();
    let completion = Arc::clone(completion);
    let tombs = Arc::clone(tombs);
    tokio::spawn(async move {
        let result = do_fn(ctx).await;
        match result {
            Ok(()) => {
                let now_ms = clock.epoch_ms();
                let mut data = state.lock();
                if let Some(t) = data.tasks.get_mut(&task_id) {
                    t.set_status(TaskStatus::Done, now_ms);
                }
                recompute_changes(&mut data, now_ms);
            }
            Err(HandlerError(message)) => {
                fail_task(&state, &clock, &tombs, task_id, change_id, message);
            }
        }
        completion.notify_waiters();
    });
}

/// Mark `task_id` `Error` with `message`, then tear down its lane (or
/// change, if it's in no lane) and cancel the change's tomb.
fn fail_task<C: Clock>(
    state: &Arc<StateStore>,
    clock: &C,
    tombs: &Tombs,
    task_id: TaskId,
    change_id: Option<ChangeId>,
    message: String,
) {
    let now_ms = clock.epoch_ms();
    let mut data = state.lock();

    if let Some(t) = data.tasks.get_mut(&task_id) {
        t.errorf(now_ms, message);
        t.set_status(TaskStatus::Error, now_ms);
    }

    let lanes = data.tasks.get(&task_id).map(|t| t.lanes.clone()).unwrap_or_default();
    if !lanes.is_empty() {
        let victims: Vec<TaskId> = data
            .tasks
            .iter()
            .filter(|(id, t)| {
                **id != task_id && t.status == TaskStatus::Do && t.lanes.iter().any(|l| lanes.contains(l))
            })
            .map(|(id, _)| *id)
            .collect();
        for id in victims {
            if let Some(t) = data.tasks.get_mut(&id) {
                t.set_status(TaskStatus::Hold, now_ms);
            }
        }
    } else if let Some(cid) = change_id {
        let sibling_ids: Vec<TaskId> = data
            .changes
            .get(&cid)
            .map(|c| c.tasks.iter().copied().filter(|id| *id != task_id).collect())
            .unwrap_or_default();
        for id in sibling_ids {
            if data.tasks.get(&id).map(|t| t.status == TaskStatus::Do).unwrap_or(false) {
                if let Some(t) = data.tasks.get_mut(&id) {
                    t.set_status(TaskStatus::Hold, now_ms);
                }
            }
        }
    }

    recompute_changes(&mut data, now_ms);
    drop(data);

    if let Some(cid) = change_id {
        if let Some(token) = tombs.lock().get(&cid) {
            token.cancel();
        }
    }
}

fn recompute_changes(data: &mut ovl_state::StateData, now_ms: u64) {
    let tasks = data.tasks.clone();
    for change in data.changes.values_mut() {
        change.recompute(&tasks, now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use ovl_core::clock::FakeClock;
    use ovl_state::{Change, ChangeStatus, StateStore, TaskSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (Arc<StateStore>, Arc<HandlerRegistry<FakeClock>>, FakeClock, Arc<Notify>, Tombs) {
        (
            Arc::new(StateStore::in_memory("boot-1")),
            Arc::new(HandlerRegistry::new()),
            FakeClock::new(),
            Arc::new(Notify::new()),
            Arc::new(Mutex::new(HashMap::new())),
        )
    }

    #[tokio::test]
    async fn a_ready_task_runs_its_handler_and_completes() {
        let (state, mut registry, clock, completion, tombs) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        Arc::get_mut(&mut registry).unwrap().add(
            "start",
            Handler::without_undo(Arc::new(move |_ctx| {
                let calls = Arc::clone(&calls_clone);
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })),
        );

        let task_id = {
            let mut data = state.lock();
            let change_id = data.new_change("start", "Start \"web\"", 0);
            let task_id = data.new_task("start", "Start \"web\"", 0);
            data.add_tasks_to_change(change_id, &TaskSet::new([task_id]));
            task_id
        };

        ensure(&state, &registry, &clock, &completion, &tombs);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let data = state.lock();
        assert_eq!(data.tasks[&task_id].status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn an_unready_task_is_left_alone() {
        let (state, registry, clock, completion, tombs) = setup();
        let (blocker_id, dependent_id) = {
            let mut data = state.lock();
            let blocker = data.new_task("start", "a", 0);
            let dependent = data.new_task("start", "b", 0);
            data.tasks.get_mut(&dependent).unwrap().wait_tasks.insert(blocker);
            (blocker, dependent)
        };
        let _ = blocker_id;

        ensure(&state, &registry, &clock, &completion, &tombs);
        let data = state.lock();
        assert_eq!(data.tasks[&dependent_id].status, TaskStatus::Do);
    }

    #[tokio::test]
    async fn a_task_with_no_registered_handler_errors_immediately() {
        let (state, registry, clock, completion, tombs) = setup();
        let task_id = {
            let mut data = state.lock();
            let change_id = data.new_change("start", "s", 0);
            let task_id = data.new_task("missing-kind", "s", 0);
            data.add_tasks_to_change(change_id, &TaskSet::new([task_id]));
            task_id
        };

        ensure(&state, &registry, &clock, &completion, &tombs);
        let data = state.lock();
        assert_eq!(data.tasks[&task_id].status, TaskStatus::Error);
    }

    #[tokio::test]
    async fn a_failing_task_holds_its_do_siblings_in_the_same_change() {
        let (state, mut registry, clock, completion, tombs) = setup();
        Arc::get_mut(&mut registry).unwrap().add(
            "fails",
            Handler::without_undo(Arc::new(|_ctx| {
                Box::pin(async { Err(HandlerError::new("boom")) })
            })),
        );

        let (failing_id, sibling_id) = {
            let mut data = state.lock();
            let change_id = data.new_change("start", "s", 0);
            let failing = data.new_task("fails", "a", 0);
            let sibling = data.new_task("start", "b", 0);
            data.tasks.get_mut(&sibling).unwrap().wait_tasks.insert(failing);
            data.tasks.get_mut(&sibling).unwrap().status = TaskStatus::Do;
            // Give the sibling no dependency on the failing task's outcome
            // so it's immediately ready in this same pass; only the
            // blocking wait above would have made it wait.
            data.tasks.get_mut(&sibling).unwrap().wait_tasks.clear();
            data.add_tasks_to_change(change_id, &TaskSet::new([failing, sibling]));
            (failing, sibling)
        };

        ensure(&state, &registry, &clock, &completion, &tombs);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let data = state.lock();
        assert_eq!(data.tasks[&failing_id].status, TaskStatus::Error);
        assert_eq!(data.tasks[&sibling_id].status, TaskStatus::Hold);
    }

    #[tokio::test]
    async fn change_status_reflects_an_errored_task() {
        let (state, mut registry, clock, completion, tombs) = setup();
        Arc::get_mut(&mut registry).unwrap().add(
            "fails",
            Handler::without_undo(Arc::new(|_ctx| Box::pin(async { Err(HandlerError::new("boom")) }))),
        );
        let change_id = {
            let mut data = state.lock();
            let change_id = data.new_change("start", "s", 0);
            let task_id = data.new_task("fails", "a", 0);
            data.add_tasks_to_change(change_id, &TaskSet::new([task_id]));
            change_id
        };

        ensure(&state, &registry, &clock, &completion, &tombs);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let data = state.lock();
        assert_eq!(data.changes[&change_id].status(&data.tasks), ChangeStatus::Error);
        assert!(data.changes[&change_id].err.is_some());
    }

    #[test]
    fn empty_change_reports_done_after_recompute() {
        let mut data = ovl_state::StateData::default();
        let change = Change::new("replan", "Replan - no services", 0);
        let id = change.id;
        data.changes.insert(id, change);
        recompute_changes(&mut data, 0);
        assert_eq!(data.changes[&id].status(&data.tasks), ChangeStatus::Done);
    }
}
