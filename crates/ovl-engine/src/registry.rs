// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `AddHandler(kind, do, undo)`: dynamic dispatch from a task's `kind`
//! string to its registered handler pair.

use crate::handler::Handler;
use ovl_core::Clock;
use std::collections::HashMap;

pub struct HandlerRegistry<C: Clock> {
    handlers: HashMap<String, Handler<C>>,
}

impl<C: Clock> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> HandlerRegistry<C> {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    pub fn add(&mut self, kind: impl Into<String>, handler: Handler<C>) {
        self.handlers.insert(kind.into(), handler);
    }

    pub fn get(&self, kind: &str) -> Option<&Handler<C>> {
        self.handlers.get(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerError, TaskContext};
    use ovl_core::clock::SystemClock;
    use std::sync::Arc;

    fn noop_handler() -> Handler<SystemClock> {
        Handler::without_undo(Arc::new(|_ctx: TaskContext<SystemClock>| {
            Box::pin(async { Ok::<(), HandlerError>(()) })
        }))
    }

    #[test]
    fn unregistered_kind_is_none() {
        let registry: HandlerRegistry<SystemClock> = HandlerRegistry::new();
        assert!(registry.get("start").is_none());
    }

    #[test]
    fn registered_kind_is_found() {
        let mut registry: HandlerRegistry<SystemClock> = HandlerRegistry::new();
        registry.add("start", noop_handler());
        assert!(registry.get("start").is_some());
        assert!(registry.get("stop").is_none());
    }

    #[test]
    fn re_adding_a_kind_replaces_the_previous_handler() {
        let mut registry: HandlerRegistry<SystemClock> = HandlerRegistry::new();
        registry.add("start", noop_handler());
        registry.add("start", noop_handler());
        assert!(registry.get("start").is_some());
    }
}
