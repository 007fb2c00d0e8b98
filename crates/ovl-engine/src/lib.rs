// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The State Engine: a cooperative task runner driving registered
//! handlers to completion against the state store.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod ensure;
pub mod handler;
pub mod loop_;
pub mod registry;

pub use ensure::{ensure as run_ensure, Tombs};
pub use handler::{Handler, HandlerError, HandlerFn, HandlerFuture, TaskContext};
pub use loop_::{EngineLoop, DEFAULT_TICK};
pub use registry::HandlerRegistry;
