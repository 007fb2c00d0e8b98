// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Overlord Facade: wires the state store, state engine, service
//! manager, check manager, log broker, and access resolver into a
//! single daemon object and correlates the managers' independent event
//! outboxes (a check going down, a service asking to shut the daemon
//! down) into concrete action.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod bootid;
pub mod config;
pub mod facade;

pub use facade::{ChangeSnapshot, Overlord, RunOutcome};
