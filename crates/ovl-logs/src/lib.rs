// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Log Broker: per-service bounded ring buffers, head/tail iterators,
//! and a server-side k-way merge with client-side backpressure.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod broker;
pub mod merge;
pub mod ring;

pub use broker::{LogBroker, DEFAULT_BUFFER_BYTES, DEFAULT_TAIL_LINES};
pub use merge::MergeStream;
pub use ring::{LogEntry, LogIterator, RingBuffer, Stream};
