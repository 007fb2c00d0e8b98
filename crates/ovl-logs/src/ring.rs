// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A per-service, byte-bounded ring buffer with head/tail iterators.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time_ms: u64,
    pub service: String,
    pub stream: Stream,
    pub message: String,
}

impl LogEntry {
    fn byte_size(&self) -> usize {
        self.message.len()
    }
}

struct Inner {
    capacity_bytes: usize,
    bytes_used: usize,
    /// `(position, entry)`; `position` is monotonically increasing and
    /// never reused, so an iterator's cursor remains meaningful even after
    /// older entries are evicted.
    entries: VecDeque<(u64, LogEntry)>,
    next_pos: u64,
    truncated: bool,
}

impl Inner {
    fn oldest_pos(&self) -> u64 {
        self.entries.front().map(|(pos, _)| *pos).unwrap_or(self.next_pos)
    }
}

/// A bounded, append-only log buffer for one service. Writers append;
/// readers iterate via [`LogIterator`] without ever blocking a writer.
pub struct RingBuffer {
    inner: Mutex<Inner>,
    notify: Notify,
    /// Forwarded to a [`crate::broker::LogBroker`]'s shared wake signal so
    /// a multi-service merge can wait on one channel instead of polling
    /// every buffer in turn.
    global_notify: Option<Arc<Notify>>,
}

impl RingBuffer {
    pub fn new(capacity_bytes: usize) -> Arc<Self> {
        Self::with_global_notify(capacity_bytes, None)
    }

    pub(crate) fn with_global_notify(capacity_bytes: usize, global_notify: Option<Arc<Notify>>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                capacity_bytes,
                bytes_used: 0,
                entries: VecDeque::new(),
                next_pos: 0,
                truncated: false,
            }),
            notify: Notify::new(),
            global_notify,
        })
    }

    /// Append an entry, evicting the oldest entries first if it would
    /// overflow the byte budget. A single entry larger than the whole
    /// buffer still gets appended (an empty buffer can't reject every
    /// write just because one line is long), but the buffer then holds
    /// only that entry and the truncation marker fires.
    pub fn push(&self, entry: LogEntry) {
        let mut inner = self.inner.lock();
        let size = entry.byte_size();
        while inner.bytes_used + size > inner.capacity_bytes && !inner.entries.is_empty() {
            if let Some((_, evicted)) = inner.entries.pop_front() {
                inner.bytes_used = inner.bytes_used.saturating_sub(evicted.byte_size());
                inner.truncated = true;
            }
        }
        let pos = inner.next_pos;
        inner.next_pos += 1;
        inner.bytes_used += size;
        inner.entries.push_back((pos, entry));
        drop(inner);
        self.notify.notify_waiters();
        if let Some(global) = &self.global_notify {
            global.notify_waiters();
        }
    }

    pub fn bytes_used(&self) -> usize {
        self.inner.lock().bytes_used
    }

    pub fn truncated(&self) -> bool {
        self.inner.lock().truncated
    }

    fn next_pos(&self) -> u64 {
        self.inner.lock().next_pos
    }

    /// An iterator positioned `n` entries back from the current tail (or
    /// at the head if fewer than `n` entries exist).
    pub fn head_iterator(self: &Arc<Self>, n: usize) -> LogIterator {
        let inner = self.inner.lock();
        let len = inner.entries.len();
        let start_index = len.saturating_sub(n);
        let cursor = inner.entries.get(start_index).map(|(pos, _)| *pos).unwrap_or(inner.next_pos);
        drop(inner);
        LogIterator { buffer: Arc::downgrade(self), cursor }
    }

    /// An iterator positioned past the current end; only future writes are seen.
    pub fn tail_iterator(self: &Arc<Self>) -> LogIterator {
        LogIterator { buffer: Arc::downgrade(self), cursor: self.next_pos() }
    }

    fn entry_at(&self, cursor: u64) -> (Option<LogEntry>, u64) {
        let inner = self.inner.lock();
        if cursor >= inner.next_pos {
            return (None, cursor);
        }
        let oldest = inner.oldest_pos();
        let cursor = cursor.max(oldest);
        let index = (cursor - oldest) as usize;
        match inner.entries.get(index) {
            Some((pos, entry)) => (Some(entry.clone()), pos + 1),
            None => (None, inner.next_pos),
        }
    }
}

/// A cursor into a [`RingBuffer`]. Holds a weak reference: once the buffer
/// is dropped the iterator simply stops producing entries, matching
/// "iterator `Close` deregisters" without a separate registry to maintain.
pub struct LogIterator {
    buffer: Weak<RingBuffer>,
    cursor: u64,
}

impl LogIterator {
    /// Return the next already-buffered entry without blocking, or `None`
    /// if the iterator has caught up to the live tail (or the buffer is gone).
    pub fn next_entry(&mut self) -> Option<LogEntry> {
        let buffer = self.buffer.upgrade()?;
        let (entry, next_cursor) = buffer.entry_at(self.cursor);
        self.cursor = next_cursor;
        entry
    }

    /// Whether the underlying buffer has been dropped; a closed iterator
    /// will never produce another entry.
    pub fn is_closed(&self) -> bool {
        self.buffer.upgrade().is_none()
    }

    /// Suspend until the buffer receives another write (or is dropped).
    pub async fn notified(&self) {
        if let Some(buffer) = self.buffer.upgrade() {
            buffer.notify.notified().await;
        }
    }
}
