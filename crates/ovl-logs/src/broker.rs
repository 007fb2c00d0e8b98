// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Log Broker: owns one [`RingBuffer`] per service and hands out
//! iterators and merges over them.

use crate::merge::MergeStream;
use crate::ring::{LogEntry, RingBuffer, Stream};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// Default per-service buffer capacity, matching what a single bursty
/// service produces in a few minutes of chatty logging.
pub const DEFAULT_BUFFER_BYTES: usize = 1024 * 1024;

/// Default backlog length for a non-follow `logs` request with `n=0`.
pub const DEFAULT_TAIL_LINES: usize = 30;

pub struct LogBroker {
    buffers: RwLock<HashMap<String, Arc<RingBuffer>>>,
    capacity_bytes: usize,
    any_write: Arc<Notify>,
}

impl LogBroker {
    pub fn new(capacity_bytes: usize) -> Self {
        Self { buffers: RwLock::new(HashMap::new()), capacity_bytes, any_write: Arc::new(Notify::new()) }
    }

    fn buffer_for(&self, service: &str) -> Arc<RingBuffer> {
        if let Some(buf) = self.buffers.read().get(service) {
            return buf.clone();
        }
        let mut buffers = self.buffers.write();
        buffers
            .entry(service.to_string())
            .or_insert_with(|| {
                RingBuffer::with_global_notify(self.capacity_bytes, Some(self.any_write.clone()))
            })
            .clone()
    }

    pub fn write(&self, service: &str, stream: Stream, message: impl Into<String>, now_ms: u64) {
        let entry = LogEntry { time_ms: now_ms, service: service.to_string(), stream, message: message.into() };
        self.buffer_for(service).push(entry);
    }

    /// Build a merge over the named services. `n` mirrors the control-API
    /// `logs?n=` parameter: `-1` means "everything currently buffered",
    /// any other non-negative value is the tail window size.
    pub fn merge(&self, services: &[String], n: i64, follow: bool) -> MergeStream {
        let sources: Vec<_> = services
            .iter()
            .map(|name| {
                let buffer = self.buffer_for(name);
                let iter = if n < 0 {
                    buffer.head_iterator(usize::MAX)
                } else {
                    buffer.head_iterator(n as usize)
                };
                (name.clone(), iter)
            })
            .collect();
        let backlog_capacity = if n < 0 { usize::MAX } else { (n as usize).max(1) };
        MergeStream::new(sources, follow, backlog_capacity, self.any_write.clone())
    }

    pub fn known_services(&self) -> Vec<String> {
        self.buffers.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn writes_are_visible_through_a_merge() {
        let broker = LogBroker::new(DEFAULT_BUFFER_BYTES);
        broker.write("web", Stream::Stdout, "hello", 0);
        broker.write("web", Stream::Stdout, "world", 1);

        let mut merged = broker.merge(&["web".to_string()], -1, false);
        let cancel = CancellationToken::new();
        let first = merged.recv(&cancel).await.unwrap();
        assert_eq!(first.message, "hello");
        let second = merged.recv(&cancel).await.unwrap();
        assert_eq!(second.message, "world");
    }

    #[tokio::test]
    async fn a_write_wakes_a_following_merge() {
        let broker = LogBroker::new(DEFAULT_BUFFER_BYTES);
        let mut merged = broker.merge(&["web".to_string()], 0, true);
        let cancel = CancellationToken::new();

        let recv_task = tokio::spawn(async move { merged.recv(&cancel).await });
        tokio::task::yield_now().await;
        broker.write("web", Stream::System, "started", 42);

        let entry = tokio::time::timeout(std::time::Duration::from_secs(1), recv_task)
            .await
            .expect("did not time out")
            .expect("task did not panic");
        assert_eq!(entry.unwrap().message, "started");
    }

    #[test]
    fn unknown_service_buffer_is_created_lazily_on_first_write() {
        let broker = LogBroker::new(DEFAULT_BUFFER_BYTES);
        assert!(broker.known_services().is_empty());
        broker.write("db", Stream::Stderr, "oops", 0);
        assert_eq!(broker.known_services(), vec!["db".to_string()]);
    }
}
