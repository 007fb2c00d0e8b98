// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-side k-way merge across per-service log iterators, with
//! per-client backpressure.

use crate::ring::{LogEntry, LogIterator};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

struct MergeSource {
    service: String,
    iter: LogIterator,
    peeked: Option<LogEntry>,
}

/// Merges several services' log iterators into one timestamp-ordered
/// stream. Ties break by service name, stably. A bounded backlog absorbs
/// bursts so a slow consumer only ever sees the most recent `n` entries
/// rather than falling further and further behind the live tail.
pub struct MergeStream {
    sources: Vec<MergeSource>,
    follow: bool,
    backlog: VecDeque<LogEntry>,
    backlog_capacity: usize,
    any_write: Arc<Notify>,
}

impl MergeStream {
    pub(crate) fn new(
        sources: Vec<(String, LogIterator)>,
        follow: bool,
        backlog_capacity: usize,
        any_write: Arc<Notify>,
    ) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|(service, iter)| MergeSource { service, iter, peeked: None })
                .collect(),
            follow,
            backlog: VecDeque::new(),
            backlog_capacity: backlog_capacity.max(1),
            any_write,
        }
    }

    fn fill_peeked(&mut self) {
        for source in &mut self.sources {
            if source.peeked.is_none() {
                source.peeked = source.iter.next_entry();
            }
        }
    }

    /// Index of the peeked entry with the earliest timestamp, breaking
    /// ties by service name in stable (first-matching) order.
    fn pick_earliest(&self) -> Option<usize> {
        self.sources
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.peeked.as_ref().map(|e| (i, e)))
            .min_by(|(_, a), (_, b)| {
                a.time_ms.cmp(&b.time_ms).then_with(|| a.service.cmp(&b.service))
            })
            .map(|(i, _)| i)
    }

    fn push_backlog(&mut self, entry: LogEntry) {
        if self.backlog.len() >= self.backlog_capacity {
            self.backlog.pop_front();
        }
        self.backlog.push_back(entry);
    }

    /// Drain every currently-ready entry into the backlog, dropping the
    /// oldest ones first if producers outran the consumer.
    fn drain_ready(&mut self) {
        loop {
            self.fill_peeked();
            match self.pick_earliest() {
                Some(idx) => {
                    let entry = self.sources[idx].peeked.take().expect("picked index always has a peeked entry");
                    self.push_backlog(entry);
                }
                None => break,
            }
        }
    }

    fn all_sources_closed(&self) -> bool {
        self.sources.iter().all(|s| s.iter.is_closed())
    }

    /// Return the next entry in timestamp order. In follow mode this
    /// suspends until a write arrives or `cancel` fires; otherwise it
    /// returns `None` once every source has no more buffered entries.
    pub async fn recv(&mut self, cancel: &CancellationToken) -> Option<LogEntry> {
        loop {
            self.drain_ready();
            if let Some(entry) = self.backlog.pop_front() {
                return Some(entry);
            }
            if !self.follow || self.all_sources_closed() {
                return None;
            }
            tokio::select! {
                _ = self.any_write.notified() => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.service.as_str()).collect()
    }
}
