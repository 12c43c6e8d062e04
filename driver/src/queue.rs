// Licensed under the Apache-2.0 license

//! Bounded request queue with backlog admission, drained by a single
//! dispatcher thread.
//!
//! Entries are serviced strictly in arrival order, one hardware chunk per
//! dequeue; a request with more chunks left goes back to the tail, so
//! concurrent sessions interleave instead of head-of-line blocking each
//! other. Submissions beyond the configured depth are still accepted but
//! marked backlogged, and their notification callback runs before the entry
//! is first serviced. Errors complete the owning request only; queued
//! siblings are untouched.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{CipherError, CipherResult};

/// Outcome of servicing one chunk of a request.
pub(crate) enum StepOutcome {
    /// More chunks remain; requeue the entry.
    Continue,
    /// The logical operation finished.
    Complete,
}

/// One chunk of work. Captures its session and buffers; returns whether
/// the request needs further chunks.
pub(crate) type WorkFn = Box<dyn FnMut() -> CipherResult<StepOutcome> + Send>;

pub(crate) struct QueueEntry {
    pub work: WorkFn,
    pub complete: Box<dyn FnOnce(CipherResult<()>) + Send>,
    /// Runs right before first service if the entry was admitted over
    /// capacity.
    pub backlog_notify: Option<Box<dyn FnOnce() + Send>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitStatus {
    Queued,
    Backlogged,
}

pub(crate) struct RequestQueue {
    inner: Mutex<QueueInner>,
    wakeup: Condvar,
    capacity: usize,
}

struct QueueInner {
    entries: VecDeque<QueueEntry>,
    shutdown: bool,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        RequestQueue {
            inner: Mutex::new(QueueInner {
                entries: VecDeque::new(),
                shutdown: false,
            }),
            wakeup: Condvar::new(),
            capacity,
        }
    }

    /// Admit an entry. Never rejects: over-capacity submissions are queued
    /// too, but reported (and notified) as backlogged.
    pub fn submit(&self, mut entry: QueueEntry) -> SubmitStatus {
        let mut inner = self.inner.lock().unwrap();
        if inner.shutdown {
            drop(inner);
            (entry.complete)(Err(CipherError::InvalidState("engine stopped")));
            return SubmitStatus::Queued;
        }
        let status = if inner.entries.len() >= self.capacity {
            SubmitStatus::Backlogged
        } else {
            entry.backlog_notify = None;
            SubmitStatus::Queued
        };
        inner.entries.push_back(entry);
        self.wakeup.notify_one();
        status
    }

    /// Requeue a partially-serviced entry at the tail. Not subject to the
    /// capacity check; the entry was already admitted once.
    fn resubmit(&self, entry: QueueEntry) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.push_back(entry);
        self.wakeup.notify_one();
    }

    pub fn shutdown(&self) {
        self.inner.lock().unwrap().shutdown = true;
        self.wakeup.notify_all();
    }

    fn pop_blocking(&self) -> Option<QueueEntry> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.shutdown {
                return None;
            }
            if let Some(entry) = inner.entries.pop_front() {
                return Some(entry);
            }
            inner = self.wakeup.wait(inner).unwrap();
        }
    }

    fn drain(&self) -> Vec<QueueEntry> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.drain(..).collect()
    }
}

/// Body of the dispatcher thread: service entries until shutdown, then
/// fail whatever is still queued.
pub(crate) fn dispatch_loop(queue: Arc<RequestQueue>) {
    while let Some(mut entry) = queue.pop_blocking() {
        if let Some(notify) = entry.backlog_notify.take() {
            notify();
        }
        match (entry.work)() {
            Ok(StepOutcome::Continue) => queue.resubmit(entry),
            Ok(StepOutcome::Complete) => (entry.complete)(Ok(())),
            Err(e) => (entry.complete)(Err(e)),
        }
    }
    for entry in queue.drain() {
        (entry.complete)(Err(CipherError::InvalidState("engine stopped")));
    }
}
