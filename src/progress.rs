use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub level: Level,
    pub message: String,
}

#[derive(Debug)]
struct Inner {
    events: VecDeque<ProgressEvent>,
    next_seq: u64,
}

/// Live step feed for the active run. Reset at run start; holds at most
/// `capacity` events, evicting the oldest. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct ProgressLog {
    inner: Arc<Mutex<Inner>>,
    capacity: usize,
}

impl ProgressLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                events: VecDeque::with_capacity(capacity.min(1024)),
                next_seq: 0,
            })),
            capacity: capacity.max(1),
        }
    }

    pub fn reset(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.events.clear();
        }
    }

    pub fn push(&self, level: Level, message: impl Into<String>) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let seq = inner.next_seq;
        inner.next_seq += 1;
        if inner.events.len() >= self.capacity {
            inner.events.pop_front();
        }
        inner.events.push_back(ProgressEvent {
            seq,
            at: Utc::now(),
            level,
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Level::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(Level::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Level::Error, message);
    }

    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.inner
            .lock()
            .map(|inner| inner.events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Events with `seq` greater than `after`, for incremental polling.
    pub fn since(&self, after: u64) -> Vec<ProgressEvent> {
        self.inner
            .lock()
            .map(|inner| inner.events.iter().filter(|e| e.seq > after).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_retention() {
        let log = ProgressLog::new(3);
        for i in 0..5 {
            log.info(format!("step {}", i));
        }
        let msgs: Vec<_> = log.snapshot().into_iter().map(|e| e.message).collect();
        assert_eq!(msgs, vec!["step 2", "step 3", "step 4"]);
    }

    #[test]
    fn reset_clears_but_keeps_sequence_monotonic() {
        let log = ProgressLog::new(10);
        log.info("a");
        log.warn("b");
        log.reset();
        assert!(log.snapshot().is_empty());
        log.error("c");
        let events = log.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].seq, 2);
        assert_eq!(events[0].level, Level::Error);
    }

    #[test]
    fn since_filters_by_sequence() {
        let log = ProgressLog::new(10);
        log.info("a");
        log.info("b");
        log.info("c");
        let tail: Vec<_> = log.since(0).into_iter().map(|e| e.message).collect();
        assert_eq!(tail, vec!["b", "c"]);
    }

    #[test]
    fn clones_share_the_feed() {
        let log = ProgressLog::new(10);
        let reader = log.clone();
        log.info("from writer");
        assert_eq!(reader.snapshot().len(), 1);
    }
}
