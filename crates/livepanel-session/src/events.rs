//! Queue of inbound interaction events for synchronous polling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use livepanel_core::{EventKind, PendingEvent};
use parking_lot::{Condvar, Mutex};

#[derive(Default)]
pub struct EventQueue {
    queue: Mutex<VecDeque<PendingEvent>>,
    ready: Condvar,
    next_seq: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a normalized event with the next sequence number.
    pub fn event(&self, target: &str, kind: EventKind, value: Option<serde_json::Value>) -> PendingEvent {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        PendingEvent::new(seq, target, kind, value)
    }

    pub fn push(&self, event: PendingEvent) {
        self.queue.lock().push_back(event);
        self.ready.notify_one();
    }

    /// Block up to `timeout` for the next event.
    ///
    /// A timeout too large to represent as a deadline (`Duration::MAX`)
    /// waits without one.
    pub fn wait_for_event(&self, timeout: Duration) -> Option<PendingEvent> {
        let mut queue = self.queue.lock();
        if let Some(event) = queue.pop_front() {
            return Some(event);
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            loop {
                self.ready.wait(&mut queue);
                if let Some(event) = queue.pop_front() {
                    return Some(event);
                }
            }
        };
        loop {
            if self.ready.wait_until(&mut queue, deadline).timed_out() {
                return queue.pop_front();
            }
            if let Some(event) = queue.pop_front() {
                return Some(event);
            }
        }
    }

    /// Drain everything queued without blocking.
    pub fn get_events(&self) -> Vec<PendingEvent> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
