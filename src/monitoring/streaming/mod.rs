/*!
 * Event Streaming
 * Lock-free, bounded, lossy event queues
 *
 * Design: multiple producers (manager loops, monitors), any number of consumers.
 * A full queue drops the new event instead of blocking the producer; the drop
 * is counted and logged. Delivery is at-most-once.
 */

use crossbeam_queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Event queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    pub events_produced: u64,
    pub events_consumed: u64,
    pub events_dropped: u64,
    pub active_subscribers: usize,
    pub capacity: usize,
}

/// Bounded MPMC event queue
pub struct EventQueue<T> {
    name: &'static str,
    queue: Arc<ArrayQueue<T>>,

    produced: Arc<AtomicU64>,
    consumed: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,

    subscribers: Arc<AtomicUsize>,
}

impl<T> EventQueue<T> {
    /// Create a queue holding at most `capacity` undelivered events
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
            produced: Arc::new(AtomicU64::new(0)),
            consumed: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an event without blocking; returns false if it was dropped
    #[inline]
    pub fn publish(&self, event: T) -> bool {
        match self.queue.push(event) {
            Ok(()) => {
                self.produced.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    queue = self.name,
                    capacity = self.queue.capacity(),
                    dropped_total = dropped,
                    "event queue full, dropping event"
                );
                false
            }
        }
    }

    /// Try to consume one event
    #[inline]
    pub fn try_consume(&self) -> Option<T> {
        self.queue.pop().map(|event| {
            self.consumed.fetch_add(1, Ordering::Relaxed);
            event
        })
    }

    /// Drain every queued event
    pub fn drain(&self) -> Vec<T> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(event) = self.try_consume() {
            events.push(event);
        }
        events
    }

    /// Subscribe to the queue (returns a consumer handle)
    pub fn subscribe(&self) -> Subscriber<T> {
        self.subscribers.fetch_add(1, Ordering::Relaxed);
        Subscriber {
            queue: self.clone(),
            local_consumed: 0,
        }
    }

    /// Number of undelivered events
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Events dropped because the queue was full
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            events_produced: self.produced.load(Ordering::Relaxed),
            events_consumed: self.consumed.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
            active_subscribers: self.subscribers.load(Ordering::Relaxed),
            capacity: self.queue.capacity(),
        }
    }
}

impl<T> Clone for EventQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            queue: Arc::clone(&self.queue),
            produced: Arc::clone(&self.produced),
            consumed: Arc::clone(&self.consumed),
            dropped: Arc::clone(&self.dropped),
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

/// Event queue subscriber handle
pub struct Subscriber<T> {
    queue: EventQueue<T>,
    local_consumed: u64,
}

impl<T> Subscriber<T> {
    /// Consume next event
    #[inline]
    pub fn next(&mut self) -> Option<T> {
        self.queue.try_consume().map(|event| {
            self.local_consumed += 1;
            event
        })
    }

    /// Consume every available event
    pub fn drain(&mut self) -> Vec<T> {
        let mut events = Vec::new();
        while let Some(event) = self.next() {
            events.push(event);
        }
        events
    }

    /// Consume events matching a predicate, discarding the rest
    pub fn filter<F>(&mut self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.drain().into_iter().filter(|e| predicate(e)).collect()
    }

    /// Events consumed through this handle
    #[inline]
    pub fn consumed(&self) -> u64 {
        self.local_consumed
    }
}

impl<T> Drop for Subscriber<T> {
    fn drop(&mut self) {
        self.queue.subscribers.fetch_sub(1, Ordering::Relaxed);
    }
}
