//! Unbounded handoff queue moving owned items from producers to one consumer.
//!
//! `push` moves the item in and never blocks; `pop` moves the head item out,
//! blocking while the queue is empty. Order is exactly arrival order at the
//! queue across every producer. Storage grows on demand; an allocation
//! failure aborts the process rather than surfacing as an error.
//!
//! The queue is correct for any number of producers and exactly one
//! consumer. With several consumers each item is still delivered once, but
//! no fairness or wake order between consumers is provided.

use std::collections::VecDeque;
use std::time::Instant;

use crate::error::{SyncError, SyncResult};
use crate::sync::{Arc, Condvar, Mutex};
use crate::time::Timeout;

/// Something a blocked kernel task can wait to become non-empty.
pub trait Pending: Send + Sync {
    fn has_pending(&self) -> bool;
}

struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T: Send> Pending for Inner<T> {
    fn has_pending(&self) -> bool {
        !self.items.lock().is_empty()
    }
}

/// Multiple-producer, single-consumer FIFO.
///
/// Cloning produces another handle to the same queue.
pub struct HandoffQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> HandoffQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
            }),
        }
    }

    /// Appends `item` at the tail and wakes a blocked consumer.
    pub fn push(&self, item: T) {
        self.inner.items.lock().push_back(item);
        self.inner.available.notify_one();
    }

    /// Removes the head item without blocking.
    pub fn try_pop(&self) -> SyncResult<T> {
        self.inner
            .items
            .lock()
            .pop_front()
            .ok_or(SyncError::WouldBlock)
    }

    /// Removes the head item, blocking until one arrives or `timeout` elapses.
    pub fn pop(&self, timeout: Timeout) -> SyncResult<T> {
        let mut items = self.inner.items.lock();
        if let Some(item) = items.pop_front() {
            return Ok(item);
        }
        let deadline = timeout.deadline_from(Instant::now());
        loop {
            if let Some(item) = items.pop_front() {
                return Ok(item);
            }
            match deadline {
                None => self.inner.available.wait(&mut items),
                Some(deadline) => {
                    if self.inner.available.wait_until(&mut items, deadline) {
                        return items.pop_front().ok_or(SyncError::Timeout);
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + 'static> HandoffQueue<T> {
    /// Readiness view used by the kernel to park a consumer task.
    pub fn watch(&self) -> Arc<dyn Pending> {
        Arc::clone(&self.inner) as Arc<dyn Pending>
    }
}

impl<T> Clone for HandoffQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> core::fmt::Debug for HandoffQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandoffQueue").field("len", &self.len()).finish()
    }
}
