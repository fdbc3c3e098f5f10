//! Bounded single-producer/single-consumer queue with cancellation.
//!
//! The producer is a real-time pipeline, so `push` never blocks: when the
//! queue is full the new item is dropped. The consumer blocks in `pop`
//! until an item arrives or the queue is cancelled. Cancellation is
//! sticky: the consumer first drains whatever is queued, then gets
//! [`Canceled`]; `reset` returns the queue to accepting state.
//!
//! All state transitions serialize under one mutex; no lock is held while
//! the consumer processes an item.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Returned by [`FrameQueue::pop`] once the queue is cancelled and drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame queue canceled")]
pub struct Canceled;

struct Inner<T> {
    items: VecDeque<T>,
    canceled: bool,
}

pub struct FrameQueue<T> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
    capacity: usize,
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameQueue<T> {
    /// The standard capacity-3 queue of the video output path.
    pub fn new() -> Self {
        Self::with_capacity(3)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                canceled: false,
            }),
            cond: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue `item`, or drop it when the queue is full. Returns whether
    /// the item was enqueued.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.items.len() >= self.capacity {
            return false;
        }
        inner.items.push_back(item);
        self.cond.notify_one();
        true
    }

    /// Block until an item is available or the queue is cancelled and
    /// drained.
    pub fn pop(&self) -> Result<T, Canceled> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Ok(item);
            }
            if inner.canceled {
                return Err(Canceled);
            }
            self.cond.wait(&mut inner);
        }
    }

    /// Raise the sticky cancellation flag and wake the consumer.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.canceled = true;
        self.cond.notify_all();
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.lock().canceled
    }

    /// Clear the cancellation flag so the queue accepts work again.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.canceled = false;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}
