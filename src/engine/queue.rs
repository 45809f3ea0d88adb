//! Bounded blocking frame queue.
//!
//! Fixed-capacity ring buffer connecting adjacent pipeline stages.
//! Push/pop come in blocking and non-blocking flavors; every blocking
//! wait is interruptible by [`BoundedFrameQueue::shutdown`], so a
//! consumer parked on an empty queue never outlives the pipeline.
//!
//! Frames are exclusively owned by the queue between push and pop;
//! ownership transfers to the consumer on pop. FIFO order is preserved
//! exactly: drops only happen at the push boundary (non-blocking
//! reject), never by reordering.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use tracing::warn;

use crate::core::types::Frame;

struct Ring {
    slots: Vec<Option<Frame>>,
    /// Next write index.
    head: usize,
    /// Next read index.
    tail: usize,
    len: usize,
}

impl Ring {
    fn next(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }
}

/// Thread-safe fixed-capacity FIFO of frames.
pub struct BoundedFrameQueue {
    capacity: usize,
    ring: Mutex<Ring>,
    not_full: Condvar,
    not_empty: Condvar,
    /// Mirror of `ring.len` for lock-free size reads.
    occupancy: AtomicUsize,
    shutdown: AtomicBool,
}

impl BoundedFrameQueue {
    /// Create a queue holding at most `capacity` frames. Capacity is
    /// fixed for the life of the queue.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");
        Self {
            capacity,
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                len: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            occupancy: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Insert a frame at the tail.
    ///
    /// Returns `false` when the frame is empty, when the queue is full
    /// and `blocking` is off, or when the queue shuts down while
    /// waiting. Callers count a `false` from a non-blocking push as a
    /// dropped frame.
    pub fn push(&self, frame: Frame, blocking: bool) -> bool {
        if frame.is_empty() {
            warn!("rejecting empty frame at queue boundary");
            return false;
        }

        let mut ring = self.ring.lock().unwrap();
        while ring.len == self.capacity {
            if self.is_shutdown() || !blocking {
                return false;
            }
            ring = self.not_full.wait(ring).unwrap();
        }
        if self.is_shutdown() {
            return false;
        }

        let head = ring.head;
        ring.slots[head] = Some(frame);
        ring.head = ring.next(head);
        ring.len += 1;
        self.occupancy.store(ring.len, Ordering::Release);
        drop(ring);

        self.not_empty.notify_one();
        true
    }

    /// Remove the oldest frame.
    ///
    /// Non-blocking pop on an empty queue returns `None` immediately;
    /// blocking pop suspends until a frame arrives or the queue shuts
    /// down. Frames still enqueued at shutdown remain poppable so a
    /// consumer can drain.
    pub fn pop(&self, blocking: bool) -> Option<Frame> {
        let mut ring = self.ring.lock().unwrap();
        while ring.len == 0 {
            if self.is_shutdown() || !blocking {
                return None;
            }
            ring = self.not_empty.wait(ring).unwrap();
        }

        let tail = ring.tail;
        let frame = ring.slots[tail].take();
        ring.tail = ring.next(tail);
        ring.len -= 1;
        self.occupancy.store(ring.len, Ordering::Release);
        drop(ring);

        self.not_full.notify_one();
        frame
    }

    /// Current occupancy; lock-free.
    pub fn size(&self) -> usize {
        self.occupancy.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Occupancy as a fraction of capacity, for admission control.
    pub fn utilization(&self) -> f64 {
        self.size() as f64 / self.capacity as f64
    }

    /// Drop every buffered frame and wake blocked producers.
    pub fn clear(&self) {
        let mut ring = self.ring.lock().unwrap();
        for slot in ring.slots.iter_mut() {
            *slot = None;
        }
        ring.head = 0;
        ring.tail = 0;
        ring.len = 0;
        self.occupancy.store(0, Ordering::Release);
        drop(ring);

        self.not_full.notify_all();
    }

    /// Permanently wake all waiters and make future blocking operations
    /// return failure promptly. Buffered frames stay poppable.
    pub fn shutdown(&self) {
        // Take the lock so no waiter can re-check its predicate between
        // the flag store and the notification.
        let _ring = self.ring.lock().unwrap();
        self.shutdown.store(true, Ordering::Release);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
