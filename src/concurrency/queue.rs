//! Bounded FIFO queues with an explicit shutdown flag.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};
use tracing::warn;

/// Errors returned by [`SignalQueue::put`].
#[derive(Debug)]
pub enum PutError<T> {
    /// The queue stayed at capacity for the whole timeout window. The item is handed
    /// back so the caller can retry, which is the backpressure mechanism.
    Full(T),
    /// The queue has been shut down. Enqueueing after shutdown is a producer-side
    /// contract violation: no consumer is obliged to drain the item.
    Shutdown(T),
}

/// Errors returned by [`SignalQueue::get`].
#[derive(Debug, PartialEq, Eq)]
pub enum GetError {
    /// Nothing arrived within the timeout window.
    Empty,
    /// The queue is shut down and fully drained. No item will ever arrive.
    Finished,
}

/// A capacity-bounded FIFO mailbox shared by the producers and consumers of one
/// pipeline edge.
///
/// Once [`shutdown`](SignalQueue::shutdown) has been signalled no further item is
/// ever enqueued, while already-enqueued items remain retrievable. The queue is
/// finished exactly when it is shut down and empty; a `get` on a finished queue
/// reports [`GetError::Finished`] immediately instead of consuming its timeout.
pub struct SignalQueue<T> {
    buffer: Mutex<VecDeque<T>>,
    capacity: usize,
    shutdown: AtomicBool,
    not_empty: Notify,
    not_full: Notify,
}

impl<T: Send> SignalQueue<T> {
    /// Creates a queue bounded to `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero, since such a queue could never accept an item.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");

        Self {
            buffer: Mutex::new(VecDeque::new()),
            capacity,
            shutdown: AtomicBool::new(false),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Enqueues `item`, blocking up to `timeout` for a free slot.
    ///
    /// Returns [`PutError::Full`] with the item handed back if no slot freed up in
    /// time, and [`PutError::Shutdown`] if the queue has been shut down.
    pub async fn put(&self, item: T, timeout: Duration) -> Result<(), PutError<T>> {
        if self.is_shutdown() {
            return Err(PutError::Shutdown(item));
        }

        let deadline = Instant::now() + timeout;
        let mut item = item;

        loop {
            // The notification future must exist before the slot check, otherwise a
            // wakeup arriving between the check and the await would be lost.
            let not_full = self.not_full.notified();

            {
                let mut buffer = self.buffer();
                if buffer.len() < self.capacity {
                    buffer.push_back(item);
                    drop(buffer);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            if timeout_at(deadline, not_full).await.is_err() {
                return Err(PutError::Full(item));
            }

            if self.is_shutdown() {
                return Err(PutError::Shutdown(item));
            }
        }
    }

    /// Dequeues the oldest item, blocking up to `timeout` for one to arrive.
    ///
    /// Returns [`GetError::Empty`] if nothing arrived in time and
    /// [`GetError::Finished`] as soon as the queue is shut down and drained.
    pub async fn get(&self, timeout: Duration) -> Result<T, GetError> {
        let deadline = Instant::now() + timeout;

        loop {
            let not_empty = self.not_empty.notified();

            // The shutdown flag is sampled before probing the buffer: shutdown
            // freezes the producer side, so "was shut down and then found empty"
            // cannot be invalidated by a later enqueue.
            let was_shutdown = self.is_shutdown();

            {
                let mut buffer = self.buffer();
                if let Some(item) = buffer.pop_front() {
                    drop(buffer);
                    self.not_full.notify_one();
                    return Ok(item);
                }
            }

            if was_shutdown {
                return Err(GetError::Finished);
            }

            if timeout_at(deadline, not_empty).await.is_err() {
                return Err(GetError::Empty);
            }
        }
    }

    /// Marks the queue as having no more producers.
    ///
    /// Idempotent. Wakes every blocked producer and consumer so they can observe the
    /// new state on their next loop iteration.
    pub fn shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.not_empty.notify_waiters();
            self.not_full.notify_waiters();
        }
    }

    /// Returns the number of currently buffered items.
    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    /// Returns whether the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }

    /// Returns whether shutdown has been signalled.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Returns whether the queue is shut down and fully drained.
    pub fn is_finished(&self) -> bool {
        // Shutdown is read first: once it is set the buffer can only shrink, so a
        // subsequent emptiness observation is final.
        self.is_shutdown() && self.is_empty()
    }

    fn buffer(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        // A poisoned lock only means some holder panicked mid-operation; the buffered
        // items themselves remain usable.
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> fmt::Debug for SignalQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = match self.buffer.lock() {
            Ok(buffer) => buffer.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        };

        f.debug_struct("SignalQueue")
            .field("len", &len)
            .field("capacity", &self.capacity)
            .field("shutdown", &self.shutdown.load(Ordering::Acquire))
            .finish()
    }
}

/// Enqueues `item`, retrying on every [`PutError::Full`] until the queue accepts it.
///
/// This is the producer-side discipline used by feeders and stage workers alike: a
/// full downstream queue throttles the producer instead of failing it. An item bound
/// for a queue that was shut down underneath the producer is dropped with a warning,
/// since no consumer will ever drain it.
pub(crate) async fn put_until_accepted<T: Send>(
    queue: &SignalQueue<T>,
    item: T,
    poll_interval: Duration,
) {
    let mut item = item;

    loop {
        match queue.put(item, poll_interval).await {
            Ok(()) => return,
            Err(PutError::Full(returned)) => {
                item = returned;
            }
            Err(PutError::Shutdown(_)) => {
                warn!("item dropped: queue was shut down while a producer was still forwarding");
                return;
            }
        }
    }
}
