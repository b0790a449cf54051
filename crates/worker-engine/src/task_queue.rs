//! Bounded FIFO of runnable regional tasks with reject-on-full semantics
//! (C3, spec §4.3).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use worker_core::RegionalTask;

pub const QUEUE_SLOTS_PER_PROCESSOR: usize = 8;

/// Sending half of the task queue. `offer` never blocks the polling loop:
/// a full queue fails immediately rather than waiting for a slot.
pub struct TaskQueue {
    tx: mpsc::Sender<RegionalTask>,
    len: Arc<AtomicUsize>,
}

/// Receiving half, handed to the compute pool. Wraps `mpsc::Receiver` so
/// every dequeue decrements the same counter `TaskQueue::len` reports —
/// the polling loop needs `tasksInQueue`, not `remainingCapacity`, to
/// decide whether the pool is close to starving (§4.7 step 2).
pub struct QueueReceiver {
    rx: mpsc::Receiver<RegionalTask>,
    len: Arc<AtomicUsize>,
}

impl QueueReceiver {
    pub async fn recv(&mut self) -> Option<RegionalTask> {
        let task = self.rx.recv().await;
        if task.is_some() {
            self.len.fetch_sub(1, Ordering::SeqCst);
        }
        task
    }
}

impl TaskQueue {
    /// `processors` is `P`, the size of the compute pool; capacity is
    /// `P * QUEUE_SLOTS_PER_PROCESSOR`.
    pub fn new(processors: usize) -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::channel(processors * QUEUE_SLOTS_PER_PROCESSOR);
        let len = Arc::new(AtomicUsize::new(0));
        (
            Self { tx, len: len.clone() },
            QueueReceiver { rx, len },
        )
    }

    /// Returns `true` if the task was accepted, `false` if the queue was
    /// full. Rejected tasks are the caller's responsibility to drop and log
    /// (§4.3: never retried locally, the broker redelivers).
    pub fn offer(&self, task: RegionalTask) -> bool {
        if self.tx.try_send(task).is_ok() {
            self.len.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// How many more tasks can currently be accepted without blocking —
    /// what the poller uses to pre-size its request (§4.7 step 3).
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }

    /// Tasks currently sitting in the queue, not yet picked up by a
    /// compute-pool worker — what the poller checks against `P` to decide
    /// whether to re-poll early (§4.7 step 2).
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }
}
