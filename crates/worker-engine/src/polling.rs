//! The sole driver on the worker (C7, spec §4.7).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::watch;

use worker_core::{Task, WorkerStatus};

use crate::broker_client::{BrokerClient, PollOutcome};
use crate::result_buffer::ResultBuffer;
use crate::task_queue::TaskQueue;
use crate::throughput::ThroughputTracker;

pub const POLL_MIN: Duration = Duration::from_secs(1);
pub const POLL_MAX: Duration = Duration::from_secs(15);
const STARTUP_JITTER_MAX_MS: u64 = 5_000;

/// §4.7 step 2's polling-cadence decision: always poll once `POLL_MAX` has
/// elapsed; otherwise poll early only if last cycle delivered work and the
/// queue has drained below `P`, meaning the pool is close to starving.
/// `tasksInQueue < P`, not `remainingCapacity > 0` — capacity is `P * 8`,
/// so gating on it re-polls on almost every cycle instead of only when the
/// compute pool is about to run dry (end-to-end scenario 6, §8).
fn should_poll(
    elapsed_since_last_poll: Duration,
    received_work_last_cycle: bool,
    tasks_in_queue: usize,
    processors: usize,
) -> bool {
    elapsed_since_last_poll > POLL_MAX || (received_work_last_cycle && tasks_in_queue < processors)
}

pub struct PollingLoopConfig {
    pub machine_id: String,
    pub worker_version: String,
    /// `P`, the size of the compute pool — needed to decide whether the
    /// queue is close to starving (§4.7 step 2), not just how many more
    /// tasks the queue's remaining capacity could physically accept.
    pub compute_threads: usize,
}

pub struct PollingLoop {
    broker: Arc<BrokerClient>,
    results: Arc<ResultBuffer>,
    queue: Arc<TaskQueue>,
    tracker: Arc<ThroughputTracker>,
    config: PollingLoopConfig,
    loaded_network_id: Arc<std::sync::Mutex<Option<String>>>,
    rejected_total: AtomicU64,
}

impl PollingLoop {
    pub fn new(
        broker: Arc<BrokerClient>,
        results: Arc<ResultBuffer>,
        queue: Arc<TaskQueue>,
        tracker: Arc<ThroughputTracker>,
        config: PollingLoopConfig,
        loaded_network_id: Arc<std::sync::Mutex<Option<String>>>,
    ) -> Self {
        Self {
            broker,
            results,
            queue,
            tracker,
            config,
            loaded_network_id,
            rejected_total: AtomicU64::new(0),
        }
    }

    /// Runs forever until `shutdown` is signalled. Sleeps `POLL_MIN` every
    /// iteration (plus a startup jitter of up to 5s to de-synchronize
    /// worker fleets), decides whether to poll this cycle, and drains the
    /// result buffer into the outbound status on every poll.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let jitter_ms = rand::thread_rng().gen_range(0..=STARTUP_JITTER_MAX_MS);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(jitter_ms)) => {}
            _ = shutdown.changed() => return,
        }

        let mut last_poll = Instant::now() - POLL_MAX;
        let mut received_work_last_cycle = false;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(POLL_MIN) => {}
                _ = shutdown.changed() => return,
            }
            if *shutdown.borrow() {
                return;
            }

            let tasks_in_queue = self.queue.len();
            if !should_poll(
                last_poll.elapsed(),
                received_work_last_cycle,
                tasks_in_queue,
                self.config.compute_threads,
            ) {
                continue;
            }

            let tasks_to_request = self.queue.remaining_capacity();
            let drained = self.results.drain();
            let status = WorkerStatus {
                machine_id: self.config.machine_id.clone(),
                loaded_network_id: self.loaded_network_id.lock().unwrap().clone(),
                worker_version: self.config.worker_version.clone(),
                max_tasks_requested: tasks_to_request,
                seconds_since_last_poll: last_poll.elapsed().as_secs_f64(),
                tasks_per_minute_by_job: self.tracker.tasks_per_minute_by_job(),
                results: drained.clone(),
            };
            last_poll = Instant::now();

            match self.broker.poll(&status).await {
                PollOutcome::Failure => {
                    self.results.reinsert(drained);
                    received_work_last_cycle = false;
                }
                PollOutcome::NoWork => {
                    received_work_last_cycle = false;
                }
                PollOutcome::Tasks(tasks) => {
                    received_work_last_cycle = !tasks.is_empty();
                    for task in tasks {
                        self.offer(task);
                    }
                }
            }
        }
    }

    fn offer(&self, task: Task) {
        match task {
            Task::Regional(regional) => {
                if !self.queue.offer(regional) {
                    self.rejected_total.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("task queue full, dropping redelivered task");
                }
            }
            Task::SinglePoint(_) => {
                tracing::warn!("broker delivered a single-point task to the polling channel, ignoring");
            }
        }
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: usize = 4;

    /// End-to-end scenario 6 (§8): queue empty, no work last cycle. Once
    /// `POLL_MAX` elapses, a poll must occur regardless of queue state.
    #[test]
    fn polls_once_poll_max_elapses_with_an_empty_queue() {
        assert!(should_poll(POLL_MAX + Duration::from_millis(1), false, 0, P));
    }

    /// Before `POLL_MAX`, an idle queue with no work delivered last cycle
    /// must not trigger an early poll.
    #[test]
    fn does_not_poll_early_when_idle() {
        assert!(!should_poll(Duration::from_secs(1), false, 0, P));
    }

    /// The bug this replaces: a queue sized `P * 8` still reports ample
    /// `remaining_capacity` right after a large batch lands, but that many
    /// tasks sitting unconsumed means the pool is nowhere near starving —
    /// this must NOT trigger an early re-poll.
    #[test]
    fn does_not_poll_early_when_queue_is_still_full_of_freshly_delivered_work() {
        assert!(!should_poll(Duration::from_secs(1), true, 10, P));
    }

    /// Once the pool has drained the queue below `P`, a cycle that received
    /// work last time must poll again immediately rather than waiting out
    /// `POLL_MAX` (scenario 6's second half, §8).
    #[test]
    fn polls_again_once_the_pool_drains_the_queue_below_p() {
        assert!(should_poll(Duration::from_secs(1), true, P - 2, P));
    }

    #[test]
    fn does_not_poll_early_just_because_work_arrived_if_queue_is_still_at_or_above_p() {
        assert!(!should_poll(Duration::from_secs(1), true, P, P));
    }
}
