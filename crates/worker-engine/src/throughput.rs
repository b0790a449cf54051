//! Rolling 1-minute per-job throughput tracker (C1, spec §4.1).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Per-job sequence of completion timestamps, pruned lazily from the front.
#[derive(Default)]
pub struct ThroughputTracker {
    by_job: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl ThroughputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, job_id: &str) {
        let mut by_job = self.by_job.lock().unwrap();
        by_job.entry(job_id.to_string()).or_default().push_back(Instant::now());
    }

    /// Drops timestamps older than the window, reports the remainder, and
    /// removes job ids whose sequence has gone empty (§4.1).
    pub fn tasks_per_minute_by_job(&self) -> HashMap<String, u32> {
        let now = Instant::now();
        let mut by_job = self.by_job.lock().unwrap();
        let mut out = HashMap::with_capacity(by_job.len());
        by_job.retain(|job_id, timestamps| {
            while let Some(&front) = timestamps.front() {
                if now.duration_since(front) > WINDOW {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }
            if timestamps.is_empty() {
                false
            } else {
                out.insert(job_id.clone(), timestamps.len() as u32);
                true
            }
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_reports_counts() {
        let tracker = ThroughputTracker::new();
        tracker.record("J1");
        tracker.record("J1");
        tracker.record("J2");
        let counts = tracker.tasks_per_minute_by_job();
        assert_eq!(counts.get("J1"), Some(&2));
        assert_eq!(counts.get("J2"), Some(&1));
    }

    #[test]
    fn drops_job_ids_once_their_window_empties() {
        let tracker = ThroughputTracker::new();
        {
            let mut by_job = tracker.by_job.lock().unwrap();
            by_job
                .entry("stale".to_string())
                .or_default()
                .push_back(Instant::now() - Duration::from_secs(61));
        }
        let counts = tracker.tasks_per_minute_by_job();
        assert!(!counts.contains_key("stale"));
    }
}
