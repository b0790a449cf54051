//! Thread-safe accumulator for completed regional results (C2, spec §4.2).

use std::sync::Mutex;

use worker_core::RegionalWorkResult;

#[derive(Default)]
pub struct ResultBuffer {
    results: Mutex<Vec<RegionalWorkResult>>,
}

impl ResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, result: RegionalWorkResult) {
        self.results.lock().unwrap().push(result);
    }

    /// Atomically returns the contents and replaces the buffer with an empty
    /// one.
    pub fn drain(&self) -> Vec<RegionalWorkResult> {
        std::mem::take(&mut *self.results.lock().unwrap())
    }

    /// Puts a previously drained batch back, ahead of anything appended
    /// concurrently by worker threads while the delivery attempt was in
    /// flight (§4.2, §4.7 step 5).
    pub fn reinsert(&self, batch: Vec<RegionalWorkResult>) {
        if batch.is_empty() {
            return;
        }
        let mut results = self.results.lock().unwrap();
        let appended_meanwhile = std::mem::take(&mut *results);
        *results = batch;
        results.extend(appended_meanwhile);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(task_id: i64) -> RegionalWorkResult {
        RegionalWorkResult::success("J1", task_id, vec![], None)
    }

    #[test]
    fn drain_returns_and_clears() {
        let buffer = ResultBuffer::new();
        buffer.append(result(1));
        buffer.append(result(2));
        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn reinsert_keeps_concurrently_appended_results() {
        let buffer = ResultBuffer::new();
        buffer.append(result(1));
        let drained = buffer.drain();
        buffer.append(result(2));
        buffer.reinsert(drained);
        let all = buffer.drain();
        assert_eq!(all.iter().map(|r| r.task_id).collect::<Vec<_>>(), vec![1, 2]);
    }
}
