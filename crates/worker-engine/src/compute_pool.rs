//! The `P` executor tasks that consume the Task Queue (spec §4.3, §5).

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use worker_core::{CoreError, DecayFunction, GridObjectStore, NetworkPreloader, PointSetCache, RoutingEngine};

use crate::regional::RegionalHandler;
use crate::task_queue::QueueReceiver;

/// Spawns `parallelism` long-lived tasks sharing one receiver. Each behaves
/// like one of the source's executor threads: pull a task, run the
/// Regional Handler, loop. Each task is run inside its own `tokio::spawn`
/// so a panic inside `handle` surfaces as a `JoinError` rather than taking
/// the worker loop down with it — "the compute runnable catches every
/// `Throwable` so compute-thread exceptions never silently terminate a
/// worker... the thread is restored to the pool" (§5, §7). A panic still
/// owes the broker a result: §4.5/§7 require every `taskId` to be
/// accounted for by a `RegionalWorkResult`, so a caught panic is appended
/// as a `Compute` error rather than only logged.
pub fn spawn<N, R, C, S, D>(
    receiver: QueueReceiver,
    handler: Arc<RegionalHandler<N, R, C, S, D>>,
    parallelism: usize,
) -> Vec<JoinHandle<()>>
where
    N: NetworkPreloader + 'static,
    R: RoutingEngine<Graph = N::Graph> + 'static,
    C: PointSetCache + 'static,
    S: GridObjectStore + 'static,
    D: DecayFunction + Send + Sync + 'static,
{
    let receiver = Arc::new(Mutex::new(receiver));
    (0..parallelism)
        .map(|worker_index| {
            let receiver = receiver.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                loop {
                    let task = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    let Some(task) = task else {
                        tracing::info!(worker_index, "compute pool worker shutting down, channel closed");
                        return;
                    };
                    let job_id = task.job_id.clone();
                    let task_id = task.header.task_id;
                    let handler = handler.clone();
                    let spawn_handler = handler.clone();
                    if let Err(join_error) = tokio::spawn(async move { spawn_handler.handle(task).await }).await {
                        tracing::error!(worker_index, job_id = %job_id, task_id, error = %join_error, "regional task panicked");
                        handler.fail(&job_id, task_id, CoreError::Compute(join_error.to_string()));
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use worker_core::{GridDescriptor, OneOriginResult, PreloadState, RegionalTask, SinglePointTask, TaskHeader};

    use crate::result_buffer::ResultBuffer;
    use crate::task_queue::TaskQueue;
    use crate::throughput::ThroughputTracker;

    #[derive(Clone)]
    struct FixtureGraph;

    struct AlwaysReadyPreloader;
    #[async_trait]
    impl NetworkPreloader for AlwaysReadyPreloader {
        type Graph = FixtureGraph;
        async fn poll(&self, _graph_id: &str, _scenario_id: Option<&str>) -> PreloadState<Self::Graph> {
            PreloadState::Ready(FixtureGraph)
        }
        async fn await_ready(
            &self,
            _graph_id: &str,
            _scenario_id: Option<&str>,
        ) -> Result<Self::Graph, CoreError> {
            Ok(FixtureGraph)
        }
    }

    struct PanickingRouting;
    #[async_trait]
    impl RoutingEngine for PanickingRouting {
        type Graph = FixtureGraph;
        async fn route_single_point(
            &self,
            _graph: &Self::Graph,
            _task: &SinglePointTask,
        ) -> Result<OneOriginResult, CoreError> {
            unreachable!()
        }
        async fn route_regional(
            &self,
            _graph: &Self::Graph,
            _task: &RegionalTask,
            _max_trip_duration_minutes: u32,
        ) -> Result<OneOriginResult, CoreError> {
            panic!("routing blew up");
        }
    }

    struct NoOpPointSets;
    #[async_trait]
    impl PointSetCache for NoOpPointSets {
        async fn load_and_validate(&self, _ids: &[String]) -> Result<(), CoreError> {
            Ok(())
        }
    }

    struct NoOpStore;
    #[async_trait]
    impl GridObjectStore for NoOpStore {
        async fn put(&self, _key: &str, _bytes: Vec<u8>) -> Result<(), CoreError> {
            Ok(())
        }
    }

    struct ZeroDecay;
    impl DecayFunction for ZeroDecay {
        fn seconds_to_zero(&self, _cutoff_minutes: u32) -> f64 {
            60.0
        }
    }

    fn task() -> RegionalTask {
        RegionalTask {
            header: TaskHeader {
                task_id: 5,
                graph_id: "G".to_string(),
                worker_version: "1.0".to_string(),
                scenario_id: None,
            },
            job_id: "J1".to_string(),
            x: 0,
            y: 0,
            grid: GridDescriptor {
                zoom: 9,
                west: 0,
                north: 0,
                width: 4,
                height: 4,
            },
            percentiles: vec![50],
            cutoffs_minutes: vec![30],
            make_taui_site: false,
            destination_point_set_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn a_panicking_task_still_appends_an_error_result() {
        let results = Arc::new(ResultBuffer::new());
        let handler = Arc::new(RegionalHandler::new(
            Arc::new(AlwaysReadyPreloader),
            Arc::new(PanickingRouting),
            Arc::new(NoOpPointSets),
            Arc::new(NoOpStore),
            Arc::new(ZeroDecay),
            results.clone(),
            Arc::new(ThroughputTracker::new()),
        ));
        let (queue, receiver) = TaskQueue::new(1);
        assert!(queue.offer(task()));
        let handles = spawn(receiver, handler, 1);

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let drained = results.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].job_id, "J1");
        assert_eq!(drained[0].task_id, 5);
        assert!(drained[0].is_error());

        for handle in handles {
            handle.abort();
        }
    }
}
