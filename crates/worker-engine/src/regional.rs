//! Asynchronous per-origin regional path (C6, spec §4.5).

use std::sync::Arc;

use worker_core::{
    CoreError, DecayFunction, GridHeader, GridObjectStore, NetworkPreloader, PointSetCache,
    RegionalTask, RegionalWorkResult, RoutingEngine,
};

use crate::result_buffer::ResultBuffer;
use crate::throughput::ThroughputTracker;

pub struct RegionalHandler<N, R, C, S, D>
where
    N: NetworkPreloader,
    R: RoutingEngine<Graph = N::Graph>,
    C: PointSetCache,
    S: GridObjectStore,
    D: DecayFunction,
{
    preloader: Arc<N>,
    routing: Arc<R>,
    point_sets: Arc<C>,
    store: Arc<S>,
    decay: Arc<D>,
    results: Arc<ResultBuffer>,
    tracker: Arc<ThroughputTracker>,
}

impl<N, R, C, S, D> RegionalHandler<N, R, C, S, D>
where
    N: NetworkPreloader,
    R: RoutingEngine<Graph = N::Graph>,
    C: PointSetCache,
    S: GridObjectStore,
    D: DecayFunction,
{
    pub fn new(
        preloader: Arc<N>,
        routing: Arc<R>,
        point_sets: Arc<C>,
        store: Arc<S>,
        decay: Arc<D>,
        results: Arc<ResultBuffer>,
        tracker: Arc<ThroughputTracker>,
    ) -> Self {
        Self {
            preloader,
            routing,
            point_sets,
            store,
            decay,
            results,
            tracker,
        }
    }

    /// Runs §4.5 end to end. Never returns an error: every failure becomes
    /// a `RegionalWorkResult` carrying a structured descriptor, appended to
    /// the result buffer so the broker can account for every `taskId` (§7).
    pub async fn handle(&self, task: RegionalTask) {
        let record_accessibility = !task.make_taui_site;

        // §4.5 step 2: clamp the decay function's answer before anything
        // else runs; the routing capability consumes the clamped value.
        let max_trip_duration_minutes =
            worker_core::decay::max_trip_duration_minutes(self.decay.as_ref(), &task.cutoffs_minutes);

        if let Err(e) = task.validate() {
            self.fail(&task.job_id, task.header.task_id, e);
            return;
        }

        let graph = match self
            .preloader
            .await_ready(&task.header.graph_id, task.header.scenario_id.as_deref())
            .await
        {
            Ok(graph) => graph,
            Err(e) => {
                self.fail(&task.job_id, task.header.task_id, e);
                return;
            }
        };

        if !task.make_taui_site {
            if let Err(e) = self
                .point_sets
                .load_and_validate(&task.destination_point_set_ids)
                .await
            {
                self.fail(&task.job_id, task.header.task_id, e);
                return;
            }
        }

        if task.make_taui_site && task.header.task_id == 0 {
            let metadata = serde_json::json!({
                "jobId": task.job_id,
                "grid": task.grid,
                "percentiles": task.percentiles,
                "cutoffsMinutes": task.cutoffs_minutes,
            });
            let bytes = serde_json::to_vec(&metadata).unwrap_or_default();
            if let Err(e) = self.store.put(&format!("{}_metadata.json", task.job_id), bytes).await {
                self.fail(&task.job_id, task.header.task_id, CoreError::FatalAssembler(e.to_string()));
                return;
            }
        }

        let routed = match self
            .routing
            .route_regional(&graph, &task, max_trip_duration_minutes)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.fail(&task.job_id, task.header.task_id, e);
                return;
            }
        };

        let result = if task.make_taui_site {
            if let Some(travel_times) = &routed.travel_times {
                if travel_times.any_destination_reached() {
                    let header = GridHeader {
                        zoom: task.grid.zoom as i32,
                        west: task.grid.west,
                        north: task.grid.north,
                        width: travel_times.width,
                        height: travel_times.height,
                        values_per_pixel: travel_times.percentile_planes.len() as u32,
                    };
                    match worker_core::grid_codec::encode_time_grid(
                        &header,
                        &travel_times.percentile_planes,
                    ) {
                        Ok(bytes) => {
                            let key = format!("{}_times.dat", task.header.task_id);
                            if let Err(e) = self.store.put(&key, bytes).await {
                                self.fail(&task.job_id, task.header.task_id, CoreError::FatalAssembler(e.to_string()));
                                return;
                            }
                        }
                        Err(e) => {
                            self.fail(&task.job_id, task.header.task_id, e);
                            return;
                        }
                    }
                }
            }
            RegionalWorkResult::taui_sentinel(
                task.job_id.clone(),
                task.header.task_id,
                1,
                task.percentiles.len(),
                task.cutoffs_minutes.len(),
            )
        } else {
            let accessibility = if record_accessibility {
                routed.accessibility.clone().unwrap_or_default()
            } else {
                Vec::new()
            };
            RegionalWorkResult::success(
                task.job_id.clone(),
                task.header.task_id,
                accessibility,
                routed.travel_times.clone(),
            )
        };

        self.results.append(result);
        self.tracker.record(&task.job_id);
    }

    /// Appends a `RegionalWorkResult` carrying a structured error descriptor
    /// (§7: every `taskId` must be accounted for, even one that never made
    /// it through `handle` — e.g. a panic caught by the compute pool).
    pub fn fail(&self, job_id: &str, task_id: i64, err: CoreError) {
        tracing::error!(job_id, task_id, error = %err, "regional task failed");
        self.results
            .append(RegionalWorkResult::error(job_id.to_string(), task_id, &err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use worker_core::{GridDescriptor, OneOriginResult, TaskHeader};

    #[derive(Clone)]
    struct FixtureGraph;

    struct AlwaysReadyPreloader;
    #[async_trait]
    impl NetworkPreloader for AlwaysReadyPreloader {
        type Graph = FixtureGraph;
        async fn poll(
            &self,
            _graph_id: &str,
            _scenario_id: Option<&str>,
        ) -> worker_core::PreloadState<Self::Graph> {
            worker_core::PreloadState::Ready(FixtureGraph)
        }
        async fn await_ready(
            &self,
            _graph_id: &str,
            _scenario_id: Option<&str>,
        ) -> Result<Self::Graph, CoreError> {
            Ok(FixtureGraph)
        }
    }

    struct FixedRouting(i64);
    #[async_trait]
    impl RoutingEngine for FixedRouting {
        type Graph = FixtureGraph;
        async fn route_single_point(
            &self,
            _graph: &Self::Graph,
            _task: &worker_core::SinglePointTask,
        ) -> Result<OneOriginResult, CoreError> {
            unreachable!()
        }
        async fn route_regional(
            &self,
            _graph: &Self::Graph,
            _task: &RegionalTask,
            _max_trip_duration_minutes: u32,
        ) -> Result<OneOriginResult, CoreError> {
            Ok(OneOriginResult {
                travel_times: None,
                accessibility: Some(vec![vec![vec![self.0]]]),
            })
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
            x: 5,
            y: 0,
            grid: GridDescriptor {
                zoom: 9,
                west: 0,
                north: 0,
                width: 10,
                height: 10,
            },
            percentiles: vec![50],
            cutoffs_minutes: vec![30],
            make_taui_site: false,
            destination_point_set_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn happy_regional_origin_matches_end_to_end_scenario_1() {
        let results = Arc::new(ResultBuffer::new());
        let tracker = Arc::new(ThroughputTracker::new());
        let handler = RegionalHandler::new(
            Arc::new(AlwaysReadyPreloader),
            Arc::new(FixedRouting(7)),
            Arc::new(NoOpPointSets),
            Arc::new(NoOpStore),
            Arc::new(ZeroDecay),
            results.clone(),
            tracker.clone(),
        );
        handler.handle(task()).await;
        let drained = results.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].job_id, "J1");
        assert_eq!(drained[0].task_id, 5);
        assert_eq!(drained[0].accessibility_values, vec![vec![vec![7]]]);
        assert_eq!(tracker.tasks_per_minute_by_job().get("J1"), Some(&1));
    }

    #[tokio::test]
    async fn validation_failure_appends_error_result() {
        let results = Arc::new(ResultBuffer::new());
        let handler = RegionalHandler::new(
            Arc::new(AlwaysReadyPreloader),
            Arc::new(FixedRouting(7)),
            Arc::new(NoOpPointSets),
            Arc::new(NoOpStore),
            Arc::new(ZeroDecay),
            results.clone(),
            Arc::new(ThroughputTracker::new()),
        );
        let mut bad_task = task();
        bad_task.cutoffs_minutes.clear();
        handler.handle(bad_task).await;
        let drained = results.drain();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].is_error());
        assert!(drained[0].accessibility_values.is_empty());
    }
}
