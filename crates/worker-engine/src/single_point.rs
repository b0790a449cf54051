//! Synchronous single-origin path (C5, spec §4.4).

use std::sync::Arc;

use serde::Serialize;

use worker_core::{
    AccessibilityValues, CoreError, GeotiffEncoder, GridHeader, NetworkPreloader, OutputFormat,
    PointSetCache, PreloadState, RoutingEngine, SinglePointTask, WorkerStatus,
};

use crate::throughput::ThroughputTracker;

const TAUI_CUTOFF_CAP_MINUTES: u32 = 120;

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct SinglePointMetadata {
    accessibility: AccessibilityValues,
    scenario_warnings: Vec<String>,
    scenario_info: Option<String>,
    path_summaries: Option<serde_json::Value>,
}

pub struct SinglePointHandler<N, R, C>
where
    N: NetworkPreloader,
    R: RoutingEngine<Graph = N::Graph>,
    C: PointSetCache,
{
    preloader: Arc<N>,
    routing: Arc<R>,
    point_sets: Arc<C>,
    geotiff: Option<Arc<dyn GeotiffEncoder>>,
    tracker: Arc<ThroughputTracker>,
}

impl<N, R, C> SinglePointHandler<N, R, C>
where
    N: NetworkPreloader,
    R: RoutingEngine<Graph = N::Graph>,
    C: PointSetCache,
{
    pub fn new(
        preloader: Arc<N>,
        routing: Arc<R>,
        point_sets: Arc<C>,
        geotiff: Option<Arc<dyn GeotiffEncoder>>,
        tracker: Arc<ThroughputTracker>,
    ) -> Self {
        Self {
            preloader,
            routing,
            point_sets,
            geotiff,
            tracker,
        }
    }

    /// Runs §4.4 steps 1-5, returning the serialized response body.
    pub async fn handle(&self, mut task: SinglePointTask) -> Result<Vec<u8>, CoreError> {
        let graph = match self
            .preloader
            .poll(&task.header.graph_id, task.header.scenario_id.as_deref())
            .await
        {
            PreloadState::NotReady(progress) => return Err(CoreError::NotReady(progress)),
            PreloadState::Ready(graph) => graph,
        };

        if task.has_destination_point_sets() {
            task.cutoffs_minutes = (0..=TAUI_CUTOFF_CAP_MINUTES).collect();
            self.point_sets
                .load_and_validate(&task.destination_point_set_ids)
                .await?;
        }

        let result = self.routing.route_single_point(&graph, &task).await?;
        let body = self.serialize_response(&task, &result)?;

        self.tracker.record(&WorkerStatus::single_point_job_key(
            task.header.scenario_id.as_deref(),
        ));
        Ok(body)
    }

    fn serialize_response(
        &self,
        task: &SinglePointTask,
        result: &worker_core::OneOriginResult,
    ) -> Result<Vec<u8>, CoreError> {
        let planes = result
            .travel_times
            .as_ref()
            .map(|tt| tt.percentile_planes.clone())
            .unwrap_or_default();
        let (width, height) = result
            .travel_times
            .as_ref()
            .map(|tt| (tt.width, tt.height))
            .unwrap_or((0, 0));

        let mut body = match task.format {
            OutputFormat::Grid => {
                let header = GridHeader {
                    zoom: 0,
                    west: 0,
                    north: 0,
                    width,
                    height,
                    values_per_pixel: planes.len() as u32,
                };
                worker_core::grid_codec::encode_time_grid(&header, &planes)?
            }
            OutputFormat::Geotiff => match &self.geotiff {
                Some(encoder) => encoder.encode(&planes, 0, 0, 0, width, height)?,
                None => {
                    return Err(CoreError::Compute(
                        "no GeoTIFF encoder configured for this worker".to_string(),
                    ))
                }
            },
        };

        let metadata = SinglePointMetadata {
            accessibility: result.accessibility.clone().unwrap_or_default(),
            scenario_warnings: Vec::new(),
            scenario_info: task.header.scenario_id.clone(),
            path_summaries: None,
        };
        let metadata_json = serde_json::to_vec(&metadata)
            .map_err(|e| CoreError::Compute(format!("metadata serialization failed: {e}")))?;
        body.extend_from_slice(&metadata_json);
        Ok(body)
    }
}
