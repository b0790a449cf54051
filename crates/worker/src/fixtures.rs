//! Reference implementations of the capabilities the core treats as
//! external collaborators (spec §1): a network preloader that "loads" a
//! graph instantly, a routing engine that returns a deterministic answer,
//! a point-set cache that always validates, and a filesystem-backed object
//! store. None of these are the production routing/graph-loading stack —
//! they exist so the worker binary links and its behavior is observable.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use worker_core::{
    CoreError, DecayFunction, GridObjectStore, LoaderProgress, LoaderStatus, NetworkPreloader,
    OneOriginResult, PointSetCache, PreloadState, RegionalTask, RoutingEngine, SinglePointTask,
    TravelTimeGrid,
};

/// A graph handle that carries nothing but the key it was built from —
/// enough for the fixtures below to behave deterministically per graph.
#[derive(Debug, Clone)]
pub struct FixtureGraph {
    pub graph_id: String,
    pub scenario_id: Option<String>,
}

/// Preloader that considers every graph ready immediately. Tracks which
/// keys have been "seen" only to exercise the not-ready path on demand.
pub struct ImmediateNetworkPreloader {
    never_ready: Mutex<Vec<String>>,
}

impl ImmediateNetworkPreloader {
    pub fn new() -> Self {
        Self {
            never_ready: Mutex::new(Vec::new()),
        }
    }

    /// Marks a `graphId` as permanently not-ready, for exercising §4.4/§4.8's
    /// 202 path without a real asynchronous loader.
    pub fn mark_never_ready(&self, graph_id: impl Into<String>) {
        self.never_ready.lock().unwrap().push(graph_id.into());
    }

    fn is_never_ready(&self, graph_id: &str) -> bool {
        self.never_ready.lock().unwrap().iter().any(|g| g == graph_id)
    }
}

impl Default for ImmediateNetworkPreloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkPreloader for ImmediateNetworkPreloader {
    type Graph = FixtureGraph;

    async fn poll(&self, graph_id: &str, scenario_id: Option<&str>) -> PreloadState<Self::Graph> {
        if self.is_never_ready(graph_id) {
            return PreloadState::NotReady(LoaderProgress {
                status: LoaderStatus::Building,
                message: Some(format!("{graph_id} has no production loader configured")),
            });
        }
        PreloadState::Ready(FixtureGraph {
            graph_id: graph_id.to_string(),
            scenario_id: scenario_id.map(str::to_string),
        })
    }

    async fn await_ready(
        &self,
        graph_id: &str,
        scenario_id: Option<&str>,
    ) -> Result<Self::Graph, CoreError> {
        if self.is_never_ready(graph_id) {
            return Err(CoreError::Compute(format!(
                "{graph_id} has no production loader configured"
            )));
        }
        Ok(FixtureGraph {
            graph_id: graph_id.to_string(),
            scenario_id: scenario_id.map(str::to_string),
        })
    }
}

/// Routing engine that reports every destination unreached and every
/// accessibility cell zero. Exercises the full serialization path without
/// a real transit network.
pub struct ZeroRoutingEngine;

#[async_trait]
impl RoutingEngine for ZeroRoutingEngine {
    type Graph = FixtureGraph;

    async fn route_single_point(
        &self,
        _graph: &Self::Graph,
        task: &SinglePointTask,
    ) -> Result<OneOriginResult, CoreError> {
        let planes = vec![vec![TravelTimeGrid::UNREACHED; 1]; task.percentiles.len()];
        Ok(OneOriginResult {
            travel_times: Some(TravelTimeGrid {
                width: 1,
                height: 1,
                percentile_planes: planes,
            }),
            accessibility: Some(vec![vec![vec![0; task.cutoffs_minutes.len()]; task.percentiles.len()]]),
        })
    }

    async fn route_regional(
        &self,
        _graph: &Self::Graph,
        task: &RegionalTask,
        _max_trip_duration_minutes: u32,
    ) -> Result<OneOriginResult, CoreError> {
        let n_total = task.grid.n_total().min(4) as usize;
        let planes = vec![vec![TravelTimeGrid::UNREACHED; n_total.max(1)]; task.percentiles.len()];
        Ok(OneOriginResult {
            travel_times: Some(TravelTimeGrid {
                width: task.grid.width,
                height: task.grid.height,
                percentile_planes: planes,
            }),
            accessibility: Some(vec![vec![vec![0; task.cutoffs_minutes.len()]; task.percentiles.len()]]),
        })
    }
}

pub struct AlwaysValidPointSetCache;

#[async_trait]
impl PointSetCache for AlwaysValidPointSetCache {
    async fn load_and_validate(&self, _destination_point_set_ids: &[String]) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Writes finalized grids to a local directory rather than a production
/// object store.
pub struct FilesystemGridObjectStore {
    base_dir: PathBuf,
}

impl FilesystemGridObjectStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }
}

#[async_trait]
impl GridObjectStore for FilesystemGridObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), CoreError> {
        let path = self.base_dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::FatalAssembler(e.to_string()))?;
        }
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| CoreError::FatalAssembler(e.to_string()))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| CoreError::FatalAssembler(e.to_string()))?;
        Ok(())
    }
}

/// Linear decay reaching zero exactly at the cutoff (§4.5 step 2): a stand-in
/// for the routing capability's real decay curve.
pub struct LinearDecay;

impl DecayFunction for LinearDecay {
    fn seconds_to_zero(&self, cutoff_minutes: u32) -> f64 {
        f64::from(cutoff_minutes) * 60.0
    }
}
