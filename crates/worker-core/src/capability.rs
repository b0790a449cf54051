//! Interfaces for the collaborators explicitly out of scope (spec §1): the
//! transit-routing engine, the network/scenario loader, the point-set
//! cache, and the object store the assembler uploads to. The core only
//! invokes these through traits; production implementations live outside
//! this crate.

use async_trait::async_trait;

use crate::error::{CoreError, LoaderProgress};
use crate::result::OneOriginResult;
use crate::task::{RegionalTask, SinglePointTask};

/// Result of asking the preloader for a graph without blocking (§4.4 step 1,
/// §9 design note: replaces "exceptions as control flow" with an explicit
/// variant).
pub enum PreloadState<G> {
    Ready(G),
    NotReady(LoaderProgress),
}

/// Materializes a transit/street graph for a `(graphId, scenarioId)` key and
/// retains it for reuse across tasks sharing that key (§3 lifecycles, C4).
#[async_trait]
pub trait NetworkPreloader: Send + Sync {
    type Graph: Send + Sync + Clone;

    /// Non-blocking: used by the single-point handler, which must never
    /// block a compute thread on the loader (§4.4 step 1).
    async fn poll(&self, graph_id: &str, scenario_id: Option<&str>) -> PreloadState<Self::Graph>;

    /// Blocks the calling thread until the graph is ready (§4.5 step 4),
    /// used only by the regional handler.
    async fn await_ready(
        &self,
        graph_id: &str,
        scenario_id: Option<&str>,
    ) -> Result<Self::Graph, CoreError>;
}

/// Resolves destination-point-set keys to grids and validates them against
/// a task (§4.4 step 2, §4.5 step 5).
#[async_trait]
pub trait PointSetCache: Send + Sync {
    async fn load_and_validate(&self, destination_point_set_ids: &[String]) -> Result<(), CoreError>;
}

/// The transit-routing engine: produces a `OneOriginResult` for one origin
/// against a prepared graph. The only capability that actually understands
/// travel time.
#[async_trait]
pub trait RoutingEngine: Send + Sync {
    type Graph: Send + Sync;

    async fn route_single_point(
        &self,
        graph: &Self::Graph,
        task: &SinglePointTask,
    ) -> Result<OneOriginResult, CoreError>;

    /// `max_trip_duration_minutes` is the clamped decay-function bound from
    /// the Regional Handler's step 2 (§4.5) — the routing capability uses it
    /// to bound its own search rather than recomputing the clamp itself.
    async fn route_regional(
        &self,
        graph: &Self::Graph,
        task: &RegionalTask,
        max_trip_duration_minutes: u32,
    ) -> Result<OneOriginResult, CoreError>;
}

/// The broker-side destination for finalized assembled grids and Taui
/// per-origin time-grid files (§4.5 step 6/8, §4.9 step 3 of `finish()`).
#[async_trait]
pub trait GridObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), CoreError>;
}

/// GeoTIFF/LZW encoding hook for single-point responses requesting that
/// format (§6). The core only decides when to call this; the actual
/// TIFF byte-level encoding is a collaborator's job.
pub trait GeotiffEncoder: Send + Sync {
    fn encode(
        &self,
        planes: &[Vec<i32>],
        zoom: i32,
        west: i32,
        north: i32,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, CoreError>;
}
