//! Outputs of computing one task (spec §3).

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, TaskErrorDescriptor};

/// Accessibility values indexed `[grid][percentile][cutoff]`.
pub type AccessibilityValues = Vec<Vec<Vec<i64>>>;

/// A travel-time grid: one plane of per-destination-cell minutes per
/// percentile, row-major over the regional grid's destinations. `i32::MAX`
/// marks an unreached destination. Opaque beyond its shape — the routing
/// capability is the only thing that understands how these minutes were
/// derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelTimeGrid {
    pub width: u32,
    pub height: u32,
    /// One plane per percentile, each of length `width * height`.
    pub percentile_planes: Vec<Vec<i32>>,
}

impl TravelTimeGrid {
    pub const UNREACHED: i32 = i32::MAX;

    pub fn values_per_pixel(&self) -> usize {
        self.percentile_planes.len()
    }

    pub fn any_destination_reached(&self) -> bool {
        self.percentile_planes
            .iter()
            .any(|plane| plane.iter().any(|&v| v != Self::UNREACHED))
    }
}

/// Output of computing one task (§3): a travel-time grid, an accessibility
/// vector, or both. Produced by the external routing capability; the core
/// only knows its shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneOriginResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_times: Option<TravelTimeGrid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<AccessibilityValues>,
}

/// What the worker returns per origin (§3). Pushed into the Result Buffer
/// (C2) by the Regional Handler (C6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionalWorkResult {
    pub job_id: String,
    pub task_id: i64,
    pub accessibility_values: AccessibilityValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_times: Option<TravelTimeGrid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskErrorDescriptor>,
}

impl RegionalWorkResult {
    pub fn success(
        job_id: impl Into<String>,
        task_id: i64,
        accessibility_values: AccessibilityValues,
        travel_times: Option<TravelTimeGrid>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            task_id,
            accessibility_values,
            travel_times,
            error: None,
        }
    }

    /// Built from an escaped error (§4.5): all numeric fields empty, a
    /// structured descriptor attached so the backend can account for every
    /// `taskId` even on failure (§7).
    pub fn error(job_id: impl Into<String>, task_id: i64, err: &CoreError) -> Self {
        Self {
            job_id: job_id.into(),
            task_id,
            accessibility_values: Vec::new(),
            travel_times: None,
            error: Some(err.to_descriptor()),
        }
    }

    /// The sentinel sent back for Taui tasks (§4.5 step 8): the full time
    /// grid was already persisted out-of-band, so the broker only needs a
    /// zero-filled placeholder of the right shape to track progress.
    pub fn taui_sentinel(
        job_id: impl Into<String>,
        task_id: i64,
        n_grids: usize,
        n_percentiles: usize,
        n_cutoffs: usize,
    ) -> Self {
        let accessibility_values = vec![vec![vec![0i64; n_cutoffs]; n_percentiles]; n_grids];
        Self {
            job_id: job_id.into(),
            task_id,
            accessibility_values,
            travel_times: None,
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
