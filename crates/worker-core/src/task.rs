//! Task data model (spec §3).
//!
//! The broker's wire format discriminates single-point and regional tasks
//! with a `type` tag; both carry a common header. Modeled here as a tagged
//! sum type rather than an inheritance hierarchy. `serde` ignores unknown
//! JSON fields by default, which gives the lenient decoding §4.6 requires
//! for free.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Fields every task carries regardless of kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHeader {
    pub task_id: i64,
    pub graph_id: String,
    pub worker_version: String,
    #[serde(default)]
    pub scenario_id: Option<String>,
}

/// Requested output encoding for a single-point response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    Grid,
    Geotiff,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Grid
    }
}

/// Web-mercator pixel grid a regional job's origins and destinations live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDescriptor {
    pub zoom: u8,
    pub west: i32,
    pub north: i32,
    pub width: u32,
    pub height: u32,
}

impl GridDescriptor {
    pub fn n_total(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }
}

/// An interactive task for one origin, answered synchronously over HTTP (C5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinglePointTask {
    #[serde(flatten)]
    pub header: TaskHeader,
    pub lat: f64,
    pub lon: f64,
    pub percentiles: Vec<u8>,
    pub cutoffs_minutes: Vec<u32>,
    #[serde(default)]
    pub destination_point_set_ids: Vec<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

impl SinglePointTask {
    pub fn has_destination_point_sets(&self) -> bool {
        !self.destination_point_set_ids.is_empty()
    }
}

/// One origin within a large asynchronous job, answered through polling (C6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionalTask {
    #[serde(flatten)]
    pub header: TaskHeader,
    pub job_id: String,
    pub x: u32,
    pub y: u32,
    pub grid: GridDescriptor,
    pub percentiles: Vec<u8>,
    pub cutoffs_minutes: Vec<u32>,
    #[serde(default)]
    pub make_taui_site: bool,
    #[serde(default)]
    pub destination_point_set_ids: Vec<String>,
}

impl RegionalTask {
    /// Invariants from spec §3: non-empty percentiles/cutoffs, origin inside the grid.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cutoffs_minutes.is_empty() || self.percentiles.is_empty() {
            return Err(CoreError::Validation(
                "cutoffsMinutes and percentiles must both be non-empty".to_string(),
            ));
        }
        if !self.grid.contains(self.x, self.y) {
            return Err(CoreError::Validation(format!(
                "origin ({}, {}) outside grid {}x{}",
                self.x, self.y, self.grid.width, self.grid.height
            )));
        }
        Ok(())
    }

    pub fn has_destination_point_sets(&self) -> bool {
        !self.destination_point_set_ids.is_empty()
    }
}

/// A task as received from the broker: either single-point or regional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Task {
    SinglePoint(SinglePointTask),
    Regional(RegionalTask),
}

impl Task {
    pub fn header(&self) -> &TaskHeader {
        match self {
            Task::SinglePoint(t) => &t.header,
            Task::Regional(t) => &t.header,
        }
    }

    pub fn task_id(&self) -> i64 {
        self.header().task_id
    }

    pub fn graph_id(&self) -> &str {
        &self.header().graph_id
    }

    pub fn scenario_id(&self) -> Option<&str> {
        self.header().scenario_id.as_deref()
    }

    /// `jobId` is absent for single-point tasks.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Task::SinglePoint(_) => None,
            Task::Regional(t) => Some(&t.job_id),
        }
    }

    pub fn is_regional(&self) -> bool {
        matches!(self, Task::Regional(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> TaskHeader {
        TaskHeader {
            task_id: 5,
            graph_id: "G".to_string(),
            worker_version: "1.0".to_string(),
            scenario_id: None,
        }
    }

    #[test]
    fn regional_task_round_trips_through_json_with_type_tag() {
        let task = Task::Regional(RegionalTask {
            header: header(),
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
        });

        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"type\":\"Regional\""));
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(task, back);
    }

    #[test]
    fn unknown_fields_are_ignored_by_the_lenient_decoder() {
        let json = serde_json::json!({
            "type": "Regional",
            "taskId": 1,
            "graphId": "G",
            "workerVersion": "1.0",
            "jobId": "J1",
            "x": 0,
            "y": 0,
            "grid": {"zoom": 9, "west": 0, "north": 0, "width": 4, "height": 4},
            "percentiles": [50],
            "cutoffsMinutes": [30],
            "somethingTheWorkerDoesNotKnowAbout": 42,
        });
        let task: Task = serde_json::from_value(json).unwrap();
        assert_eq!(task.task_id(), 1);
    }

    #[test]
    fn validate_rejects_empty_cutoffs() {
        let task = RegionalTask {
            header: header(),
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
            cutoffs_minutes: Vec::new(),
            make_taui_site: false,
            destination_point_set_ids: Vec::new(),
        };
        assert!(matches!(task.validate(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn validate_rejects_origin_outside_grid() {
        let task = RegionalTask {
            header: header(),
            job_id: "J1".to_string(),
            x: 10,
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
        };
        assert!(task.validate().is_err());
    }
}
