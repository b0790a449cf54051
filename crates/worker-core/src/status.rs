//! Status posted to the broker on every poll (spec §3, §4.7).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::result::RegionalWorkResult;

/// Posted as the body of every `POST /internal/poll` (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub machine_id: String,
    pub loaded_network_id: Option<String>,
    pub worker_version: String,
    pub max_tasks_requested: usize,
    pub seconds_since_last_poll: f64,
    pub tasks_per_minute_by_job: HashMap<String, u32>,
    pub results: Vec<RegionalWorkResult>,
}

impl WorkerStatus {
    /// The synthetic throughput-tracker key for single-point tasks (§4.1):
    /// `SINGLE-<scenarioId>`.
    pub fn single_point_job_key(scenario_id: Option<&str>) -> String {
        format!("SINGLE-{}", scenario_id.unwrap_or(""))
    }
}
