//! Error taxonomy (spec §7).
//!
//! One `thiserror`-derived enum covers every failure kind the core can
//! produce. Library crates (`worker-core`, `worker-engine`, `assembler`)
//! only ever return `CoreError`; `anyhow` is reserved for the binary crate's
//! `main.rs`, matching the reference client's split between library and
//! process-boundary error handling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A structured description of a loader's in-progress build, returned
/// alongside `CoreError::NotReady` and surfaced to `POST /single` callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderProgress {
    pub status: LoaderStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoaderStatus {
    Queued,
    Building,
    Present,
}

/// The taxonomy from spec §7, table form.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("graph not ready yet")]
    NotReady(LoaderProgress),

    #[error("scenario application rejected: {0:?}")]
    ScenarioApplication(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("broker transport failure: {0}")]
    Transport(String),

    #[error("compute failed: {0}")]
    Compute(String),

    #[error("assembler dimension mismatch: expected {expected} values per pixel, got {got}")]
    AssemblerDimension { expected: usize, got: usize },

    #[error("assembler finalize failed: {0}")]
    FatalAssembler(String),
}

impl CoreError {
    /// The HTTP status a surrounding endpoint should use for this error (§7).
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::NotReady(_) => 202,
            CoreError::ScenarioApplication(_) => 400,
            CoreError::Validation(_) => 400,
            CoreError::Transport(_) => 502,
            CoreError::Compute(_) => 500,
            CoreError::AssemblerDimension { .. } => 500,
            CoreError::FatalAssembler(_) => 500,
        }
    }

    /// Converts to the structured descriptor attached to a `RegionalWorkResult`
    /// or posted to `/internal/complete/<status>/<taskId>`.
    pub fn to_descriptor(&self) -> TaskErrorDescriptor {
        TaskErrorDescriptor {
            kind: self.kind_name().to_string(),
            message: self.to_string(),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            CoreError::NotReady(_) => "NotReady",
            CoreError::ScenarioApplication(_) => "ScenarioApplication",
            CoreError::Validation(_) => "Validation",
            CoreError::Transport(_) => "Transport",
            CoreError::Compute(_) => "Compute",
            CoreError::AssemblerDimension { .. } => "AssemblerDimension",
            CoreError::FatalAssembler(_) => "FatalAssembler",
        }
    }
}

/// Structured error attached to a `RegionalWorkResult` or reported to the
/// broker's `/internal/complete/<status>/<taskId>` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskErrorDescriptor {
    pub kind: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_matches_taxonomy_table() {
        assert_eq!(
            CoreError::NotReady(LoaderProgress {
                status: LoaderStatus::Building,
                message: None,
            })
            .http_status(),
            202
        );
        assert_eq!(CoreError::Validation("x".into()).http_status(), 400);
        assert_eq!(CoreError::Compute("x".into()).http_status(), 500);
    }
}
