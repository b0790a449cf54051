//! Wraps the broker's HTTP API: poll, report errors (C8, spec §4.6).

use std::time::Duration;

use reqwest::{StatusCode, Url};

use worker_core::{Task, TaskErrorDescriptor, WorkerStatus};

const POOL_MAX_IDLE_PER_HOST: usize = 20;
const SOCKET_TIMEOUT: Duration = Duration::from_secs(55);

/// Outcome of one `poll` call. Transport failures and unexpected status
/// codes collapse into `Failure` rather than propagating an error type —
/// the caller's only recovery path is "reinsert the drained results and
/// try again next cycle" (§4.6, §4.7 step 5), regardless of what failed.
pub enum PollOutcome {
    Tasks(Vec<Task>),
    NoWork,
    Failure,
}

pub struct BrokerClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BrokerClient {
    pub fn new(base_url: Url) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .timeout(SOCKET_TIMEOUT)
            .build()?;
        Ok(Self { http, base_url })
    }

    /// `POST /internal/poll`. 204 = no work; 200 with a JSON array parses
    /// leniently (unknown task fields are ignored); anything else is a
    /// failure.
    pub async fn poll(&self, status: &WorkerStatus) -> PollOutcome {
        let url = match self.base_url.join("internal/poll") {
            Ok(u) => u,
            Err(_) => return PollOutcome::Failure,
        };
        let response = match self.http.post(url).json(status).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "poll transport failure");
                return PollOutcome::Failure;
            }
        };
        match response.status() {
            StatusCode::NO_CONTENT => PollOutcome::NoWork,
            StatusCode::OK => match response.json::<Vec<Task>>().await {
                Ok(tasks) => PollOutcome::Tasks(tasks),
                Err(e) => {
                    tracing::warn!(error = %e, "poll response body did not decode as a task list");
                    PollOutcome::Failure
                }
            },
            other => {
                // Consume the body on every path so the connection is released
                // back to the pool even when we aren't interested in it (§4.6).
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(status = %other, body, "poll returned an unexpected status");
                PollOutcome::Failure
            }
        }
    }

    /// `POST /internal/complete/<status>/<taskId>` with a JSON array of
    /// error descriptors (§4.6, §6). Best-effort: failures are logged, not
    /// retried, since the broker will redeliver the task anyway.
    pub async fn report_task_errors(
        &self,
        task_id: i64,
        http_status_code: u16,
        errors: &[TaskErrorDescriptor],
    ) {
        let path = format!("internal/complete/{http_status_code}/{task_id}");
        let url = match self.base_url.join(&path) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(error = %e, task_id, "could not build error-report URL");
                return;
            }
        };
        match self.http.post(url).json(errors).send().await {
            Ok(response) => {
                let _ = response.text().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, task_id, "error report transport failure");
            }
        }
    }
}
