use std::time::Duration;

use bytes::Bytes;
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    consts::{MAX_POLL_RETRIES, POLL_DELAY_MS, POLLING_URL},
    error::{CollaboratorRequestSnafu, FramelensError},
};

/// Lifecycle of one asynchronous inference job.
///
/// A submit may complete synchronously (200) or come back pending
/// (202), in which case the job is polled a bounded number of times
/// with a fixed delay before it is declared timed out. Any other
/// status is a terminal failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Pending { polls_remaining: u32 },
    Ready,
    Failed { status: u16 },
    TimedOut,
}

impl JobState {
    /// Advances the machine with the HTTP status of the latest
    /// response. Terminal states absorb further input.
    pub fn advance(self, status: u16) -> JobState {
        match (self, status) {
            (JobState::Submitted, 200) => JobState::Ready,
            (JobState::Submitted, 202) => JobState::Pending {
                polls_remaining: MAX_POLL_RETRIES,
            },
            (JobState::Submitted, status) => JobState::Failed { status },

            (JobState::Pending { .. }, 200) => JobState::Ready,
            (JobState::Pending { polls_remaining }, 202) => {
                if polls_remaining <= 1 {
                    JobState::TimedOut
                } else {
                    JobState::Pending {
                        polls_remaining: polls_remaining - 1,
                    }
                }
            }
            (JobState::Pending { .. }, status) => JobState::Failed { status },

            (terminal, _) => terminal,
        }
    }
}

/// Drives a submitted job to completion and returns the result body.
///
/// `response` is the reply to the submit request; when it is pending
/// the gateway's status endpoint is polled using the request id the
/// submit reply carried.
pub async fn await_result(
    client: &reqwest::Client,
    api_key: &str,
    service: &str,
    response: reqwest::Response,
) -> Result<Bytes, FramelensError> {
    let request_id = response
        .headers()
        .get("NVCF-REQID")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut state = JobState::Submitted.advance(response.status().as_u16());
    let mut current = response;

    loop {
        match state {
            JobState::Ready => {
                return current
                    .bytes()
                    .await
                    .context(CollaboratorRequestSnafu { service });
            }
            JobState::Failed { status } => {
                let message = current.text().await.unwrap_or_default();
                return Err(FramelensError::CollaboratorStatus {
                    service: service.to_string(),
                    status,
                    message,
                });
            }
            JobState::TimedOut => {
                return Err(FramelensError::JobTimedOut {
                    service: service.to_string(),
                    retries: MAX_POLL_RETRIES,
                });
            }
            JobState::Pending { polls_remaining } => {
                let request_id =
                    request_id
                        .as_deref()
                        .ok_or_else(|| FramelensError::CollaboratorResponse {
                            service: service.to_string(),
                            field: "NVCF-REQID".to_string(),
                        })?;
                debug!("`{service}` job {request_id} pending, {polls_remaining} polls left");
                tokio::time::sleep(Duration::from_millis(POLL_DELAY_MS)).await;

                let next = client
                    .get(format!("{POLLING_URL}{request_id}"))
                    .bearer_auth(api_key)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await
                    .context(CollaboratorRequestSnafu { service })?;
                state = state.advance(next.status().as_u16());
                if state == JobState::Ready {
                    info!("`{service}` job {request_id} ready");
                }
                current = next;
            }
            JobState::Submitted => {
                // advance() never leaves Submitted in place.
                return Err(FramelensError::CollaboratorResponse {
                    service: service.to_string(),
                    field: "status".to_string(),
                });
            }
        }
    }
}
