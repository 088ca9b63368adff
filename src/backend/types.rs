//! Wire types and transport errors for the extraction backend protocol.

use crate::extraction::types::{
    DEFAULT_FAILURE_REASON, ExtractionError, ExtractionResult, TaskHandle, TaskStatus,
};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors returned while talking to the extraction backend over HTTP.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid extraction backend URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend responded with an unexpected status code.
    #[error("Unexpected extraction backend response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

#[derive(Deserialize)]
pub(crate) struct SubmitResponse {
    #[serde(default)]
    pub(crate) task_id: Option<String>,
}

impl SubmitResponse {
    pub(crate) fn into_handle(self) -> Result<TaskHandle, ExtractionError> {
        match self.task_id.map(TaskHandle::new) {
            Some(handle) if handle.is_addressable() => Ok(handle),
            Some(handle) => Err(ExtractionError::Protocol(format!(
                "submit response carried an unusable task_id '{handle}'"
            ))),
            None => Err(ExtractionError::Protocol(
                "submit response is missing task_id".into(),
            )),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct StatusResponse {
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) result: Option<ExtractionResult>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

impl StatusResponse {
    /// Close the untyped status vocabulary into [`TaskStatus`].
    pub(crate) fn into_status(self) -> Result<TaskStatus, ExtractionError> {
        match self.status.as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => self.result.map(TaskStatus::Completed).ok_or_else(|| {
                ExtractionError::Protocol("completed status without a result".into())
            }),
            "failed" => Ok(TaskStatus::Failed(
                self.error
                    .filter(|reason| !reason.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
            )),
            other => Err(ExtractionError::Protocol(format!(
                "unrecognized task status '{other}'"
            ))),
        }
    }
}
