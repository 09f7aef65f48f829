use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure talking to a remote provider.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} request timed out after {after:?}")]
    Timeout {
        provider: &'static str,
        after: Duration,
    },
    #[error("{provider} transport error: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },
    #[error("{provider} response could not be decoded: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    /// Classifies a reqwest failure, treating an elapsed deadline as `Timeout`.
    pub fn from_reqwest(provider: &'static str, err: reqwest::Error, after: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout { provider, after }
        } else if err.is_decode() {
            ProviderError::Decode { provider, message: err.to_string() }
        } else {
            ProviderError::Transport { provider, message: err.to_string() }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImageError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("all {attempted} polling endpoints unavailable, last error: {last}")]
    AllEndpointsUnavailable {
        attempted: usize,
        last: Box<ProviderError>,
    },
    #[error("image job {request_id} failed: {reason}")]
    JobFailed {
        request_id: String,
        reason: String,
    },
}

/// Failures a workflow step can report.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("missing input: {0}")]
    MissingInput(&'static str),
    #[error("invalid request body: {0}")]
    InvalidInput(String),
    #[error("image generation failed: {0}")]
    Image(#[from] ImageError),
    #[error("copy generation failed: {0}")]
    Copy(#[from] ProviderError),
    #[error("workflow did not settle after {0} transitions")]
    Stalled(usize),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    InvalidInput,
    ProviderError,
    AllEndpointsUnavailable,
    Timeout,
    Internal,
}

/// Last failure seen by the workflow, in a form callers can inspect and re-invoke on.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorState {
    pub kind: ErrorKind,
    pub message: String,
    pub retry_count: u32,
}

impl From<&WorkflowError> for ErrorState {
    fn from(err: &WorkflowError) -> Self {
        let kind = match err {
            WorkflowError::MissingInput(_) => ErrorKind::MissingInput,
            WorkflowError::InvalidInput(_) => ErrorKind::InvalidInput,
            WorkflowError::Image(ImageError::AllEndpointsUnavailable { .. }) => {
                ErrorKind::AllEndpointsUnavailable
            }
            WorkflowError::Image(ImageError::Provider(p)) | WorkflowError::Copy(p) if p.is_timeout() => {
                ErrorKind::Timeout
            }
            WorkflowError::Image(_) | WorkflowError::Copy(_) => ErrorKind::ProviderError,
            WorkflowError::Stalled(_) => ErrorKind::Internal,
        };
        ErrorState { kind, message: err.to_string(), retry_count: 0 }
    }
}
