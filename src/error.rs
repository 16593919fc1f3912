use std::time::Duration;

use thiserror::Error;

use crate::model::VehicleType;

/// Failure of a single fetch, or of a whole retry sequence (`Exhausted`).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timeout after {after:?}: {url}")]
    Timeout { url: String, after: Duration },
    #[error("connection error for {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("redirect error for {url}: {reason}")]
    Redirect { url: String, reason: String },
    #[error("malformed body from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("giving up on {url} after {attempts} attempt(s): {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Transient network failures are retried; parse and redirect errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout { .. } | FetchError::Connection { .. } | FetchError::Status { .. }
        )
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url, .. }
            | FetchError::Connection { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Redirect { url, .. }
            | FetchError::Parse { url, .. }
            | FetchError::Exhausted { url, .. } => url,
        }
    }
}

/// Category-level collection failure. The orchestrator answers it with seed data.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("category {category} failed: {source}")]
    CategoryFailed {
        category: VehicleType,
        #[source]
        source: FetchError,
    },
}

/// Fatal pipeline errors. Anything here aborts the run with a non-zero exit.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("merged dataset is empty; refusing to persist")]
    EmptyDataset,
    #[error("integrity check failed: expected {expected} vehicles, artifact holds {found}")]
    Integrity { expected: usize, found: usize },
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
