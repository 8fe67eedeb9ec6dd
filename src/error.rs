//! Error types for the downloader.
//!
//! Validation and configuration failures are raised before any remote call.
//! Remote failures other than a missing series are passed through untouched
//! inside [`Error::Remote`].

use polars::prelude::PolarsError;
use thiserror::Error;

/// Result type alias for downloader operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or undecodable credential
    #[error("configuration error: {0}")]
    Config(String),

    /// Request rejected before contacting the service
    #[error("validation error: {0}")]
    Validation(String),

    /// The series exists on none of the filtered runs
    #[error("No runs have a column named {series}")]
    SeriesNotFound { series: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("table assembly failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Errors raised at the remote service boundary
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("run {run_id} does not have an attribute named {attribute}")]
    AttributeNotFound { run_id: String, attribute: String },

    #[error("request to {url} failed with status {status}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl From<ureq::Error> for RemoteError {
    fn from(e: ureq::Error) -> Self {
        RemoteError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        RemoteError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_not_found_names_the_series() {
        let err = Error::SeriesNotFound { series: "loss".to_string() };
        assert_eq!(err.to_string(), "No runs have a column named loss");
    }

    #[test]
    fn remote_errors_pass_through_unchanged() {
        let err: Error = RemoteError::Status {
            status: 500,
            url: "https://app.neptune.ai/x".to_string(),
            body: "boom".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "request to https://app.neptune.ai/x failed with status 500: boom"
        );
        assert!(matches!(err, Error::Remote(RemoteError::Status { status: 500, .. })));
    }
}
