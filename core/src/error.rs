//! Error types for the request engine.
//!
//! # Design
//! Every variant owns plain data (`String`, status codes) rather than the
//! transport's own error type, so `Error` is `Clone` and can be mirrored into
//! framework state by [`crate::states`]. Transport errors are rendered to
//! strings at the adapter boundary.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by `Method::send` and the pieces it drives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The adapter could not complete the HTTP exchange.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The server answered with a status the response expectation rejects.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The response body could not be decoded into the expected shape.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A `transformData` step failed.
    #[error("transform failed: {0}")]
    Transform(String),

    /// The method asked for something the adapter cannot provide.
    #[error("{adapter} adapter does not support {capability}")]
    UnsupportedCapability {
        adapter: &'static str,
        capability: &'static str,
    },

    #[error("request aborted")]
    Aborted,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration could not be loaded or is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Shorthand for transform functions that want to fail with a message.
    pub fn transform(msg: impl Into<String>) -> Self {
        Error::Transform(msg.into())
    }

    /// True when the failure came from the server's status code rather than
    /// from the transport or the pipeline.
    pub fn is_status(&self) -> bool {
        matches!(self, Error::HttpStatus { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Deserialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_and_body() {
        let err = Error::HttpStatus {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 500: boom");
        assert!(err.is_status());
    }

    #[test]
    fn unsupported_capability_names_adapter() {
        let err = Error::UnsupportedCapability {
            adapter: "fetch",
            capability: "upload progress",
        };
        assert_eq!(err.to_string(), "fetch adapter does not support upload progress");
    }

    #[test]
    fn serde_errors_become_deserialization() {
        let err: Error = serde_json::from_str::<serde_json::Value>("not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
