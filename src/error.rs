//! Error types for the import pipeline.
//!
//! Failures are modeled as tagged variants rather than exception-style
//! downcasting:
//!
//! - [`FetchError`]: transport failures, non-success HTTP statuses, and
//!   intentional cancellation
//! - [`TransformError`]: malformed input that defeats parsing or
//!   serialization
//!
//! All errors use the `thiserror` crate for minimal boilerplate and proper
//! error trait implementations. Fetch errors are `Clone` because a single
//! in-flight retrieval is shared by every concurrent waiter, and each waiter
//! receives the same outcome.

use thiserror::Error;

/// Result type alias for import pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the import pipeline.
///
/// Cancellation travels through [`FetchError::Cancelled`] and must be treated
/// as a silent no-op by callers; [`Error::is_cancelled`] exists so the
/// pipeline entry point can filter it out before anything reaches the error
/// signal path.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Fragment retrieval failed (or was cancelled).
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Fetched markup could not be transformed.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
}

impl Error {
    /// True when this error represents an intentional cancellation rather than
    /// a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Fetch(FetchError::Cancelled))
    }
}

/// Errors that occur while retrieving a fragment.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// The network (or filesystem) transport failed outright.
    #[error("Transport failure fetching '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("Fetch of '{url}' failed: HTTP {status} {status_text}")]
    Status {
        url: String,
        status: u16,
        status_text: String,
    },

    /// The requesting instance cancelled its interest in the result.
    ///
    /// Never surfaced to observers; the retrieval itself may keep running for
    /// other borrowers.
    #[error("Fetch cancelled")]
    Cancelled,
}

/// Errors that occur while splitting fetched markup.
#[derive(Error, Debug, Clone)]
pub enum TransformError {
    /// The base URL or markup could not be parsed.
    #[error("Failed to parse fragment: {reason}")]
    Parse { reason: String },

    /// The transformed tree could not be serialized back to markup.
    #[error("Failed to serialize content: {reason}")]
    Serialize { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_status_display() {
        let error = FetchError::Status {
            url: "https://example.com/frag.html".to_string(),
            status: 404,
            status_text: "Not Found".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("404"));
        assert!(display.contains("Not Found"));
        assert!(display.contains("example.com"));
    }

    #[test]
    fn fetch_error_transport_display() {
        let error = FetchError::Transport {
            url: "https://example.com/frag.html".to_string(),
            reason: "connection refused".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Transport failure"));
        assert!(display.contains("connection refused"));
    }

    #[test]
    fn transform_error_display() {
        let error = TransformError::Parse {
            reason: "invalid base URL".to_string(),
        };
        assert!(format!("{}", error).contains("invalid base URL"));
    }

    #[test]
    fn error_from_fetch_error() {
        let error: Error = FetchError::Cancelled.into();
        assert!(matches!(error, Error::Fetch(_)));
    }

    #[test]
    fn error_from_transform_error() {
        let error: Error = TransformError::Serialize {
            reason: "test".to_string(),
        }
        .into();
        assert!(matches!(error, Error::Transform(_)));
    }

    #[test]
    fn cancellation_is_detected_only_for_cancelled() {
        assert!(Error::Fetch(FetchError::Cancelled).is_cancelled());
        let status: Error = FetchError::Status {
            url: "u".to_string(),
            status: 500,
            status_text: "Internal Server Error".to_string(),
        }
        .into();
        assert!(!status.is_cancelled());
    }

    #[test]
    fn errors_are_cloneable() {
        let error = FetchError::Transport {
            url: "u".to_string(),
            reason: "r".to_string(),
        };
        let cloned = error.clone();
        assert_eq!(format!("{}", error), format!("{}", cloned));
    }
}
