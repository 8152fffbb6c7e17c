//! Typed error hierarchy for the spo-ops crate.
//!
//! `OperationError` gives every remote-operation failure a structured shape
//! that preserves diagnostic context at each boundary. Every variant carries
//! enough information for callers to:
//! - Distinguish the failure category (network, digest, post, auth, parse).
//! - Inspect the original cause via `source()` (thiserror derives this
//!   automatically from `#[source]` fields).
//! - Display a human-readable message that includes the relevant context
//!   (status code, response body, lifecycle phase).
//!
//! Design rationale:
//! - Variants map to real system boundaries, not to internal implementation
//!   details. `Network` covers the transport; `DigestMissing` covers the
//!   administrative digest endpoint; `AuthenticationRejected` covers the
//!   identity exchange; etc.
//! - `Network` messages preserve the response status and body where one was
//!   received, because `error_for_status()` alone would discard the remote
//!   service's diagnostic text.
//! - `execute()` is the single recovery boundary: anything that fails below
//!   it is wrapped in `Operation { phase, .. }` so the caller knows whether
//!   the fetch or the analysis step broke. POST failures wear `PostFailed`.
//!
//! The scraping helpers in [`crate::scrape`] deliberately have no error
//! path: a hidden field that is absent from a page is a routine outcome and
//! degrades to an empty string instead of an error.

use std::error::Error;

/// The lifecycle phase that failed inside [`crate::operation::RemoteExecutor::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPhase {
    /// The initial authenticated GET of the operation page.
    Fetch,
    /// The operation's `analyze_response` hook.
    Analyze,
}

impl std::fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationPhase::Fetch => f.write_str("fetch"),
            OperationPhase::Analyze => f.write_str("analyze"),
        }
    }
}

/// Unified error type for all spo-ops library operations.
///
/// Each variant corresponds to a distinct failure boundary. The `#[source]`
/// attribute on inner errors enables `Error::source()` chaining so callers
/// and logging frameworks can traverse the full cause chain.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// A transport-level failure: DNS, TLS, connection refused, request
    /// timeout, redirect cap exceeded, response-header cap exceeded, or a
    /// non-success HTTP status.
    ///
    /// When a response was received, `message` includes the status code and
    /// the response body so the remote service's diagnostic text is not
    /// lost.
    #[error("network error: {message}")]
    Network {
        /// Human-readable description including status and body when available.
        message: String,
        /// The underlying transport error, if any.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },

    /// The administrative digest endpoint returned a body without the
    /// expected `<GetUpdatedFormDigestResult>` markers, or with a start tag
    /// that has no matching end tag after it.
    #[error("form digest missing from digest endpoint response")]
    DigestMissing,

    /// A POST operation failed — transport, status, or digest acquisition.
    /// Wraps the underlying cause.
    #[error("POST operation failed")]
    PostFailed(#[source] Box<OperationError>),

    /// The credential exchange for federated authentication was refused by
    /// the identity provider, or an NTLM challenge could not be answered.
    #[error("authentication rejected: {message}")]
    AuthenticationRejected {
        /// Description of the rejection, including the provider's status
        /// and response body when available. Never contains credentials.
        message: String,
        /// The underlying transport or parse error, if any.
        #[source]
        source: Option<Box<dyn Error + Send + Sync>>,
    },

    /// Top-level wrapper produced by `execute()`, identifying which phase
    /// of the operation lifecycle failed.
    #[error("operation {phase} phase failed")]
    Operation {
        /// The lifecycle phase that failed.
        phase: OperationPhase,
        /// The underlying failure.
        #[source]
        source: Box<OperationError>,
    },

    /// The target or endpoint URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON deserialization of a report payload failed.
    #[error("failed to parse report JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// CSV deserialization of a report payload failed.
    #[error("failed to parse report CSV: {0}")]
    Report(#[from] csv::Error),
}

impl OperationError {
    /// Builds a `Network` error from a plain message with no inner cause.
    pub(crate) fn network(message: impl Into<String>) -> Self {
        OperationError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a lower-level failure with the lifecycle phase it occurred in.
    pub(crate) fn in_phase(phase: OperationPhase, source: OperationError) -> Self {
        OperationError::Operation {
            phase,
            source: Box::new(source),
        }
    }
}

impl From<reqwest::Error> for OperationError {
    fn from(err: reqwest::Error) -> Self {
        OperationError::Network {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_displays_message() {
        let err = OperationError::network("GET https://x returned 503: throttled");
        let msg = err.to_string();
        assert!(msg.contains("network error"), "got: {msg}");
        assert!(msg.contains("503"), "status must survive in display: {msg}");
        assert!(msg.contains("throttled"), "body must survive: {msg}");
    }

    #[test]
    fn post_failed_chains_to_cause() {
        let cause = OperationError::network("connection refused");
        let err = OperationError::PostFailed(Box::new(cause));
        assert!(err.to_string().contains("POST operation failed"));
        let source = err.source().expect("PostFailed must chain its cause");
        assert!(source.to_string().contains("connection refused"));
    }

    #[test]
    fn operation_wrapper_names_the_phase() {
        let err = OperationError::in_phase(
            OperationPhase::Fetch,
            OperationError::network("dns failure"),
        );
        assert!(err.to_string().contains("fetch"));
        assert!(err.source().is_some(), "phase wrapper must preserve cause");

        let err = OperationError::in_phase(
            OperationPhase::Analyze,
            OperationError::network("bad markup"),
        );
        assert!(err.to_string().contains("analyze"));
    }

    #[test]
    fn authentication_rejected_preserves_provider_body() {
        let err = OperationError::AuthenticationRejected {
            message: "identity provider returned 400: invalid_grant".to_string(),
            source: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("authentication rejected"));
        assert!(msg.contains("invalid_grant"));
    }

    #[test]
    fn digest_missing_has_a_stable_message() {
        let err = OperationError::DigestMissing;
        assert!(err.to_string().contains("form digest missing"));
    }

    #[test]
    fn error_is_send_and_sync() {
        // Required for use across async task boundaries.
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OperationError>();
    }
}
