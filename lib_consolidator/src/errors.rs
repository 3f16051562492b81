//! # Consolidator Errors
//!
//! Every failure the engine can observe while polling a target. Errors are
//! local to the poll loop that produced them: they are fanned out once to all
//! listeners as an `error` event and never tear down other loops.

use thiserror::Error;

/// Errors surfaced by the consolidation engine and its transports.
///
/// The enum is `Clone` so a single failure can be delivered to every listener
/// without wrapping it in an `Arc`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsolidatorError {
    /// The transport could not complete the request (connection refused, DNS, timeout, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response carried a content type that is not structured (JSON-like) data.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The server answered with a non-success status code.
    #[error("HTTP request failed with status {status}: {body}")]
    HttpStatus {
        /// The numeric HTTP status code.
        status: u16,
        /// The raw response body, kept for diagnostics.
        body: String,
    },

    /// The body could not be parsed as JSON.
    #[error("Malformed response body: {0}")]
    MalformedBody(String),

    /// A response was routed for a path that has no node in the tree.
    /// Logged as a warning, never emitted as an event.
    #[error("No node registered for origin {0}")]
    UnknownOrigin(String),

    /// `register` was called with a path that is not absolute or has no segments.
    #[error("Invalid path '{0}': expected an absolute, slash-delimited path")]
    InvalidPath(String),

    /// A transport was configured with a base URL that cannot have paths joined to it.
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ConsolidatorError {
    /// Whether the poll loop that hit this error may still schedule its next fetch.
    ///
    /// Only HTTP status failures are treated as transient; transport failures,
    /// non-JSON content and unparsable bodies halt the loop for that node.
    pub fn allows_repoll(&self) -> bool {
        matches!(self, ConsolidatorError::HttpStatus { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_http_status_allows_repoll() {
        assert!(ConsolidatorError::HttpStatus { status: 503, body: String::new() }.allows_repoll());
        assert!(!ConsolidatorError::Transport("refused".into()).allows_repoll());
        assert!(!ConsolidatorError::UnsupportedContentType("text/html".into()).allows_repoll());
        assert!(!ConsolidatorError::MalformedBody("eof".into()).allows_repoll());
    }

    #[test]
    fn test_display_includes_status() {
        let err = ConsolidatorError::HttpStatus { status: 404, body: "missing".into() };
        assert_eq!(err.to_string(), "HTTP request failed with status 404: missing");
    }
}
