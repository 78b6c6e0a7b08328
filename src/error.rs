//! Error types for the smart-extract library.
//!
//! Every variant of [`ExtractError`] is **fatal** for the invocation that
//! produced it: the pipeline stops and the caller decides whether to retry,
//! skip the document, or abort a batch. The pipeline itself never retries.
//!
//! Two conditions are deliberately *not* errors:
//!
//! * A malformed extraction response degrades to
//!   [`crate::pipeline::extract::ParsedResponse::Fallback`] (raw body as
//!   content, empty metadata).
//! * A temporary file that cannot be removed is logged and ignored.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the smart-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input cannot be used as a document source.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Local I/O errors ──────────────────────────────────────────────────
    /// Copying a forward-only stream into temporary storage failed.
    #[error("Failed to buffer the input stream to temporary storage: {source}")]
    Materialize {
        #[source]
        source: std::io::Error,
    },

    /// Reading or seeking a seekable source failed.
    #[error("I/O error while {stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    // ── Rendering service ─────────────────────────────────────────────────
    /// The rendering service could not be reached or the transfer broke off.
    #[error("Rendering request to '{endpoint}' failed: {source}")]
    RenderRequest {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The rendering service answered with a non-success status.
    #[error("FO conversion failed with status {status}. Details: {body}")]
    ConversionFailed { status: StatusCode, body: String },

    // ── Extraction service ────────────────────────────────────────────────
    /// The extraction service could not be reached or the transfer broke off.
    #[error("Extraction request to '{endpoint}' failed: {source}")]
    ExtractionRequest {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The extraction service answered with a non-success status.
    #[error("Extraction service '{endpoint}' returned status {status}. Details: {body}")]
    ExtractionFailed {
        endpoint: String,
        status: StatusCode,
        body: String,
    },

    // ── Control flow ──────────────────────────────────────────────────────
    /// The caller raised the cancellation signal.
    #[error("Extraction cancelled")]
    Cancelled,

    // ── Config / output errors ────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// True when the failure originated at one of the remote services.
    ///
    /// Batch callers use this to separate "service trouble, try again later"
    /// from "this document is bad".
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ExtractError::RenderRequest { .. }
                | ExtractError::ConversionFailed { .. }
                | ExtractError::ExtractionRequest { .. }
                | ExtractError::ExtractionFailed { .. }
        )
    }

    /// HTTP status reported by a remote service, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ExtractError::ConversionFailed { status, .. }
            | ExtractError::ExtractionFailed { status, .. } => Some(*status),
            ExtractError::RenderRequest { source, .. }
            | ExtractError::ExtractionRequest { source, .. } => source.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_failed_display_carries_status_and_body() {
        let e = ExtractError::ConversionFailed {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: r#"{"error":"FOP conversion failed","returncode":1}"#.into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("500"), "got: {msg}");
        assert!(msg.contains("FOP conversion failed"), "got: {msg}");
    }

    #[test]
    fn extraction_failed_display_names_endpoint() {
        let e = ExtractError::ExtractionFailed {
            endpoint: "http://tika:9998/rmeta/text".into(),
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: String::new(),
        };
        let msg = e.to_string();
        assert!(msg.contains("http://tika:9998/rmeta/text"), "got: {msg}");
        assert!(msg.contains("422"), "got: {msg}");
    }

    #[test]
    fn remote_classification() {
        let remote = ExtractError::ConversionFailed {
            status: StatusCode::BAD_GATEWAY,
            body: "down".into(),
        };
        assert!(remote.is_remote());
        assert_eq!(remote.status(), Some(StatusCode::BAD_GATEWAY));

        let local = ExtractError::Materialize {
            source: std::io::Error::other("disk full"),
        };
        assert!(!local.is_remote());
        assert_eq!(local.status(), None);
        assert!(!ExtractError::Cancelled.is_remote());
    }
}
