//! # Error Handling
//!
//! Every fallible operation in the registry core returns [`AppResult`]. The
//! ingestion and serialization failures are all non-retryable: they are
//! surfaced synchronously to the request-handling layer, which turns them
//! into a protocol error response via [`AppError::to_error_response`].
//!
//! ## Error Classifications
//!
//! - **Validation Errors** (400): rejected uploads (no manifest, several
//!   manifests, missing metadata or identity, invalid id/version)
//! - **Not Found** (404): unknown package or version
//! - **Upload Errors** (413): upload exceeds the configured size limit
//! - **Auth Errors** (401): missing or unknown API key
//! - **Internal Errors** (500): I/O failures and programming errors such as
//!   an unserializable response field
//!
//! ```rust
//! use nuget_server::error::{AppError, ErrorCode};
//!
//! let err = AppError::ManifestNotFound;
//! assert_eq!(err.error_code(), ErrorCode::ValidationError);
//! assert_eq!(err.error_code().http_status(), 400);
//! ```

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::error::Error as _;

use crate::validation::ValidationError;

/// Standardized error body handed to the request-handling layer
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,          // Human-readable error message
    pub code: String,           // Machine-readable error code
    pub details: Option<Value>, // Additional error details
    pub timestamp: String,      // ISO 8601 timestamp
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    UploadError,
    InternalError,
    AuthError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::UploadError => "upload_error",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::AuthError => "auth_error",
        }
    }

    /// HTTP status the surrounding transport should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::UploadError => 413,
            ErrorCode::InternalError => 500,
            ErrorCode::AuthError => 401,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("api_error: manifest file not found in package")]
    ManifestNotFound,

    #[error("api_error: multiple manifest files found in package ({count})")]
    AmbiguousManifest { count: usize },

    #[error("Unable to find the metadata element in the manifest")]
    MetadataMissing,

    #[error("api_error: {field} missing from manifest")]
    IdentityMissing { field: &'static str },

    #[error("I/O error while {action}: {source}")]
    IngestIo {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Field '{field}' has no JSON representation")]
    UnserializableField { field: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid package archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid manifest XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UploadError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap an I/O failure that happened during ingestion with what was being done.
    pub fn ingest_io(action: impl Into<String>, source: std::io::Error) -> Self {
        AppError::IngestIo {
            action: action.into(),
            source,
        }
    }

    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::ManifestNotFound
            | AppError::AmbiguousManifest { .. }
            | AppError::MetadataMissing
            | AppError::IdentityMissing { .. }
            | AppError::Zip(_)
            | AppError::Xml(_)
            | AppError::Validation(_)
            | AppError::BadRequest(_) => ErrorCode::ValidationError,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::UploadError(_) => ErrorCode::UploadError,
            AppError::Unauthorized(_) => ErrorCode::AuthError,
            AppError::IngestIo { .. }
            | AppError::UnserializableField { .. }
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Get additional error details if available
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::AmbiguousManifest { count } => Some(json!({ "manifests": count })),
            AppError::IdentityMissing { field } => Some(json!({ "field": field })),
            AppError::IngestIo { source, .. } => Some(json!({ "source": source.to_string() })),
            _ => self
                .source()
                .map(|source| json!({ "source": source.to_string() })),
        }
    }

    /// Create a standardized error response
    pub fn to_error_response(&self) -> ApiErrorResponse {
        let code = self.error_code();
        ApiErrorResponse {
            error: self.to_string(),
            code: code.as_str().to_string(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Convenient result type for registry operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_rejections_are_validation_errors() {
        for err in [
            AppError::ManifestNotFound,
            AppError::AmbiguousManifest { count: 2 },
            AppError::MetadataMissing,
            AppError::IdentityMissing { field: "id" },
        ] {
            assert_eq!(err.error_code(), ErrorCode::ValidationError);
            assert_eq!(err.error_code().http_status(), 400);
        }
    }

    #[test]
    fn test_programming_errors_are_internal() {
        let err = AppError::UnserializableField {
            field: "score".to_string(),
        };
        assert_eq!(err.error_code(), ErrorCode::InternalError);

        let err = AppError::ingest_io(
            "copying archive",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert_eq!(err.error_code().as_str(), "internal_error");
        assert!(err.to_string().contains("copying archive"));
    }

    #[test]
    fn test_error_response_shape() {
        let response = AppError::AmbiguousManifest { count: 3 }.to_error_response();
        assert_eq!(response.code, "validation_error");
        assert_eq!(response.details, Some(json!({ "manifests": 3 })));
        assert!(response.error.contains("multiple manifest files"));

        let body = serde_json::to_value(&response).expect("response should serialize");
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn test_unauthorized_maps_to_auth_error() {
        let err = AppError::Unauthorized("Invalid API key".to_string());
        assert_eq!(err.error_code().http_status(), 401);
        assert_eq!(err.to_string(), "Unauthorized: Invalid API key");
    }
}
