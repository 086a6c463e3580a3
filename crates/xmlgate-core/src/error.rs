//! Error types for xmlgate.
//!
//! This module provides the [`AdapterError`] type, the structured error that
//! pipeline stages and resource engines raise. Each error carries a kind, an
//! HTTP status, a machine-readable code and a message; the error stage turns
//! it into an [`ErrorEnvelope`].
//!
//! Two rejections are deliberately *not* modelled as raised errors because
//! they must bypass the error stage: the `Malformed document` response for an
//! empty PUT/PATCH body and the `Invalid XML format.` response of the
//! transcoder. Their bodies are built by [`malformed_document_body`] and
//! [`invalid_xml_body`].

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`AdapterError`].
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Categories of adapter errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A mutating request declared a content type the adapter does not accept.
    InvalidContentType,
    /// The request body could not be turned into a document.
    MalformedDocument,
    /// The request body exceeded the configured limit.
    PayloadTooLarge,
    /// The addressed entity, key or operation does not exist.
    NotFound,
    /// The HTTP method has no dispatch target.
    MethodNotAllowed,
    /// The resource engine rejected the request.
    Engine,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorKind {
    /// Returns the default HTTP status code for this kind.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::InvalidContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::MalformedDocument => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Engine | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured error raised inside the adapter pipeline.
///
/// # Example
///
/// ```
/// use xmlgate_core::{AdapterError, ErrorKind};
/// use http::StatusCode;
///
/// let err = AdapterError::invalid_content_type("application/xml");
/// assert_eq!(err.kind(), ErrorKind::InvalidContentType);
/// assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
/// assert_eq!(err.code(), "415");
/// assert_eq!(err.to_string(), "INVALID_CONTENT_TYPE_ONLY_XML");
/// ```
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Content-type header present but not the expected media type.
    #[error("{message}")]
    InvalidContentType {
        /// The media type the rejecting guard expected.
        expected: String,
        /// Human-readable error message.
        message: String,
    },

    /// Request body is structurally unusable.
    #[error("{message}")]
    MalformedDocument {
        /// Human-readable error message.
        message: String,
    },

    /// Request body larger than the configured limit.
    #[error("Request body exceeds the limit of {limit} bytes")]
    PayloadTooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },

    /// Entity, key, navigation or operation not found.
    #[error("{message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// No dispatch target for the HTTP method.
    #[error("Method {method} is not allowed")]
    MethodNotAllowed {
        /// The rejected method.
        method: String,
    },

    /// Error raised by the resource engine, carrying its own status and code.
    #[error("{message}")]
    Engine {
        /// HTTP status chosen by the engine.
        status: StatusCode,
        /// Engine-specific error code.
        code: String,
        /// Human-readable error message.
        message: String,
        /// Optional element the error refers to.
        target: Option<String>,
    },

    /// Internal error.
    #[error("{message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl AdapterError {
    /// Creates a content-type error for a guard expecting `expected`.
    ///
    /// The message follows the `INVALID_CONTENT_TYPE_ONLY_<SUBTYPE>` pattern.
    #[must_use]
    pub fn invalid_content_type(expected: impl Into<String>) -> Self {
        let expected = expected.into();
        let subtype = expected
            .rsplit('/')
            .next()
            .unwrap_or(expected.as_str())
            .to_ascii_uppercase();
        Self::InvalidContentType {
            message: format!("INVALID_CONTENT_TYPE_ONLY_{subtype}"),
            expected,
        }
    }

    /// Creates a malformed document error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
        }
    }

    /// Creates a payload-too-large error.
    #[must_use]
    pub const fn payload_too_large(limit: usize) -> Self {
        Self::PayloadTooLarge { limit }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a method-not-allowed error.
    #[must_use]
    pub fn method_not_allowed(method: impl Into<String>) -> Self {
        Self::MethodNotAllowed {
            method: method.into(),
        }
    }

    /// Creates an engine error with an explicit status and code.
    #[must_use]
    pub fn engine(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            status,
            code: code.into(),
            message: message.into(),
            target: None,
        }
    }

    /// Attaches a target element to an engine error; no-op for other kinds.
    #[must_use]
    pub fn with_target(mut self, element: impl Into<String>) -> Self {
        if let Self::Engine { target, .. } = &mut self {
            *target = Some(element.into());
        }
        self
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidContentType { .. } => ErrorKind::InvalidContentType,
            Self::MalformedDocument { .. } => ErrorKind::MalformedDocument,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::MethodNotAllowed { .. } => ErrorKind::MethodNotAllowed,
            Self::Engine { .. } => ErrorKind::Engine,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Engine { status, .. } => *status,
            _ => self.kind().default_status_code(),
        }
    }

    /// Returns the machine-readable error code.
    ///
    /// Adapter-raised errors use the numeric status as their code; engine
    /// errors keep the code the engine supplied.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Engine { code, .. } => code.clone(),
            _ => self.status_code().as_u16().to_string(),
        }
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        let target = match self {
            Self::Engine { target, .. } => target.clone(),
            _ => None,
        };
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                status_code: self.status_code().as_u16(),
                target,
            },
            request_id: request_id.map(ToString::to_string),
        }
    }
}

/// Serializable error envelope rendered by the error stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// HTTP status code.
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Element the error refers to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Body of the direct `400` response for an empty PUT/PATCH body.
#[must_use]
pub fn malformed_document_body() -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": "Malformed document",
            "statusCode": 400,
            "code": "400"
        }
    })
}

/// Body of the direct `400` response for an unparsable XML body.
#[must_use]
pub fn invalid_xml_body() -> serde_json::Value {
    serde_json::json!({ "error": "Invalid XML format." })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_content_type_messages() {
        let xml = AdapterError::invalid_content_type("application/xml");
        assert_eq!(xml.to_string(), "INVALID_CONTENT_TYPE_ONLY_XML");
        assert_eq!(xml.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let json = AdapterError::invalid_content_type("application/json");
        assert_eq!(json.to_string(), "INVALID_CONTENT_TYPE_ONLY_JSON");
        assert_eq!(json.code(), "415");
    }

    #[test]
    fn test_engine_error_keeps_status_and_code() {
        let err = AdapterError::engine(StatusCode::CONFLICT, "ENTITY_ALREADY_EXISTS", "Entity exists")
            .with_target("ID");
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "ENTITY_ALREADY_EXISTS");

        let envelope = err.to_envelope(Some("req-1"));
        assert_eq!(envelope.error.target.as_deref(), Some("ID"));
        assert_eq!(envelope.error.status_code, 409);
        assert_eq!(envelope.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_with_target_ignored_for_other_kinds() {
        let err = AdapterError::not_found("Books not found").with_target("ID");
        assert!(err.to_envelope(None).error.target.is_none());
    }

    #[test]
    fn test_envelope_serialization() {
        let err = AdapterError::not_found("Entity \"Movies\" not found");
        let json = serde_json::to_value(err.to_envelope(None)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "error": {
                    "code": "404",
                    "message": "Entity \"Movies\" not found",
                    "statusCode": 404
                }
            })
        );
    }

    #[test]
    fn test_internal_error_with_source() {
        let err = AdapterError::internal_with_source(
            "storage failed",
            std::io::Error::new(std::io::ErrorKind::Other, "disk"),
        );
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_direct_response_bodies() {
        assert_eq!(
            malformed_document_body().to_string(),
            r#"{"error":{"message":"Malformed document","statusCode":400,"code":"400"}}"#
        );
        assert_eq!(invalid_xml_body().to_string(), r#"{"error":"Invalid XML format."}"#);
    }
}
