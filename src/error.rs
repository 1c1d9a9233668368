//! Error codes and the request-path error record.
//!
//! Every failure an HTTP caller can observe is expressed as an [`RpcError`]
//! carrying an [`ErrorCode`]. The code fixes the HTTP status and the `code`
//! field of the wire body; procedures raise the same type, so a procedure
//! failure and an adapter failure serialize identically.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Canonical error codes with their fixed HTTP status mapping.
///
/// The adapter itself only emits `NOT_FOUND`, `UNSUPPORTED_MEDIA_TYPE`,
/// `BAD_REQUEST`, `PAYLOAD_TOO_LARGE` and `INTERNAL_SERVER_ERROR`; the
/// remaining codes are available for procedures to raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotSupported,
    Timeout,
    Conflict,
    PreconditionFailed,
    PayloadTooLarge,
    UnsupportedMediaType,
    UnprocessableContent,
    TooManyRequests,
    ClientClosedRequest,
    InternalServerError,
    NotImplemented,
}

impl ErrorCode {
    /// Wire representation of the code (the `code` field of error bodies).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            ErrorCode::UnprocessableContent => "UNPROCESSABLE_CONTENT",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorCode::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
        }
    }

    /// HTTP status for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ParseError => 400,
            ErrorCode::BadRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::MethodNotSupported => 405,
            ErrorCode::Timeout => 408,
            ErrorCode::Conflict => 409,
            ErrorCode::PreconditionFailed => 412,
            ErrorCode::PayloadTooLarge => 413,
            ErrorCode::UnsupportedMediaType => 415,
            ErrorCode::UnprocessableContent => 422,
            ErrorCode::TooManyRequests => 429,
            ErrorCode::ClientClosedRequest => 499,
            ErrorCode::InternalServerError => 500,
            ErrorCode::NotImplemented => 501,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One schema violation, shaped the way schema libraries report them:
/// a machine code, the path of the offending leaf, a human message, and
/// for type mismatches the expected/received type names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub code: String,
    pub path: Vec<Value>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
}

/// Error record for a failed request.
///
/// `cause` is diagnostic detail for logs; it never reaches the wire.
#[derive(Debug, Clone)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    pub issues: Vec<ValidationIssue>,
    pub cause: Option<String>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
            issues: Vec::new(),
            cause: None,
        }
    }

    pub fn with_issues(mut self, issues: Vec<ValidationIssue>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn not_found() -> Self {
        RpcError::new(ErrorCode::NotFound, "Not found")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        RpcError::new(ErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RpcError::new(ErrorCode::InternalServerError, message)
    }

    pub fn unsupported_media_type(raw: &str) -> Self {
        RpcError::new(
            ErrorCode::UnsupportedMediaType,
            format!("Unsupported content-type \"{raw}\""),
        )
    }

    /// Message equals the code string for this failure class.
    pub fn payload_too_large() -> Self {
        RpcError::new(ErrorCode::PayloadTooLarge, ErrorCode::PayloadTooLarge.as_str())
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}
