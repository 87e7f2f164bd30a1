//! Authentication error types.
//!
//! Every rejection produced by the dispatcher carries a stable numeric code,
//! a machine-readable name and a human-readable reason.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Authentication error codes (4001-4013, 4012 unassigned).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AuthErrorCode {
    /// 4001: No Authorization header
    MissingAuth = 4001,
    /// 4002: Authorization header format error
    InvalidFormat = 4002,
    /// 4003: Access key not found
    UnknownAccessKey = 4003,
    /// 4004: Account exists but is not active
    AccountSuspended = 4004,
    /// 4005: X-Date outside the tolerance window
    TimestampExpired = 4005,
    /// 4006: X-Date is not RFC3339
    InvalidTimestamp = 4006,
    /// 4007: Signature verification failed
    InvalidSignature = 4007,
    /// 4008: Signature already presented inside the window
    SignatureReplayed = 4008,
    /// 4009: Legacy stub payload could not be parsed
    InvalidLegacyToken = 4009,
    /// 4010: External id could not be mapped to a tenant
    UidMappingFailed = 4010,
    /// 4011: No authentication branch matched the request
    UnsupportedMethod = 4011,
    /// 4013: Internal server error
    InternalError = 4013,
}

impl AuthErrorCode {
    /// Get error code as i32.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Get error name string.
    pub fn name(self) -> &'static str {
        match self {
            Self::MissingAuth => "MISSING_AUTH",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::UnknownAccessKey => "UNKNOWN_ACCESS_KEY",
            Self::AccountSuspended => "ACCOUNT_SUSPENDED",
            Self::TimestampExpired => "TIMESTAMP_EXPIRED",
            Self::InvalidTimestamp => "INVALID_TIMESTAMP",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::SignatureReplayed => "SIGNATURE_REPLAYED",
            Self::InvalidLegacyToken => "INVALID_LEGACY_TOKEN",
            Self::UidMappingFailed => "UID_MAPPING_FAILED",
            Self::UnsupportedMethod => "UNSUPPORTED_AUTH_METHOD",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code.
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Authentication error with message.
#[derive(Error, Debug, Clone)]
#[error("{}: {message}", .code.name())]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
}

impl AuthError {
    /// Create a new auth error.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create error with default message.
    pub fn from_code(code: AuthErrorCode) -> Self {
        let message = match code {
            AuthErrorCode::MissingAuth => "missing Authorization header",
            AuthErrorCode::InvalidFormat => "invalid Authorization header format",
            AuthErrorCode::UnknownAccessKey => "invalid access key",
            AuthErrorCode::AccountSuspended => "account is not active",
            AuthErrorCode::TimestampExpired => "request timestamp expired",
            AuthErrorCode::InvalidTimestamp => "invalid timestamp format",
            AuthErrorCode::InvalidSignature => "invalid signature",
            AuthErrorCode::SignatureReplayed => "signature already used",
            AuthErrorCode::InvalidLegacyToken => "invalid legacy token",
            AuthErrorCode::UidMappingFailed => "failed to map external uid",
            AuthErrorCode::UnsupportedMethod => "unsupported authentication method",
            AuthErrorCode::InternalError => "internal server error",
        };
        Self::new(code, message)
    }
}

/// JSON response body for auth errors.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub code: i32,
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = AuthErrorResponse {
            code: self.code.code(),
            error: self.code.name(),
            message: self.message,
        };
        (self.code.http_status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AuthErrorCode::MissingAuth.code(), 4001);
        assert_eq!(AuthErrorCode::InternalError.code(), 4013);
    }

    #[test]
    fn test_error_names() {
        assert_eq!(AuthErrorCode::InvalidFormat.name(), "INVALID_FORMAT");
        assert_eq!(
            AuthErrorCode::UnsupportedMethod.name(),
            "UNSUPPORTED_AUTH_METHOD"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(
            AuthErrorCode::InvalidSignature.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthErrorCode::AccountSuspended.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthErrorCode::InternalError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_display() {
        let err = AuthError::new(AuthErrorCode::TimestampExpired, "too old");
        assert_eq!(err.to_string(), "TIMESTAMP_EXPIRED: too old");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_error_from_code() {
        let err = AuthError::from_code(AuthErrorCode::UnsupportedMethod);
        assert_eq!(err.code, AuthErrorCode::UnsupportedMethod);
        assert_eq!(err.message, "unsupported authentication method");
    }

    #[test]
    fn test_into_response_status() {
        let resp = AuthError::from_code(AuthErrorCode::InternalError).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
