//! Centralized error types for the Roonlink core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::host::HostError;
use crate::transport::TransportError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(e) if e.is_timeout() => "transport_timeout",
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_, _) => "http_error_status",
            Self::Parse(_) => "transport_parse_error",
            Self::Unavailable(_) => "transport_unavailable",
        }
    }
}

impl ErrorCode for HostError {
    fn code(&self) -> &'static str {
        match self {
            Self::EntityNotFound(_) => "entity_not_found",
            Self::UnknownService(_, _) => "unknown_service",
            Self::InvalidServiceData(_) => "invalid_service_data",
            Self::InvalidOption { .. } => "invalid_option",
            Self::ServiceFailed(_) => "service_failed",
        }
    }
}

/// Application-wide error type for the Roonlink server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum RoonlinkError {
    /// Request to the Roon extension failed.
    #[error("Transport error: {message}")]
    Transport {
        code: &'static str,
        message: String,
    },

    /// Host entity or service call failed.
    #[error("Host error: {message}")]
    Host {
        code: &'static str,
        message: String,
    },

    /// No device with the given identifier.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Server configuration error (missing or inconsistent settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Filesystem error (token persistence).
    #[error("I/O error: {0}")]
    Io(String),
}

impl RoonlinkError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport { code, .. } | Self::Host { code, .. } => code,
            Self::DeviceNotFound(_) => "device_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            Self::Host { code, .. } if *code == "entity_not_found" => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) | Self::Host { .. } => StatusCode::BAD_REQUEST,
            Self::Transport { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

// Re-export Result type aliases from their defining modules
pub use crate::host::HostResult;
pub use crate::transport::TransportResult;

/// Convenient Result alias for application-wide operations.
pub type RoonlinkResult<T> = Result<T, RoonlinkError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for RoonlinkError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<TransportError> for RoonlinkError {
    fn from(err: TransportError) -> Self {
        Self::Transport {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<HostError> for RoonlinkError {
    fn from(err: HostError) -> Self {
        Self::Host {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for RoonlinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
