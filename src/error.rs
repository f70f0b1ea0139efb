//! Error types for the RPC gateway

use std::io;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::service::ServiceKind;

/// Result type alias for the RPC gateway
pub type Result<T> = std::result::Result<T, Error>;

/// RPC gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two configured clients canonicalise to the same identity
    #[error("Duplicate client identity: {0}")]
    DuplicateClient(String),

    /// A service slot was bound twice during startup
    #[error("Service already registered: {0}")]
    ServiceAlreadyRegistered(ServiceKind),

    /// A service slot was used before anything was bound to it
    #[error("Service not registered: {0}")]
    ServiceUnbound(ServiceKind),

    /// The caller's scopes do not cover the requested method
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed request
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller-supplied deadline expired before the call completed
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Error reported by a payment backend, message passed through verbatim
    #[error("Payment provider {provider} error: {message}")]
    Provider {
        /// Provider identifier (`stripe`, `sandbox`, ...)
        provider: String,
        /// Backend message, unmodified
        message: String,
    },

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Convert to a canonical RPC status code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::PermissionDenied(_) => rpc_codes::PERMISSION_DENIED,
            Self::InvalidArgument(_) => rpc_codes::INVALID_ARGUMENT,
            Self::NotFound(_) | Self::ServiceUnbound(_) => rpc_codes::NOT_FOUND,
            Self::DeadlineExceeded(_) => rpc_codes::DEADLINE_EXCEEDED,
            Self::Provider { .. } | Self::Transport(_) | Self::Http(_) => rpc_codes::UNAVAILABLE,
            Self::ServiceAlreadyRegistered(_) | Self::DuplicateClient(_) => {
                rpc_codes::ALREADY_EXISTS
            }
            _ => rpc_codes::INTERNAL,
        }
    }

    /// HTTP status used when the error crosses the transport boundary
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self.to_rpc_code() {
            rpc_codes::PERMISSION_DENIED => StatusCode::FORBIDDEN,
            rpc_codes::INVALID_ARGUMENT => StatusCode::BAD_REQUEST,
            rpc_codes::NOT_FOUND => StatusCode::NOT_FOUND,
            rpc_codes::DEADLINE_EXCEEDED => StatusCode::GATEWAY_TIMEOUT,
            rpc_codes::UNAVAILABLE => StatusCode::BAD_GATEWAY,
            rpc_codes::ALREADY_EXISTS => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Symbolic status name (`PERMISSION_DENIED`, ...)
    #[must_use]
    pub fn status_name(&self) -> &'static str {
        rpc_codes::name(self.to_rpc_code())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.to_rpc_code(),
            "status": self.status_name(),
            "message": self.to_string(),
        });
        (self.http_status(), Json(body)).into_response()
    }
}

/// Canonical RPC status codes
pub mod rpc_codes {
    /// Not an error
    pub const OK: i32 = 0;
    /// Client specified an invalid argument
    pub const INVALID_ARGUMENT: i32 = 3;
    /// Deadline expired before the operation could complete
    pub const DEADLINE_EXCEEDED: i32 = 4;
    /// Requested entity (or service) was not found
    pub const NOT_FOUND: i32 = 5;
    /// Entity already exists
    pub const ALREADY_EXISTS: i32 = 6;
    /// Caller lacks permission for the operation
    pub const PERMISSION_DENIED: i32 = 7;
    /// Internal error
    pub const INTERNAL: i32 = 13;
    /// Downstream service unavailable
    pub const UNAVAILABLE: i32 = 14;

    /// Symbolic name of a code
    #[must_use]
    pub fn name(code: i32) -> &'static str {
        match code {
            OK => "OK",
            INVALID_ARGUMENT => "INVALID_ARGUMENT",
            DEADLINE_EXCEEDED => "DEADLINE_EXCEEDED",
            NOT_FOUND => "NOT_FOUND",
            ALREADY_EXISTS => "ALREADY_EXISTS",
            PERMISSION_DENIED => "PERMISSION_DENIED",
            UNAVAILABLE => "UNAVAILABLE",
            _ => "INTERNAL",
        }
    }
}
