//! Error types for the Launchpad engine

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use openapi_server::models::ErrorResponse;
use thiserror::Error;

/// Main error type for the Launchpad engine
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Dispatch failed: {0}")]
    DispatchFailure(String),

    #[error("Transient IO error: {0}")]
    TransientIo(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Whether the stream should redeliver the work that produced this error
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::TransientIo(_) | PlatformError::IoError(_) => true,
            PlatformError::HttpError(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
            PlatformError::InvalidState(_) | PlatformError::Conflict(_) => StatusCode::CONFLICT,
            PlatformError::ValidationError(_) | PlatformError::JsonError(_) => {
                StatusCode::BAD_REQUEST
            }
            PlatformError::TransientIo(_) => StatusCode::SERVICE_UNAVAILABLE,
            PlatformError::DispatchFailure(_)
            | PlatformError::IoError(_)
            | PlatformError::HttpError(_)
            | PlatformError::StorageError(_)
            | PlatformError::ServerError(_)
            | PlatformError::ShutdownError(_)
            | PlatformError::ConfigError(_)
            | PlatformError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for PlatformError {
    fn from(err: anyhow::Error) -> Self {
        PlatformError::Internal(err.to_string())
    }
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            PlatformError::NotFound(_)
            | PlatformError::InvalidState(_)
            | PlatformError::Conflict(_)
            | PlatformError::ValidationError(_)
            | PlatformError::DispatchFailure(_)
            | PlatformError::JsonError(_) => self.to_string(),
            PlatformError::TransientIo(_) => "Service temporarily unavailable".to_string(),
            _ => "Internal server error".to_string(),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

/// Errors of the routing proxy, rendered as plain-text proxy responses
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Slug lookup failed: {0}")]
    Lookup(String),

    #[error("Artifact store unreachable: {0}")]
    Upstream(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoutingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RoutingError::NotFound(_) => StatusCode::NOT_FOUND,
            RoutingError::Lookup(_) | RoutingError::Upstream(_) => StatusCode::BAD_GATEWAY,
            RoutingError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RoutingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RoutingError {
    fn into_response(self) -> Response {
        let message = match &self {
            RoutingError::NotFound(_) => "No deployment found",
            RoutingError::Lookup(_) => "Failed to resolve deployment",
            RoutingError::Upstream(_) => "Failed to reach deployment artifacts",
            RoutingError::BadRequest(_) => "Invalid host",
            RoutingError::Internal(_) => "Internal server error",
        };
        (self.status_code(), message).into_response()
    }
}
