//! services/api/src/error.rs
//!
//! Defines the primary error type for the API service and the mapping from
//! core port errors to HTTP responses.

use crate::config::ConfigError;
use axum::http::StatusCode;
use sop_compliance_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The error half of every handler result.
pub type HandlerError = (StatusCode, String);

/// Maps a port error to the status and message shown to the client.
/// Upstream failures keep their message so the client can display it verbatim.
pub fn port_error_response(e: PortError) -> HandlerError {
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Validation(_) => StatusCode::BAD_REQUEST,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        PortError::Unauthorized => StatusCode::FORBIDDEN,
        PortError::Unexpected(_) => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}
