//! Error types for Doctrack
//!
//! Every failure the engine can report maps onto one of these variants, and
//! each variant maps onto exactly one HTTP status.

use hyper::StatusCode;

/// Main error type for Doctrack operations
#[derive(Debug, thiserror::Error)]
pub enum DoctrackError {
    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("Not authorized: {0}")]
    AuthorizationDenied(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The document changed since the caller read it
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DoctrackError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired(_) => StatusCode::UNAUTHORIZED,
            Self::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for response bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired(_) => "AUTHENTICATION_REQUIRED",
            Self::AuthorizationDenied(_) => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Database(_) => "DB_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "SERVER_ERROR",
        }
    }

    /// Message safe to show to a client. Storage and internal faults are
    /// reported generically; the detail goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) | Self::Config(_) => "Server Error".to_string(),
            other => other.to_string(),
        }
    }

    /// True for failures caused by the storage layer or the process itself
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<std::io::Error> for DoctrackError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for DoctrackError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for DoctrackError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for DoctrackError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for DoctrackError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON serialization error: {}", err))
    }
}

impl From<bson::oid::Error> for DoctrackError {
    fn from(_: bson::oid::Error) -> Self {
        Self::NotFound("Invalid id".into())
    }
}

impl From<jsonwebtoken::errors::Error> for DoctrackError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::AuthenticationRequired(format!("JWT error: {}", err))
    }
}

/// Result type alias for Doctrack operations
pub type Result<T> = std::result::Result<T, DoctrackError>;
