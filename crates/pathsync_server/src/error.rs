//! Error types for the sync server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned to callers of the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Bad credentials or missing second factor.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Disabled, expired or unowned resource, or missing capability.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing client, path or remote target.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input or unsupported selection.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The owner's storage quota is exceeded.
    #[error("insufficient storage: {0}")]
    InsufficientStorage(String),

    /// Invalid server configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Persistence failure with no recovery path.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::Unauthorized(_) => 401,
            ServerError::Forbidden(_) => 403,
            ServerError::NotFound(_) => 404,
            ServerError::BadRequest(_) => 400,
            ServerError::InsufficientStorage(_) => 507,
            ServerError::Config(_) | ServerError::Internal(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Unauthorized(_)
                | ServerError::Forbidden(_)
                | ServerError::NotFound(_)
                | ServerError::BadRequest(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

/// Result type for gateway (external collaborator) calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors reported by external collaborators.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The collaborator could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The collaborator rejected or failed the call.
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::Forbidden("disabled".into()).is_client_error());
        assert!(ServerError::Internal("db down".into()).is_server_error());
        assert!(ServerError::InsufficientStorage("quota".into()).is_server_error());
        assert!(!ServerError::BadRequest("bad".into()).is_server_error());
    }

    #[test]
    fn status_codes() {
        assert_eq!(ServerError::Unauthorized(String::new()).status_code(), 401);
        assert_eq!(ServerError::Forbidden(String::new()).status_code(), 403);
        assert_eq!(ServerError::NotFound(String::new()).status_code(), 404);
        assert_eq!(ServerError::BadRequest(String::new()).status_code(), 400);
        assert_eq!(ServerError::InsufficientStorage(String::new()).status_code(), 507);
        assert_eq!(ServerError::Internal(String::new()).status_code(), 500);
    }

    #[test]
    fn gateway_error_display() {
        let err = GatewayError::backend("unique constraint");
        assert_eq!(err.to_string(), "backend error: unique constraint");
    }
}
