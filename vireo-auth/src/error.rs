//! Error types for authorization operations
//!
//! This module defines the errors returned to callers that gate requests on
//! a permission or role, and the errors surfaced by the user store.

use thiserror::Error;
use uuid::Uuid;
use vireo_permissions::ConfigError;

/// Authorization error types.
///
/// Permission checks themselves never fail; these errors exist so that
/// middleware can turn a denial into a response.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No authenticated user
    #[error("Authentication required")]
    Unauthenticated,

    /// User lacks a permission
    #[error("Forbidden: missing permission {permission}")]
    PermissionDenied {
        /// Permission that was checked
        permission: String,
    },

    /// User's role is below the required level
    #[error("Forbidden: requires role {required}")]
    InsufficientRole {
        /// Role that was required
        required: String,
    },

    /// User does not exist
    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    /// Account is disabled
    #[error("Account is disabled")]
    AccountDisabled,

    /// Role is not part of the hierarchy
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// Permission name is malformed
    #[error("Invalid permission: {0}")]
    InvalidPermission(String),

    /// User store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authorization operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        AuthError::ConfigError(err.to_string())
    }
}

impl AuthError {
    /// Check if this error should be logged at error level.
    ///
    /// Denials are expected and should not be logged as errors.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            AuthError::Store(_) | AuthError::ConfigError(_) | AuthError::Internal(_)
        )
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::Unauthenticated => 401,

            AuthError::PermissionDenied { .. }
            | AuthError::InsufficientRole { .. }
            | AuthError::AccountDisabled => 403,

            AuthError::UserNotFound(_) => 404,

            AuthError::UnknownRole(_) | AuthError::InvalidPermission(_) => 400,

            AuthError::Store(_) | AuthError::ConfigError(_) | AuthError::Internal(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "UNAUTHENTICATED",
            AuthError::PermissionDenied { .. } => "PERMISSION_DENIED",
            AuthError::InsufficientRole { .. } => "INSUFFICIENT_ROLE",
            AuthError::UserNotFound(_) => "USER_NOT_FOUND",
            AuthError::AccountDisabled => "ACCOUNT_DISABLED",
            AuthError::UnknownRole(_) => "UNKNOWN_ROLE",
            AuthError::InvalidPermission(_) => "INVALID_PERMISSION",
            AuthError::Store(_) => "STORE_ERROR",
            AuthError::ConfigError(_) => "CONFIG_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// User store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Query failed
    #[error("Query failed: {0}")]
    Query(String),

    /// Stored data could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Result type for user store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::Unauthenticated.status_code(), 401);
        assert_eq!(
            AuthError::PermissionDenied {
                permission: "users.delete".to_string()
            }
            .status_code(),
            403
        );
        assert_eq!(AuthError::UserNotFound(Uuid::nil()).status_code(), 404);
        assert_eq!(
            AuthError::from(StoreError::Unavailable("db down".to_string())).status_code(),
            500
        );
    }

    #[test]
    fn test_server_errors() {
        assert!(!AuthError::Unauthenticated.is_server_error());
        assert!(!AuthError::InsufficientRole {
            required: "manager".to_string()
        }
        .is_server_error());
        assert!(AuthError::Internal("boom".to_string()).is_server_error());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: AuthError = ConfigError::InvalidRoleName(String::new()).into();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }
}
