//! Error types for loading permission configuration
//!
//! Permission checks themselves never fail; every error in this crate is a
//! configuration problem that should stop the process before it serves a
//! request.

use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The role hierarchy is not a DAG
    #[error("Role hierarchy contains a cycle: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// Role name is empty or contains whitespace
    #[error("Invalid role name: {0:?}")]
    InvalidRoleName(String),

    /// Permission name is not a dot-namespaced identifier
    #[error("Invalid permission name: {0:?}")]
    InvalidPermissionName(String),

    /// Permission rule refers to an attribute that is not enabled
    #[error("Permission {permission} uses attribute {attribute} which is not enabled")]
    UnknownAttribute {
        /// Permission carrying the constraint.
        permission: String,
        /// Attribute name.
        attribute: String,
    },

    /// Permission rule uses a symbol while wildcards are disabled
    #[error("Permission {permission} grants {symbol:?} but wildcards are disabled")]
    WildcardDisabled {
        /// Permission carrying the symbol.
        permission: String,
        /// The symbol that was used.
        symbol: String,
    },

    /// Configuration document could not be parsed
    #[error("Failed to parse permission configuration: {0}")]
    Parse(String),

    /// Configuration file could not be read
    #[error("Failed to read permission configuration: {0}")]
    Io(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Get error code for startup diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::CycleDetected(_) => "ROLE_CYCLE",
            ConfigError::InvalidRoleName(_) => "INVALID_ROLE",
            ConfigError::InvalidPermissionName(_) => "INVALID_PERMISSION",
            ConfigError::UnknownAttribute { .. } => "UNKNOWN_ATTRIBUTE",
            ConfigError::WildcardDisabled { .. } => "WILDCARD_DISABLED",
            ConfigError::Parse(_) => "PARSE_ERROR",
            ConfigError::Io(_) => "IO_ERROR",
        }
    }
}
