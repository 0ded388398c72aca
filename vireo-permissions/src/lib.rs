//! # Vireo Permissions
//!
//! Role hierarchy and attribute-based permission resolution for the Vireo
//! portal.
//!
//! ## Overview
//!
//! The vireo-permissions crate handles:
//! - **Roles**: An inheritance graph where a parent role holds everything
//!   its children hold
//! - **Permissions**: Dot-namespaced names (`users.create`) and patterns
//!   (`reports.*`)
//! - **Overrides**: Per-user grants and revocations with optional expiry
//! - **Attributes**: Pluggable checks (`own`, `department`, ...) layered on
//!   top of role grants
//!
//! ## Architecture
//!
//! ```text
//! PermissionsConfig (JSON)
//!        |
//!        v
//! RoleGraph + PermissionIndex + AttributeCheckerRegistry
//!        |
//!        v
//! PermissionResolver::can(subject, "projects.edit.own", context) -> bool
//! ```
//!
//! The resolver is immutable once built. Load it at startup, share it
//! behind an `Arc`, and pass the [`Subject`] into every check.
//!
//! ## Role Direction
//!
//! `"corridor": ["manager", "officer"]` means corridor can do everything
//! manager and officer can. Manager gains nothing from corridor.
//!
//! ## Usage
//!
//! ```rust
//! use uuid::Uuid;
//! use vireo_permissions::{CheckContext, PermissionResolver, PermissionsConfig, Subject};
//!
//! let config = PermissionsConfig::bundled().unwrap();
//! let resolver = PermissionResolver::from_config(&config).unwrap();
//!
//! let officer = Subject::new(Uuid::now_v7()).with_role("officer");
//!
//! // Owner check on a `.own` permission
//! let mine = CheckContext::owned_by(officer.id);
//! assert!(resolver.can(&officer, "projects.edit.own", &mine));
//!
//! let theirs = CheckContext::owned_by(Uuid::now_v7());
//! assert!(!resolver.can(&officer, "projects.edit.own", &theirs));
//!
//! // Unknown permissions are denied
//! assert!(!resolver.can(&officer, "billing.refund", &CheckContext::new()));
//! ```

pub mod attributes;
pub mod config;
pub mod error;
pub mod index;
pub mod overrides;
pub mod permissions;
pub mod resolver;
pub mod roles;
pub mod subject;

// Re-export main types for convenience
pub use attributes::{AttributeChecker, AttributeCheckerRegistry, AttributeConstraint};
pub use config::{ConfigWarning, PermissionsConfig};
pub use error::{ConfigError, ConfigResult};
pub use index::{Grant, PermissionEntry, PermissionIndex};
pub use overrides::UserPermissionOverride;
pub use permissions::Permission;
pub use resolver::{Decision, DenyReason, GrantReason, PermissionResolver};
pub use roles::RoleGraph;
pub use subject::{CheckContext, Subject};
