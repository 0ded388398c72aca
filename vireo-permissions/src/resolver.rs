//! Permission resolution
//!
//! [`PermissionResolver`] combines the role graph, the permission index,
//! per-user overrides and attribute checks into one decision. Every path
//! that is not an explicit grant ends in a deny.
//!
//! Precedence, first match wins:
//!
//! 1. Unauthenticated subjects pass only guest permissions.
//! 2. Super admins pass everything when the bypass is on.
//! 3. A live override grants or revokes outright.
//! 4. Unknown permissions deny.
//! 5. The all-users grant, or any role (with inheritance) in the grant.
//! 6. Every constraint must pass.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;

use crate::attributes::{AttributeChecker, AttributeCheckerRegistry, AttributeConstraint};
use crate::config::PermissionsConfig;
use crate::error::ConfigResult;
use crate::index::{Grant, PermissionIndex};
use crate::overrides::UserPermissionOverride;
use crate::permissions::Permission;
use crate::roles::RoleGraph;
use crate::subject::{CheckContext, Subject};

/// Why a check passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantReason {
    /// Subject holds a super-admin role
    SuperAdmin,
    /// A live override granted the permission
    Override,
    /// The permission is granted to all users
    Everyone,
    /// The named role (directly held) is, or inherits, a granted role
    Role(String),
    /// The permission is open to guests
    Guest,
}

/// Why a check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Subject is not authenticated and the permission is not a guest one
    Unauthenticated,
    /// A live override revoked the permission
    Override,
    /// No entry governs the permission
    UnknownPermission,
    /// None of the subject's roles hold the permission
    NoMatchingRole,
    /// The named constraint failed
    Constraint(String),
    /// Data needed for the check could not be loaded
    LookupFailed,
}

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Access allowed
    Granted(GrantReason),
    /// Access denied
    Denied(DenyReason),
}

impl Decision {
    /// Check if access was allowed.
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted(_))
    }

    /// Check if access was denied.
    pub fn is_denied(&self) -> bool {
        !self.is_granted()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Granted(GrantReason::SuperAdmin) => write!(f, "granted: super admin"),
            Decision::Granted(GrantReason::Override) => write!(f, "granted: override"),
            Decision::Granted(GrantReason::Everyone) => write!(f, "granted: all users"),
            Decision::Granted(GrantReason::Role(role)) => write!(f, "granted: role {}", role),
            Decision::Granted(GrantReason::Guest) => write!(f, "granted: guest"),
            Decision::Denied(DenyReason::Unauthenticated) => write!(f, "denied: unauthenticated"),
            Decision::Denied(DenyReason::Override) => write!(f, "denied: override"),
            Decision::Denied(DenyReason::UnknownPermission) => {
                write!(f, "denied: unknown permission")
            }
            Decision::Denied(DenyReason::NoMatchingRole) => write!(f, "denied: no matching role"),
            Decision::Denied(DenyReason::Constraint(attr)) => {
                write!(f, "denied: constraint {} failed", attr)
            }
            Decision::Denied(DenyReason::LookupFailed) => write!(f, "denied: lookup failed"),
        }
    }
}

/// Immutable permission evaluator.
///
/// Build once at startup and share behind an `Arc`.
///
/// # Example
///
/// ```
/// use uuid::Uuid;
/// use vireo_permissions::{CheckContext, PermissionResolver, PermissionsConfig, Subject};
///
/// let resolver = PermissionResolver::from_config(&PermissionsConfig::bundled().unwrap()).unwrap();
///
/// let manager = Subject::new(Uuid::now_v7()).with_role("manager");
/// assert!(resolver.can(&manager, "users.create", &CheckContext::new()));
/// assert!(!resolver.can(&manager, "users.delete", &CheckContext::new()));
/// ```
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    graph: RoleGraph,
    index: PermissionIndex,
    checkers: AttributeCheckerRegistry,
    super_admin_roles: BTreeSet<String>,
    guest_permissions: Vec<Permission>,
    log_checks: bool,
}

impl PermissionResolver {
    /// Create a resolver from its parts.
    ///
    /// No super-admin roles and no guest permissions are configured.
    pub fn new(graph: RoleGraph, index: PermissionIndex, checkers: AttributeCheckerRegistry) -> Self {
        Self {
            graph,
            index,
            checkers,
            super_admin_roles: BTreeSet::new(),
            guest_permissions: Vec::new(),
            log_checks: false,
        }
    }

    /// Validate `config` and build a resolver from it.
    ///
    /// # Errors
    ///
    /// Any fatal configuration error; warnings are logged and dropped.
    pub fn from_config(config: &PermissionsConfig) -> ConfigResult<Self> {
        let warnings = config.validate()?;

        let graph = RoleGraph::new(&config.roles)?;
        let index = PermissionIndex::from_config(config)?;
        let checkers = AttributeCheckerRegistry::from_toggles(&config.attributes);

        let super_admin_roles = if config.super_admin.bypass_active() {
            config.super_admin.roles.iter().cloned().collect()
        } else {
            BTreeSet::new()
        };

        let guest_permissions = config
            .guest
            .permissions
            .iter()
            .map(|name| name.parse())
            .collect::<ConfigResult<Vec<Permission>>>()?;

        tracing::info!(
            roles = graph.len(),
            permissions = index.len(),
            warnings = warnings.len(),
            "Permission resolver loaded"
        );

        Ok(Self {
            graph,
            index,
            checkers,
            super_admin_roles,
            guest_permissions,
            log_checks: config.debug.log_permission_checks,
        })
    }

    /// Set the roles that bypass every check.
    pub fn with_super_admin_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.super_admin_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Set the permissions unauthenticated subjects hold.
    pub fn with_guest_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.guest_permissions = permissions;
        self
    }

    /// Register (or replace) an attribute checker.
    pub fn with_checker<C>(mut self, attribute: impl Into<String>, checker: C) -> Self
    where
        C: AttributeChecker + 'static,
    {
        self.checkers.register(attribute, checker);
        self
    }

    /// Log every decision at debug level.
    pub fn with_check_logging(mut self, enabled: bool) -> Self {
        self.log_checks = enabled;
        self
    }

    /// Role graph in use.
    pub fn graph(&self) -> &RoleGraph {
        &self.graph
    }

    /// Permission index in use.
    pub fn index(&self) -> &PermissionIndex {
        &self.index
    }

    /// Attribute checkers in use.
    pub fn checkers(&self) -> &AttributeCheckerRegistry {
        &self.checkers
    }

    /// Check if `subject` directly holds a super-admin role.
    pub fn is_super_admin(&self, subject: &Subject) -> bool {
        subject.authenticated && subject.roles.iter().any(|r| self.super_admin_roles.contains(r))
    }

    /// Check if `subject` holds `permission`.
    pub fn can(&self, subject: &Subject, permission: &str, context: &CheckContext) -> bool {
        self.decide(subject, permission, context).is_granted()
    }

    /// Decide `permission` for `subject`, using the subject's preloaded
    /// overrides.
    pub fn decide(&self, subject: &Subject, permission: &str, context: &CheckContext) -> Decision {
        let now = Utc::now();
        let ov = subject.active_override(permission, now);
        self.decide_with_override(subject, permission, context, ov, now)
    }

    /// Decide `permission` for `subject` with an override loaded elsewhere.
    ///
    /// # Arguments
    ///
    /// * `subject` - Principal being checked
    /// * `permission` - Exact permission name
    /// * `context` - Resource context and call-time constraints
    /// * `ov` - Override for this user and permission, if any
    /// * `now` - Evaluation time for override expiry
    ///
    /// # Returns
    ///
    /// The decision with the reason behind it
    pub fn decide_with_override(
        &self,
        subject: &Subject,
        permission: &str,
        context: &CheckContext,
        ov: Option<&UserPermissionOverride>,
        now: DateTime<Utc>,
    ) -> Decision {
        let decision = self.evaluate(subject, permission, context, ov, now);

        if self.log_checks {
            tracing::debug!(
                user_id = %subject.id,
                permission = %permission,
                granted = decision.is_granted(),
                decision = %decision,
                "Permission check"
            );
        }

        decision
    }

    fn evaluate(
        &self,
        subject: &Subject,
        permission: &str,
        context: &CheckContext,
        ov: Option<&UserPermissionOverride>,
        now: DateTime<Utc>,
    ) -> Decision {
        if !subject.authenticated {
            return if self.is_guest_permission(permission) {
                Decision::Granted(GrantReason::Guest)
            } else {
                Decision::Denied(DenyReason::Unauthenticated)
            };
        }

        if self.is_super_admin(subject) {
            return Decision::Granted(GrantReason::SuperAdmin);
        }

        if let Some(ov) = ov.filter(|ov| ov.applies_to(subject.id, permission) && ov.is_active_at(now)) {
            return if ov.granted {
                Decision::Granted(GrantReason::Override)
            } else {
                Decision::Denied(DenyReason::Override)
            };
        }

        let Some(entry) = self.index.lookup(permission) else {
            return Decision::Denied(DenyReason::UnknownPermission);
        };

        let reason = match &entry.grant {
            Grant::Everyone => GrantReason::Everyone,
            Grant::Roles(granted) => match self.graph.any_grants(&subject.roles, granted) {
                Some(role) => GrantReason::Role(role),
                None => return Decision::Denied(DenyReason::NoMatchingRole),
            },
        };

        let constraints = entry.constraints.iter().chain(context.constraints.iter());
        if let Some(failed) = self.checkers.first_failure(constraints, subject, context) {
            return Decision::Denied(DenyReason::Constraint(failed.attribute.clone()));
        }

        Decision::Granted(reason)
    }

    fn is_guest_permission(&self, permission: &str) -> bool {
        let Some(requested) = Permission::parse(permission) else {
            return false;
        };
        self.guest_permissions
            .iter()
            .any(|guest| *guest == requested || guest.matches(&requested))
    }

    /// Exact permission names `subject` holds through roles and overrides.
    ///
    /// Constraints are not evaluated, since they depend on a resource.
    /// Super admins get every indexed name.
    pub fn permissions_for(&self, subject: &Subject) -> BTreeSet<String> {
        if !subject.authenticated {
            return self
                .index
                .names()
                .into_iter()
                .filter(|name| self.is_guest_permission(name))
                .map(str::to_string)
                .collect();
        }

        let all = self.index.names();
        if self.is_super_admin(subject) {
            return all.into_iter().map(str::to_string).collect();
        }

        let now = Utc::now();
        let roles = self.graph.expand(&subject.roles);
        let mut held: BTreeSet<String> = all
            .into_iter()
            .filter(|name| match self.index.roles_granted(name) {
                Some(Grant::Everyone) => true,
                Some(Grant::Roles(granted)) => !granted.is_disjoint(&roles),
                None => false,
            })
            .map(str::to_string)
            .collect();

        for ov in subject.overrides.iter().filter(|ov| ov.user_id == subject.id && ov.is_active_at(now)) {
            if ov.granted {
                held.insert(ov.permission.clone());
            } else {
                held.remove(&ov.permission);
            }
        }

        held
    }

    /// Constraints a check of `permission` would evaluate, before
    /// call-time ones.
    pub fn constraints_for(&self, permission: &str) -> &[AttributeConstraint] {
        self.index
            .lookup(permission)
            .map(|entry| entry.constraints.as_slice())
            .unwrap_or(&[])
    }
}
