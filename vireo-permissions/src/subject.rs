//! Subjects and check contexts
//!
//! A [`Subject`] is the authenticated principal a permission check is made
//! for. It is passed explicitly into every check; nothing is read from
//! ambient session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::attributes::AttributeConstraint;
use crate::overrides::UserPermissionOverride;

/// The principal a permission check is evaluated for.
///
/// # Examples
///
/// ```
/// use uuid::Uuid;
/// use vireo_permissions::Subject;
///
/// let subject = Subject::new(Uuid::now_v7())
///     .with_role("manager")
///     .with_attribute("department", "engineering");
///
/// assert!(subject.has_role("manager"));
/// assert_eq!(subject.attribute("department"), Some("engineering"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    /// User ID
    pub id: Uuid,

    /// Login name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Directly-assigned roles
    #[serde(default)]
    pub roles: BTreeSet<String>,

    /// Group memberships
    #[serde(default)]
    pub groups: BTreeSet<String>,

    /// User attributes (department, location, ...)
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// Whether the subject passed authentication
    pub authenticated: bool,

    /// Preloaded permission overrides
    #[serde(default)]
    pub overrides: Vec<UserPermissionOverride>,
}

impl Subject {
    /// Create an authenticated subject with no roles.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            username: None,
            roles: BTreeSet::new(),
            groups: BTreeSet::new(),
            attributes: HashMap::new(),
            authenticated: true,
            overrides: Vec::new(),
        }
    }

    /// Create an unauthenticated subject.
    pub fn guest() -> Self {
        Self {
            authenticated: false,
            ..Self::new(Uuid::nil())
        }
    }

    /// Set the login name.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Add a directly-assigned role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Add several directly-assigned roles.
    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Add a group membership.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    /// Set a user attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attach a preloaded override.
    pub fn with_override(mut self, ov: UserPermissionOverride) -> Self {
        self.overrides.push(ov);
        self
    }

    /// Check if the subject directly holds `role`.
    ///
    /// Inheritance is not consulted; use the resolver for that.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Check if the subject directly holds any of `roles`.
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }

    /// Check if the subject directly holds all of `roles`.
    pub fn has_all_roles(&self, roles: &[&str]) -> bool {
        roles.iter().all(|role| self.has_role(role))
    }

    /// Check group membership.
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Get a user attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Find the preloaded override for `permission` that applies at `now`.
    ///
    /// Overrides recorded for a different user are ignored.
    pub fn active_override(
        &self,
        permission: &str,
        now: DateTime<Utc>,
    ) -> Option<&UserPermissionOverride> {
        self.overrides
            .iter()
            .find(|ov| ov.applies_to(self.id, permission) && ov.is_active_at(now))
    }
}

/// Resource context for a single permission check.
///
/// # Examples
///
/// ```
/// use uuid::Uuid;
/// use vireo_permissions::{AttributeConstraint, CheckContext};
///
/// let owner = Uuid::now_v7();
/// let ctx = CheckContext::owned_by(owner)
///     .with_attribute("department", "finance")
///     .require(AttributeConstraint::new("department"));
///
/// assert_eq!(ctx.owner_id, Some(owner));
/// assert_eq!(ctx.constraints.len(), 1);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckContext {
    /// Owner of the resource being accessed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,

    /// Resource attributes (department, location, ...)
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// Constraints attached by the caller for this check
    #[serde(default)]
    pub constraints: Vec<AttributeConstraint>,
}

impl CheckContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context for a resource owned by `owner_id`.
    pub fn owned_by(owner_id: Uuid) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Self::default()
        }
    }

    /// Set a resource attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attach a constraint that must pass for this check.
    pub fn require(mut self, constraint: AttributeConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Get a resource attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
