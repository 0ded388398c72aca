//! Per-user permission overrides
//!
//! An override grants or revokes a single permission for a single user and
//! wins over anything the user's roles say. Overrides may expire; expired
//! overrides are ignored at evaluation time rather than swept.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A direct grant or revocation of one permission for one user.
///
/// # Examples
///
/// ```
/// use chrono::Duration;
/// use uuid::Uuid;
/// use vireo_permissions::UserPermissionOverride;
///
/// let user_id = Uuid::now_v7();
/// let grant = UserPermissionOverride::grant(user_id, "reports.export")
///     .expires_in(Duration::hours(8));
/// assert!(grant.granted);
/// assert!(grant.is_active());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPermissionOverride {
    /// User the override applies to
    pub user_id: Uuid,

    /// Exact permission name
    pub permission: String,

    /// `true` grants the permission, `false` revokes it
    pub granted: bool,

    /// When the override stops applying (never, if `None`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Administrator who created the override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<Uuid>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl UserPermissionOverride {
    /// Create an override that grants `permission` to `user_id`.
    pub fn grant(user_id: Uuid, permission: impl Into<String>) -> Self {
        Self::new(user_id, permission, true)
    }

    /// Create an override that revokes `permission` from `user_id`.
    pub fn revoke(user_id: Uuid, permission: impl Into<String>) -> Self {
        Self::new(user_id, permission, false)
    }

    fn new(user_id: Uuid, permission: impl Into<String>, granted: bool) -> Self {
        Self {
            user_id,
            permission: permission.into(),
            granted,
            expires_at: None,
            granted_by: None,
            created_at: Utc::now(),
        }
    }

    /// Set an absolute expiry.
    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Expire after `duration` from now.
    pub fn expires_in(mut self, duration: Duration) -> Self {
        self.expires_at = Some(Utc::now() + duration);
        self
    }

    /// Record the administrator who created the override.
    pub fn granted_by(mut self, admin_id: Uuid) -> Self {
        self.granted_by = Some(admin_id);
        self
    }

    /// Check if the override has expired at `now`.
    ///
    /// An override expiring exactly at `now` is expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| expires_at <= now)
    }

    /// Check if the override still applies at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now)
    }

    /// Check if the override still applies right now.
    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// Check if this override is for `user_id` and `permission`.
    pub fn applies_to(&self, user_id: Uuid, permission: &str) -> bool {
        self.user_id == user_id && self.permission == permission
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_without_expiry_never_expires() {
        let ov = UserPermissionOverride::grant(Uuid::now_v7(), "users.delete");
        assert!(ov.is_active_at(Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn test_override_expiry_boundary() {
        let now = Utc::now();
        let ov = UserPermissionOverride::revoke(Uuid::now_v7(), "users.delete").expires_at(now);

        assert!(!ov.granted);
        assert!(ov.is_active_at(now - Duration::seconds(1)));
        assert!(ov.is_expired_at(now));
        assert!(ov.is_expired_at(now + Duration::seconds(1)));
    }

    #[test]
    fn test_applies_to() {
        let user_id = Uuid::now_v7();
        let ov = UserPermissionOverride::grant(user_id, "reports.export");

        assert!(ov.applies_to(user_id, "reports.export"));
        assert!(!ov.applies_to(user_id, "reports.export.all"));
        assert!(!ov.applies_to(Uuid::now_v7(), "reports.export"));
    }

    #[test]
    fn test_granted_by() {
        let admin = Uuid::now_v7();
        let ov = UserPermissionOverride::grant(Uuid::now_v7(), "users.view").granted_by(admin);
        assert_eq!(ov.granted_by, Some(admin));
    }
}
