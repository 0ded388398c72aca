//! Role level gate
//!
//! Some routes are gated on a minimum role rather than a permission:
//! `officer < manager < corridor < superadmin`. A user whose role is not on
//! the ladder sits at level 0, and a required role that is not on the
//! ladder can never be met.

use std::collections::HashMap;

use vireo_permissions::Subject;

use crate::error::{AuthError, AuthResult};

/// Ordered role ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLevels {
    levels: HashMap<String, u32>,
}

impl Default for RoleLevels {
    fn default() -> Self {
        Self::from_ladder(["officer", "manager", "corridor", "superadmin"])
    }
}

impl RoleLevels {
    /// Build a ladder from lowest to highest; levels start at 1.
    pub fn from_ladder<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        let levels = roles
            .into_iter()
            .zip(1u32..)
            .map(|(role, level)| (role.into(), level))
            .collect();
        Self { levels }
    }

    /// Level of a role; 0 when not on the ladder.
    pub fn level(&self, role: &str) -> u32 {
        self.levels.get(role).copied().unwrap_or(0)
    }

    /// Highest level among `roles`.
    pub fn highest<'a, I>(&self, roles: I) -> u32
    where
        I: IntoIterator<Item = &'a String>,
    {
        roles.into_iter().map(|role| self.level(role)).max().unwrap_or(0)
    }

    /// Check if `user_role` is at or above `required`.
    pub fn meets(&self, user_role: &str, required: &str) -> bool {
        match self.levels.get(required) {
            Some(&needed) => self.level(user_role) >= needed,
            None => false,
        }
    }

    /// Check if any of the subject's roles is at or above `required`.
    pub fn subject_meets(&self, subject: &Subject, required: &str) -> bool {
        subject.authenticated
            && subject.roles.iter().any(|role| self.meets(role, required))
    }

    /// Gate a request on a minimum role.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for guests, `InsufficientRole` otherwise
    pub fn require(&self, subject: &Subject, required: &str) -> AuthResult<()> {
        if !subject.authenticated {
            return Err(AuthError::Unauthenticated);
        }
        if self.subject_meets(subject, required) {
            Ok(())
        } else {
            Err(AuthError::InsufficientRole {
                required: required.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_default_ladder() {
        let levels = RoleLevels::default();
        assert_eq!(levels.level("officer"), 1);
        assert_eq!(levels.level("superadmin"), 4);
        assert_eq!(levels.level("assistant"), 0);

        assert!(levels.meets("corridor", "manager"));
        assert!(levels.meets("manager", "manager"));
        assert!(!levels.meets("officer", "manager"));
        assert!(!levels.meets("assistant", "officer"));
    }

    #[test]
    fn test_unknown_required_role_is_unreachable() {
        let levels = RoleLevels::default();
        assert!(!levels.meets("superadmin", "galactic_overlord"));
    }

    #[test]
    fn test_require() {
        let levels = RoleLevels::default();
        let manager = Subject::new(Uuid::now_v7()).with_roles(["assistant", "manager"]);

        assert!(levels.require(&manager, "officer").is_ok());
        assert_eq!(levels.highest(&manager.roles), 2);

        let err = levels.require(&manager, "corridor").unwrap_err();
        assert_eq!(err.status_code(), 403);

        let err = levels.require(&Subject::guest(), "officer").unwrap_err();
        assert_eq!(err.status_code(), 401);
    }
}
