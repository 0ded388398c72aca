//! # Permissions
//!
//! Dot-namespaced permission names and the patterns that cover them.
//! A permission names a module followed by an action and optional
//! qualifiers, e.g. `users.create` or `projects.edit.own`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Segment that turns a permission into a prefix pattern.
pub const PATTERN_SEGMENT: &str = "*";

/// Trailing segment marking an ownership-scoped permission.
pub const OWN_SEGMENT: &str = "own";

/// A validated permission name.
///
/// Permissions can be:
/// - **Exact**: `users.create`, matches only itself
/// - **Pattern**: `reports.*`, matches every permission below `reports`
///
/// # Example
///
/// ```
/// use vireo_permissions::permissions::Permission;
///
/// let perm = Permission::parse("users.create").unwrap();
/// assert_eq!(perm.module(), "users");
/// assert_eq!(perm.to_string(), "users.create");
///
/// let pattern = Permission::parse("reports.*").unwrap();
/// assert!(pattern.matches(&Permission::parse("reports.view.all").unwrap()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    name: String,
}

impl Permission {
    /// Parse a permission name.
    ///
    /// Segments are separated by `.`, must be non-empty and free of
    /// whitespace. `*` is only allowed as the last segment, and a bare `*`
    /// is not a permission.
    ///
    /// # Returns
    ///
    /// `Some(Permission)` if valid, `None` otherwise
    ///
    /// # Example
    ///
    /// ```
    /// use vireo_permissions::permissions::Permission;
    ///
    /// assert!(Permission::parse("system.admin").is_some());
    /// assert!(Permission::parse("system..admin").is_none());
    /// assert!(Permission::parse("*.admin").is_none());
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let segments: Vec<&str> = s.split('.').collect();
        if segments.len() < 2 && segments[0] == PATTERN_SEGMENT {
            return None;
        }

        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() || segment.chars().any(char::is_whitespace) {
                return None;
            }
            if segment.contains('*') && (i != last || *segment != PATTERN_SEGMENT) {
                return None;
            }
        }

        Some(Self {
            name: s.to_string(),
        })
    }

    /// Get the permission name.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Iterate over the dot-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.name.split('.')
    }

    /// The first segment (e.g. `users` for `users.create`).
    pub fn module(&self) -> &str {
        self.segments().next().unwrap_or_default()
    }

    /// Check if this permission is a prefix pattern (`reports.*`).
    pub fn is_pattern(&self) -> bool {
        self.segments().last() == Some(PATTERN_SEGMENT)
    }

    /// Check if this permission is ownership-scoped (`projects.edit.own`).
    pub fn is_own(&self) -> bool {
        self.segments().last() == Some(OWN_SEGMENT)
    }

    /// Number of literal (non-pattern) segments.
    ///
    /// Used to pick the most specific pattern when several match.
    pub fn specificity(&self) -> usize {
        self.segments().filter(|s| *s != PATTERN_SEGMENT).count()
    }

    /// Check if this permission covers another.
    ///
    /// An exact permission matches only an identical name. A pattern
    /// matches every permission that extends its prefix by at least one
    /// segment, so `reports.*` covers `reports.view` and
    /// `reports.view.all` but not `reports` itself.
    ///
    /// # Example
    ///
    /// ```
    /// use vireo_permissions::permissions::Permission;
    ///
    /// let pattern = Permission::parse("users.*").unwrap();
    /// let create = Permission::parse("users.create").unwrap();
    /// let other = Permission::parse("projects.create").unwrap();
    ///
    /// assert!(pattern.matches(&create));
    /// assert!(!pattern.matches(&other));
    /// assert!(!create.matches(&pattern));
    /// ```
    pub fn matches(&self, other: &Permission) -> bool {
        if !self.is_pattern() {
            return self == other;
        }
        if other.is_pattern() {
            return false;
        }

        let prefix: Vec<&str> = self.segments().filter(|s| *s != PATTERN_SEGMENT).collect();
        let target: Vec<&str> = other.segments().collect();
        target.len() > prefix.len() && target[..prefix.len()] == prefix[..]
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for Permission {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ConfigError::InvalidPermissionName(s.to_string()))
    }
}

impl TryFrom<String> for Permission {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.name
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(s: &str) -> Permission {
        Permission::parse(s).unwrap()
    }

    #[test]
    fn test_permission_parsing() {
        let p = perm("users.view.all");
        assert_eq!(p.module(), "users");
        assert_eq!(p.segments().count(), 3);
        assert!(!p.is_pattern());
        assert!(!p.is_own());

        // Middleware style names keep their colon
        assert!(Permission::parse("view:admin").is_some());
    }

    #[test]
    fn test_invalid_names() {
        assert!(Permission::parse("").is_none());
        assert!(Permission::parse("*").is_none());
        assert!(Permission::parse("users.").is_none());
        assert!(Permission::parse(".users").is_none());
        assert!(Permission::parse("users.cre ate").is_none());
        assert!(Permission::parse("users.*.view").is_none());
        assert!(Permission::parse("users.cre*").is_none());
    }

    #[test]
    fn test_own_permission() {
        assert!(perm("projects.edit.own").is_own());
        assert!(!perm("projects.own.edit").is_own());
    }

    #[test]
    fn test_pattern_matching() {
        let pattern = perm("reports.*");
        assert!(pattern.is_pattern());
        assert_eq!(pattern.specificity(), 1);

        assert!(pattern.matches(&perm("reports.view")));
        assert!(pattern.matches(&perm("reports.view.all")));
        assert!(!pattern.matches(&perm("reports")));
        assert!(!pattern.matches(&perm("reporting.view")));
        assert!(!pattern.matches(&perm("reports.*")));

        let nested = perm("reports.view.*");
        assert_eq!(nested.specificity(), 2);
        assert!(nested.matches(&perm("reports.view.all")));
        assert!(!nested.matches(&perm("reports.view")));
    }

    #[test]
    fn test_exact_matching() {
        assert!(perm("users.create").matches(&perm("users.create")));
        assert!(!perm("users.create").matches(&perm("users.create.bulk")));
    }

    #[test]
    fn test_serde_round_trip_rejects_invalid() {
        let p: Permission = serde_json::from_str("\"users.delete\"").unwrap();
        assert_eq!(p.as_str(), "users.delete");

        let bad: Result<Permission, _> = serde_json::from_str("\"users..delete\"");
        assert!(bad.is_err());
    }
}
