//! Permission index
//!
//! Maps permission names to the roles that hold them. Exact entries win;
//! otherwise the most specific pattern entry (`reports.view.*` before
//! `reports.*`) applies. A name with no entry is held by nobody.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::attributes::{AttributeConstraint, OWN};
use crate::config::{AttributeRule, GrantSpec, PermissionsConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::permissions::Permission;

/// Who holds a permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// Every authenticated user
    Everyone,
    /// Exactly these roles (and roles inheriting them)
    Roles(BTreeSet<String>),
}

impl Grant {
    /// Check if this is the all-users grant.
    pub fn is_everyone(&self) -> bool {
        matches!(self, Grant::Everyone)
    }

    /// The granted roles, unless this is the all-users grant.
    pub fn roles(&self) -> Option<&BTreeSet<String>> {
        match self {
            Grant::Everyone => None,
            Grant::Roles(roles) => Some(roles),
        }
    }
}

/// One indexed permission rule.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionEntry {
    /// Permission name or pattern
    pub permission: Permission,

    /// Who holds it
    pub grant: Grant,

    /// Constraints that must also pass
    pub constraints: Vec<AttributeConstraint>,
}

impl PermissionEntry {
    /// Create an entry without constraints.
    pub fn new(permission: Permission, grant: Grant) -> Self {
        Self {
            permission,
            grant,
            constraints: Vec::new(),
        }
    }

    /// Add a constraint.
    pub fn with_constraint(mut self, constraint: AttributeConstraint) -> Self {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
        self
    }
}

/// Lookup table from permission name to [`PermissionEntry`].
#[derive(Debug, Clone, Default)]
pub struct PermissionIndex {
    exact: HashMap<String, PermissionEntry>,

    /// Pattern entries, most specific first
    patterns: Vec<PermissionEntry>,

    groups: BTreeMap<String, Vec<String>>,
}

impl PermissionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from configuration.
    ///
    /// Permissions ending in `.own` get the `own` constraint when that
    /// attribute is enabled.
    pub fn from_config(config: &PermissionsConfig) -> ConfigResult<Self> {
        let own_enabled = config.attributes.get(OWN).copied().unwrap_or(false);
        let mut index = Self::new();

        for (name, rule) in &config.permissions {
            let permission: Permission = name.parse()?;

            let grant = match rule.grant() {
                GrantSpec::Symbol(symbol) if config.is_all_users_symbol(symbol) => Grant::Everyone,
                GrantSpec::Symbol(symbol) => {
                    return Err(ConfigError::WildcardDisabled {
                        permission: name.clone(),
                        symbol: symbol.clone(),
                    })
                }
                GrantSpec::Roles(roles) if roles.iter().any(|r| config.is_all_users_symbol(r)) => {
                    Grant::Everyone
                }
                GrantSpec::Roles(roles) => Grant::Roles(roles.iter().cloned().collect()),
            };

            let mut entry = PermissionEntry::new(permission, grant);

            if let Some(attributes) = rule.attributes() {
                for (attribute, setting) in attributes {
                    match setting {
                        AttributeRule::Enabled(false) => {}
                        AttributeRule::Enabled(true) => {
                            entry = entry.with_constraint(AttributeConstraint::new(attribute));
                        }
                        AttributeRule::Value(value) => {
                            entry = entry.with_constraint(
                                AttributeConstraint::new(attribute).with_value(value),
                            );
                        }
                    }
                }
            }

            if own_enabled && entry.permission.is_own() {
                entry = entry.with_constraint(AttributeConstraint::own());
            }

            index.insert(entry);
        }

        index.groups = config.groups.clone();
        Ok(index)
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, entry: PermissionEntry) {
        if entry.permission.is_pattern() {
            self.patterns
                .retain(|existing| existing.permission != entry.permission);
            self.patterns.push(entry);
            self.patterns
                .sort_by(|a, b| b.permission.specificity().cmp(&a.permission.specificity()));
        } else {
            self.exact
                .insert(entry.permission.as_str().to_string(), entry);
        }
    }

    /// Find the entry governing `name`.
    ///
    /// Exact entries first, then the most specific matching pattern.
    /// Names that do not parse have no entry.
    pub fn lookup(&self, name: &str) -> Option<&PermissionEntry> {
        if let Some(entry) = self.exact.get(name) {
            return Some(entry);
        }

        let permission = Permission::parse(name)?;
        self.patterns
            .iter()
            .find(|entry| entry.permission.matches(&permission))
    }

    /// Who holds `name`; `None` means nobody.
    pub fn roles_granted(&self, name: &str) -> Option<&Grant> {
        self.lookup(name).map(|entry| &entry.grant)
    }

    /// Check if `name` has an entry (exact or via pattern).
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Exact permission names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.exact.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// All exact entries, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &PermissionEntry> {
        self.exact.values()
    }

    /// Pattern entries, most specific first.
    pub fn patterns(&self) -> &[PermissionEntry] {
        &self.patterns
    }

    /// Permissions listed in a group.
    pub fn group(&self, name: &str) -> Option<&[String]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Groups listing `permission`.
    pub fn groups_containing(&self, permission: &str) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|(_, members)| members.iter().any(|m| m == permission))
            .map(|(group, _)| group.as_str())
            .collect()
    }

    /// Number of entries (exact and pattern).
    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> Grant {
        Grant::Roles(names.iter().map(|n| n.to_string()).collect())
    }

    fn entry(name: &str, grant: Grant) -> PermissionEntry {
        PermissionEntry::new(Permission::parse(name).unwrap(), grant)
    }

    #[test]
    fn test_exact_lookup() {
        let mut index = PermissionIndex::new();
        index.insert(entry("users.delete", roles(&["corridor"])));

        assert_eq!(index.roles_granted("users.delete"), Some(&roles(&["corridor"])));
        assert_eq!(index.roles_granted("users.create"), None);
        assert_eq!(index.roles_granted("not a permission"), None);
    }

    #[test]
    fn test_pattern_specificity() {
        let mut index = PermissionIndex::new();
        index.insert(entry("reports.*", roles(&["manager"])));
        index.insert(entry("reports.view.*", Grant::Everyone));
        index.insert(entry("reports.delete", roles(&["corridor"])));

        assert_eq!(index.roles_granted("reports.view.all"), Some(&Grant::Everyone));
        assert_eq!(index.roles_granted("reports.schedule"), Some(&roles(&["manager"])));
        // Exact entry wins over both patterns
        assert_eq!(index.roles_granted("reports.delete"), Some(&roles(&["corridor"])));
        // A pattern does not cover its own prefix
        assert_eq!(index.roles_granted("reports"), None);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_insert_replaces() {
        let mut index = PermissionIndex::new();
        index.insert(entry("reports.*", roles(&["manager"])));
        index.insert(entry("reports.*", roles(&["officer"])));
        assert_eq!(index.patterns().len(), 1);
        assert_eq!(index.roles_granted("reports.view"), Some(&roles(&["officer"])));
    }

    #[test]
    fn test_from_config() {
        let config = PermissionsConfig::from_json_str(
            r#"{
                "permissions": {
                    "projects.view": "*",
                    "projects.edit.own": ["officer", "assistant"],
                    "projects.audit": [],
                    "users.list": ["manager", "*"],
                    "reports.view.department": {
                        "roles": ["manager"],
                        "attributes": { "department": true, "location": "nairobi" }
                    }
                },
                "groups": { "projects": ["projects.view", "projects.edit.own"] }
            }"#,
        )
        .unwrap();
        let index = PermissionIndex::from_config(&config).unwrap();

        assert!(index.roles_granted("projects.view").unwrap().is_everyone());
        assert!(index.roles_granted("users.list").unwrap().is_everyone());
        assert_eq!(index.roles_granted("projects.audit"), Some(&roles(&[])));

        let own = index.lookup("projects.edit.own").unwrap();
        assert_eq!(own.constraints, vec![AttributeConstraint::own()]);

        let dept = index.lookup("reports.view.department").unwrap();
        assert_eq!(dept.constraints.len(), 2);
        assert!(dept
            .constraints
            .contains(&AttributeConstraint::new("location").with_value("nairobi")));

        assert_eq!(index.groups_containing("projects.view"), vec!["projects"]);
        assert_eq!(index.group("projects").unwrap().len(), 2);
    }

    #[test]
    fn test_own_constraint_follows_toggle() {
        let config = PermissionsConfig::from_json_str(
            r#"{
                "attributes": { "own": false },
                "permissions": { "projects.edit.own": ["officer"] }
            }"#,
        )
        .unwrap();
        let index = PermissionIndex::from_config(&config).unwrap();
        assert!(index.lookup("projects.edit.own").unwrap().constraints.is_empty());
    }
}
