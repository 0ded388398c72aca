//! Permission configuration
//!
//! The configuration document lists the role hierarchy, which roles hold
//! which permissions, the attribute checkers in use and the super-admin and
//! guest settings. It is loaded once at startup; any error here should keep
//! the process from starting.
//!
//! ```json
//! {
//!   "roles": { "manager": ["officer"], "officer": [] },
//!   "permissions": {
//!     "projects.view": "*",
//!     "projects.create": ["manager", "officer"],
//!     "projects.edit.own": ["officer"],
//!     "reports.view.department": { "roles": ["manager"], "attributes": { "department": true } }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::attributes::BUILTIN_ATTRIBUTES;
use crate::error::{ConfigError, ConfigResult};
use crate::permissions::Permission;
use crate::roles::{validate_role_name, RoleGraph};

/// Configuration shipped with the crate, matching the portal defaults.
pub const BUNDLED_CONFIG: &str = include_str!("../config/permissions.json");

/// Complete permission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Role hierarchy: `parent -> [children]`
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,

    /// Permission rules keyed by permission name or pattern
    #[serde(default)]
    pub permissions: BTreeMap<String, PermissionRule>,

    /// Attribute checkers in use
    #[serde(default = "default_attributes")]
    pub attributes: BTreeMap<String, bool>,

    /// Wildcard behaviour
    #[serde(default)]
    pub wildcards: WildcardSettings,

    /// Informational permission groups
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,

    /// Super-admin bypass
    #[serde(default)]
    pub super_admin: SuperAdminSettings,

    /// Permissions for unauthenticated subjects
    #[serde(default)]
    pub guest: GuestSettings,

    /// Diagnostics
    #[serde(default)]
    pub debug: DebugSettings,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            roles: BTreeMap::new(),
            permissions: BTreeMap::new(),
            attributes: default_attributes(),
            wildcards: WildcardSettings::default(),
            groups: BTreeMap::new(),
            super_admin: SuperAdminSettings::default(),
            guest: GuestSettings::default(),
            debug: DebugSettings::default(),
        }
    }
}

fn default_attributes() -> BTreeMap<String, bool> {
    BUILTIN_ATTRIBUTES
        .iter()
        .map(|name| (name.to_string(), true))
        .collect()
}

/// Who holds a permission.
///
/// Either a symbol (`"*"` for every authenticated user) or a role list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrantSpec {
    /// A wildcard symbol
    Symbol(String),
    /// Explicit role names; empty means nobody
    Roles(Vec<String>),
}

/// A permission rule as written in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionRule {
    /// Roles plus attribute constraints
    Detailed {
        /// Who holds the permission
        roles: GrantSpec,
        /// Constraints keyed by attribute name
        #[serde(default)]
        attributes: BTreeMap<String, AttributeRule>,
    },
    /// Just the roles
    Grant(GrantSpec),
}

impl PermissionRule {
    /// Who holds the permission.
    pub fn grant(&self) -> &GrantSpec {
        match self {
            PermissionRule::Detailed { roles, .. } => roles,
            PermissionRule::Grant(spec) => spec,
        }
    }

    /// Configured attribute constraints.
    pub fn attributes(&self) -> Option<&BTreeMap<String, AttributeRule>> {
        match self {
            PermissionRule::Detailed { attributes, .. } => Some(attributes),
            PermissionRule::Grant(_) => None,
        }
    }
}

/// A configured attribute constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeRule {
    /// `true` requires the checker without a value; `false` disables it
    Enabled(bool),
    /// Requires the checker with this expected value
    Value(String),
}

/// Wildcard behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WildcardSettings {
    /// Whether the all-users symbol is honoured
    pub enabled: bool,

    /// Symbol meaning "every authenticated user"
    pub all_users_symbol: String,
}

impl Default for WildcardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            all_users_symbol: "*".to_string(),
        }
    }
}

/// Super-admin bypass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperAdminSettings {
    /// Whether super-admin roles are recognised at all
    pub enabled: bool,

    /// Roles considered super admin
    pub roles: Vec<String>,

    /// Whether super admins skip every check
    pub bypass_all: bool,
}

impl Default for SuperAdminSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            roles: vec!["superadmin".to_string()],
            bypass_all: true,
        }
    }
}

impl SuperAdminSettings {
    /// Check if the bypass is active.
    pub fn bypass_active(&self) -> bool {
        self.enabled && self.bypass_all
    }
}

/// Unauthenticated access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestSettings {
    /// Role name used for guests
    pub role: String,

    /// Permissions guests hold
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Default for GuestSettings {
    fn default() -> Self {
        Self {
            role: "guest".to_string(),
            permissions: Vec::new(),
        }
    }
}

/// Diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugSettings {
    /// Log every permission check at debug level
    #[serde(default)]
    pub log_permission_checks: bool,
}

/// Non-fatal configuration findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A permission is granted to a role that is not in the hierarchy
    UnknownRole {
        /// Permission naming the role.
        permission: String,
        /// The unknown role.
        role: String,
    },
    /// A super-admin role is not in the hierarchy
    UnknownSuperAdminRole(String),
    /// A group lists a permission with no rule
    UnknownGroupPermission {
        /// Group name.
        group: String,
        /// Permission that has no rule.
        permission: String,
    },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::UnknownRole { permission, role } => {
                write!(f, "permission {} is granted to unknown role {}", permission, role)
            }
            ConfigWarning::UnknownSuperAdminRole(role) => {
                write!(f, "super admin role {} is not in the role hierarchy", role)
            }
            ConfigWarning::UnknownGroupPermission { group, permission } => {
                write!(f, "group {} lists unknown permission {}", group, permission)
            }
        }
    }
}

impl PermissionsConfig {
    /// Parse a JSON document.
    pub fn from_json_str(s: &str) -> ConfigResult<Self> {
        serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse a JSON document from a reader.
    pub fn from_reader<R: Read>(reader: R) -> ConfigResult<Self> {
        serde_json::from_reader(reader).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a JSON document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    /// The configuration shipped with the crate.
    pub fn bundled() -> ConfigResult<Self> {
        Self::from_json_str(BUNDLED_CONFIG)
    }

    /// Check if `symbol` is the active all-users symbol.
    pub fn is_all_users_symbol(&self, symbol: &str) -> bool {
        self.wildcards.enabled && symbol == self.wildcards.all_users_symbol
    }

    /// Validate the configuration.
    ///
    /// Structural problems (cycles, malformed names, constraints on disabled
    /// attributes, symbols with wildcards off) are errors. References that
    /// merely look suspicious are returned as warnings and logged.
    pub fn validate(&self) -> ConfigResult<Vec<ConfigWarning>> {
        let graph = RoleGraph::new(&self.roles)?;
        let mut warnings = Vec::new();

        for (name, rule) in &self.permissions {
            Permission::parse(name)
                .ok_or_else(|| ConfigError::InvalidPermissionName(name.clone()))?;

            match rule.grant() {
                GrantSpec::Symbol(symbol) => {
                    if !self.is_all_users_symbol(symbol) {
                        return Err(ConfigError::WildcardDisabled {
                            permission: name.clone(),
                            symbol: symbol.clone(),
                        });
                    }
                }
                GrantSpec::Roles(roles) => {
                    for role in roles {
                        if self.is_all_users_symbol(role) {
                            continue;
                        }
                        validate_role_name(role)?;
                        if !graph.contains(role) {
                            warnings.push(ConfigWarning::UnknownRole {
                                permission: name.clone(),
                                role: role.clone(),
                            });
                        }
                    }
                }
            }

            if let Some(attributes) = rule.attributes() {
                for (attribute, setting) in attributes {
                    if *setting == AttributeRule::Enabled(false) {
                        continue;
                    }
                    if !self.attributes.get(attribute).copied().unwrap_or(false) {
                        return Err(ConfigError::UnknownAttribute {
                            permission: name.clone(),
                            attribute: attribute.clone(),
                        });
                    }
                }
            }
        }

        if self.super_admin.enabled {
            for role in &self.super_admin.roles {
                validate_role_name(role)?;
                if !graph.contains(role) {
                    warnings.push(ConfigWarning::UnknownSuperAdminRole(role.clone()));
                }
            }
        }

        let known: BTreeSet<&str> = self.permissions.keys().map(String::as_str).collect();
        for (group, permissions) in &self.groups {
            for permission in permissions {
                if !known.contains(permission.as_str()) {
                    warnings.push(ConfigWarning::UnknownGroupPermission {
                        group: group.clone(),
                        permission: permission.clone(),
                    });
                }
            }
        }

        for warning in &warnings {
            tracing::warn!(warning = %warning, "Permission configuration warning");
        }

        Ok(warnings)
    }
}
