//! Permission service settings
//!
//! Loaded from environment variables with defaults, mirroring the
//! `permissions` block of the portal's application settings.

use std::path::PathBuf;
use std::time::Duration;

use vireo_permissions::{PermissionResolver, PermissionsConfig};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::error::AuthResult;

/// Settings for [`crate::PermissionService`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSettings {
    /// Cache override lookups
    pub cache_enabled: bool,

    /// How long a cached lookup is trusted, in seconds
    pub cache_ttl_secs: u64,

    /// Most lookups held at once
    pub cache_capacity: usize,

    /// Publish admin actions and denials on the event bus
    pub audit_enabled: bool,

    /// Log every permission decision at debug level
    pub log_checks: bool,

    /// Permission configuration file; the bundled one when unset
    pub config_path: Option<PathBuf>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_secs: 3600,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            audit_enabled: true,
            log_checks: false,
            config_path: None,
        }
    }
}

impl AuthSettings {
    /// Load settings from environment variables.
    ///
    /// Variables:
    /// - `PERMISSION_CACHE_ENABLED`
    /// - `PERMISSION_CACHE_TTL_SECS`
    /// - `PERMISSION_CACHE_CAPACITY`
    /// - `PERMISSION_AUDIT_ENABLED`
    /// - `PERMISSION_LOG_CHECKS`
    /// - `PERMISSIONS_CONFIG_PATH`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        Self {
            cache_enabled: lookup("PERMISSION_CACHE_ENABLED")
                .map(|s| parse_flag(&s))
                .unwrap_or(default.cache_enabled),
            cache_ttl_secs: lookup("PERMISSION_CACHE_TTL_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default.cache_ttl_secs),
            cache_capacity: lookup("PERMISSION_CACHE_CAPACITY")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default.cache_capacity),
            audit_enabled: lookup("PERMISSION_AUDIT_ENABLED")
                .map(|s| parse_flag(&s))
                .unwrap_or(default.audit_enabled),
            log_checks: lookup("PERMISSION_LOG_CHECKS")
                .map(|s| parse_flag(&s))
                .unwrap_or(default.log_checks),
            config_path: lookup("PERMISSIONS_CONFIG_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Effective cache TTL; zero when caching is off.
    pub fn cache_ttl(&self) -> Duration {
        if self.cache_enabled {
            Duration::from_secs(self.cache_ttl_secs)
        } else {
            Duration::ZERO
        }
    }

    /// Read the permission configuration these settings point at.
    pub fn load_config(&self) -> AuthResult<PermissionsConfig> {
        let mut config = match &self.config_path {
            Some(path) => PermissionsConfig::from_path(path)?,
            None => PermissionsConfig::bundled()?,
        };
        if self.log_checks {
            config.debug.log_permission_checks = true;
        }
        Ok(config)
    }

    /// Read the configuration and build the resolver from it.
    pub fn load_resolver(&self) -> AuthResult<PermissionResolver> {
        let config = self.load_config()?;
        Ok(PermissionResolver::from_config(&config)?)
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no" | "off" | ""
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = AuthSettings::from_lookup(lookup(&[]));
        assert_eq!(settings, AuthSettings::default());
        assert_eq!(settings.cache_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let settings = AuthSettings::from_lookup(lookup(&[
            ("PERMISSION_CACHE_ENABLED", "false"),
            ("PERMISSION_CACHE_TTL_SECS", "120"),
            ("PERMISSION_CACHE_CAPACITY", "500"),
            ("PERMISSION_AUDIT_ENABLED", "0"),
            ("PERMISSION_LOG_CHECKS", "true"),
            ("PERMISSIONS_CONFIG_PATH", "/etc/vireo/permissions.json"),
        ]));

        assert!(!settings.cache_enabled);
        assert_eq!(settings.cache_ttl_secs, 120);
        assert_eq!(settings.cache_capacity, 500);
        assert_eq!(settings.cache_ttl(), Duration::ZERO);
        assert!(!settings.audit_enabled);
        assert!(settings.log_checks);
        assert_eq!(
            settings.config_path,
            Some(PathBuf::from("/etc/vireo/permissions.json"))
        );
    }

    #[test]
    fn test_bad_ttl_falls_back() {
        let settings =
            AuthSettings::from_lookup(lookup(&[("PERMISSION_CACHE_TTL_SECS", "an hour")]));
        assert_eq!(settings.cache_ttl_secs, 3600);
    }

    #[test]
    fn test_load_bundled_resolver() {
        let settings = AuthSettings {
            log_checks: true,
            ..AuthSettings::default()
        };
        assert!(settings.load_config().unwrap().debug.log_permission_checks);
        let resolver = settings.load_resolver().unwrap();
        assert!(resolver.index().contains("users.delete"));
    }

    #[test]
    fn test_missing_config_file() {
        let settings = AuthSettings {
            config_path: Some(PathBuf::from("/nonexistent/permissions.json")),
            ..AuthSettings::default()
        };
        assert_eq!(settings.load_resolver().unwrap_err().status_code(), 500);
    }
}
