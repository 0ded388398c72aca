//! Permission service
//!
//! Ties the resolver to a [`UserStore`], caches override lookups, and turns
//! admin actions into store writes plus bus events. Checks never return an
//! error: anything that goes wrong while loading data is a deny.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;
use vireo_events::{EventBus, EventBusError, PermissionEvent};
use vireo_permissions::{
    CheckContext, Decision, DenyReason, Permission, PermissionResolver, Subject,
    UserPermissionOverride,
};

use crate::cache::{CacheStats, OverrideCache};
use crate::error::{AuthError, AuthResult};
use crate::settings::AuthSettings;
use crate::store::{UserRecord, UserStore};

/// Topic pattern for every permission event.
pub const PERMISSION_TOPICS: &str = "permissions.#";

/// Permission checks and administration over a user store.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use vireo_auth::{AuthSettings, MemoryUserStore, PermissionService, UserRecord};
/// use vireo_permissions::CheckContext;
///
/// async fn example() {
///     let settings = AuthSettings::from_env();
///     let resolver = settings.load_resolver().unwrap();
///     let store = Arc::new(MemoryUserStore::new());
///
///     let user = UserRecord::new("amina", "amina@example.com").with_role("manager");
///     let user_id = user.id;
///     store.insert_user(user).await;
///
///     let service = PermissionService::new(resolver, store, settings);
///     assert!(service.can(user_id, "users.create", &CheckContext::new()).await);
/// }
/// ```
pub struct PermissionService<S: UserStore> {
    resolver: RwLock<Arc<PermissionResolver>>,
    store: Arc<S>,
    cache: OverrideCache,
    bus: Option<Arc<dyn EventBus>>,
    settings: AuthSettings,
}

impl<S: UserStore> std::fmt::Debug for PermissionService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionService")
            .field("settings", &self.settings)
            .field("cache_enabled", &self.cache.is_enabled())
            .field("has_bus", &self.bus.is_some())
            .finish()
    }
}

impl<S: UserStore> PermissionService<S> {
    /// Create a service without an event bus.
    pub fn new(resolver: PermissionResolver, store: Arc<S>, settings: AuthSettings) -> Self {
        Self {
            resolver: RwLock::new(Arc::new(resolver)),
            store,
            cache: OverrideCache::with_capacity(settings.cache_ttl(), settings.cache_capacity),
            bus: None,
            settings,
        }
    }

    /// Publish admin actions (and, with auditing on, denials) on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Resolver currently in use.
    pub async fn resolver(&self) -> Arc<PermissionResolver> {
        self.resolver.read().await.clone()
    }

    /// User store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Settings in use.
    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Checks
    // ------------------------------------------------------------------

    /// Check if a stored user holds `permission`.
    pub async fn can(&self, user_id: Uuid, permission: &str, context: &CheckContext) -> bool {
        self.decide(user_id, permission, context).await.is_granted()
    }

    /// Decide `permission` for a stored user.
    ///
    /// Unknown users are treated as unauthenticated.
    pub async fn decide(&self, user_id: Uuid, permission: &str, context: &CheckContext) -> Decision {
        let user = match self.store.find_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::debug!(user_id = %user_id, permission = %permission, "Permission check for unknown user");
                return Decision::Denied(DenyReason::Unauthenticated);
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, permission = %permission, error = %e, "User lookup failed, denying");
                return Decision::Denied(DenyReason::LookupFailed);
            }
        };

        self.decide_subject(&user.to_subject(), permission, context).await
    }

    /// Check if an already-loaded subject holds `permission`.
    pub async fn can_subject(&self, subject: &Subject, permission: &str, context: &CheckContext) -> bool {
        self.decide_subject(subject, permission, context).await.is_granted()
    }

    /// Decide `permission` for an already-loaded subject.
    ///
    /// A preloaded override on the subject is used as is; otherwise the
    /// override is fetched through the cache.
    pub async fn decide_subject(
        &self,
        subject: &Subject,
        permission: &str,
        context: &CheckContext,
    ) -> Decision {
        let resolver = self.resolver().await;
        let now = Utc::now();

        // Malformed names can never be granted, so they never reach the store
        let needs_lookup = subject.authenticated
            && !resolver.is_super_admin(subject)
            && Permission::parse(permission).is_some();

        let decision = if !needs_lookup {
            resolver.decide_with_override(subject, permission, context, None, now)
        } else if let Some(ov) = subject.active_override(permission, now) {
            resolver.decide_with_override(subject, permission, context, Some(ov), now)
        } else {
            match self.lookup_override(subject.id, permission).await {
                Ok(ov) => resolver.decide_with_override(subject, permission, context, ov.as_ref(), now),
                Err(e) => {
                    tracing::warn!(
                        user_id = %subject.id,
                        permission = %permission,
                        error = %e,
                        "Override lookup failed, denying"
                    );
                    Decision::Denied(DenyReason::LookupFailed)
                }
            }
        };

        if decision.is_denied() && subject.authenticated && self.settings.audit_enabled {
            self.publish(PermissionEvent::AccessDenied {
                user_id: subject.id,
                permission: permission.to_string(),
                reason: decision.to_string(),
            })
            .await;
        }

        decision
    }

    /// Gate a request on `permission`.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for guests denied the permission,
    /// `PermissionDenied` for everyone else denied it
    pub async fn authorize(
        &self,
        subject: &Subject,
        permission: &str,
        context: &CheckContext,
    ) -> AuthResult<()> {
        match self.decide_subject(subject, permission, context).await {
            Decision::Granted(_) => Ok(()),
            Decision::Denied(_) if !subject.authenticated => Err(AuthError::Unauthenticated),
            Decision::Denied(_) => Err(AuthError::PermissionDenied {
                permission: permission.to_string(),
            }),
        }
    }

    /// Gate a request on a permission built from segments.
    ///
    /// `["users", "edit"]` checks `users.edit`.
    pub async fn authorize_segments(
        &self,
        subject: &Subject,
        segments: &[&str],
        context: &CheckContext,
    ) -> AuthResult<()> {
        self.authorize(subject, &segments.join("."), context).await
    }

    /// Exact permission names a stored user holds through roles and
    /// overrides, before any resource constraint.
    pub async fn permissions_for_user(&self, user_id: Uuid) -> AuthResult<BTreeSet<String>> {
        let user = self.require_user(user_id).await?;
        let mut subject = user.to_subject();
        subject.overrides = self.store.overrides_for_user(user_id).await?;
        Ok(self.resolver().await.permissions_for(&subject))
    }

    async fn lookup_override(
        &self,
        user_id: Uuid,
        permission: &str,
    ) -> AuthResult<Option<UserPermissionOverride>> {
        let generation = self.cache.generation();
        if let Some(cached) = self.cache.get(user_id, permission).await {
            return Ok(cached);
        }

        let ov = self.store.find_override(user_id, permission).await?;
        if !self
            .cache
            .put_if_current(user_id, permission, ov.clone(), generation)
            .await
        {
            tracing::debug!(user_id = %user_id, permission = %permission, "Override lookup raced an eviction, not cached");
        }
        Ok(ov)
    }

    /// Roles a user holds directly plus every role they inherit.
    pub async fn roles_for_user(&self, user_id: Uuid) -> AuthResult<BTreeSet<String>> {
        let direct = self.store.roles_for_user(user_id).await?;
        Ok(self.resolver().await.graph().expand(&direct))
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Grant `permission` to a user directly.
    ///
    /// # Arguments
    ///
    /// * `user_id` - User receiving the grant
    /// * `permission` - Exact permission name
    /// * `expires_at` - When the grant lapses, if ever
    /// * `granted_by` - Administrator performing the action
    pub async fn grant_override(
        &self,
        user_id: Uuid,
        permission: &str,
        expires_at: Option<DateTime<Utc>>,
        granted_by: Option<Uuid>,
    ) -> AuthResult<UserPermissionOverride> {
        let ov = self
            .save_override(UserPermissionOverride::grant(user_id, permission), expires_at, granted_by)
            .await?;

        tracing::info!(user_id = %user_id, permission = %permission, "Permission granted");
        self.publish(PermissionEvent::OverrideGranted {
            user_id,
            permission: ov.permission.clone(),
            expires_at: ov.expires_at,
            granted_by: ov.granted_by,
        })
        .await;

        Ok(ov)
    }

    /// Revoke `permission` from a user directly, whatever their roles say.
    pub async fn revoke_override(
        &self,
        user_id: Uuid,
        permission: &str,
        expires_at: Option<DateTime<Utc>>,
        granted_by: Option<Uuid>,
    ) -> AuthResult<UserPermissionOverride> {
        let ov = self
            .save_override(UserPermissionOverride::revoke(user_id, permission), expires_at, granted_by)
            .await?;

        tracing::info!(user_id = %user_id, permission = %permission, "Permission revoked");
        self.publish(PermissionEvent::OverrideRevoked {
            user_id,
            permission: ov.permission.clone(),
            expires_at: ov.expires_at,
            granted_by: ov.granted_by,
        })
        .await;

        Ok(ov)
    }

    async fn save_override(
        &self,
        mut ov: UserPermissionOverride,
        expires_at: Option<DateTime<Utc>>,
        granted_by: Option<Uuid>,
    ) -> AuthResult<UserPermissionOverride> {
        let parsed = Permission::parse(&ov.permission)
            .filter(|p| !p.is_pattern())
            .ok_or_else(|| AuthError::InvalidPermission(ov.permission.clone()))?;
        self.require_user(ov.user_id).await?;

        ov.permission = parsed.to_string();
        ov.expires_at = expires_at;
        ov.granted_by = granted_by;

        self.store.save_override(ov.clone()).await?;
        self.cache.invalidate(ov.user_id, &ov.permission).await;
        Ok(ov)
    }

    /// Remove a direct grant or revocation.
    ///
    /// # Returns
    ///
    /// `true` if an override existed
    pub async fn clear_override(
        &self,
        user_id: Uuid,
        permission: &str,
        cleared_by: Option<Uuid>,
    ) -> AuthResult<bool> {
        let removed = self.store.delete_override(user_id, permission).await?;
        self.cache.invalidate(user_id, permission).await;

        if removed {
            tracing::info!(user_id = %user_id, permission = %permission, "Permission override cleared");
            self.publish(PermissionEvent::OverrideCleared {
                user_id,
                permission: permission.to_string(),
                cleared_by,
            })
            .await;
        }

        Ok(removed)
    }

    /// Assign a role from the hierarchy to a user.
    ///
    /// # Returns
    ///
    /// `true` if the user did not already hold the role
    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role: &str,
        assigned_by: Option<Uuid>,
    ) -> AuthResult<bool> {
        if !self.resolver().await.graph().contains(role) {
            return Err(AuthError::UnknownRole(role.to_string()));
        }
        self.require_user(user_id).await?;

        let added = self.store.assign_role(user_id, role).await?;
        if added {
            tracing::info!(user_id = %user_id, role = %role, "Role assigned");
            self.publish(PermissionEvent::RoleAssigned {
                user_id,
                role: role.to_string(),
                assigned_by,
            })
            .await;
        }

        Ok(added)
    }

    /// Remove a role from a user.
    ///
    /// # Returns
    ///
    /// `true` if the user held the role
    pub async fn remove_role(
        &self,
        user_id: Uuid,
        role: &str,
        removed_by: Option<Uuid>,
    ) -> AuthResult<bool> {
        self.require_user(user_id).await?;

        let removed = self.store.remove_role(user_id, role).await?;
        if removed {
            tracing::info!(user_id = %user_id, role = %role, "Role removed");
            self.publish(PermissionEvent::RoleRemoved {
                user_id,
                role: role.to_string(),
                removed_by,
            })
            .await;
        }

        Ok(removed)
    }

    /// Swap in a new resolver, e.g. after the configuration file changed.
    pub async fn reload(&self, resolver: PermissionResolver) {
        let roles = resolver.graph().len();
        let permissions = resolver.index().len();

        *self.resolver.write().await = Arc::new(resolver);
        self.cache.clear().await;

        tracing::info!(roles, permissions, "Permission configuration reloaded");
        self.publish(PermissionEvent::ConfigReloaded { roles, permissions })
            .await;
    }

    async fn require_user(&self, user_id: Uuid) -> AuthResult<UserRecord> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound(user_id))
    }

    async fn publish(&self, event: PermissionEvent) {
        let Some(bus) = &self.bus else {
            return;
        };
        if let Err(e) = bus.publish(event.to_event()).await {
            tracing::warn!(error = %e, event_type = event.event_type(), "Failed to publish permission event");
        }
    }

    // ------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------

    /// Evict every cached lookup for a user.
    pub async fn invalidate_user(&self, user_id: Uuid) {
        self.cache.invalidate_user(user_id).await;
    }

    /// Evict every cached lookup.
    pub async fn invalidate_all(&self) {
        self.cache.clear().await;
    }

    /// Override cache statistics.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Evict cached lookups whenever a permission event arrives on `bus`.
    ///
    /// Keeps this process consistent with admin actions taken by others
    /// sharing the bus. The task ends when the bus closes.
    pub async fn spawn_invalidation_listener(
        &self,
        bus: Arc<dyn EventBus>,
    ) -> AuthResult<JoinHandle<()>> {
        let mut subscription = bus
            .subscribe(PERMISSION_TOPICS)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        let cache = self.cache.clone();

        Ok(tokio::spawn(async move {
            loop {
                match subscription.recv().await {
                    Ok(event) => match PermissionEvent::from_event(&event) {
                        Some(PermissionEvent::ConfigReloaded { .. }) => cache.clear().await,
                        Some(perm_event) if perm_event.changes_access() => {
                            if let Some(user_id) = perm_event.user_id() {
                                cache.invalidate_user(user_id).await;
                            }
                        }
                        _ => {}
                    },
                    Err(EventBusError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Invalidation listener lagged, clearing override cache");
                        cache.clear().await;
                    }
                    Err(_) => break,
                }
            }
        }))
    }
}
