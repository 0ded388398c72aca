//! User store port
//!
//! Permission checks need a user's roles and any override for the permission
//! being checked. [`UserStore`] is the narrow interface to wherever those
//! live; [`MemoryUserStore`] keeps them in process for tests and small
//! deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use vireo_permissions::{Subject, UserPermissionOverride};

use crate::error::StoreResult;

/// A user as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// User ID
    pub id: Uuid,

    /// Login name
    pub username: String,

    /// Email address
    pub email: String,

    /// Directly-assigned roles
    #[serde(default)]
    pub roles: BTreeSet<String>,

    /// Group memberships
    #[serde(default)]
    pub groups: BTreeSet<String>,

    /// Profile attributes (department, location, ...)
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// Whether the account may sign in
    pub active: bool,
}

impl UserRecord {
    /// Create an active user with no roles.
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            username: username.into(),
            email: email.into(),
            roles: BTreeSet::new(),
            groups: BTreeSet::new(),
            attributes: HashMap::new(),
            active: true,
        }
    }

    /// Add a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Add a group membership.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    /// Set a profile attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Build the subject permission checks run against.
    ///
    /// Inactive accounts become unauthenticated subjects.
    pub fn to_subject(&self) -> Subject {
        let mut subject = Subject::new(self.id)
            .with_username(self.username.clone())
            .with_roles(self.roles.iter().cloned());
        subject.groups = self.groups.clone();
        subject.attributes = self.attributes.clone();
        subject.authenticated = self.active;
        subject
    }
}

/// Storage for users, their roles and their permission overrides.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Directly-assigned roles of a user (empty if unknown).
    ///
    /// Checks load the whole record through [`find_user`](Self::find_user);
    /// this backs [`PermissionService::roles_for_user`](crate::PermissionService::roles_for_user)
    /// for callers that only need the role set.
    async fn roles_for_user(&self, user_id: Uuid) -> StoreResult<BTreeSet<String>>;

    /// Load a user.
    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>>;

    /// Override for exactly this user and permission, expired or not.
    async fn find_override(
        &self,
        user_id: Uuid,
        permission: &str,
    ) -> StoreResult<Option<UserPermissionOverride>>;

    /// Every override recorded for a user.
    async fn overrides_for_user(&self, user_id: Uuid) -> StoreResult<Vec<UserPermissionOverride>>;

    /// Insert or replace the override for its user and permission.
    async fn save_override(&self, ov: UserPermissionOverride) -> StoreResult<()>;

    /// Remove an override.
    ///
    /// # Returns
    ///
    /// `true` if one existed
    async fn delete_override(&self, user_id: Uuid, permission: &str) -> StoreResult<bool>;

    /// Add a role to a user.
    ///
    /// # Returns
    ///
    /// `true` if the user exists and did not already hold the role
    async fn assign_role(&self, user_id: Uuid, role: &str) -> StoreResult<bool>;

    /// Remove a role from a user.
    ///
    /// # Returns
    ///
    /// `true` if the user held the role
    async fn remove_role(&self, user_id: Uuid, role: &str) -> StoreResult<bool>;
}

/// In-memory user store.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, UserRecord>>>,
    overrides: Arc<RwLock<HashMap<(Uuid, String), UserPermissionOverride>>>,
}

impl MemoryUserStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub async fn insert_user(&self, user: UserRecord) {
        self.users.write().await.insert(user.id, user);
    }

    /// Remove a user and their overrides.
    pub async fn remove_user(&self, user_id: Uuid) -> Option<UserRecord> {
        self.overrides
            .write()
            .await
            .retain(|(owner, _), _| *owner != user_id);
        self.users.write().await.remove(&user_id)
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn roles_for_user(&self, user_id: Uuid) -> StoreResult<BTreeSet<String>> {
        Ok(self
            .users
            .read()
            .await
            .get(&user_id)
            .map(|user| user.roles.clone())
            .unwrap_or_default())
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn find_override(
        &self,
        user_id: Uuid,
        permission: &str,
    ) -> StoreResult<Option<UserPermissionOverride>> {
        Ok(self
            .overrides
            .read()
            .await
            .get(&(user_id, permission.to_string()))
            .cloned())
    }

    async fn overrides_for_user(&self, user_id: Uuid) -> StoreResult<Vec<UserPermissionOverride>> {
        let mut found: Vec<UserPermissionOverride> = self
            .overrides
            .read()
            .await
            .values()
            .filter(|ov| ov.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.permission.cmp(&b.permission));
        Ok(found)
    }

    async fn save_override(&self, ov: UserPermissionOverride) -> StoreResult<()> {
        self.overrides
            .write()
            .await
            .insert((ov.user_id, ov.permission.clone()), ov);
        Ok(())
    }

    async fn delete_override(&self, user_id: Uuid, permission: &str) -> StoreResult<bool> {
        Ok(self
            .overrides
            .write()
            .await
            .remove(&(user_id, permission.to_string()))
            .is_some())
    }

    async fn assign_role(&self, user_id: Uuid, role: &str) -> StoreResult<bool> {
        Ok(self
            .users
            .write()
            .await
            .get_mut(&user_id)
            .map(|user| user.roles.insert(role.to_string()))
            .unwrap_or(false))
    }

    async fn remove_role(&self, user_id: Uuid, role: &str) -> StoreResult<bool> {
        Ok(self
            .users
            .write()
            .await
            .get_mut(&user_id)
            .map(|user| user.roles.remove(role))
            .unwrap_or(false))
    }
}
