//! End-to-end tests for the permission service.
//!
//! These tests run the service against the bundled portal configuration, an
//! in-memory user store and an in-memory event bus.
//!
//! Scenarios:
//! 1. Role-derived checks for stored users
//! 2. Admin overrides (grant, revoke, clear, expiry) and cache eviction
//! 3. Store failures resolving to deny
//! 4. Middleware gates (`authorize`, role levels)
//! 5. Events published for admin actions and denials
//! 6. Cross-service cache invalidation over the bus
//! 7. Cache consistency under concurrent admin changes, and its size bound

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;
use vireo_auth::{
    AuthError, AuthSettings, MemoryUserStore, PermissionService, RoleLevels, StoreError,
    StoreResult, UserRecord, UserStore,
};
use vireo_events::{EventBus, MemoryEventBus, PermissionEvent, Subscription};
use vireo_permissions::{
    CheckContext, Decision, DenyReason, GrantReason, PermissionResolver, PermissionsConfig,
    Subject, UserPermissionOverride,
};

/// Test fixture wiring a service to a store and a bus.
struct TestFixture {
    /// User store shared with the service.
    store: Arc<MemoryUserStore>,
    /// Event bus shared with the service.
    bus: Arc<MemoryEventBus>,
    /// Service under test.
    service: PermissionService<MemoryUserStore>,
}

impl TestFixture {
    fn new() -> Self {
        Self::with_settings(AuthSettings::default())
    }

    fn with_settings(settings: AuthSettings) -> Self {
        let store = Arc::new(MemoryUserStore::new());
        let bus = Arc::new(MemoryEventBus::new());
        let service = PermissionService::new(bundled_resolver(), store.clone(), settings)
            .with_event_bus(bus.clone());
        Self { store, bus, service }
    }

    /// Store a user holding `role` and return their ID.
    async fn user(&self, role: &str) -> Uuid {
        let user = UserRecord::new(format!("{}-user", role), format!("{}@example.com", role))
            .with_role(role);
        let id = user.id;
        self.store.insert_user(user).await;
        id
    }

    async fn subject(&self, user_id: Uuid) -> Subject {
        self.store
            .find_user(user_id)
            .await
            .unwrap()
            .unwrap()
            .to_subject()
    }
}

fn bundled_resolver() -> PermissionResolver {
    PermissionResolver::from_config(&PermissionsConfig::bundled().unwrap()).unwrap()
}

/// Receive the next permission event, failing after a short wait.
async fn next_event(sub: &mut Subscription) -> PermissionEvent {
    let event = tokio::time::timeout(Duration::from_millis(200), sub.recv())
        .await
        .expect("event arrives")
        .expect("bus open");
    PermissionEvent::from_event(&event).expect("permission event")
}

#[tokio::test]
async fn test_role_checks_for_stored_users() {
    let fx = TestFixture::new();
    let manager = fx.user("manager").await;
    let corridor = fx.user("corridor").await;
    let ctx = CheckContext::new();

    assert!(fx.service.can(manager, "users.create", &ctx).await);
    assert!(!fx.service.can(manager, "users.delete", &ctx).await);
    assert!(fx.service.can(corridor, "users.delete", &ctx).await);
    assert!(!fx.service.can(manager, "billing.refund", &ctx).await);
}

#[tokio::test]
async fn test_unknown_user_is_denied() {
    let fx = TestFixture::new();
    assert_eq!(
        fx.service
            .decide(Uuid::now_v7(), "projects.view", &CheckContext::new())
            .await,
        Decision::Denied(DenyReason::Unauthenticated)
    );
}

#[tokio::test]
async fn test_inactive_user_is_denied() {
    let fx = TestFixture::new();
    let mut user = UserRecord::new("former", "former@example.com").with_role("corridor");
    user.active = false;
    let id = user.id;
    fx.store.insert_user(user).await;

    assert!(!fx.service.can(id, "projects.view", &CheckContext::new()).await);
}

#[tokio::test]
async fn test_grant_override_evicts_cached_lookup() {
    let fx = TestFixture::new();
    let officer = fx.user("officer").await;
    let ctx = CheckContext::new();

    // Caches "no override"
    assert!(!fx.service.can(officer, "users.delete", &ctx).await);
    assert!(!fx.service.can(officer, "users.delete", &ctx).await);
    assert_eq!(fx.service.cache_stats().await.hits, 1);

    fx.service
        .grant_override(officer, "users.delete", None, None)
        .await
        .unwrap();
    assert_eq!(
        fx.service.decide(officer, "users.delete", &ctx).await,
        Decision::Granted(GrantReason::Override)
    );
}

#[tokio::test]
async fn test_revoke_and_clear_override() {
    let fx = TestFixture::new();
    let corridor = fx.user("corridor").await;
    let admin = Uuid::now_v7();
    let ctx = CheckContext::new();

    let ov = fx
        .service
        .revoke_override(corridor, "users.delete", None, Some(admin))
        .await
        .unwrap();
    assert!(!ov.granted);
    assert_eq!(ov.granted_by, Some(admin));
    assert!(!fx.service.can(corridor, "users.delete", &ctx).await);

    assert!(fx
        .service
        .clear_override(corridor, "users.delete", Some(admin))
        .await
        .unwrap());
    assert!(fx.service.can(corridor, "users.delete", &ctx).await);

    // Nothing left to clear
    assert!(!fx
        .service
        .clear_override(corridor, "users.delete", Some(admin))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_expired_override_is_ignored() {
    let fx = TestFixture::new();
    let officer = fx.user("officer").await;

    fx.service
        .grant_override(
            officer,
            "users.delete",
            Some(Utc::now() - ChronoDuration::minutes(1)),
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        fx.service
            .decide(officer, "users.delete", &CheckContext::new())
            .await,
        Decision::Denied(DenyReason::NoMatchingRole)
    );
}

#[tokio::test]
async fn test_override_validation() {
    let fx = TestFixture::new();
    let officer = fx.user("officer").await;

    let err = fx
        .service
        .grant_override(officer, "reports.*", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidPermission(_)));
    assert_eq!(err.status_code(), 400);

    let err = fx
        .service
        .grant_override(Uuid::now_v7(), "users.delete", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserNotFound(_)));
}

#[tokio::test]
async fn test_own_permission_through_service() {
    let fx = TestFixture::new();
    let officer = fx.user("officer").await;

    assert!(
        fx.service
            .can(officer, "projects.edit.own", &CheckContext::owned_by(officer))
            .await
    );
    assert!(
        !fx.service
            .can(officer, "projects.edit.own", &CheckContext::owned_by(Uuid::now_v7()))
            .await
    );
}

#[tokio::test]
async fn test_authorize_errors() {
    let fx = TestFixture::new();
    let manager = fx.subject(fx.user("manager").await).await;

    assert!(fx
        .service
        .authorize(&manager, "users.create", &CheckContext::new())
        .await
        .is_ok());
    assert!(fx
        .service
        .authorize_segments(&manager, &["users", "edit"], &CheckContext::new())
        .await
        .is_ok());

    let err = fx
        .service
        .authorize(&manager, "users.delete", &CheckContext::new())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
    assert_eq!(err.error_code(), "PERMISSION_DENIED");

    let err = fx
        .service
        .authorize(&Subject::guest(), "projects.view", &CheckContext::new())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn test_role_level_gate() {
    let fx = TestFixture::new();
    let manager = fx.subject(fx.user("manager").await).await;
    let levels = RoleLevels::default();

    assert!(levels.require(&manager, "officer").is_ok());
    assert!(matches!(
        levels.require(&manager, "corridor"),
        Err(AuthError::InsufficientRole { .. })
    ));
}

#[tokio::test]
async fn test_role_admin_publishes_events() {
    let fx = TestFixture::new();
    let user = fx.user("officer").await;
    let admin = Uuid::now_v7();
    let mut sub = fx.bus.subscribe("permissions.role.*").await.unwrap();

    assert!(fx.service.assign_role(user, "manager", Some(admin)).await.unwrap());
    assert_eq!(
        next_event(&mut sub).await,
        PermissionEvent::RoleAssigned {
            user_id: user,
            role: "manager".to_string(),
            assigned_by: Some(admin),
        }
    );
    assert!(fx.service.can(user, "users.create", &CheckContext::new()).await);

    assert!(fx.service.remove_role(user, "manager", Some(admin)).await.unwrap());
    assert!(matches!(
        next_event(&mut sub).await,
        PermissionEvent::RoleRemoved { .. }
    ));

    let err = fx
        .service
        .assign_role(user, "emperor", Some(admin))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UnknownRole(_)));
}

#[tokio::test]
async fn test_denials_are_audited() {
    let fx = TestFixture::new();
    let manager = fx.user("manager").await;
    let mut sub = fx.bus.subscribe("permissions.access.denied").await.unwrap();

    assert!(!fx.service.can(manager, "users.delete", &CheckContext::new()).await);
    match next_event(&mut sub).await {
        PermissionEvent::AccessDenied {
            user_id,
            permission,
            ..
        } => {
            assert_eq!(user_id, manager);
            assert_eq!(permission, "users.delete");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_denials_not_audited_when_disabled() {
    let fx = TestFixture::with_settings(AuthSettings {
        audit_enabled: false,
        ..AuthSettings::default()
    });
    let manager = fx.user("manager").await;

    assert!(!fx.service.can(manager, "users.delete", &CheckContext::new()).await);
    assert_eq!(fx.bus.stats().await.events_published, 0);
}

#[tokio::test]
async fn test_permissions_for_user() {
    let fx = TestFixture::new();
    let manager = fx.user("manager").await;
    fx.service
        .revoke_override(manager, "users.create", None, None)
        .await
        .unwrap();
    fx.service
        .grant_override(manager, "users.delete", None, None)
        .await
        .unwrap();

    let held = fx.service.permissions_for_user(manager).await.unwrap();
    assert!(held.contains("users.delete"));
    assert!(held.contains("geospatial.edit"));
    assert!(!held.contains("users.create"));
    assert!(!held.contains("system.maintenance"));
}

#[tokio::test]
async fn test_reload_swaps_resolver() {
    let fx = TestFixture::new();
    let officer = fx.user("officer").await;
    let mut sub = fx.bus.subscribe("permissions.config.*").await.unwrap();

    let config = PermissionsConfig::from_json_str(
        r#"{
            "roles": { "officer": [] },
            "permissions": { "users.delete": ["officer"] }
        }"#,
    )
    .unwrap();
    fx.service
        .reload(PermissionResolver::from_config(&config).unwrap())
        .await;

    assert!(fx.service.can(officer, "users.delete", &CheckContext::new()).await);
    assert!(matches!(
        next_event(&mut sub).await,
        PermissionEvent::ConfigReloaded { roles: 1, permissions: 1 }
    ));
}

#[tokio::test]
async fn test_disabled_cache_reads_through() {
    let fx = TestFixture::with_settings(AuthSettings {
        cache_enabled: false,
        ..AuthSettings::default()
    });
    let officer = fx.user("officer").await;

    for _ in 0..3 {
        assert!(!fx.service.can(officer, "users.delete", &CheckContext::new()).await);
    }
    let stats = fx.service.cache_stats().await;
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.size, 0);
}

#[tokio::test]
async fn test_invalidation_listener_syncs_services() {
    let store = Arc::new(MemoryUserStore::new());
    let bus = Arc::new(MemoryEventBus::new());

    let reader = PermissionService::new(bundled_resolver(), store.clone(), AuthSettings::default());
    let listener = reader.spawn_invalidation_listener(bus.clone()).await.unwrap();
    let writer = PermissionService::new(bundled_resolver(), store.clone(), AuthSettings::default())
        .with_event_bus(bus.clone());

    let user = UserRecord::new("amina", "amina@example.com").with_role("officer");
    let user_id = user.id;
    store.insert_user(user).await;

    // Reader caches "no override"
    assert!(!reader.can(user_id, "users.delete", &CheckContext::new()).await);

    writer
        .grant_override(user_id, "users.delete", None, None)
        .await
        .unwrap();

    let mut granted = false;
    for _ in 0..50 {
        if reader.can(user_id, "users.delete", &CheckContext::new()).await {
            granted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(granted, "reader never saw the grant");

    listener.abort();
}

/// Store whose override lookups always fail.
struct FailingStore {
    user: UserRecord,
}

#[async_trait]
impl UserStore for FailingStore {
    async fn roles_for_user(&self, _user_id: Uuid) -> StoreResult<BTreeSet<String>> {
        Ok(self.user.roles.clone())
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>> {
        Ok((user_id == self.user.id).then(|| self.user.clone()))
    }

    async fn find_override(
        &self,
        _user_id: Uuid,
        _permission: &str,
    ) -> StoreResult<Option<UserPermissionOverride>> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn overrides_for_user(&self, _user_id: Uuid) -> StoreResult<Vec<UserPermissionOverride>> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn save_override(&self, _ov: UserPermissionOverride) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn delete_override(&self, _user_id: Uuid, _permission: &str) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn assign_role(&self, _user_id: Uuid, _role: &str) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn remove_role(&self, _user_id: Uuid, _role: &str) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_store_failure_denies() {
    let corridor = UserRecord::new("kofi", "kofi@example.com").with_role("corridor");
    let superadmin = UserRecord::new("root", "root@example.com").with_role("superadmin");

    let service = PermissionService::new(
        bundled_resolver(),
        Arc::new(FailingStore {
            user: corridor.clone(),
        }),
        AuthSettings::default(),
    );

    assert_eq!(
        service
            .decide(corridor.id, "users.delete", &CheckContext::new())
            .await,
        Decision::Denied(DenyReason::LookupFailed)
    );

    // Super admins do not need the override lookup
    assert!(
        service
            .can_subject(&superadmin.to_subject(), "users.delete", &CheckContext::new())
            .await
    );

    let err = service
        .revoke_override(corridor.id, "users.delete", None, None)
        .await
        .unwrap_err();
    assert!(err.is_server_error());
}

/// Store whose next override read stops until released.
struct PausingStore {
    inner: MemoryUserStore,
    armed: AtomicBool,
    reached: Notify,
    resume: Notify,
}

impl PausingStore {
    fn new() -> Self {
        Self {
            inner: MemoryUserStore::new(),
            armed: AtomicBool::new(false),
            reached: Notify::new(),
            resume: Notify::new(),
        }
    }
}

#[async_trait]
impl UserStore for PausingStore {
    async fn roles_for_user(&self, user_id: Uuid) -> StoreResult<BTreeSet<String>> {
        self.inner.roles_for_user(user_id).await
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<UserRecord>> {
        self.inner.find_user(user_id).await
    }

    async fn find_override(
        &self,
        user_id: Uuid,
        permission: &str,
    ) -> StoreResult<Option<UserPermissionOverride>> {
        let found = self.inner.find_override(user_id, permission).await;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.resume.notified().await;
        }
        found
    }

    async fn overrides_for_user(&self, user_id: Uuid) -> StoreResult<Vec<UserPermissionOverride>> {
        self.inner.overrides_for_user(user_id).await
    }

    async fn save_override(&self, ov: UserPermissionOverride) -> StoreResult<()> {
        self.inner.save_override(ov).await
    }

    async fn delete_override(&self, user_id: Uuid, permission: &str) -> StoreResult<bool> {
        self.inner.delete_override(user_id, permission).await
    }

    async fn assign_role(&self, user_id: Uuid, role: &str) -> StoreResult<bool> {
        self.inner.assign_role(user_id, role).await
    }

    async fn remove_role(&self, user_id: Uuid, role: &str) -> StoreResult<bool> {
        self.inner.remove_role(user_id, role).await
    }
}

#[tokio::test]
async fn test_revoke_during_lookup_is_not_lost() {
    let store = Arc::new(PausingStore::new());
    let corridor = UserRecord::new("kofi", "kofi@example.com").with_role("corridor");
    let id = corridor.id;
    store.inner.insert_user(corridor).await;
    let service = PermissionService::new(bundled_resolver(), store.clone(), AuthSettings::default());

    // The check reads "no override", then the revoke lands before it caches
    store.armed.store(true, Ordering::SeqCst);
    let in_flight_ctx = CheckContext::new();
    let (in_flight, revoked) = tokio::join!(
        service.can(id, "users.delete", &in_flight_ctx),
        async {
            store.reached.notified().await;
            let result = service.revoke_override(id, "users.delete", None, None).await;
            store.resume.notify_one();
            result
        }
    );
    assert!(in_flight);
    revoked.unwrap();

    assert_eq!(
        service
            .decide(id, "users.delete", &CheckContext::new())
            .await,
        Decision::Denied(DenyReason::Override)
    );
    assert!(!service.can(id, "users.delete", &CheckContext::new()).await);
    assert_eq!(service.cache_stats().await.hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_stays_within_capacity() {
    let fx = TestFixture::with_settings(AuthSettings {
        cache_capacity: 100,
        ..AuthSettings::default()
    });
    let officer = fx.user("officer").await;
    let ctx = CheckContext::new();

    for i in 0..500 {
        assert!(!fx.service.can(officer, &format!("junk.p{}", i), &ctx).await);
    }
    assert_eq!(fx.service.cache_stats().await.size, 100);

    tokio::time::advance(Duration::from_secs(7200)).await;
    assert!(!fx.service.can(officer, "junk.last", &ctx).await);

    let stats = fx.service.cache_stats().await;
    assert_eq!(stats.size, 1);
    assert!(stats.evictions >= 500);
}

#[tokio::test]
async fn test_malformed_names_skip_the_cache() {
    let fx = TestFixture::new();
    let corridor = fx.user("corridor").await;

    for name in ["users..delete", "users.*.delete", "", "users. delete"] {
        assert_eq!(
            fx.service.decide(corridor, name, &CheckContext::new()).await,
            Decision::Denied(DenyReason::UnknownPermission)
        );
    }
    let stats = fx.service.cache_stats().await;
    assert_eq!(stats.size, 0);
    assert_eq!(stats.misses, 0);
}

#[tokio::test]
async fn test_roles_for_user_expands_hierarchy() {
    let fx = TestFixture::new();
    let corridor = fx.user("corridor").await;

    let roles = fx.service.roles_for_user(corridor).await.unwrap();
    assert!(roles.contains("corridor"));
    assert!(roles.contains("manager"));
    assert!(!roles.contains("superadmin"));

    assert!(fx.service.roles_for_user(Uuid::now_v7()).await.unwrap().is_empty());
}
