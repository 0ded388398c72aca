//! # Vireo Auth
//!
//! Request-time authorization for the Vireo portal: permission checks
//! against stored users, role gates, and the admin actions that change
//! what a user may do.
//!
//! ## Overview
//!
//! The vireo-auth crate handles:
//! - **User Store**: The port to wherever users, roles and overrides live
//! - **Permission Service**: Checks, `authorize` gates and admin actions
//! - **Override Cache**: TTL cache of per-check override lookups
//! - **Role Levels**: Minimum-role gates (`officer < manager < corridor <
//!   superadmin`)
//! - **Settings**: Environment-driven configuration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vireo_auth::{AuthSettings, MemoryUserStore, PermissionService, UserRecord};
//! use vireo_events::MemoryEventBus;
//! use vireo_permissions::CheckContext;
//!
//! async fn example() {
//!     let settings = AuthSettings::from_env();
//!     let resolver = settings.load_resolver().unwrap();
//!     let store = Arc::new(MemoryUserStore::new());
//!     let bus = Arc::new(MemoryEventBus::new());
//!
//!     let service = PermissionService::new(resolver, store.clone(), settings)
//!         .with_event_bus(bus.clone());
//!     service.spawn_invalidation_listener(bus).await.unwrap();
//!
//!     let user = UserRecord::new("kofi", "kofi@example.com").with_role("officer");
//!     let user_id = user.id;
//!     store.insert_user(user).await;
//!
//!     // Middleware gate
//!     let subject = store_subject(&service, user_id).await;
//!     service
//!         .authorize(&subject, "projects.edit.own", &CheckContext::owned_by(user_id))
//!         .await
//!         .unwrap();
//!
//!     // Admin action
//!     service.grant_override(user_id, "users.delete", None, None).await.unwrap();
//!     assert!(service.can(user_id, "users.delete", &CheckContext::new()).await);
//! }
//!
//! async fn store_subject(
//!     service: &PermissionService<MemoryUserStore>,
//!     user_id: uuid::Uuid,
//! ) -> vireo_permissions::Subject {
//!     use vireo_auth::UserStore;
//!     service.store().find_user(user_id).await.unwrap().unwrap().to_subject()
//! }
//! ```
//!
//! ## Failure Semantics
//!
//! Checks return `bool` or a `Decision`, never an error. A store failure
//! during a check is logged and treated as a deny.

pub mod cache;
pub mod error;
pub mod levels;
pub mod service;
pub mod settings;
pub mod store;

// Re-export main types
pub use cache::{CacheStats, OverrideCache, DEFAULT_CACHE_CAPACITY};
pub use error::{AuthError, AuthResult, StoreError, StoreResult};
pub use levels::RoleLevels;
pub use service::{PermissionService, PERMISSION_TOPICS};
pub use settings::AuthSettings;
pub use store::{MemoryUserStore, UserRecord, UserStore};
