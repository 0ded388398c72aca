//! # Vireo Events
//!
//! This crate provides an in-process event bus for Vireo, used to announce
//! access control changes to every component holding permission state.
//!
//! ## Overview
//!
//! The vireo-events crate handles:
//! - **Event Envelope**: Routing metadata around a JSON payload
//! - **Event Bus**: Publish/subscribe messaging
//! - **Permission Events**: Override, role and configuration changes
//! - **Event Handlers**: Async event processing
//!
//! ## Usage
//!
//! ### Publishing Events
//!
//! ```rust,no_run
//! use vireo_events::{EventBus, MemoryEventBus, PermissionEvent};
//! use uuid::Uuid;
//!
//! async fn publish_example() {
//!     let bus = MemoryEventBus::new();
//!
//!     let event = PermissionEvent::RoleAssigned {
//!         user_id: Uuid::now_v7(),
//!         role: "manager".to_string(),
//!         assigned_by: None,
//!     };
//!
//!     bus.publish(event.to_event()).await.unwrap();
//! }
//! ```
//!
//! ### Subscribing to Events
//!
//! ```rust,no_run
//! use vireo_events::{EventBus, MemoryEventBus};
//!
//! async fn subscribe_example() {
//!     let bus = MemoryEventBus::new();
//!
//!     // Every override change
//!     let mut sub = bus.subscribe("permissions.override.*").await.unwrap();
//!
//!     while let Ok(event) = sub.recv().await {
//!         println!("Received: {}", event.event_type);
//!     }
//! }
//! ```
//!
//! ## Topic Patterns
//!
//! Topics are structured as `{source}.{event_type}`:
//! - `permissions.override.granted` - Specific event
//! - `permissions.override.*` - All override events
//! - `permissions.#` - All permission events
//! - `#` - All events
//!
//! Wildcards:
//! - `*` matches exactly one segment
//! - `#` matches zero or more segments

pub mod bus;
pub mod types;

// Re-export main types
pub use bus::{
    topic_matches, EventBus, EventBusError, EventBusResult, EventBusStats, EventHandler,
    MemoryEventBus, Subscription,
};
pub use types::{Event, PermissionEvent, PERMISSIONS_SOURCE};
