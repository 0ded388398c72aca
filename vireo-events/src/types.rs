//! Event types
//!
//! This module defines the event envelope and the permission events
//! published when access control state changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Source name for permission events.
pub const PERMISSIONS_SOURCE: &str = "permissions";

/// Event envelope.
///
/// All events are wrapped in this envelope which provides metadata
/// for routing, tracing, and processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: Uuid,

    /// Event type (e.g., "override.granted", "role.assigned")
    pub event_type: String,

    /// Publishing component
    pub source: String,

    /// Timestamp when event was created
    pub timestamp: DateTime<Utc>,

    /// User the event is about
    pub user_id: Option<Uuid>,

    /// Correlation ID for tracing
    pub correlation_id: Option<String>,

    /// Event version for schema evolution
    pub version: u32,

    /// Event payload
    pub payload: serde_json::Value,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Event {
    /// Create a new event.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The event type string
    /// * `source` - The publishing component
    /// * `payload` - The event payload
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            source: source.into(),
            timestamp: Utc::now(),
            user_id: None,
            correlation_id: None,
            version: 1,
            payload,
            metadata: HashMap::new(),
        }
    }

    /// Set user context.
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Get the topic for this event.
    ///
    /// Topics are structured as: `{source}.{event_type}`
    pub fn topic(&self) -> String {
        format!("{}.{}", self.source, self.event_type)
    }

    /// Parse the payload into a specific type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

// ============================================================================
// Permission Events
// ============================================================================

/// Access control changes and notable decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PermissionEvent {
    /// A permission was granted to a user directly
    OverrideGranted {
        user_id: Uuid,
        permission: String,
        expires_at: Option<DateTime<Utc>>,
        granted_by: Option<Uuid>,
    },
    /// A permission was revoked from a user directly
    OverrideRevoked {
        user_id: Uuid,
        permission: String,
        expires_at: Option<DateTime<Utc>>,
        granted_by: Option<Uuid>,
    },
    /// A direct grant or revocation was removed
    OverrideCleared {
        user_id: Uuid,
        permission: String,
        cleared_by: Option<Uuid>,
    },
    /// A role was assigned to a user
    RoleAssigned {
        user_id: Uuid,
        role: String,
        assigned_by: Option<Uuid>,
    },
    /// A role was removed from a user
    RoleRemoved {
        user_id: Uuid,
        role: String,
        removed_by: Option<Uuid>,
    },
    /// Permission configuration was reloaded
    ConfigReloaded { roles: usize, permissions: usize },
    /// A permission check failed
    AccessDenied {
        user_id: Uuid,
        permission: String,
        reason: String,
    },
}

impl PermissionEvent {
    /// Event type string for this variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            PermissionEvent::OverrideGranted { .. } => "override.granted",
            PermissionEvent::OverrideRevoked { .. } => "override.revoked",
            PermissionEvent::OverrideCleared { .. } => "override.cleared",
            PermissionEvent::RoleAssigned { .. } => "role.assigned",
            PermissionEvent::RoleRemoved { .. } => "role.removed",
            PermissionEvent::ConfigReloaded { .. } => "config.reloaded",
            PermissionEvent::AccessDenied { .. } => "access.denied",
        }
    }

    /// User the event is about, if any.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            PermissionEvent::OverrideGranted { user_id, .. }
            | PermissionEvent::OverrideRevoked { user_id, .. }
            | PermissionEvent::OverrideCleared { user_id, .. }
            | PermissionEvent::RoleAssigned { user_id, .. }
            | PermissionEvent::RoleRemoved { user_id, .. }
            | PermissionEvent::AccessDenied { user_id, .. } => Some(*user_id),
            PermissionEvent::ConfigReloaded { .. } => None,
        }
    }

    /// Check if the event changes what some user may do.
    pub fn changes_access(&self) -> bool {
        !matches!(self, PermissionEvent::AccessDenied { .. })
    }

    /// Convert to generic event.
    pub fn to_event(&self) -> Event {
        let payload = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        let event = Event::new(self.event_type(), PERMISSIONS_SOURCE, payload);
        match self.user_id() {
            Some(user_id) => event.with_user(user_id),
            None => event,
        }
    }

    /// Recover a permission event from a generic one.
    pub fn from_event(event: &Event) -> Option<Self> {
        if event.source != PERMISSIONS_SOURCE {
            return None;
        }
        event.parse_payload().ok()
    }
}
