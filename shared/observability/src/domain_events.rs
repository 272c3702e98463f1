//! Domain event logging for StrategyForge services.
//!
//! Provides structured logging for business domain events with consistent schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a domain operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    Success,
    Failure,
}

impl std::fmt::Display for OperationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Categories of domain events for filtering and routing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Auth,
    Notification,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::Notification => write!(f, "notification"),
        }
    }
}

/// A structured domain event for logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    /// Specific event type (e.g., "login", "magic_link_sent")
    pub event_type: String,
    /// Entity type being operated on (e.g., "account")
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub result: OperationResult,
    pub duration_ms: Option<u64>,
    /// Error message if failed
    pub error: Option<String>,
    /// Service that emitted the event
    pub service: String,
    pub metadata: Option<serde_json::Value>,
}

impl DomainEvent {
    /// Create a new domain event builder
    pub fn new(service: impl Into<String>, category: EventCategory, event_type: impl Into<String>) -> DomainEventBuilder {
        DomainEventBuilder {
            service: service.into(),
            category,
            event_type: event_type.into(),
            entity_type: None,
            entity_id: None,
            result: OperationResult::Success,
            duration_ms: None,
            error: None,
            metadata: None,
        }
    }
}

/// Builder for constructing domain events
pub struct DomainEventBuilder {
    service: String,
    category: EventCategory,
    event_type: String,
    entity_type: Option<String>,
    entity_id: Option<String>,
    result: OperationResult,
    duration_ms: Option<u64>,
    error: Option<String>,
    metadata: Option<serde_json::Value>,
}

impl DomainEventBuilder {
    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn success(mut self) -> Self {
        self.result = OperationResult::Success;
        self
    }

    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.result = OperationResult::Failure;
        self.error = Some(error.into());
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Build and emit the event as a log.
    ///
    /// Failures are logged at `warn`: in this domain they are mostly user
    /// errors (bad password, stale link), not service faults.
    pub fn emit(self) {
        let event = self.build();
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());

        match event.result {
            OperationResult::Success => tracing::info!(
                target: "domain_event",
                category = %event.category,
                event_type = %event.event_type,
                result = "success",
                "DomainEvent: {}", json
            ),
            OperationResult::Failure => tracing::warn!(
                target: "domain_event",
                category = %event.category,
                event_type = %event.event_type,
                result = "failure",
                error = ?event.error,
                "DomainEvent: {}", json
            ),
        }
    }

    /// Build the event without emitting
    pub fn build(self) -> DomainEvent {
        DomainEvent {
            timestamp: Utc::now(),
            category: self.category,
            event_type: self.event_type,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            result: self.result,
            duration_ms: self.duration_ms,
            error: self.error,
            service: self.service,
            metadata: self.metadata,
        }
    }
}

/// Log an authentication outcome (register, login, magic link, refresh, logout).
pub fn log_auth_event(service: &str, event_type: &str, account_id: Option<&str>, success: bool, error: Option<&str>) {
    let mut builder = DomainEvent::new(service, EventCategory::Auth, event_type);

    if let Some(id) = account_id {
        builder = builder.entity("account", id);
    }

    if success {
        builder = builder.success();
    } else {
        builder = builder.failure(error.unwrap_or("unspecified"));
    }

    builder.emit();
}

/// Log the outcome of an out-of-band notification such as a magic-link mail.
pub fn log_notification_event(service: &str, channel: &str, account_id: &str, duration_ms: u64, error: Option<&str>) {
    let builder = DomainEvent::new(service, EventCategory::Notification, "magic_link_dispatched")
        .entity("account", account_id)
        .duration_ms(duration_ms)
        .metadata(serde_json::json!({ "channel": channel }));

    match error {
        None => builder.success().emit(),
        Some(err) => builder.failure(err).emit(),
    }
}
