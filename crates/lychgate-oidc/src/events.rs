//! Login event notifications.
//!
//! After a login fully completes (token stored, roles synced) the flow
//! emits a [`LoginEvent`] through an [`EventSink`]. Hosts hook their
//! audit or notification pipeline in here; the default sink just writes
//! a structured log line.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A completed login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEvent {
    /// The local user ID.
    pub user_id: String,

    /// The local username.
    pub username: String,

    /// When the login completed.
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

impl LoginEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn now(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            occurred_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Receives login events.
///
/// Sinks are best-effort observers: a sink failure is logged but never
/// fails the login that triggered it.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Called once per completed login.
    async fn user_logged_in(&self, event: &LoginEvent);
}

/// Default sink that emits a `tracing` log line per login.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn user_logged_in(&self, event: &LoginEvent) {
        tracing::info!(
            user_id = %event.user_id,
            username = %event.username,
            "User logged in via OIDC"
        );
    }
}
