//! Outbox event record. Appended in the same transaction as the state change
//! it describes; a dispatcher later delivers it to the event-publishing port.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Integration event awaiting dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxEvent {
    pub event_id: Uuid,
    pub event_name: String,
    pub payload: serde_json::Value,
    pub actor_user_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub dispatched_utc: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(event_name: &str, payload: serde_json::Value, actor_user_id: Option<Uuid>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_name: event_name.to_string(),
            payload,
            actor_user_id,
            created_utc: Utc::now(),
            dispatched_utc: None,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched_utc.is_some()
    }
}
