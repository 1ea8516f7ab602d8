//! Outbox dispatcher. Events are written in the same transaction as the
//! state change that caused them; this drains undispatched rows through the
//! publisher port. Delivery is at-least-once: a crash between publish and
//! mark leaves the row to be published again.

use std::sync::Arc;

use identity_core::error::IdentityError;

use crate::services::ports::EventPublisher;
use crate::store::Database;

#[derive(Clone)]
pub struct OutboxDispatcher {
    db: Database,
    publisher: Arc<dyn EventPublisher>,
}

impl OutboxDispatcher {
    pub fn new(db: Database, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { db, publisher }
    }

    /// Publish up to `limit` pending events, oldest first. Returns how many
    /// were delivered. A publish failure stops the batch so ordering holds.
    pub async fn dispatch_pending(&self, limit: i64) -> Result<usize, IdentityError> {
        let events = self.db.find_undispatched_events(limit).await?;
        let mut dispatched = 0usize;

        for event in events {
            if let Err(e) = self
                .publisher
                .publish(&event.event_name, &event.payload)
                .await
            {
                tracing::warn!(
                    event_id = %event.event_id,
                    event_name = %event.event_name,
                    error = %e,
                    "Event publish failed, stopping batch"
                );
                return Ok(dispatched);
            }
            self.db.mark_event_dispatched(event.event_id).await?;
            dispatched += 1;
        }

        if dispatched > 0 {
            tracing::info!(dispatched, "Outbox events dispatched");
        }
        Ok(dispatched)
    }
}
