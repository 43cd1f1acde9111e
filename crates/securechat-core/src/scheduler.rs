//! Deferred deletion of self-destructing messages.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;
use uuid::Uuid;

use crate::registry::RoomRegistry;

/// A one-shot `delete_message` broadcast due at `fire_at`.
///
/// Bound to the room instance (`epoch`) that carried the message, so a room
/// destroyed and re-created under the same id never sees the deletion.
/// There is no cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredDeletion {
    pub room_id: String,
    pub epoch: Uuid,
    pub message_id: String,
    pub fire_at: Instant,
}

impl DeferredDeletion {
    /// Sleep until due, then broadcast the deletion if the room still exists.
    pub fn spawn(self, registry: Arc<RoomRegistry>) -> JoinHandle<()> {
        tokio::spawn(async move {
            sleep_until(self.fire_at).await;
            let fired = registry
                .expire_message(&self.room_id, self.epoch, &self.message_id)
                .await;
            if !fired {
                debug!(
                    "room '{}' is gone; dropped deletion of {}",
                    self.room_id, self.message_id
                );
            }
        })
    }
}
