//! Room registry: the single authority for room existence and membership.
//!
//! ```text
//!   rooms: RwLock<HashMap<id, Arc<Mutex<Room>>>>
//!                 │
//!                 ├── "r1" ── Mutex<Room>   (serializes join/leave/broadcast on r1)
//!                 └── "r2" ── Mutex<Room>   (independent of r1)
//! ```
//!
//! The map lock is only held to look up, insert or remove an entry, never
//! while waiting on a room. Lock order is room → map. A room is published
//! already holding its founder and is unpublished (and marked closed) under
//! its own lock when it empties, so a waiter that finds it closed simply
//! looks again.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::connection::{ConnId, Connection};
use crate::error::{EventError, JoinError};
use crate::limits::RoomLimits;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::room::Room;

type RoomHandle = Arc<Mutex<Room>>;

/// Snapshot of one room, for status reporting and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub id: String,
    pub members: Vec<String>,
    pub admin: String,
    pub locked: bool,
}

pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, RoomHandle>>,
    limits: RoomLimits,
}

impl RoomRegistry {
    pub fn new(limits: RoomLimits) -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            limits,
        })
    }

    pub fn limits(&self) -> &RoomLimits {
        &self.limits
    }

    async fn lookup(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Admit `conn` into `room_id` as `name`, founding the room if needed.
    pub async fn join(
        &self,
        conn: Connection,
        room_id: &str,
        name: &str,
        secret: &str,
    ) -> Result<(), JoinError> {
        loop {
            if let Some(handle) = self.lookup(room_id).await {
                let mut room = handle.lock().await;
                if room.is_closed() {
                    continue;
                }
                let result = room.admit(conn, name, secret);
                if let Err(e) = &result {
                    info!("rejected '{name}' from room '{room_id}': {e}");
                }
                // Announcing the join can evict members whose sends fail.
                self.reap(room_id, &handle, &mut room).await;
                return result;
            }

            let handle = Arc::new(Mutex::new(Room::found(
                room_id,
                conn.clone(),
                name,
                secret,
                &self.limits,
            )?));
            let mut room = handle.clone().lock_owned().await;
            {
                let mut rooms = self.rooms.write().await;
                match rooms.entry(room_id.to_string()) {
                    // Someone founded it first; join theirs instead.
                    Entry::Occupied(_) => continue,
                    Entry::Vacant(slot) => {
                        slot.insert(handle.clone());
                    }
                }
            }
            info!("room '{room_id}' created by '{name}'");
            room.announce_join(conn.id());
            self.reap(room_id, &handle, &mut room).await;
            return Ok(());
        }
    }

    /// Remove `conn` from `room_id`. Idempotent.
    pub async fn leave(&self, room_id: &str, conn: ConnId) {
        let Some(handle) = self.lookup(room_id).await else {
            return;
        };
        let mut room = handle.lock().await;
        room.leave(conn);
        self.reap(room_id, &handle, &mut room).await;
    }

    /// Fan `event` out to every member of `room_id` except `exclude`.
    pub async fn broadcast(&self, room_id: &str, event: ServerEvent, exclude: Option<ConnId>) {
        let Some(handle) = self.lookup(room_id).await else {
            return;
        };
        let mut room = handle.lock().await;
        room.broadcast(event, exclude);
        self.reap(room_id, &handle, &mut room).await;
    }

    /// Send one event to a single member.
    pub async fn send_to(&self, room_id: &str, conn: ConnId, event: ServerEvent) {
        let Some(handle) = self.lookup(room_id).await else {
            return;
        };
        let mut room = handle.lock().await;
        room.send_to(conn, event);
        self.reap(room_id, &handle, &mut room).await;
    }

    /// Pre-flight check: true if the room doesn't exist yet (any secret
    /// would found it) or the secret matches. Never mutates.
    pub async fn verify_room(&self, room_id: &str, secret: &str) -> bool {
        let Some(handle) = self.lookup(room_id).await else {
            return true;
        };
        let room = handle.lock().await;
        room.is_closed() || room.secret_matches(secret)
    }

    /// Run one inbound event from `conn` through the room's dispatcher.
    pub async fn dispatch(
        self: &Arc<Self>,
        room_id: &str,
        conn: ConnId,
        event: ClientEvent,
    ) -> Result<(), EventError> {
        let Some(handle) = self.lookup(room_id).await else {
            return Err(EventError::NotMember(room_id.to_string()));
        };
        let mut room = handle.lock().await;
        let result = room.dispatch(conn, event, Instant::now());
        self.reap(room_id, &handle, &mut room).await;
        drop(room);

        if let Some(deletion) = result? {
            deletion.spawn(Arc::clone(self));
        }
        Ok(())
    }

    /// Answer a frame from `conn` that failed to parse. The frame counts
    /// against the sender's rate window; the returned error is what was sent.
    pub async fn reject_unparsed(&self, room_id: &str, conn: ConnId, detail: String) -> EventError {
        let Some(handle) = self.lookup(room_id).await else {
            return EventError::NotMember(room_id.to_string());
        };
        let mut room = handle.lock().await;
        let err = room.reject_unparsed(conn, detail, Instant::now());
        self.reap(room_id, &handle, &mut room).await;
        err
    }

    /// Broadcast `delete_message` if the same room instance is still live.
    pub async fn expire_message(&self, room_id: &str, epoch: Uuid, message_id: &str) -> bool {
        let Some(handle) = self.lookup(room_id).await else {
            return false;
        };
        let mut room = handle.lock().await;
        if room.is_closed() || room.epoch() != epoch {
            return false;
        }
        room.expire(message_id);
        self.reap(room_id, &handle, &mut room).await;
        true
    }

    /// Unpublish a room that has emptied. Caller holds the room lock.
    async fn reap(&self, room_id: &str, handle: &RoomHandle, room: &mut Room) {
        if !room.is_empty() || room.is_closed() {
            return;
        }
        room.mark_closed();
        let mut rooms = self.rooms.write().await;
        if rooms.get(room_id).is_some_and(|h| Arc::ptr_eq(h, handle)) {
            rooms.remove(room_id);
            info!("room '{room_id}' destroyed (empty)");
        }
    }

    /// Send a final notice to every live room and ask all sockets to close.
    pub async fn shutdown(&self, notice: &str) {
        let handles: Vec<(String, RoomHandle)> = self
            .rooms
            .read()
            .await
            .iter()
            .map(|(id, h)| (id.clone(), h.clone()))
            .collect();
        if !handles.is_empty() {
            warn!("notifying {} room(s) of shutdown", handles.len());
        }
        for (id, handle) in handles {
            let mut room = handle.lock().await;
            if !room.is_closed() {
                room.shut_down(notice);
                self.reap(&id, &handle, &mut room).await;
            }
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn contains(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    pub async fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        let handle = self.lookup(room_id).await?;
        let room = handle.lock().await;
        if room.is_closed() {
            return None;
        }
        Some(RoomSnapshot {
            id: room.id().to_string(),
            members: room.names(),
            admin: room.admin().to_string(),
            locked: room.is_locked(),
        })
    }
}
