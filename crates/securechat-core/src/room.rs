//! A single room: membership, gate, admin, recent buffer, rate state.
//!
//! A `Room` is always accessed under its registry mutex, so nothing here
//! locks. Fan-out goes through [`Room::broadcast`]; a member whose send fails
//! is removed through the same departure path as a graceful leave, and the
//! announcements for that departure may in turn evict further members.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::{ConnId, Connection};
use crate::error::{EventError, JoinError};
use crate::limits::RoomLimits;
use crate::protocol::{ChatMessage, ClientEvent, ContentBody, ContentKind, ServerEvent, now_millis};
use crate::rate_limit::RateLimiter;
use crate::sanitize;
use crate::scheduler::DeferredDeletion;

/// A member slot: the socket handle plus the display name it joined with.
#[derive(Debug, Clone)]
pub struct Member {
    pub conn: Connection,
    pub name: String,
}

#[derive(Debug)]
pub struct Room {
    id: String,
    /// Distinguishes this room from a later one re-created under the same id.
    epoch: Uuid,
    secret: String,
    locked: bool,
    admin: String,
    /// Join order; admin promotion picks the earliest remaining member.
    members: Vec<Member>,
    recent: VecDeque<ServerEvent>,
    rate: HashMap<ConnId, RateLimiter>,
    limits: RoomLimits,
    /// Set once the room has emptied and is being dropped from the registry.
    closed: bool,
}

impl Room {
    /// Build a room around its founder. The founding secret and admin are
    /// only fixed if the founder is actually admitted.
    pub(crate) fn found(
        id: &str,
        founder: Connection,
        name: &str,
        secret: &str,
        limits: &RoomLimits,
    ) -> Result<Self, JoinError> {
        if limits.capacity == 0 {
            return Err(JoinError::Full(0));
        }
        let mut room = Self {
            id: id.to_string(),
            epoch: Uuid::new_v4(),
            secret: secret.to_string(),
            locked: false,
            admin: name.to_string(),
            members: Vec::new(),
            recent: VecDeque::with_capacity(limits.history_len),
            rate: HashMap::new(),
            limits: limits.clone(),
            closed: false,
        };
        room.insert(founder, name);
        Ok(room)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn epoch(&self) -> Uuid {
        self.epoch
    }

    pub fn admin(&self) -> &str {
        &self.admin
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Member names in join order.
    pub fn names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name.clone()).collect()
    }

    pub fn recent(&self) -> impl Iterator<Item = &ServerEvent> {
        self.recent.iter()
    }

    pub fn secret_matches(&self, secret: &str) -> bool {
        self.secret == secret
    }

    pub fn name_of(&self, conn: ConnId) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.conn.id() == conn)
            .map(|m| m.name.as_str())
    }

    pub(crate) fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.members.iter().map(|m| &m.conn)
    }

    fn insert(&mut self, conn: Connection, name: &str) {
        self.rate.insert(
            conn.id(),
            RateLimiter::new(self.limits.rate_window(), self.limits.rate_max_events),
        );
        self.members.push(Member {
            conn,
            name: name.to_string(),
        });
    }

    /// Gate and admit a new member into an existing room.
    pub(crate) fn admit(&mut self, conn: Connection, name: &str, secret: &str) -> Result<(), JoinError> {
        if self.locked {
            return Err(JoinError::Sealed);
        }
        if !self.secret_matches(secret) {
            return Err(JoinError::BadSecret);
        }
        if self.members.len() >= self.limits.capacity {
            return Err(JoinError::Full(self.limits.capacity));
        }
        if self.members.iter().any(|m| m.name == name) {
            return Err(JoinError::NameTaken(name.to_string()));
        }

        let id = conn.id();
        self.insert(conn, name);
        self.announce_join(id);
        Ok(())
    }

    /// Replay history to the newest member, then tell the room.
    pub(crate) fn announce_join(&mut self, conn: ConnId) {
        let Some(name) = self.name_of(conn).map(str::to_string) else {
            return;
        };
        info!("'{name}' joined room '{}' ({} members)", self.id, self.members.len());

        for messages in self.history_frames() {
            self.send_to(conn, ServerEvent::History { messages });
        }
        self.broadcast(self.user_list(), None);
        self.broadcast(
            ServerEvent::system(format!("User '{name}' connected to the secure tunnel.")),
            None,
        );
    }

    /// The recent buffer cut into replay frames, oldest first. Each frame
    /// carries at most `max_attachment_len` content bytes unless a single
    /// entry is larger on its own.
    fn history_frames(&self) -> Vec<Vec<ServerEvent>> {
        let budget = self.limits.max_attachment_len;
        let mut frames = Vec::new();
        let mut frame: Vec<ServerEvent> = Vec::new();
        let mut bytes = 0;
        for event in &self.recent {
            let len = event.content_len();
            if !frame.is_empty() && bytes + len > budget {
                frames.push(std::mem::take(&mut frame));
                bytes = 0;
            }
            bytes += len;
            frame.push(event.clone());
        }
        if !frame.is_empty() {
            frames.push(frame);
        }
        frames
    }

    /// Evict the oldest entries until both the count and byte bounds hold.
    fn trim_recent(&mut self) {
        let mut bytes: usize = self.recent.iter().map(ServerEvent::content_len).sum();
        while self.recent.len() > self.limits.history_len || bytes > self.limits.history_max_bytes {
            let Some(oldest) = self.recent.pop_front() else {
                break;
            };
            bytes -= oldest.content_len();
        }
    }

    pub fn user_list(&self) -> ServerEvent {
        ServerEvent::UserList {
            users: self.names(),
            admin: self.admin.clone(),
            locked: self.locked,
        }
    }

    /// Remove a member and announce it. No-op for non-members.
    pub(crate) fn leave(&mut self, conn: ConnId) {
        let mut pending = vec![conn];
        while let Some(next) = pending.pop() {
            pending.extend(self.depart(next));
        }
    }

    /// Deliver to every member but `exclude`. Content events are recorded in
    /// the recent buffer first. Members whose send fails are evicted.
    pub fn broadcast(&mut self, event: ServerEvent, exclude: Option<ConnId>) {
        let mut pending = self.fan_out(event, exclude);
        while let Some(dead) = pending.pop() {
            pending.extend(self.depart(dead));
        }
    }

    /// Send to one member; a failure evicts it like any other send.
    pub fn send_to(&mut self, conn: ConnId, event: ServerEvent) {
        let Some(member) = self.members.iter().find(|m| m.conn.id() == conn) else {
            return;
        };
        if let Err(e) = member.conn.send(Arc::new(event)) {
            debug!("send to {conn} in room '{}' failed: {e}", self.id);
            self.leave(conn);
        }
    }

    fn fan_out(&mut self, event: ServerEvent, exclude: Option<ConnId>) -> Vec<ConnId> {
        if event.content_kind().is_some_and(ContentKind::is_replayable) {
            self.recent.push_back(event.clone());
            self.trim_recent();
        }

        let event = Arc::new(event);
        let mut failed = Vec::new();
        for member in &self.members {
            if Some(member.conn.id()) == exclude {
                continue;
            }
            if let Err(e) = member.conn.send(event.clone()) {
                debug!("send to '{}' in room '{}' failed: {e}", member.name, self.id);
                failed.push(member.conn.id());
            }
        }
        failed
    }

    /// Single removal path for graceful leaves and transport failures.
    /// Returns connections whose sends failed while announcing it.
    fn depart(&mut self, conn: ConnId) -> Vec<ConnId> {
        let Some(pos) = self.members.iter().position(|m| m.conn.id() == conn) else {
            return Vec::new();
        };
        let member = self.members.remove(pos);
        self.rate.remove(&conn);
        member.conn.close();
        info!("'{}' left room '{}' ({} members)", member.name, self.id, self.members.len());

        let mut failed = self.fan_out(
            ServerEvent::Typing {
                username: member.name.clone(),
                status: false,
            },
            None,
        );
        if self.members.is_empty() {
            return failed;
        }

        if self.admin == member.name {
            self.admin = self.members[0].name.clone();
            info!("'{}' is now admin of room '{}'", self.admin, self.id);
            failed.extend(self.fan_out(
                ServerEvent::system(format!("{} is now the room admin.", self.admin)),
                None,
            ));
        }
        failed.extend(self.fan_out(self.user_list(), None));
        failed.extend(self.fan_out(
            ServerEvent::system(format!("{} has left the chat.", member.name)),
            None,
        ));
        failed
    }

    /// Handle one inbound event from a member.
    ///
    /// Rejections are reported to the sender as an `error` event and also
    /// returned. A self-destructing message yields the deletion to schedule.
    pub(crate) fn dispatch(
        &mut self,
        conn: ConnId,
        event: ClientEvent,
        now: Instant,
    ) -> Result<Option<DeferredDeletion>, EventError> {
        let Some(name) = self.name_of(conn).map(str::to_string) else {
            return Err(EventError::NotMember(self.id.clone()));
        };

        let result = if self.within_rate(conn, now) {
            self.apply(conn, &name, event, now)
        } else {
            Err(EventError::RateLimited)
        };
        if let Err(e) = &result {
            self.report(conn, &name, e);
        }
        result
    }

    /// Answer a frame that did not parse as an event. It is charged to the
    /// sender's rate window like any other frame.
    pub(crate) fn reject_unparsed(&mut self, conn: ConnId, detail: String, now: Instant) -> EventError {
        let Some(name) = self.name_of(conn).map(str::to_string) else {
            return EventError::NotMember(self.id.clone());
        };
        let err = if self.within_rate(conn, now) {
            EventError::Invalid(detail)
        } else {
            EventError::RateLimited
        };
        self.report(conn, &name, &err);
        err
    }

    fn within_rate(&mut self, conn: ConnId, now: Instant) -> bool {
        self.rate.get_mut(&conn).is_none_or(|rl| rl.check_at(now))
    }

    fn report(&mut self, conn: ConnId, name: &str, err: &EventError) {
        debug!("rejected event from '{name}' in room '{}': {err}", self.id);
        self.send_to(conn, ServerEvent::error(err.code(), err.to_string()));
    }

    fn apply(
        &mut self,
        conn: ConnId,
        name: &str,
        event: ClientEvent,
        now: Instant,
    ) -> Result<Option<DeferredDeletion>, EventError> {
        let event = match event.into_content() {
            Ok((kind, body)) => return self.post(name, kind, body, now),
            Err(other) => other,
        };

        match event {
            ClientEvent::Ping => self.send_to(conn, ServerEvent::Pong),
            ClientEvent::Typing { status } => {
                self.broadcast(
                    ServerEvent::Typing {
                        username: name.to_string(),
                        status,
                    },
                    Some(conn),
                );
            }
            ClientEvent::Kick { target } => {
                self.require_admin(name, "kick members")?;
                if target == name || !self.members.iter().any(|m| m.name == target) {
                    return Err(EventError::UnknownMember(target));
                }
                info!("'{name}' kicked '{target}' from room '{}'", self.id);
                self.broadcast(ServerEvent::Kicked { target }, None);
            }
            ClientEvent::Wipe => {
                self.require_admin(name, "wipe the room")?;
                self.recent.clear();
                info!("'{name}' wiped room '{}'", self.id);
                self.broadcast(ServerEvent::WipeAll, None);
            }
            ClientEvent::Lock => self.set_locked(name, true)?,
            ClientEvent::Unlock => self.set_locked(name, false)?,
            ClientEvent::EditMessage { id, content } => {
                let content = sanitize::text(&content, self.limits.max_text_len)?;
                let msg = self
                    .recent
                    .iter_mut()
                    .filter_map(ServerEvent::chat_mut)
                    .find(|m| m.id == id)
                    .ok_or_else(|| EventError::UnknownMessage(id.clone()))?;
                if msg.username != name {
                    return Err(EventError::Invalid("you can only edit your own messages".into()));
                }
                msg.content = content.clone();
                self.trim_recent();
                self.broadcast(ServerEvent::EditMessage { id, content }, None);
            }
            ClientEvent::DeleteRequest { id } => {
                let pos = self
                    .recent
                    .iter()
                    .position(|ev| ev.chat().is_some_and(|m| m.id == id))
                    .ok_or_else(|| EventError::UnknownMessage(id.clone()))?;
                let author = self.recent[pos].chat().map(|m| m.username.as_str()) == Some(name);
                if !author && self.admin != name {
                    return Err(EventError::Forbidden("delete other members' messages"));
                }
                self.recent.remove(pos);
                self.broadcast(ServerEvent::DeleteMessage { id }, None);
            }
            ClientEvent::Message(_)
            | ClientEvent::Image(_)
            | ClientEvent::File(_)
            | ClientEvent::Reaction(_) => {}
        }
        Ok(None)
    }

    /// Validate, stamp and echo a content event to the whole room.
    fn post(
        &mut self,
        name: &str,
        kind: ContentKind,
        body: ContentBody,
        now: Instant,
    ) -> Result<Option<DeferredDeletion>, EventError> {
        let content = match kind {
            ContentKind::Message => sanitize::text(&body.content, self.limits.max_text_len)?,
            ContentKind::Image | ContentKind::File => {
                sanitize::attachment(&body.content, self.limits.max_attachment_len)?
            }
            ContentKind::Reaction => sanitize::reaction(&body.content)?,
        };

        let msg = ChatMessage {
            id: Uuid::new_v4().to_string(),
            username: name.to_string(),
            content,
            reply_to: body.reply_to,
            self_destruct: body.self_destruct,
            timestamp: now_millis(),
        };
        let deletion = body.self_destruct.then(|| DeferredDeletion {
            room_id: self.id.clone(),
            epoch: self.epoch,
            message_id: msg.id.clone(),
            fire_at: now + self.limits.self_destruct_delay(),
        });

        self.broadcast(ServerEvent::content(kind, msg), None);
        Ok(deletion)
    }

    fn set_locked(&mut self, name: &str, locked: bool) -> Result<(), EventError> {
        self.require_admin(name, if locked { "lock the room" } else { "unlock the room" })?;
        self.locked = locked;
        info!("room '{}' {} by '{name}'", self.id, if locked { "locked" } else { "unlocked" });
        self.broadcast(self.user_list(), None);
        let notice = if locked {
            "Room locked by admin. No new members can join."
        } else {
            "Room unlocked by admin."
        };
        self.broadcast(ServerEvent::system(notice), None);
        Ok(())
    }

    fn require_admin(&self, name: &str, action: &'static str) -> Result<(), EventError> {
        if self.admin == name {
            Ok(())
        } else {
            Err(EventError::Forbidden(action))
        }
    }

    /// Drop an expired self-destructing message and tell the room.
    pub(crate) fn expire(&mut self, message_id: &str) {
        self.recent
            .retain(|ev| ev.chat().is_none_or(|m| m.id != message_id));
        self.broadcast(
            ServerEvent::DeleteMessage {
                id: message_id.to_string(),
            },
            None,
        );
    }

    /// Final notice before the process exits; sockets are asked to close.
    pub(crate) fn shut_down(&mut self, notice: &str) {
        self.broadcast(ServerEvent::system(notice), None);
        for conn in self.connections() {
            conn.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Outbound::Event(ev) = msg {
                out.push((*ev).clone());
            }
        }
        out
    }

    fn room_with(names: &[&str]) -> (Room, Vec<(Connection, mpsc::Receiver<Outbound>)>) {
        room_with_limits(names, RoomLimits::default())
    }

    fn room_with_limits(
        names: &[&str],
        limits: RoomLimits,
    ) -> (Room, Vec<(Connection, mpsc::Receiver<Outbound>)>) {
        let mut conns: Vec<_> = names.iter().map(|_| Connection::channel(512)).collect();
        let mut room = Room::found("r1", conns[0].0.clone(), names[0], "secret", &limits).unwrap();
        room.announce_join(conns[0].0.id());
        for (i, name) in names.iter().enumerate().skip(1) {
            room.admit(conns[i].0.clone(), name, "secret").unwrap();
        }
        for (_, rx) in conns.iter_mut() {
            drain(rx);
        }
        (room, conns)
    }

    #[tokio::test]
    async fn admin_leaving_promotes_earliest_member() {
        let (mut room, mut conns) = room_with(&["alice", "bob", "carol"]);
        room.leave(conns[0].0.id());

        assert_eq!(room.admin(), "bob");
        assert_eq!(room.names(), vec!["bob", "carol"]);
        let events = drain(&mut conns[2].1);
        assert!(events.contains(&ServerEvent::Typing {
            username: "alice".into(),
            status: false
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::System { content, .. } if content.contains("bob is now the room admin")
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::UserList { admin, .. } if admin == "bob"
        )));
    }

    #[tokio::test]
    async fn failed_send_evicts_without_stopping_fan_out() {
        let (mut room, mut conns) = room_with(&["alice", "bob", "carol"]);
        let (_, bob_rx) = conns.remove(1);
        drop(bob_rx);

        room.broadcast(ServerEvent::system("hello"), None);

        assert_eq!(room.names(), vec!["alice", "carol"]);
        let carol = drain(&mut conns[1].1);
        assert!(matches!(&carol[0], ServerEvent::System { content, .. } if content == "hello"));
        assert!(carol.iter().any(|e| matches!(
            e,
            ServerEvent::System { content, .. } if content == "bob has left the chat."
        )));
    }

    #[tokio::test]
    async fn recent_buffer_is_bounded_and_skips_reactions() {
        let (mut room, conns) = room_with(&["alice"]);
        let alice = conns[0].0.id();
        let now = Instant::now();
        for i in 0..105 {
            let body = ContentBody {
                content: format!("m{i}"),
                reply_to: None,
                self_destruct: false,
            };
            room.post("alice", ContentKind::Message, body, now).unwrap();
        }
        room.dispatch(
            alice,
            ClientEvent::Reaction(ContentBody {
                content: "👍".into(),
                reply_to: None,
                self_destruct: false,
            }),
            now,
        )
        .unwrap();

        let recent: Vec<_> = room.recent().filter_map(ServerEvent::chat).collect();
        assert_eq!(recent.len(), 100);
        assert_eq!(recent[0].content, "m5");
        assert_eq!(recent[99].content, "m104");
    }

    #[tokio::test]
    async fn only_author_edits_and_admin_may_delete() {
        let (mut room, mut conns) = room_with(&["alice", "bob"]);
        let (alice, bob) = (conns[0].0.id(), conns[1].0.id());
        let now = Instant::now();
        let body = ContentBody {
            content: "typo".into(),
            reply_to: None,
            self_destruct: false,
        };
        room.dispatch(bob, ClientEvent::Message(body), now).unwrap();
        let id = room.recent().next().and_then(ServerEvent::chat).unwrap().id.clone();

        let err = room
            .dispatch(alice, ClientEvent::EditMessage { id: id.clone(), content: "x".into() }, now)
            .unwrap_err();
        assert!(matches!(err, EventError::Invalid(_)));

        room.dispatch(bob, ClientEvent::EditMessage { id: id.clone(), content: "fixed".into() }, now)
            .unwrap();
        assert_eq!(room.recent().next().and_then(ServerEvent::chat).unwrap().content, "fixed");

        room.dispatch(alice, ClientEvent::DeleteRequest { id: id.clone() }, now).unwrap();
        assert_eq!(room.recent().count(), 0);
        let bob_events = drain(&mut conns[1].1);
        assert!(bob_events.contains(&ServerEvent::DeleteMessage { id }));
    }

    #[tokio::test]
    async fn typing_is_not_echoed_to_sender() {
        let (mut room, mut conns) = room_with(&["alice", "bob"]);
        room.dispatch(conns[0].0.id(), ClientEvent::Typing { status: true }, Instant::now())
            .unwrap();
        assert!(drain(&mut conns[0].1).is_empty());
        assert_eq!(
            drain(&mut conns[1].1),
            vec![ServerEvent::Typing {
                username: "alice".into(),
                status: true
            }]
        );
    }

    #[tokio::test]
    async fn ping_gets_pong_and_counts_against_rate_limit() {
        let (mut room, mut conns) = room_with(&["alice"]);
        let alice = conns[0].0.id();
        let now = Instant::now();
        for _ in 0..30 {
            room.dispatch(alice, ClientEvent::Ping, now).unwrap();
        }
        let err = room.dispatch(alice, ClientEvent::Ping, now).unwrap_err();
        assert_eq!(err, EventError::RateLimited);

        let events = drain(&mut conns[0].1);
        assert_eq!(events.len(), 31);
        assert!(events[..30].iter().all(|e| *e == ServerEvent::Pong));
        assert!(matches!(
            events[30],
            ServerEvent::Error { code: crate::error::ErrorCode::RateLimited, .. }
        ));
    }

    #[tokio::test]
    async fn unparsed_frames_are_rate_limited() {
        let (mut room, mut conns) = room_with(&["alice", "bob"]);
        let alice = conns[0].0.id();
        let now = Instant::now();
        for _ in 0..30 {
            let err = room.reject_unparsed(alice, "unknown variant `teleport`".into(), now);
            assert!(matches!(err, EventError::Invalid(_)));
        }
        let err = room.reject_unparsed(alice, "unknown variant `teleport`".into(), now);
        assert_eq!(err, EventError::RateLimited);

        let codes: Vec<_> = drain(&mut conns[0].1)
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::Error { code, .. } => Some(code),
                _ => None,
            })
            .collect();
        assert_eq!(codes.len(), 31);
        assert!(codes[..30].iter().all(|c| *c == crate::error::ErrorCode::InvalidInput));
        assert_eq!(codes[30], crate::error::ErrorCode::RateLimited);
        assert!(drain(&mut conns[1].1).is_empty());

        // The window is spent, so a real event is refused as well.
        let err = room
            .dispatch(alice, ClientEvent::Typing { status: true }, now)
            .unwrap_err();
        assert_eq!(err, EventError::RateLimited);
    }

    #[tokio::test]
    async fn unparsed_frame_from_stranger_is_not_member() {
        let (mut room, _conns) = room_with(&["alice"]);
        let (stranger, _rx) = Connection::channel(4);
        let err = room.reject_unparsed(stranger.id(), "garbage".into(), Instant::now());
        assert!(matches!(err, EventError::NotMember(_)));
    }

    #[tokio::test]
    async fn history_is_bounded_by_bytes_and_replayed_in_small_frames() {
        let limits = RoomLimits {
            max_attachment_len: 1000,
            history_max_bytes: 2500,
            ..RoomLimits::default()
        };
        let (mut room, _conns) = room_with_limits(&["alice"], limits);
        let now = Instant::now();
        for i in 0..5 {
            let body = ContentBody {
                content: format!("{i}{}", "x".repeat(899)),
                reply_to: None,
                self_destruct: false,
            };
            room.post("alice", ContentKind::Image, body, now).unwrap();
        }
        let hi = ContentBody {
            content: "hi".into(),
            reply_to: None,
            self_destruct: false,
        };
        room.post("alice", ContentKind::Message, hi, now).unwrap();

        let kept: Vec<_> = room.recent().filter_map(ServerEvent::chat).collect();
        assert_eq!(kept.len(), 3);
        assert!(kept[0].content.starts_with('3'));
        assert!(kept[1].content.starts_with('4'));
        assert_eq!(kept[2].content, "hi");

        let (bob, mut bob_rx) = Connection::channel(64);
        room.admit(bob, "bob", "secret").unwrap();
        let frames: Vec<Vec<ServerEvent>> = drain(&mut bob_rx)
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::History { messages } => Some(messages),
                _ => None,
            })
            .collect();
        assert_eq!(frames.iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 2]);
        for frame in &frames {
            assert!(frame.iter().map(ServerEvent::content_len).sum::<usize>() <= 1000);
        }
        assert!(frames[0][0].chat().unwrap().content.starts_with('3'));
        assert_eq!(frames[1][1].chat().unwrap().content, "hi");
    }

    #[tokio::test]
    async fn empty_buffer_sends_no_history() {
        let (mut room, _conns) = room_with(&["alice"]);
        let (bob, mut bob_rx) = Connection::channel(64);
        room.admit(bob, "bob", "secret").unwrap();
        assert!(!drain(&mut bob_rx)
            .iter()
            .any(|e| matches!(e, ServerEvent::History { .. })));
    }

    #[tokio::test]
    async fn backlogged_member_is_evicted_without_stopping_fan_out() {
        let limits = RoomLimits::default();
        let (alice, mut alice_rx) = Connection::channel(512);
        let (carol, mut carol_rx) = Connection::channel(512);
        // Exactly room for bob's own join announcements.
        let (bob, mut bob_rx) = Connection::channel(2);

        let mut room = Room::found("r1", alice.clone(), "alice", "secret", &limits).unwrap();
        room.announce_join(alice.id());
        room.admit(carol, "carol", "secret").unwrap();
        room.admit(bob, "bob", "secret").unwrap();
        assert_eq!(room.names(), vec!["alice", "carol", "bob"]);
        drain(&mut alice_rx);
        drain(&mut carol_rx);

        room.broadcast(ServerEvent::system("hello"), None);

        assert_eq!(room.names(), vec!["alice", "carol"]);
        assert_eq!(room.admin(), "alice");
        let carol_events = drain(&mut carol_rx);
        assert!(matches!(&carol_events[0], ServerEvent::System { content, .. } if content == "hello"));
        assert!(carol_events.iter().any(|e| matches!(
            e,
            ServerEvent::UserList { users, .. } if users == &["alice", "carol"]
        )));
        assert!(carol_events.iter().any(|e| matches!(
            e,
            ServerEvent::System { content, .. } if content == "bob has left the chat."
        )));
        // Bob only ever received his join announcements.
        assert_eq!(drain(&mut bob_rx).len(), 2);
    }

    #[tokio::test]
    async fn rate_limited_event_warns_sender_only() {
        let (mut room, mut conns) = room_with(&["alice", "bob"]);
        let alice = conns[0].0.id();
        let now = Instant::now();
        for _ in 0..30 {
            room.dispatch(alice, ClientEvent::Typing { status: true }, now).unwrap();
        }
        drain(&mut conns[1].1);

        let err = room
            .dispatch(alice, ClientEvent::Typing { status: false }, now)
            .unwrap_err();
        assert_eq!(err, EventError::RateLimited);
        assert!(drain(&mut conns[1].1).is_empty());
        assert!(matches!(
            drain(&mut conns[0].1).as_slice(),
            [ServerEvent::Error { code: crate::error::ErrorCode::RateLimited, .. }]
        ));
        assert_eq!(room.member_count(), 2);
    }
}
