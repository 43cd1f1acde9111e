//! Wire protocol: JSON events exchanged over the room WebSocket.
//!
//! Both directions use an internally tagged `type` field, e.g.
//! `{"type":"message","content":"hi"}`.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Kinds of user content that are stamped and echoed to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Message,
    Image,
    File,
    Reaction,
}

impl ContentKind {
    /// Whether events of this kind are kept in the room's recent buffer.
    pub fn is_replayable(self) -> bool {
        !matches!(self, ContentKind::Reaction)
    }
}

/// Body of an inbound content event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBody {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub self_destruct: bool,
}

/// A content event after server-side stamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub username: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub self_destruct: bool,
    pub timestamp: u64,
}

/// Events a joined client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "typing")]
    Typing { status: bool },

    #[serde(rename = "kick")]
    Kick { target: String },

    #[serde(rename = "wipe")]
    Wipe,

    #[serde(rename = "lock")]
    Lock,

    #[serde(rename = "unlock")]
    Unlock,

    #[serde(rename = "edit_message")]
    EditMessage { id: String, content: String },

    #[serde(rename = "delete_request")]
    DeleteRequest { id: String },

    #[serde(rename = "message")]
    Message(ContentBody),

    #[serde(rename = "image")]
    Image(ContentBody),

    #[serde(rename = "file")]
    File(ContentBody),

    #[serde(rename = "reaction")]
    Reaction(ContentBody),

    /// Keepalive; answered with `pong`. Counts against the rate limit.
    #[serde(rename = "ping")]
    Ping,
}

impl ClientEvent {
    /// Parse a text frame. Frames that are not JSON at all are treated as a
    /// plain chat message, which is what bare-text clients send.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => Ok(event),
            Err(e) => {
                if serde_json::from_str::<serde_json::Value>(text).is_ok() {
                    return Err(e);
                }
                Ok(ClientEvent::Message(ContentBody {
                    content: text.to_string(),
                    reply_to: None,
                    self_destruct: false,
                }))
            }
        }
    }

    /// Split a content event into its kind and body.
    pub fn into_content(self) -> Result<(ContentKind, ContentBody), Self> {
        match self {
            ClientEvent::Message(body) => Ok((ContentKind::Message, body)),
            ClientEvent::Image(body) => Ok((ContentKind::Image, body)),
            ClientEvent::File(body) => Ok((ContentKind::File, body)),
            ClientEvent::Reaction(body) => Ok((ContentKind::Reaction, body)),
            other => Err(other),
        }
    }
}

/// Events the server sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "system")]
    System { content: String, timestamp: u64 },

    #[serde(rename = "error")]
    Error { code: ErrorCode, message: String },

    /// Current membership (join order), admin and gate state.
    #[serde(rename = "user_list")]
    UserList {
        users: Vec<String>,
        admin: String,
        locked: bool,
    },

    #[serde(rename = "typing")]
    Typing { username: String, status: bool },

    #[serde(rename = "kicked")]
    Kicked { target: String },

    #[serde(rename = "wipe_all")]
    WipeAll,

    #[serde(rename = "delete_message")]
    DeleteMessage { id: String },

    #[serde(rename = "edit_message")]
    EditMessage { id: String, content: String },

    /// Replay of the room's recent buffer, sent to a new joiner only.
    #[serde(rename = "history")]
    History { messages: Vec<ServerEvent> },

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "message")]
    Message(ChatMessage),

    #[serde(rename = "image")]
    Image(ChatMessage),

    #[serde(rename = "file")]
    File(ChatMessage),

    #[serde(rename = "reaction")]
    Reaction(ChatMessage),
}

impl ServerEvent {
    pub fn system(content: impl Into<String>) -> Self {
        ServerEvent::System {
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
        }
    }

    pub fn content(kind: ContentKind, msg: ChatMessage) -> Self {
        match kind {
            ContentKind::Message => ServerEvent::Message(msg),
            ContentKind::Image => ServerEvent::Image(msg),
            ContentKind::File => ServerEvent::File(msg),
            ContentKind::Reaction => ServerEvent::Reaction(msg),
        }
    }

    pub fn content_kind(&self) -> Option<ContentKind> {
        match self {
            ServerEvent::Message(_) => Some(ContentKind::Message),
            ServerEvent::Image(_) => Some(ContentKind::Image),
            ServerEvent::File(_) => Some(ContentKind::File),
            ServerEvent::Reaction(_) => Some(ContentKind::Reaction),
            _ => None,
        }
    }

    pub fn chat(&self) -> Option<&ChatMessage> {
        match self {
            ServerEvent::Message(m) | ServerEvent::Image(m) | ServerEvent::File(m) | ServerEvent::Reaction(m) => {
                Some(m)
            }
            _ => None,
        }
    }

    /// Bytes of user content carried; zero for non-content events.
    pub fn content_len(&self) -> usize {
        self.chat().map_or(0, |m| m.content.len())
    }

    pub fn chat_mut(&mut self) -> Option<&mut ChatMessage> {
        match self {
            ServerEvent::Message(m) | ServerEvent::Image(m) | ServerEvent::File(m) | ServerEvent::Reaction(m) => {
                Some(m)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_content_event() {
        let ev = ClientEvent::parse(r#"{"type":"message","content":"hi","self_destruct":true}"#).unwrap();
        let (kind, body) = ev.into_content().unwrap();
        assert_eq!(kind, ContentKind::Message);
        assert_eq!(body.content, "hi");
        assert!(body.self_destruct);
        assert_eq!(body.reply_to, None);
    }

    #[test]
    fn ignores_extra_client_fields() {
        // Browser clients also send their own name; the server stamps its own.
        let ev = ClientEvent::parse(r#"{"type":"message","content":"x","sender":"mallory"}"#).unwrap();
        assert!(matches!(ev, ClientEvent::Message(_)));
    }

    #[test]
    fn bare_text_becomes_message() {
        let ev = ClientEvent::parse("hello there").unwrap();
        assert_eq!(
            ev,
            ClientEvent::Message(ContentBody {
                content: "hello there".into(),
                reply_to: None,
                self_destruct: false,
            })
        );
    }

    #[test]
    fn unknown_json_type_is_rejected() {
        assert!(ClientEvent::parse(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn unit_variants_parse() {
        assert_eq!(ClientEvent::parse(r#"{"type":"lock"}"#).unwrap(), ClientEvent::Lock);
        assert_eq!(ClientEvent::parse(r#"{"type":"ping"}"#).unwrap(), ClientEvent::Ping);
    }

    #[test]
    fn server_event_wire_shape() {
        let ev = ServerEvent::UserList {
            users: vec!["alice".into(), "bob".into()],
            admin: "alice".into(),
            locked: false,
        };
        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "user_list");
        assert_eq!(json["users"][1], "bob");
        assert_eq!(json["admin"], "alice");

        let err = ServerEvent::error(ErrorCode::NameTaken, "taken");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "name_taken");

        let json = serde_json::to_value(ServerEvent::WipeAll).unwrap();
        assert_eq!(json, serde_json::json!({"type": "wipe_all"}));
    }

    #[test]
    fn content_event_carries_stamp() {
        let msg = ChatMessage {
            id: "m1".into(),
            username: "alice".into(),
            content: "pic".into(),
            reply_to: Some("m0".into()),
            self_destruct: false,
            timestamp: 42,
        };
        let json = serde_json::to_value(ServerEvent::content(ContentKind::Image, msg)).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["id"], "m1");
        assert_eq!(json["reply_to"], "m0");
        assert_eq!(json["timestamp"], 42);
    }
}
