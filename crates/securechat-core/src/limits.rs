//! Tunable limits shared by the registry, rooms and token issuer.

use serde::Deserialize;
use std::time::Duration;

/// Hard ceiling for handshake token lifetime.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Per-room and per-connection limits.
///
/// Durations are configured in whole seconds so the struct can be read
/// straight from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomLimits {
    /// Maximum members per room.
    pub capacity: usize,
    /// Recent messages kept per room for replay.
    pub history_len: usize,
    /// Total content bytes the recent buffer may hold.
    pub history_max_bytes: usize,
    /// Sliding rate-limit window.
    pub rate_window_secs: u64,
    /// Events accepted per connection inside one window.
    pub rate_max_events: usize,
    /// Handshake token lifetime (clamped to 60s).
    pub token_ttl_secs: u64,
    /// Delay before a self-destructing message is deleted.
    pub self_destruct_secs: u64,
    /// Outbound events buffered per connection before it counts as stalled.
    pub outbound_queue: usize,
    /// Max characters in a text message or edit.
    pub max_text_len: usize,
    /// Max bytes in an image/file payload (usually a data URL).
    pub max_attachment_len: usize,
    pub min_secret_len: usize,
    pub max_secret_len: usize,
}

impl Default for RoomLimits {
    fn default() -> Self {
        Self {
            capacity: 50,
            history_len: 100,
            history_max_bytes: 32 * 1024 * 1024,
            rate_window_secs: 10,
            rate_max_events: 30,
            token_ttl_secs: 60,
            self_destruct_secs: 30,
            outbound_queue: 256,
            max_text_len: 2000,
            max_attachment_len: 8 * 1024 * 1024,
            min_secret_len: 8,
            max_secret_len: 128,
        }
    }
}

impl RoomLimits {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs).min(MAX_TOKEN_TTL)
    }

    pub fn self_destruct_delay(&self) -> Duration {
        Duration::from_secs(self.self_destruct_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_ttl_is_clamped() {
        let limits = RoomLimits {
            token_ttl_secs: 600,
            ..RoomLimits::default()
        };
        assert_eq!(limits.token_ttl(), MAX_TOKEN_TTL);
    }
}
