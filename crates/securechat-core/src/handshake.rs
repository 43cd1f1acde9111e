//! Single-use handshake tokens for WebSocket upgrades.
//!
//! The auth boundary calls [`TokenIssuer::issue`] for an already verified
//! identity; the upgrade handler calls [`TokenIssuer::verify`], which
//! removes the token whether or not it matches.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::limits::MAX_TOKEN_TTL;

/// Random bytes per token (hex-encoded to 64 chars).
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct PendingHandshake {
    identity: String,
    expires_at: Instant,
}

/// Expiring take-once token store.
#[derive(Debug)]
pub struct TokenIssuer {
    ttl: Duration,
    tokens: Mutex<HashMap<String, PendingHandshake>>,
}

impl TokenIssuer {
    /// `ttl` is clamped to 60 seconds.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: ttl.min(MAX_TOKEN_TTL),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a fresh unguessable token bound to `identity`.
    pub fn issue(&self, identity: &str) -> String {
        let bytes: [u8; TOKEN_BYTES] = rand::random();
        let token = hex::encode(bytes);
        let pending = PendingHandshake {
            identity: identity.to_string(),
            expires_at: Instant::now() + self.ttl,
        };
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), pending);
        debug!("issued handshake token for '{identity}'");
        token
    }

    /// Consume `token`. True only if it existed, is unexpired, and was issued
    /// to `claimed_identity`.
    pub fn verify(&self, token: &str, claimed_identity: &str) -> bool {
        let taken = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);

        match taken {
            Some(p) if p.expires_at <= Instant::now() => {
                warn!("expired handshake token presented for '{claimed_identity}'");
                false
            }
            Some(p) if p.identity != claimed_identity => {
                warn!(
                    "handshake token for '{}' presented as '{claimed_identity}'",
                    p.identity
                );
                false
            }
            Some(_) => true,
            None => {
                warn!("unknown handshake token presented for '{claimed_identity}'");
                false
            }
        }
    }

    /// Drop expired tokens. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        let before = tokens.len();
        tokens.retain(|_, p| p.expires_at > now);
        before - tokens.len()
    }

    pub fn pending(&self) -> usize {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
