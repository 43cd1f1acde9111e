//! Auth boundary.
//!
//! Account storage and password checks live in an upstream auth service.
//! It forwards requests it has authenticated with the username in a trusted
//! header; the relay only reads that header before issuing a handshake
//! token.

use axum::http::HeaderMap;
use securechat_core::sanitize;

/// The verified identity asserted upstream, normalized like any username.
/// `None` if the header is missing, not UTF-8, or not a valid name.
pub fn asserted_identity(headers: &HeaderMap, header: &str) -> Option<String> {
    let raw = headers.get(header)?.to_str().ok()?;
    sanitize::username(raw).ok()
}
