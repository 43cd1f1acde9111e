//! Input validation for names, room ids, secrets and message content.

use crate::error::ValidationError;

const NAME_LEN: (usize, usize) = (3, 24);
const ROOM_ID_LEN: (usize, usize) = (3, 32);
const MAX_REACTION_LEN: usize = 32;

fn slug(raw: &str, field: &'static str, (min, max): (usize, usize)) -> Result<String, ValidationError> {
    let value = raw.trim().to_lowercase();
    if value.len() < min || value.len() > max {
        return Err(ValidationError::Length { field, min, max });
    }
    // ASCII only: rules out homoglyph look-alikes.
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::Charset(field));
    }
    Ok(value)
}

/// Normalize a display name: trimmed, lowercased, `[a-z0-9_-]{3,24}`.
pub fn username(raw: &str) -> Result<String, ValidationError> {
    slug(raw, "username", NAME_LEN)
}

/// Normalize a room id: trimmed, lowercased, `[a-z0-9_-]{3,32}`.
pub fn room_id(raw: &str) -> Result<String, ValidationError> {
    slug(raw, "room id", ROOM_ID_LEN)
}

/// Check a room secret's length. The secret itself is used verbatim.
pub fn secret(raw: &str, min: usize, max: usize) -> Result<&str, ValidationError> {
    let len = raw.chars().count();
    if len < min || len > max {
        return Err(ValidationError::Length {
            field: "password",
            min,
            max,
        });
    }
    Ok(raw)
}

/// Trim a text message; empty or oversize text is rejected.
pub fn text(raw: &str, max_chars: usize) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty);
    }
    let len = value.chars().count();
    if len > max_chars {
        return Err(ValidationError::TooLong { len, max: max_chars });
    }
    Ok(value.to_string())
}

/// Image/file payloads are opaque; only emptiness and size are checked.
pub fn attachment(raw: &str, max_bytes: usize) -> Result<String, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::Empty);
    }
    if raw.len() > max_bytes {
        return Err(ValidationError::TooLong {
            len: raw.len(),
            max: max_bytes,
        });
    }
    Ok(raw.to_string())
}

/// Reactions are short emoji strings with no markup characters.
pub fn reaction(raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty);
    }
    if value.len() > MAX_REACTION_LEN
        || value
            .chars()
            .any(|c| matches!(c, '\'' | '"' | '<' | '>' | '\\' | '&'))
    {
        return Err(ValidationError::Reaction);
    }
    Ok(value.to_string())
}
