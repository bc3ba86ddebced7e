//! Shared types for the Nevira voice platform.
//!
//! This crate holds the wire types exchanged between the credential server
//! and its clients, the UI-visible session projection produced by the
//! session controller, and the input validation both sides agree on.
//!
//! Nothing here performs I/O. The server (`nevira-server`), the issuer
//! (`nevira-voice`) and the client controller (`nevira-session`) all depend
//! on these definitions so the JSON contract lives in one place.

pub mod session;

pub use session::{ConnectionPhase, ConnectionQuality, Participant, UiState};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Room joined when a credential request does not name one.
pub const DEFAULT_ROOM_NAME: &str = "nevira-room";

/// Upper bound on identity and room name length, in bytes.
pub const MAX_NAME_BYTES: usize = 256;

/// Request body for `POST /token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Participant identity to embed in the grant.
    #[serde(default)]
    pub identity: String,
    /// Room to join. Falls back to the server's configured room when absent.
    #[serde(rename = "roomName", default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
}

/// Response body for a successful `POST /token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Signed access token.
    pub token: String,
    /// The room the token grants access to.
    #[serde(rename = "roomName")]
    pub room_name: String,
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339 timestamp of the check.
    pub timestamp: String,
    /// Whether signing credentials are present.
    pub configured: bool,
}

/// Rejected credential request input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("identity is required")]
    MissingIdentity,

    #[error("{field} exceeds {max} bytes")]
    TooLong { field: &'static str, max: usize },

    #[error("{0} contains control characters")]
    ControlCharacters(&'static str),
}

/// Validates a participant identity.
///
/// Surrounding whitespace is ignored; the trimmed identity is returned.
pub fn validate_identity(identity: &str) -> Result<&str, ValidationError> {
    let trimmed = identity.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingIdentity);
    }
    check_name("identity", trimmed)?;
    Ok(trimmed)
}

/// Resolves the room for a request, falling back to `default_room` when the
/// requested name is absent or blank.
pub fn resolve_room<'a>(
    requested: Option<&'a str>,
    default_room: &'a str,
) -> Result<&'a str, ValidationError> {
    match requested.map(str::trim).filter(|r| !r.is_empty()) {
        Some(room) => {
            check_name("roomName", room)?;
            Ok(room)
        }
        None => Ok(default_room),
    }
}

fn check_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.len() > MAX_NAME_BYTES {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_NAME_BYTES,
        });
    }
    if value.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacters(field));
    }
    Ok(())
}
