//! Error types for client session control.

use thiserror::Error;

/// Failure reported by the media engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("could not reach media server: {0}")]
    Unreachable(String),

    #[error("media server rejected the connection: {0}")]
    Rejected(String),

    #[error("microphone unavailable: {0}")]
    Microphone(String),

    #[error("media engine error: {0}")]
    Other(String),
}

/// Failure fetching a credential from the token server.
#[derive(Debug, Error)]
pub enum TokenSourceError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token server returned {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// A connect attempt failed. The controller returns to idle.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Token(#[from] TokenSourceError),

    #[error(transparent)]
    Media(#[from] MediaError),
}

/// A control call on an established session failed.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("microphone toggle failed: {0}")]
    Microphone(MediaError),

    #[error("teardown failed: {0}")]
    Teardown(MediaError),
}

/// Errors returned to callers of a [`SessionHandle`](crate::SessionHandle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session controller has shut down")]
    ControllerClosed,
}
