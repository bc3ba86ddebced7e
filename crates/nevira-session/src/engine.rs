//! Seam to the real-time media engine.
//!
//! The engine does the actual work: capture, transport, codecs, track
//! subscription. The controller only calls the handful of control
//! operations on [`MediaEngine`] and consumes the [`EngineEvent`] stream it
//! returns from `connect`.

use crate::error::MediaError;
use async_trait::async_trait;
use nevira_types::ConnectionQuality;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Options applied when the room connection is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOptions {
    /// Let the engine pick stream quality based on rendered size.
    pub adaptive_stream: bool,
    /// Pause publishing layers nobody is subscribed to.
    pub dynacast: bool,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            adaptive_stream: true,
            dynacast: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A track the engine has subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribedTrack {
    pub sid: String,
    pub kind: TrackKind,
    /// Identity of the participant that published the track.
    pub participant: String,
    pub participant_is_local: bool,
}

/// One entry of an active-speaker report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speaker {
    pub identity: String,
    pub is_local: bool,
}

/// Why the platform closed the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    ParticipantRemoved,
    RoomDeleted,
    DuplicateIdentity,
    ServerShutdown,
    ConnectionLost,
    Other(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParticipantRemoved => f.write_str("removed from the room"),
            Self::RoomDeleted => f.write_str("room was closed"),
            Self::DuplicateIdentity => f.write_str("identity joined from another session"),
            Self::ServerShutdown => f.write_str("media server shut down"),
            Self::ConnectionLost => f.write_str("connection lost"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

/// Asynchronous notifications from an open session.
///
/// Delivery order across participants is not guaranteed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    ParticipantConnected {
        identity: String,
    },
    ParticipantDisconnected {
        identity: String,
    },
    TrackSubscribed {
        track: SubscribedTrack,
    },
    ActiveSpeakersChanged {
        speakers: Vec<Speaker>,
    },
    ConnectionQualityChanged {
        identity: String,
        quality: ConnectionQuality,
    },
    Disconnected {
        reason: Option<DisconnectReason>,
    },
}

/// Control surface of the media engine.
///
/// Implementations own the underlying room. `disconnect` must be safe to call
/// on a session that is already closed or was never fully opened.
#[async_trait]
pub trait MediaEngine: Send + 'static {
    /// Opens the room connection and returns its event stream.
    async fn connect(
        &mut self,
        url: &str,
        token: &str,
        options: &RoomOptions,
    ) -> Result<mpsc::Receiver<EngineEvent>, MediaError>;

    async fn set_microphone_enabled(&mut self, enabled: bool) -> Result<(), MediaError>;

    /// Routes a remote audio track to playback.
    async fn attach_audio(&mut self, track: &SubscribedTrack) -> Result<(), MediaError>;

    /// Identities of the remote participants currently in the room.
    fn remote_participants(&self) -> Vec<String>;

    async fn disconnect(&mut self) -> Result<(), MediaError>;
}
