//! UI-visible projection of a client voice session.
//!
//! These types are what a presentation layer renders. They are derived from
//! the media platform's event stream and are never authoritative.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Externally observable connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    #[default]
    Idle,
    Connecting,
    Connected,
}

/// Link quality reported by the media platform for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Poor,
    Lost,
}

/// A remote participant as shown in the roster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Participant {
    pub identity: String,
    /// Heuristic classification; see the session controller's classifier.
    #[serde(rename = "isAgent")]
    pub is_agent: bool,
}

/// Everything the presentation layer needs to render a session.
///
/// When `phase` is [`ConnectionPhase::Idle`] the roster is empty and the
/// mute and speaking flags are all false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    #[serde(rename = "connectionPhase")]
    pub phase: ConnectionPhase,
    pub muted: bool,
    pub locally_speaking: bool,
    pub agent_speaking: bool,
    pub participants: Vec<Participant>,
    /// Last failure, cleared when the next connect attempt starts.
    pub last_error: Option<String>,
    /// Local identity of the current (or in-flight) session.
    pub identity: Option<String>,
    /// Latest reported quality per participant identity. Informational only.
    pub quality: BTreeMap<String, ConnectionQuality>,
}

impl UiState {
    /// Returns the state to `Idle`, dropping everything derived from the
    /// session. `last_error` is kept.
    pub fn clear_session(&mut self) {
        self.phase = ConnectionPhase::Idle;
        self.muted = false;
        self.locally_speaking = false;
        self.agent_speaking = false;
        self.participants.clear();
        self.identity = None;
        self.quality.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    /// Whether any participant in the roster is classified as an agent.
    pub fn agent_present(&self) -> bool {
        self.participants.iter().any(|p| p.is_agent)
    }
}
