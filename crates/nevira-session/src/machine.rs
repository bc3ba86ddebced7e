//! The session state machine.
//!
//! [`step`] is the only place session state changes. It takes the current
//! [`SessionState`] and one [`Input`] (a user intent, the outcome of an
//! effect, a platform event, or a timer firing), updates the state in place
//! and returns the [`Effect`]s the driver must perform. It performs no I/O,
//! so the whole rule set is testable with plain values.
//!
//! ```text
//!  Idle ──connect──▶ Connecting ──token──▶ ──session──▶ ──mic──▶ Connected
//!   ▲                    │  (any step fails: lastError, Idle)       │
//!   └────────────────────┴───────── disconnect / Disconnected ──────┘
//! ```

use crate::classify::{project_roster, AgentClassifier};
use crate::engine::{EngineEvent, SubscribedTrack, TrackKind};
use nevira_types::{ConnectionPhase, UiState};
use tracing::{debug, info, warn};

/// Sub-step of an in-flight connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStep {
    RequestingToken,
    OpeningSession,
    EnablingMicrophone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Connecting {
        step: ConnectStep,
        /// A disconnect intent arrived mid-connect; honor it once the
        /// current step resolves.
        disconnect_requested: bool,
    },
    Connected {
        /// A mute toggle is awaiting confirmation from the engine.
        mute_in_flight: bool,
    },
}

/// Everything the machine knows about the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    stage: Stage,
    ui: UiState,
    /// Generation of the most recently armed agent-speaking window.
    agent_window: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            stage: Stage::Idle,
            ui: UiState::default(),
            agent_window: 0,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.stage, Stage::Connected { .. })
    }

    fn enter_idle(&mut self) {
        self.stage = Stage::Idle;
        self.ui.clear_session();
    }

    fn fail_connect(&mut self, step: ConnectStep, error: String) -> Vec<Effect> {
        warn!(?step, %error, "connect attempt failed");
        self.enter_idle();
        self.ui.last_error = Some(error);
        match step {
            // Nothing was opened yet.
            ConnectStep::RequestingToken => Vec::new(),
            ConnectStep::OpeningSession | ConnectStep::EnablingMicrophone => {
                vec![Effect::TearDown]
            }
        }
    }
}

/// Something that happened and that the machine must react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// User asked to connect. The driver supplies a fresh identity.
    Connect { identity: String },
    /// User asked to disconnect.
    Disconnect,
    /// User asked to flip the microphone.
    ToggleMute,
    TokenIssued { token: String },
    SessionOpened,
    MicrophoneEnabled,
    /// Any step of the connect sequence failed.
    ConnectFailed { error: String },
    /// A mute toggle was confirmed by the engine.
    MicrophoneSet { enabled: bool },
    MicrophoneFailed { error: String },
    /// Snapshot of the engine's remote participants, answering
    /// [`Effect::RefreshRoster`].
    RosterSnapshot { identities: Vec<String> },
    AgentWindowElapsed { generation: u64 },
    Engine(EngineEvent),
}

/// Work the driver must perform on behalf of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fetch a credential; answer with `TokenIssued` or `ConnectFailed`.
    RequestToken { identity: String },
    /// Open the engine connection; answer with `SessionOpened` or `ConnectFailed`.
    OpenSession { token: String },
    /// Publish the microphone; answer with `MicrophoneEnabled` or `ConnectFailed`.
    EnableMicrophone,
    /// Answer with `MicrophoneSet` or `MicrophoneFailed`.
    SetMicrophone { enabled: bool },
    AttachAudio { track: SubscribedTrack },
    /// Answer with `RosterSnapshot`.
    RefreshRoster,
    /// Schedule `AgentWindowElapsed { generation }`, replacing any window
    /// already scheduled.
    ArmAgentWindow { generation: u64 },
    CancelAgentWindow,
    /// Close the engine connection (best effort) and stop reading its events.
    TearDown,
}

/// Applies one input to the session.
pub fn step(
    state: &mut SessionState,
    input: Input,
    classifier: &dyn AgentClassifier,
) -> Vec<Effect> {
    match input {
        Input::Connect { identity } => on_connect(state, identity),
        Input::Disconnect => on_disconnect(state),
        Input::ToggleMute => on_toggle_mute(state),
        Input::TokenIssued { token } => match state.stage {
            Stage::Connecting {
                step: ConnectStep::RequestingToken,
                disconnect_requested,
            } => {
                if disconnect_requested {
                    info!("disconnect requested while fetching token, abandoning connect");
                    state.enter_idle();
                    return Vec::new();
                }
                state.stage = Stage::Connecting {
                    step: ConnectStep::OpeningSession,
                    disconnect_requested,
                };
                vec![Effect::OpenSession { token }]
            }
            _ => stale("TokenIssued", state),
        },
        Input::SessionOpened => match state.stage {
            Stage::Connecting {
                step: ConnectStep::OpeningSession,
                disconnect_requested,
            } => {
                if disconnect_requested {
                    info!("disconnect requested while opening session, closing it");
                    state.enter_idle();
                    return vec![Effect::TearDown];
                }
                state.stage = Stage::Connecting {
                    step: ConnectStep::EnablingMicrophone,
                    disconnect_requested,
                };
                vec![Effect::EnableMicrophone]
            }
            _ => stale("SessionOpened", state),
        },
        Input::MicrophoneEnabled => match state.stage {
            Stage::Connecting {
                step: ConnectStep::EnablingMicrophone,
                disconnect_requested,
            } => {
                if disconnect_requested {
                    info!("disconnect requested while enabling microphone, closing session");
                    state.enter_idle();
                    return vec![Effect::TearDown];
                }
                state.stage = Stage::Connected {
                    mute_in_flight: false,
                };
                state.ui.phase = ConnectionPhase::Connected;
                state.ui.muted = false;
                info!(identity = ?state.ui.identity, "session connected");
                vec![Effect::RefreshRoster]
            }
            _ => stale("MicrophoneEnabled", state),
        },
        Input::ConnectFailed { error } => match state.stage {
            Stage::Connecting { step, .. } => state.fail_connect(step, error),
            _ => stale("ConnectFailed", state),
        },
        Input::MicrophoneSet { enabled } => {
            if let Stage::Connected { mute_in_flight } = &mut state.stage {
                *mute_in_flight = false;
                state.ui.muted = !enabled;
                debug!(muted = state.ui.muted, "microphone state confirmed");
                Vec::new()
            } else {
                stale("MicrophoneSet", state)
            }
        }
        Input::MicrophoneFailed { error } => {
            if let Stage::Connected { mute_in_flight } = &mut state.stage {
                *mute_in_flight = false;
                warn!(%error, "microphone toggle failed, keeping previous state");
                state.ui.last_error = Some(error);
                Vec::new()
            } else {
                stale("MicrophoneFailed", state)
            }
        }
        Input::RosterSnapshot { identities } => {
            if state.is_connected() {
                state.ui.participants = project_roster(identities, classifier);
                debug!(
                    participants = state.ui.participants.len(),
                    agent_present = state.ui.agent_present(),
                    "roster updated"
                );
                Vec::new()
            } else {
                stale("RosterSnapshot", state)
            }
        }
        Input::AgentWindowElapsed { generation } => {
            if state.is_connected() && generation == state.agent_window {
                state.ui.agent_speaking = false;
            }
            Vec::new()
        }
        Input::Engine(event) => {
            if state.is_connected() {
                fold_event(state, event, classifier)
            } else {
                debug!(?event, "dropping engine event outside a connected session");
                Vec::new()
            }
        }
    }
}

fn on_connect(state: &mut SessionState, identity: String) -> Vec<Effect> {
    if state.stage != Stage::Idle {
        debug!(stage = ?state.stage, "ignoring connect intent, session already active");
        return Vec::new();
    }
    info!(%identity, "connecting");
    state.ui.last_error = None;
    state.ui.phase = ConnectionPhase::Connecting;
    state.ui.identity = Some(identity.clone());
    state.stage = Stage::Connecting {
        step: ConnectStep::RequestingToken,
        disconnect_requested: false,
    };
    vec![Effect::RequestToken { identity }]
}

fn on_disconnect(state: &mut SessionState) -> Vec<Effect> {
    match &mut state.stage {
        Stage::Idle => Vec::new(),
        Stage::Connecting {
            disconnect_requested,
            ..
        } => {
            *disconnect_requested = true;
            Vec::new()
        }
        Stage::Connected { .. } => {
            info!("disconnecting");
            state.enter_idle();
            vec![Effect::CancelAgentWindow, Effect::TearDown]
        }
    }
}

fn on_toggle_mute(state: &mut SessionState) -> Vec<Effect> {
    match &mut state.stage {
        Stage::Connected { mute_in_flight } if !*mute_in_flight => {
            *mute_in_flight = true;
            // Currently muted means the toggle enables the microphone.
            vec![Effect::SetMicrophone {
                enabled: state.ui.muted,
            }]
        }
        Stage::Connected { .. } => {
            debug!("mute toggle already in flight, ignoring");
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn fold_event(
    state: &mut SessionState,
    event: EngineEvent,
    classifier: &dyn AgentClassifier,
) -> Vec<Effect> {
    match event {
        EngineEvent::ParticipantConnected { identity } => {
            info!(%identity, "participant connected");
            vec![Effect::RefreshRoster]
        }
        EngineEvent::ParticipantDisconnected { identity } => {
            info!(%identity, "participant disconnected");
            state.ui.quality.remove(&identity);
            vec![Effect::RefreshRoster]
        }
        EngineEvent::TrackSubscribed { track } => {
            debug!(sid = %track.sid, kind = ?track.kind, from = %track.participant, "track subscribed");
            if track.kind != TrackKind::Audio || track.participant_is_local {
                return Vec::new();
            }
            let is_agent = classifier.is_agent(&track.participant);
            let mut effects = vec![Effect::AttachAudio { track }];
            if is_agent {
                state.agent_window += 1;
                state.ui.agent_speaking = true;
                effects.push(Effect::ArmAgentWindow {
                    generation: state.agent_window,
                });
            }
            effects
        }
        EngineEvent::ActiveSpeakersChanged { speakers } => {
            let local = state.ui.identity.as_deref();
            state.ui.locally_speaking = speakers
                .iter()
                .any(|s| s.is_local || Some(s.identity.as_str()) == local);
            Vec::new()
        }
        EngineEvent::ConnectionQualityChanged { identity, quality } => {
            debug!(%identity, ?quality, "connection quality changed");
            state.ui.quality.insert(identity, quality);
            Vec::new()
        }
        EngineEvent::Disconnected { reason } => {
            info!(?reason, "disconnected by platform");
            state.enter_idle();
            if let Some(reason) = reason {
                state.ui.last_error = Some(format!("disconnected: {reason}"));
            }
            vec![Effect::CancelAgentWindow, Effect::TearDown]
        }
    }
}

fn stale(input: &'static str, state: &SessionState) -> Vec<Effect> {
    debug!(input, stage = ?state.stage, "ignoring stale input");
    Vec::new()
}
