//! The session controller actor.
//!
//! One tokio task owns the media engine, the token source and the
//! [`SessionState`]. User intents arrive through a [`SessionHandle`], engine
//! events through the receiver returned by [`MediaEngine::connect`], and the
//! agent-speaking window fires from a single deadline. All three are handled
//! one at a time on the task, so projection updates never race.
//!
//! Network calls (token request, engine connect, microphone) are awaited
//! while the mailbox keeps draining: a disconnect that arrives mid-connect is
//! recorded and applied as soon as the in-flight step resolves, and extra
//! connect intents are dropped by the state machine.
//!
//! The task exits on [`SessionHandle::shutdown`] or when every handle has
//! been dropped. Either way the active session is torn down first.

use crate::classify::AgentClassifier;
use crate::config::SessionConfig;
use crate::engine::{DisconnectReason, EngineEvent, MediaEngine};
use crate::error::{ConnectError, ControlError, SessionError};
use crate::machine::{self, Effect, Input, SessionState, Stage};
use crate::token_source::TokenSource;
use nevira_types::UiState;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default channel buffer size for the controller mailbox.
const COMMAND_CHANNEL_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Connect,
    Disconnect,
    ToggleMute,
    Shutdown,
}

/// Handle to a running [`SessionController`].
///
/// Cheap to clone. Intent methods only enqueue; observe their outcome through
/// [`state`](Self::state), [`subscribe`](Self::subscribe) or
/// [`wait_for`](Self::wait_for).
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<UiState>,
}

impl SessionHandle {
    /// Starts a session. Ignored unless the controller is idle.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.send(Command::Connect).await
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.send(Command::Disconnect).await
    }

    /// Flips the microphone. Ignored unless connected.
    pub async fn toggle_mute(&self) -> Result<(), SessionError> {
        self.send(Command::ToggleMute).await
    }

    /// Tears down any session and stops the controller task.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Command::Shutdown).await
    }

    /// Snapshot of the current UI state.
    pub fn state(&self) -> UiState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.state.clone()
    }

    /// Waits until the UI state satisfies `predicate` and returns it.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<UiState, SessionError>
    where
        F: FnMut(&UiState) -> bool,
    {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|state| predicate(state))
            .await
            .map_err(|_| SessionError::ControllerClosed)?
            .clone();
        Ok(state)
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::ControllerClosed)
    }
}

/// Intent side of the actor: turns commands into machine inputs.
struct Mailbox {
    commands: mpsc::Receiver<Command>,
    open: bool,
    stopping: bool,
    identity_prefix: String,
}

impl Mailbox {
    /// Returns `None` for intents that arrive once the controller is
    /// stopping: nothing may open a session after shutdown was requested.
    fn accept(&mut self, command: Option<Command>) -> Option<Input> {
        if command.is_none() {
            self.open = false;
        }
        if self.stopping {
            debug!(?command, "controller stopping, ignoring intent");
            return None;
        }
        let input = match command {
            Some(Command::Connect) => Input::Connect {
                identity: fresh_identity(&self.identity_prefix),
            },
            Some(Command::Disconnect) => Input::Disconnect,
            Some(Command::ToggleMute) => Input::ToggleMute,
            Some(Command::Shutdown) => {
                self.stopping = true;
                Input::Disconnect
            }
            None => {
                debug!("all session handles dropped");
                self.stopping = true;
                Input::Disconnect
            }
        };
        Some(input)
    }
}

/// State side of the actor: the machine plus the published projection.
struct Core {
    state: SessionState,
    classifier: Arc<dyn AgentClassifier>,
    ui_tx: watch::Sender<UiState>,
}

impl Core {
    fn apply(&mut self, input: Input) -> Vec<Effect> {
        let effects = machine::step(&mut self.state, input, self.classifier.as_ref());
        let ui = self.state.ui();
        self.ui_tx.send_if_modified(|current| {
            if *current == *ui {
                false
            } else {
                *current = ui.clone();
                true
            }
        });
        effects
    }
}

/// Owns one client session at a time. See the module docs.
pub struct SessionController<E, T> {
    config: SessionConfig,
    engine: E,
    tokens: T,
    core: Core,
    mailbox: Mailbox,
    events: Option<mpsc::Receiver<EngineEvent>>,
    /// Pending agent-speaking window: when it ends and which generation it
    /// belongs to. Re-arming replaces it.
    agent_deadline: Option<(Instant, u64)>,
}

impl<E, T> SessionController<E, T>
where
    E: MediaEngine,
    T: TokenSource,
{
    /// Spawns the controller task and returns a handle to it.
    pub fn spawn(
        config: SessionConfig,
        engine: E,
        tokens: T,
        classifier: Arc<dyn AgentClassifier>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let (ui_tx, ui_rx) = watch::channel(UiState::default());

        let controller = Self {
            mailbox: Mailbox {
                commands: command_rx,
                open: true,
                stopping: false,
                identity_prefix: config.identity_prefix.clone(),
            },
            config,
            engine,
            tokens,
            core: Core {
                state: SessionState::new(),
                classifier,
                ui_tx,
            },
            events: None,
            agent_deadline: None,
        };

        let task = tokio::spawn(controller.run());
        let handle = SessionHandle {
            commands: command_tx,
            state: ui_rx,
        };
        (handle, task)
    }

    async fn run(mut self) {
        info!(room = %self.config.room_name, "session controller started");

        loop {
            tokio::select! {
                command = self.mailbox.commands.recv(), if self.mailbox.open => {
                    if let Some(input) = self.mailbox.accept(command) {
                        self.dispatch(input).await;
                    }
                }
                event = next_event(&mut self.events), if self.events.is_some() => {
                    let input = match event {
                        Some(event) => Input::Engine(event),
                        None => {
                            warn!("media engine closed its event stream");
                            self.events = None;
                            Input::Engine(EngineEvent::Disconnected {
                                reason: Some(DisconnectReason::ConnectionLost),
                            })
                        }
                    };
                    self.dispatch(input).await;
                }
                generation = agent_window_elapsed(self.agent_deadline), if self.agent_deadline.is_some() => {
                    self.agent_deadline = None;
                    self.dispatch(Input::AgentWindowElapsed { generation }).await;
                }
                else => break,
            }

            if self.mailbox.stopping {
                break;
            }
        }

        if self.core.state.stage() != &Stage::Idle {
            warn!(stage = ?self.core.state.stage(), "session still active on exit, tearing down");
            self.dispatch(Input::Disconnect).await;
        }

        info!("session controller stopped");
    }

    /// Applies `input` and runs every effect it (transitively) produces.
    async fn dispatch(&mut self, input: Input) {
        let mut pending: VecDeque<Effect> = self.core.apply(input).into();
        while let Some(effect) = pending.pop_front() {
            if let Some(next) = self.perform(effect, &mut pending).await {
                pending.extend(self.core.apply(next));
            }
        }
    }

    /// Runs one effect and returns the input that reports its outcome.
    ///
    /// Effects produced by intents that arrive while a network call is in
    /// flight are appended to `deferred`.
    async fn perform(&mut self, effect: Effect, deferred: &mut VecDeque<Effect>) -> Option<Input> {
        match effect {
            Effect::RequestToken { identity } => {
                let result = drain_while(
                    self.tokens.request_token(&identity, &self.config.room_name),
                    &mut self.mailbox,
                    &mut self.core,
                    deferred,
                )
                .await;
                Some(match result {
                    Ok(token) => Input::TokenIssued { token },
                    Err(e) => Input::ConnectFailed {
                        error: ConnectError::from(e).to_string(),
                    },
                })
            }
            Effect::OpenSession { token } => {
                let result = drain_while(
                    self.engine.connect(
                        &self.config.livekit_url,
                        &token,
                        &self.config.room_options,
                    ),
                    &mut self.mailbox,
                    &mut self.core,
                    deferred,
                )
                .await;
                Some(match result {
                    Ok(events) => {
                        self.events = Some(events);
                        Input::SessionOpened
                    }
                    Err(e) => Input::ConnectFailed {
                        error: ConnectError::from(e).to_string(),
                    },
                })
            }
            Effect::EnableMicrophone => {
                let result = drain_while(
                    self.engine.set_microphone_enabled(true),
                    &mut self.mailbox,
                    &mut self.core,
                    deferred,
                )
                .await;
                Some(match result {
                    Ok(()) => Input::MicrophoneEnabled,
                    Err(e) => Input::ConnectFailed {
                        error: ConnectError::from(e).to_string(),
                    },
                })
            }
            Effect::SetMicrophone { enabled } => {
                let result = drain_while(
                    self.engine.set_microphone_enabled(enabled),
                    &mut self.mailbox,
                    &mut self.core,
                    deferred,
                )
                .await;
                Some(match result {
                    Ok(()) => Input::MicrophoneSet { enabled },
                    Err(e) => Input::MicrophoneFailed {
                        error: ControlError::Microphone(e).to_string(),
                    },
                })
            }
            Effect::AttachAudio { track } => {
                if let Err(e) = self.engine.attach_audio(&track).await {
                    warn!(sid = %track.sid, error = %e, "failed to attach remote audio");
                }
                None
            }
            Effect::RefreshRoster => Some(Input::RosterSnapshot {
                identities: self.engine.remote_participants(),
            }),
            Effect::ArmAgentWindow { generation } => {
                self.agent_deadline = Some((Instant::now() + self.config.agent_window(), generation));
                None
            }
            Effect::CancelAgentWindow => {
                self.agent_deadline = None;
                None
            }
            Effect::TearDown => {
                self.teardown().await;
                None
            }
        }
    }

    async fn teardown(&mut self) {
        self.events = None;
        self.agent_deadline = None;
        if let Err(e) = self.engine.disconnect().await {
            warn!(error = %ControlError::Teardown(e), "session teardown incomplete");
        }
    }
}

/// Awaits `fut` while still accepting intents from the mailbox.
async fn drain_while<F>(
    fut: F,
    mailbox: &mut Mailbox,
    core: &mut Core,
    deferred: &mut VecDeque<Effect>,
) -> F::Output
where
    F: Future,
{
    tokio::pin!(fut);
    loop {
        tokio::select! {
            biased;
            output = &mut fut => return output,
            command = mailbox.commands.recv(), if mailbox.open => {
                if let Some(input) = mailbox.accept(command) {
                    deferred.extend(core.apply(input));
                }
            }
        }
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<EngineEvent>>) -> Option<EngineEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn agent_window_elapsed(deadline: Option<(Instant, u64)>) -> u64 {
    match deadline {
        Some((at, generation)) => {
            tokio::time::sleep_until(at).await;
            generation
        }
        None => std::future::pending().await,
    }
}

fn fresh_identity(prefix: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{prefix}_{suffix}")
}
