//! Test doubles for the media engine and token source.

#![allow(dead_code)]

use async_trait::async_trait;
use nevira_session::{
    EngineEvent, MediaEngine, MediaError, RoomOptions, SubscribedTrack, TokenSource,
    TokenSourceError, TrackKind,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct EngineInner {
    remote: BTreeSet<String>,
    events: Option<mpsc::Sender<EngineEvent>>,
    connect_calls: Vec<(String, String, RoomOptions)>,
    microphone_calls: Vec<bool>,
    attached: Vec<String>,
    disconnect_calls: usize,
    connect_error: Option<MediaError>,
    microphone_error: Option<MediaError>,
    connect_delay: Option<Duration>,
    microphone_delay: Option<Duration>,
}

/// In-memory media engine. Clones share state so the test can drive the
/// room while the controller owns its copy.
#[derive(Clone, Default)]
pub struct FakeEngine {
    inner: Arc<Mutex<EngineInner>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut EngineInner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner)
    }

    pub fn fail_connect(&self, error: MediaError) {
        self.with(|i| i.connect_error = Some(error));
    }

    pub fn fail_microphone(&self, error: Option<MediaError>) {
        self.with(|i| i.microphone_error = error);
    }

    pub fn delay_connect(&self, delay: Duration) {
        self.with(|i| i.connect_delay = Some(delay));
    }

    pub fn delay_microphone(&self, delay: Duration) {
        self.with(|i| i.microphone_delay = Some(delay));
    }

    pub fn connect_calls(&self) -> Vec<(String, String, RoomOptions)> {
        self.with(|i| i.connect_calls.clone())
    }

    pub fn microphone_calls(&self) -> Vec<bool> {
        self.with(|i| i.microphone_calls.clone())
    }

    pub fn attached(&self) -> Vec<String> {
        self.with(|i| i.attached.clone())
    }

    pub fn disconnect_calls(&self) -> usize {
        self.with(|i| i.disconnect_calls)
    }

    /// Sends a raw event on the open session.
    pub async fn emit(&self, event: EngineEvent) {
        let tx = self
            .with(|i| i.events.clone())
            .expect("no open session to emit on");
        tx.send(event).await.expect("controller dropped event stream");
    }

    /// Adds a remote participant and announces it.
    pub async fn join(&self, identity: &str) {
        self.with(|i| i.remote.insert(identity.to_string()));
        self.emit(EngineEvent::ParticipantConnected {
            identity: identity.to_string(),
        })
        .await;
    }

    /// Removes a remote participant and announces it.
    pub async fn leave(&self, identity: &str) {
        self.with(|i| i.remote.remove(identity));
        self.emit(EngineEvent::ParticipantDisconnected {
            identity: identity.to_string(),
        })
        .await;
    }

    /// Publishes an audio track from a remote participant.
    pub async fn publish_audio(&self, identity: &str) {
        self.emit(EngineEvent::TrackSubscribed {
            track: SubscribedTrack {
                sid: format!("TR_{identity}"),
                kind: TrackKind::Audio,
                participant: identity.to_string(),
                participant_is_local: false,
            },
        })
        .await;
    }

    /// Drops the engine's side of the event stream, as a crashed engine would.
    pub fn close_events(&self) {
        self.with(|i| i.events = None);
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn connect(
        &mut self,
        url: &str,
        token: &str,
        options: &RoomOptions,
    ) -> Result<mpsc::Receiver<EngineEvent>, MediaError> {
        let delay = self.with(|i| i.connect_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.with(|i| {
            i.connect_calls
                .push((url.to_string(), token.to_string(), *options));
            if let Some(error) = i.connect_error.clone() {
                return Err(error);
            }
            let (tx, rx) = mpsc::channel(64);
            i.events = Some(tx);
            Ok(rx)
        })
    }

    async fn set_microphone_enabled(&mut self, enabled: bool) -> Result<(), MediaError> {
        let delay = self.with(|i| i.microphone_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.with(|i| {
            i.microphone_calls.push(enabled);
            match i.microphone_error.clone() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }

    async fn attach_audio(&mut self, track: &SubscribedTrack) -> Result<(), MediaError> {
        self.with(|i| i.attached.push(track.sid.clone()));
        Ok(())
    }

    fn remote_participants(&self) -> Vec<String> {
        self.with(|i| i.remote.iter().cloned().collect())
    }

    async fn disconnect(&mut self) -> Result<(), MediaError> {
        self.with(|i| {
            i.disconnect_calls += 1;
            i.events = None;
            i.remote.clear();
        });
        Ok(())
    }
}

#[derive(Default)]
struct TokensInner {
    requests: Vec<(String, String)>,
    fail: bool,
    delay: Option<Duration>,
}

/// Token source that mints `token-for-<identity>` or fails on demand.
#[derive(Clone, Default)]
pub struct FakeTokens {
    inner: Arc<Mutex<TokensInner>>,
}

impl FakeTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let tokens = Self::default();
        tokens.inner.lock().unwrap().fail = true;
        tokens
    }

    pub fn delay(&self, delay: Duration) {
        self.inner.lock().unwrap().delay = Some(delay);
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl TokenSource for FakeTokens {
    async fn request_token(&self, identity: &str, room: &str) -> Result<String, TokenSourceError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.requests.push((identity.to_string(), room.to_string()));
            inner.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.inner.lock().unwrap().fail {
            return Err(TokenSourceError::Rejected {
                status: 503,
                message: "token server unreachable".to_string(),
            });
        }
        Ok(format!("token-for-{identity}"))
    }
}
