//! Client-side session control for Nevira voice calls.
//!
//! A [`SessionController`] owns at most one real-time audio session. It
//! fetches a credential from the token server, opens the media engine
//! connection, publishes the microphone and folds the engine's event stream
//! into a [`UiState`](nevira_types::UiState) projection that a presentation
//! layer can render.
//!
//! The crate splits into three layers:
//!
//! - [`machine`]: a pure transition function `(state, input) -> effects`
//!   with no I/O, so every rule can be tested without a network.
//! - [`engine`] and [`token_source`]: the seams to the media engine and the
//!   credential endpoint.
//! - [`controller`]: the tokio actor that serializes intents and engine
//!   events, runs effects and publishes state on a `watch` channel.

pub mod classify;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod machine;
pub mod token_source;

pub use classify::{AgentClassifier, MarkerClassifier};
pub use config::SessionConfig;
pub use controller::{SessionController, SessionHandle};
pub use engine::{
    DisconnectReason, EngineEvent, MediaEngine, RoomOptions, Speaker, SubscribedTrack, TrackKind,
};
pub use error::{ConnectError, ControlError, MediaError, SessionError, TokenSourceError};
pub use token_source::{HttpTokenSource, TokenSource};
