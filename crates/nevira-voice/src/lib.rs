//! Credential issuance for Nevira voice sessions.
//!
//! Mints LiveKit access tokens that let a browser client join one room with
//! the full publish/subscribe capability set for a fixed lifetime. The
//! issuer is stateless: every grant is verifiable by the media platform with
//! the shared API secret alone, so any number of issuers can run side by
//! side and restart freely.
//!
//! The API secret is the only trust anchor. It never leaves the server: it is
//! skipped on serialization and redacted from `Debug` output.

pub mod config;
pub mod error;
pub mod issuer;

pub use config::LiveKitConfig;
pub use error::VoiceError;
pub use issuer::{Capabilities, Grant, TokenIssuer};
