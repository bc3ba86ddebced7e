use crate::config::LiveKitConfig;
use crate::error::VoiceError;
use chrono::{DateTime, Utc};
use livekit_api::access_token::{AccessToken, VideoGrants};
use nevira_types::{resolve_room, validate_identity};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Capabilities embedded in every grant.
///
/// This deployment always grants the full set; narrower grants are not
/// supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub join: bool,
    pub publish: bool,
    pub subscribe: bool,
    pub publish_data: bool,
}

impl Capabilities {
    pub const FULL: Self = Self {
        join: true,
        publish: true,
        subscribe: true,
        publish_data: true,
    };
}

/// A signed, scoped, expiring credential.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub identity: String,
    pub room: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub capabilities: Capabilities,
    /// The signed JWT handed to the client.
    #[serde(skip_serializing)]
    pub token: String,
}

/// Stateless issuer of LiveKit join tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    config: LiveKitConfig,
    ttl: Duration,
}

impl TokenIssuer {
    /// Builds an issuer, refusing configurations without a signing key pair.
    pub fn new(config: LiveKitConfig) -> Result<Self, VoiceError> {
        if !config.has_credentials() {
            return Err(VoiceError::Config(
                "LiveKit API key and secret must both be set".to_string(),
            ));
        }
        if config.token_ttl_seconds == 0 {
            return Err(VoiceError::Config(
                "token_ttl_seconds must be greater than zero".to_string(),
            ));
        }
        let ttl = Duration::from_secs(config.token_ttl_seconds);
        Ok(Self { config, ttl })
    }

    pub fn is_configured(&self) -> bool {
        self.config.has_credentials()
    }

    pub fn default_room(&self) -> &str {
        &self.config.room_name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the media platform URL clients should connect to.
    pub fn livekit_url(&self) -> &str {
        &self.config.url
    }

    /// Issues a grant for `identity` in `room` (or the default room).
    pub fn issue(&self, identity: &str, room: Option<&str>) -> Result<Grant, VoiceError> {
        self.issue_at(identity, room, Utc::now())
    }

    /// Issues a grant stamped with `now` as its issue time.
    ///
    /// The JWT `nbf`/`exp` claims are stamped by the token library from the
    /// system clock; `issued_at`/`expires_at` on the returned [`Grant`]
    /// always differ by exactly the configured TTL.
    pub fn issue_at(
        &self,
        identity: &str,
        room: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Grant, VoiceError> {
        let identity = validate_identity(identity)?;
        let room = resolve_room(room, &self.config.room_name)?;

        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(identity)
            .with_grants(VideoGrants {
                room_join: true,
                room: room.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(self.ttl)
            .to_jwt()?;

        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| VoiceError::Config(format!("token ttl out of range: {e}")))?;

        info!(identity, room, "token generated");

        Ok(Grant {
            identity: identity.to_string(),
            room: room.to_string(),
            issued_at: now,
            expires_at: now + ttl,
            capabilities: Capabilities::FULL,
            token,
        })
    }
}
