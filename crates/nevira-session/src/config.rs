use crate::engine::RoomOptions;
use nevira_types::DEFAULT_ROOM_NAME;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_livekit_url() -> String {
    "ws://localhost:7880".to_string()
}

fn default_token_endpoint() -> String {
    "http://localhost:3001/token".to_string()
}

fn default_room_name() -> String {
    DEFAULT_ROOM_NAME.to_string()
}

fn default_identity_prefix() -> String {
    "user".to_string()
}

fn default_agent_window_ms() -> u64 {
    3000
}

/// Client-side session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Media platform URL passed to the engine.
    #[serde(default = "default_livekit_url")]
    pub livekit_url: String,
    /// Credential endpoint (`POST /token`) read by
    /// [`HttpTokenSource::from_config`](crate::HttpTokenSource::from_config).
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_room_name")]
    pub room_name: String,
    /// Prefix for generated local identities (`<prefix>_<8 hex>`).
    #[serde(default = "default_identity_prefix")]
    pub identity_prefix: String,
    /// How long the agent-speaking flag stays up after an agent audio track
    /// is subscribed.
    #[serde(default = "default_agent_window_ms")]
    pub agent_window_ms: u64,
    #[serde(default)]
    pub room_options: RoomOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            livekit_url: default_livekit_url(),
            token_endpoint: default_token_endpoint(),
            room_name: default_room_name(),
            identity_prefix: default_identity_prefix(),
            agent_window_ms: default_agent_window_ms(),
            room_options: RoomOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn agent_window(&self) -> Duration {
        Duration::from_millis(self.agent_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_hosted_setup() {
        let config = SessionConfig::default();
        assert_eq!(config.room_name, "nevira-room");
        assert_eq!(config.agent_window(), Duration::from_secs(3));
        assert!(config.room_options.adaptive_stream);
        assert!(config.room_options.dynacast);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"livekit_url":"wss://nevira.livekit.cloud"}"#).unwrap();
        assert_eq!(config.livekit_url, "wss://nevira.livekit.cloud");
        assert_eq!(config.token_endpoint, "http://localhost:3001/token");
        assert_eq!(config.agent_window_ms, 3000);
    }
}
