//! Credential acquisition.

use crate::config::SessionConfig;
use crate::error::TokenSourceError;
use async_trait::async_trait;
use nevira_types::{TokenRequest, TokenResponse};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Timeout for a single token request.
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can mint a join token for an identity.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn request_token(&self, identity: &str, room: &str) -> Result<String, TokenSourceError>;
}

/// Fetches tokens from the Nevira token server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTokenSource {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpTokenSource {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TokenSourceError> {
        let client = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Builds a client for the credential endpoint named in `config`.
    pub fn from_config(config: &SessionConfig) -> Result<Self, TokenSourceError> {
        Self::new(config.token_endpoint.clone())
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn request_token(&self, identity: &str, room: &str) -> Result<String, TokenSourceError> {
        let request = TokenRequest {
            identity: identity.to_string(),
            room_name: Some(room.to_string()),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
            };
            return Err(TokenSourceError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: TokenResponse = response.json().await?;
        debug!(identity, room = %body.room_name, endpoint = %self.endpoint, "received token");
        Ok(body.token)
    }
}
