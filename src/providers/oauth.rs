//! OAuth 2.0 refresh-token grant against a provider's token endpoint.

use super::{RefreshCapability, TokenGrant};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::debug;

/// Token response from an OAuth token refresh endpoint.
///
/// Slack answers HTTP 200 with `{"ok": false, "error": ...}` on failure, so
/// every field is optional and `ok` is checked explicitly.
#[derive(Deserialize, Debug)]
struct TokenRefreshResponse {
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Refreshes tokens with `grant_type=refresh_token`.
///
/// Client credentials are sent in the form body, which every supported
/// provider (Google, Slack, Atlassian) accepts.
#[derive(Clone)]
pub struct OAuthRefresher {
    token_url: String,
    client_id: String,
    client_secret: String,
    http_client: reqwest::Client,
}

impl OAuthRefresher {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http_client,
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

#[async_trait]
impl RefreshCapability for OAuthRefresher {
    async fn refresh(&self, provider_id: &str, refresh_token: &str) -> Result<TokenGrant> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        debug!(
            provider = %provider_id,
            token_url = %self.token_url,
            "Sending refresh token grant"
        );

        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .context("Failed to send token refresh request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            anyhow::bail!("Token refresh failed with status {}: {}", status, body);
        }

        let token_response: TokenRefreshResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;

        if token_response.ok == Some(false) {
            return Err(anyhow!(
                "Provider rejected token refresh: {}",
                token_response.error.as_deref().unwrap_or("unknown error")
            ));
        }

        debug!(
            provider = %provider_id,
            rotated = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            "Token refresh response received"
        );

        let expires_at = match token_response.expires_in {
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .ok_or_else(|| anyhow!("Token refresh response has out-of-range expires_in: {}", secs))?,
            ),
            None => None,
        };

        Ok(TokenGrant {
            access_token: token_response.access_token.unwrap_or_default(),
            refresh_token: token_response.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
            token_type: token_response.token_type,
        })
    }
}
