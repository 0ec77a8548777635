//! Built-in provider catalog.
//!
//! Maps each logical provider id to the OAuth client that backs it. Several
//! providers may share one client ("gmail" and "google-drive" both refresh
//! through Google) while remaining distinct token records.

use super::{OAuthRefresher, ProviderRegistry, RefreshCapability};
use crate::config::{OAuthClientConfig, ProvidersConfig};
use std::sync::Arc;
use tracing::{debug, info};

/// OAuth application backing one or more logical providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OAuthClient {
    Google,
    Slack,
    Confluence,
}

impl OAuthClient {
    pub fn name(&self) -> &'static str {
        match self {
            OAuthClient::Google => "google",
            OAuthClient::Slack => "slack",
            OAuthClient::Confluence => "confluence",
        }
    }

    /// Token endpoint used for `grant_type=refresh_token`.
    pub fn default_token_url(&self) -> &'static str {
        match self {
            OAuthClient::Google => "https://oauth2.googleapis.com/token",
            OAuthClient::Slack => "https://slack.com/api/oauth.v2.access",
            OAuthClient::Confluence => "https://auth.atlassian.com/oauth/token",
        }
    }

    fn config<'a>(&self, providers: &'a ProvidersConfig) -> Option<&'a OAuthClientConfig> {
        match self {
            OAuthClient::Google => providers.google.as_ref(),
            OAuthClient::Slack => providers.slack.as_ref(),
            OAuthClient::Confluence => providers.confluence.as_ref(),
        }
    }
}

/// Logical provider ids and their backing clients.
const PROVIDERS: &[(&str, OAuthClient)] = &[
    ("gmail", OAuthClient::Google),
    ("google-drive", OAuthClient::Google),
    ("slack", OAuthClient::Slack),
    ("confluence", OAuthClient::Confluence),
];

const CLIENTS: &[OAuthClient] = &[OAuthClient::Google, OAuthClient::Slack, OAuthClient::Confluence];

/// All provider ids known to the broker.
pub fn supported_providers() -> Vec<&'static str> {
    PROVIDERS.iter().map(|(id, _)| *id).collect()
}

/// Check if a provider id is in the catalog
pub fn is_supported_provider(provider_id: &str) -> bool {
    client_for(provider_id).is_some()
}

/// Returns the OAuth client backing a provider id.
pub fn client_for(provider_id: &str) -> Option<OAuthClient> {
    PROVIDERS
        .iter()
        .find(|(id, _)| *id == provider_id)
        .map(|(_, client)| *client)
}

/// Builds the provider registry from configured OAuth clients.
///
/// Each configured client gets one [`OAuthRefresher`], registered under every
/// provider id it backs. Clients without both id and secret are skipped, so
/// their providers resolve to `ProviderUnavailable`.
pub fn build_registry(config: &ProvidersConfig, http_client: reqwest::Client) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    for client in CLIENTS {
        let Some(client_config) = client.config(config).filter(|c| c.is_complete()) else {
            debug!(client = client.name(), "OAuth client not configured, skipping");
            continue;
        };

        let token_url = client_config
            .token_url
            .clone()
            .unwrap_or_else(|| client.default_token_url().to_string());

        let refresher: Arc<dyn RefreshCapability> = Arc::new(OAuthRefresher::new(
            token_url.clone(),
            client_config.client_id.clone(),
            client_config.client_secret.clone(),
            http_client.clone(),
        ));

        for (provider_id, _) in PROVIDERS.iter().filter(|(_, c)| c == client) {
            registry.register(*provider_id, Arc::clone(&refresher));
        }

        info!(client = client.name(), token_url = %token_url, "Registered OAuth client");
    }

    registry
}
