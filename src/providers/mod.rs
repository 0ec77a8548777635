//! Provider refresh capabilities.
//!
//! The lifecycle manager never speaks OAuth itself. It resolves a
//! [`RefreshCapability`] for a provider id from an explicit
//! [`ProviderRegistry`] and calls through that one-method interface.
//!
//! # Core Types
//!
//! - [`RefreshCapability`] - Trait each provider implements
//! - [`TokenGrant`] - What a successful refresh hands back
//! - [`ProviderRegistry`] - Provider id → capability, built at startup
//! - [`OAuthRefresher`] - Standard `grant_type=refresh_token` implementation
//!
//! # Implementing a capability
//!
//! ```no_run
//! use tokenbroker::providers::{RefreshCapability, TokenGrant};
//! use async_trait::async_trait;
//! use anyhow::Result;
//!
//! struct StaticRefresher;
//!
//! #[async_trait]
//! impl RefreshCapability for StaticRefresher {
//!     async fn refresh(&self, provider_id: &str, refresh_token: &str) -> Result<TokenGrant> {
//!         // Exchange `refresh_token` with the provider's token endpoint
//!         Ok(TokenGrant::new(format!("{}-access", provider_id)))
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub mod catalog;
mod oauth;

pub use catalog::{build_registry, is_supported_provider, supported_providers, OAuthClient};
pub use oauth::OAuthRefresher;

/// Result of a successful refresh exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// New access token. Empty means the provider returned nothing usable.
    pub access_token: String,

    /// Rotated refresh token, if the provider issued one
    pub refresh_token: Option<String>,

    /// New absolute expiry, if the provider reported one
    pub expires_at: Option<DateTime<Utc>>,

    /// Token type reported by the provider
    pub token_type: Option<String>,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Self::default()
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }
}

/// Exchanges a refresh token for a new access token.
///
/// Implemented once per OAuth client (Google, Slack, Confluence). The same
/// implementation may back several logical providers, so the provider id is
/// passed through for logging and error messages.
///
/// # Error Handling
/// - Transport or provider-side failures → `Err(...)`; the manager reports
///   them as `RefreshFailed`
/// - A grant with an empty access token is reported as `InvalidRefreshResult`
/// - Implementations must not retry; the caller owns the latency budget
#[async_trait]
pub trait RefreshCapability: Send + Sync {
    async fn refresh(&self, provider_id: &str, refresh_token: &str) -> Result<TokenGrant>;
}

/// Explicit provider id → refresh capability mapping.
///
/// Built once at startup and shared with the lifecycle manager.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    capabilities: HashMap<String, Arc<dyn RefreshCapability>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the capability for a provider id.
    pub fn register(&mut self, provider_id: impl Into<String>, capability: Arc<dyn RefreshCapability>) {
        self.capabilities.insert(provider_id.into(), capability);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, provider_id: impl Into<String>, capability: Arc<dyn RefreshCapability>) -> Self {
        self.register(provider_id, capability);
        self
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn RefreshCapability>> {
        self.capabilities.get(provider_id).cloned()
    }

    /// Registered provider ids, sorted.
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.capabilities.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
