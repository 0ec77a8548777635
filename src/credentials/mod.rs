//! In-memory credential storage for OAuth tokens.
//!
//! This module holds the per-user, per-provider token records and the
//! concurrency-safe store that maps `(user_id, provider_id)` to them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TokenStore                         │
//! │  - CRUD operations                       │
//! │  - Compare-and-swap for refresh commits  │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!     (write lock)         (read lock)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │   user_id → provider_id → record         │
//! │  - Whole records replaced atomically     │
//! │  - Empty users pruned on delete          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use tokenbroker::credentials::{CredentialRecord, TokenStore};
//! use chrono::{Duration, Utc};
//!
//! let store = TokenStore::new();
//!
//! let record = CredentialRecord::new("slack", "xoxe.xoxp-access")
//!     .with_refresh_token("xoxe-1-refresh")
//!     .with_expiry(Utc::now() + Duration::hours(12));
//! store.save("user1", "slack", record);
//!
//! if let Some(record) = store.get("user1", "slack") {
//!     assert_eq!(record.access_token, "xoxe.xoxp-access");
//! }
//!
//! store.delete("user1", "slack");
//! assert!(store.get_all("user1").is_empty());
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

mod store;


pub use store::{CompareAndSwap, TokenStore};

/// Token type assumed when a provider does not report one.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Credentials for one user against one logical provider.
///
/// Records are values: a refresh never mutates a stored record, it replaces
/// it in full. Staleness is derived from `expires_at` at read time and is not
/// stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// OAuth access token (used for API requests)
    pub access_token: String,

    /// OAuth refresh token (used to obtain new access tokens)
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC). `None` never expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// Token type tag, carried through untouched
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Logical provider this record authenticates against (e.g. "gmail")
    pub provider_id: String,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

impl CredentialRecord {
    /// Creates a never-expiring bearer record without a refresh token.
    pub fn new(provider_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            token_type: default_token_type(),
            provider_id: provider_id.into(),
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
        self.token_type = token_type.into();
        self
    }

    /// Returns the refresh token if one is present and non-empty.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// True when the record carries an expiry strictly before `now`.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.expires_within(Duration::zero(), now)
    }

    /// True when the record expires strictly before `now + window`.
    ///
    /// Records without an expiry never match. A deadline past the end of
    /// the calendar matches every expiry.
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        match now.checked_add_signed(window) {
            Some(deadline) => expires_at < deadline,
            None => window > Duration::zero(),
        }
    }
}
