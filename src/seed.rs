//! Development test-token seeding.
//!
//! With `ENABLE_TEST_TOKENS=true` the broker starts with tokens for user `"1"`
//! taken from the environment, so provider integrations can be exercised
//! without running the OAuth consent flow.

use crate::credentials::{CredentialRecord, DEFAULT_TOKEN_TYPE};
use crate::lifecycle::LifecycleManager;
use tracing::{info, warn};

/// User id the seeded tokens are stored under.
pub const SEED_USER_ID: &str = "1";

/// Access and refresh token pair read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedTokens {
    pub google: Option<SeedPair>,
    pub slack: Option<SeedPair>,
}

impl SeedTokens {
    /// Reads seed tokens from the process environment.
    ///
    /// Returns `None` unless `ENABLE_TEST_TOKENS` is `true`.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = lookup("ENABLE_TEST_TOKENS")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if !enabled {
            return None;
        }

        let pair = |prefix: &str| {
            let access_token = lookup(&format!("TEST_TOKEN_{}_ACCESS", prefix)).filter(|v| !v.is_empty())?;
            let refresh_token = lookup(&format!("TEST_TOKEN_{}_REFRESH", prefix)).filter(|v| !v.is_empty());
            Some(SeedPair {
                access_token,
                refresh_token,
            })
        };

        Some(Self {
            google: pair("GOOGLE"),
            slack: pair("SLACK"),
        })
    }

    fn records(&self) -> Vec<(&'static str, CredentialRecord)> {
        let mut records = Vec::new();
        if let Some(google) = &self.google {
            for provider_id in ["gmail", "google-drive"] {
                records.push((provider_id, google.record(provider_id)));
            }
        }
        if let Some(slack) = &self.slack {
            records.push(("slack", slack.record("slack")));
        }
        records
    }

    /// Saves the seed tokens and refreshes those that carry a refresh token.
    ///
    /// Refresh failures are logged; the seeded record stays in place.
    /// Returns the number of records saved.
    pub async fn inject(&self, manager: &LifecycleManager) -> usize {
        let records = self.records();
        for (provider_id, record) in &records {
            let refreshable = record.refresh_token().is_some();
            manager.save(SEED_USER_ID, provider_id, record.clone());

            if !refreshable {
                continue;
            }
            match manager.refresh(SEED_USER_ID, provider_id).await {
                Ok(_) => info!(provider = %provider_id, "Seeded test token refreshed"),
                Err(e) => warn!(provider = %provider_id, error = %e, "Failed to refresh seeded test token"),
            }
        }

        info!(user_id = SEED_USER_ID, count = records.len(), "Test tokens injected");
        records.len()
    }
}

impl SeedPair {
    fn record(&self, provider_id: &str) -> CredentialRecord {
        let record = CredentialRecord::new(provider_id, self.access_token.clone()).with_token_type(DEFAULT_TOKEN_TYPE);
        match &self.refresh_token {
            Some(refresh_token) => record.with_refresh_token(refresh_token.clone()),
            None => record,
        }
    }
}
