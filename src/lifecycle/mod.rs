//! Token lifecycle management.
//!
//! The [`LifecycleManager`] is the only component that decides whether a
//! stored token is usable. Reads of a stale record trigger a refresh through
//! the provider's [`RefreshCapability`](crate::providers::RefreshCapability)
//! before anything is returned to the caller.
//!
//! # Refresh sequence
//!
//! ```text
//! get(user, provider)
//!     │
//!     ├─ store read (read lock, released)
//!     ├─ fresh or never-expiring? ──────────────► return record
//!     │
//!     ├─ per-key guard (one refresh per key)
//!     │     ├─ re-read: replaced while waiting? ─► return current record
//!     │     ├─ provider refresh (no store lock, bounded by timeout)
//!     │     └─ compare-and-swap commit (write lock)
//!     └─ return refreshed record
//! ```
//!
//! Failures leave the stored record untouched so a later call can retry.

use crate::credentials::{CompareAndSwap, CredentialRecord, TokenStore};
use crate::providers::ProviderRegistry;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

mod error;
mod metrics;
mod sweep;


pub use error::{RefreshCause, TokenError};
pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};
pub use sweep::{run_refresh_sweep, SweepReport};

/// Default upper bound on a single provider refresh call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

type RecordKey = (String, String);

/// Failure of the most recent refresh for a key, handed to callers that
/// waited on that refresh. Dropped with the guard once no caller holds it.
struct SharedFailure {
    observed: CredentialRecord,
    error: TokenError,
}

type RefreshGuard = Arc<Mutex<Option<SharedFailure>>>;

/// Provider exchanges one refresh may run when stale records keep being
/// saved over it while the provider call is in flight.
const MAX_EXCHANGES: usize = 3;

/// Result of committing a refreshed record.
enum Commit {
    Stored(CredentialRecord),
    /// Another writer saved a record while the provider call was in flight
    Superseded(CredentialRecord),
}

/// Store counts and refresh counters
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub users: usize,
    pub records: usize,
    pub refresh: RefreshMetricsSnapshot,
}

/// Freshness policy over the [`TokenStore`].
///
/// # Thread Safety
/// - Shared behind an `Arc` by all request handlers
/// - Store lock is never held across a provider call
/// - Concurrent refreshes of one `(user_id, provider_id)` key collapse into a
///   single provider call; waiters receive the winner's record or its error
pub struct LifecycleManager {
    store: TokenStore,
    providers: ProviderRegistry,
    refresh_timeout: Duration,
    /// Per-key refresh guards, pruned once no task holds them
    guards: DashMap<RecordKey, RefreshGuard>,
    metrics: RefreshMetrics,
}

impl LifecycleManager {
    /// Creates a manager with an empty store.
    ///
    /// # Arguments
    /// * `providers` - Refresh capabilities, resolved by provider id
    pub fn new(providers: ProviderRegistry) -> Self {
        Self {
            store: TokenStore::new(),
            providers,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            guards: DashMap::new(),
            metrics: RefreshMetrics::new(),
        }
    }

    pub fn with_refresh_timeout(mut self, refresh_timeout: Duration) -> Self {
        self.refresh_timeout = refresh_timeout;
        self
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Stores credentials for a user and provider, replacing any existing record.
    pub fn save(&self, user_id: &str, provider_id: &str, record: CredentialRecord) {
        info!(
            user_id = %user_id,
            provider = %provider_id,
            has_refresh_token = record.refresh_token().is_some(),
            expires_at = ?record.expires_at,
            "Credentials saved"
        );
        self.store.save(user_id, provider_id, record);
    }

    /// Returns a usable record, refreshing it first if it is stale.
    ///
    /// # Returns
    /// * `Ok(record)` - Never-expiring, unexpired, or freshly refreshed record
    /// * `Err(TokenError::NotFound)` - No record for the key
    /// * `Err(...)` - Any refresh error; the stale token is never returned
    pub async fn get(&self, user_id: &str, provider_id: &str) -> Result<CredentialRecord, TokenError> {
        let record = self
            .store
            .get(user_id, provider_id)
            .ok_or_else(|| TokenError::not_found(user_id, provider_id))?;

        if !record.is_stale(Utc::now()) {
            return Ok(record);
        }

        debug!(
            user_id = %user_id,
            provider = %provider_id,
            expires_at = ?record.expires_at,
            "Stored token expired, refreshing"
        );

        self.refresh_observed(user_id, provider_id, record)
            .await
    }

    /// Returns copies of every record stored for a user, without refreshing.
    pub fn get_all(&self, user_id: &str) -> HashMap<String, CredentialRecord> {
        self.store.get_all(user_id)
    }

    /// Removes the record for a user and provider (disconnect).
    ///
    /// # Returns
    /// * `true` - Credentials deleted
    /// * `false` - No credentials found
    pub fn delete(&self, user_id: &str, provider_id: &str) -> bool {
        let removed = self.store.delete(user_id, provider_id);
        if removed {
            info!(user_id = %user_id, provider = %provider_id, "Credentials deleted");
        }
        removed
    }

    /// Exchanges the stored refresh token for a new record and stores it.
    ///
    /// If another caller refreshed or replaced the record with an unexpired
    /// one while this call waited for the per-key guard, the current record
    /// is returned without contacting the provider.
    pub async fn refresh(&self, user_id: &str, provider_id: &str) -> Result<CredentialRecord, TokenError> {
        let observed = self
            .store
            .get(user_id, provider_id)
            .ok_or_else(|| TokenError::not_found(user_id, provider_id))?;

        self.refresh_observed(user_id, provider_id, observed)
            .await
    }

    /// Get store counts and refresh counters
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            users: self.store.user_count(),
            records: self.store.record_count(),
            refresh: self.metrics.snapshot(),
        }
    }

    /// Logs every stored record at debug level, without token values.
    ///
    /// Returns the number of records logged.
    pub fn log_inventory(&self) -> usize {
        let entries = self.store.list_all();
        for (user_id, provider_id, record) in &entries {
            debug!(
                user_id = %user_id,
                provider = %provider_id,
                token_type = %record.token_type,
                expires_at = ?record.expires_at,
                has_refresh_token = record.refresh_token().is_some(),
                "Stored credentials"
            );
        }
        info!(records = entries.len(), "Credential inventory logged");
        entries.len()
    }

    /// Runs one refresh for a key under its guard, starting from `observed`.
    async fn refresh_observed(
        &self,
        user_id: &str,
        provider_id: &str,
        observed: CredentialRecord,
    ) -> Result<CredentialRecord, TokenError> {
        let key_guard = self.key_guard(user_id, provider_id);
        let mut last_failure = key_guard.lock().await;

        let shared = last_failure
            .as_ref()
            .filter(|failure| failure.observed == observed)
            .filter(|_| self.store.get(user_id, provider_id).as_ref() == Some(&observed))
            .map(|failure| failure.error.clone());

        if let Some(error) = shared {
            debug!(
                user_id = %user_id,
                provider = %provider_id,
                "Refresh failed while waiting, sharing the error"
            );
            self.metrics.record_coalesced();
            return Err(error);
        }

        let result = self.refresh_locked(user_id, provider_id, &observed).await;
        *last_failure = result.as_ref().err().map(|error| SharedFailure {
            observed: observed.clone(),
            error: error.clone(),
        });
        result
    }

    async fn refresh_locked(
        &self,
        user_id: &str,
        provider_id: &str,
        observed: &CredentialRecord,
    ) -> Result<CredentialRecord, TokenError> {
        let mut current = self
            .store
            .get(user_id, provider_id)
            .ok_or_else(|| TokenError::not_found(user_id, provider_id))?;

        if current != *observed && !current.is_stale(Utc::now()) {
            debug!(
                user_id = %user_id,
                provider = %provider_id,
                "Record replaced while waiting, reusing it"
            );
            self.metrics.record_coalesced();
            return Ok(current);
        }

        for _ in 0..MAX_EXCHANGES {
            match self.exchange(user_id, provider_id, &current).await? {
                Commit::Stored(record) => return Ok(record),
                Commit::Superseded(newer) if !newer.is_stale(Utc::now()) => {
                    info!(
                        user_id = %user_id,
                        provider = %provider_id,
                        "Credentials saved during refresh, keeping the newer record"
                    );
                    self.metrics.record_coalesced();
                    return Ok(newer);
                }
                Commit::Superseded(newer) => {
                    debug!(
                        user_id = %user_id,
                        provider = %provider_id,
                        "Expired credentials saved during refresh, refreshing them"
                    );
                    current = newer;
                }
            }
        }

        warn!(
            user_id = %user_id,
            provider = %provider_id,
            "Credentials kept changing during refresh"
        );
        Err(TokenError::refresh_failed(
            provider_id,
            anyhow::anyhow!("record replaced during {} consecutive refreshes", MAX_EXCHANGES),
        ))
    }

    /// Calls the provider and commits the result with compare-and-swap.
    async fn exchange(
        &self,
        user_id: &str,
        provider_id: &str,
        current: &CredentialRecord,
    ) -> Result<Commit, TokenError> {
        let refresh_token = current
            .refresh_token()
            .ok_or_else(|| TokenError::NoRefreshToken {
                provider_id: provider_id.to_string(),
            })?
            .to_string();

        let capability = self
            .providers
            .get(provider_id)
            .ok_or_else(|| TokenError::ProviderUnavailable {
                provider_id: provider_id.to_string(),
            })?;

        info!(user_id = %user_id, provider = %provider_id, "Refreshing OAuth token");
        self.metrics.record_attempt();

        let refresh_call = capability.refresh(provider_id, &refresh_token);
        let grant = match tokio::time::timeout(self.refresh_timeout, refresh_call).await {
            Ok(Ok(grant)) => grant,
            Ok(Err(e)) => {
                warn!(
                    user_id = %user_id,
                    provider = %provider_id,
                    error = %e,
                    "Token refresh failed"
                );
                self.metrics.record_failure();
                return Err(TokenError::refresh_failed(provider_id, e));
            }
            Err(_) => {
                warn!(
                    user_id = %user_id,
                    provider = %provider_id,
                    timeout = ?self.refresh_timeout,
                    "Token refresh timed out"
                );
                self.metrics.record_failure();
                return Err(TokenError::refresh_failed(
                    provider_id,
                    anyhow::anyhow!("timed out after {:?}", self.refresh_timeout),
                ));
            }
        };

        if grant.access_token.is_empty() {
            warn!(user_id = %user_id, provider = %provider_id, "Provider returned an empty access token");
            self.metrics.record_failure();
            return Err(TokenError::InvalidRefreshResult {
                provider_id: provider_id.to_string(),
            });
        }

        // Keep the existing refresh token if the provider did not rotate it
        let rotated = grant.refresh_token.is_some();
        let refreshed = CredentialRecord {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(Some(refresh_token)),
            expires_at: grant.expires_at,
            token_type: grant
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| current.token_type.clone()),
            provider_id: provider_id.to_string(),
        };

        match self
            .store
            .replace_if_unchanged(user_id, provider_id, current, refreshed.clone())
        {
            CompareAndSwap::Updated => {
                self.metrics.record_success();
                info!(
                    user_id = %user_id,
                    provider = %provider_id,
                    rotated = rotated,
                    expires_at = ?refreshed.expires_at,
                    "OAuth token refreshed successfully"
                );
                Ok(Commit::Stored(refreshed))
            }
            CompareAndSwap::Changed(newer) => Ok(Commit::Superseded(newer)),
            CompareAndSwap::Missing => {
                info!(
                    user_id = %user_id,
                    provider = %provider_id,
                    "Credentials deleted during refresh, discarding result"
                );
                Err(TokenError::not_found(user_id, provider_id))
            }
        }
    }

    fn key_guard(&self, user_id: &str, provider_id: &str) -> KeyGuard<'_> {
        let key = (user_id.to_string(), provider_id.to_string());
        let lock = Arc::clone(self.guards.entry(key.clone()).or_default().value());
        KeyGuard {
            guards: &self.guards,
            key,
            lock,
        }
    }

    #[cfg(test)]
    fn guard_count(&self) -> usize {
        self.guards.len()
    }
}

/// Handle on one key's refresh lock; prunes the map entry on drop.
struct KeyGuard<'a> {
    guards: &'a DashMap<RecordKey, RefreshGuard>,
    key: RecordKey,
    lock: RefreshGuard,
}

impl KeyGuard<'_> {
    async fn lock(&self) -> MutexGuard<'_, Option<SharedFailure>> {
        self.lock.lock().await
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Map + this handle; clones are only taken under the shard lock
        self.guards
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}
