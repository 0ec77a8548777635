//! Concurrency-safe credential storage.
//!
//! Stores OAuth credentials for users and providers behind a single
//! reader/writer lock. The lock is never held across an await point.

use super::CredentialRecord;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type UserRecords = HashMap<String, CredentialRecord>;

/// Outcome of [`TokenStore::replace_if_unchanged`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompareAndSwap {
    /// The stored record matched and was replaced
    Updated,
    /// Another writer replaced the record first; holds the current value
    Changed(CredentialRecord),
    /// The record was deleted
    Missing,
}

/// In-memory credential storage keyed by `(user_id, provider_id)`.
///
/// # Thread Safety
/// - Many concurrent readers (`get`, `get_all`), exclusive writers
///   (`save`, `delete`, `replace_if_unchanged`)
/// - Records are replaced whole under the write lock, so a reader never
///   observes a partially written record
/// - No validation of ids: empty ids are a caller contract violation
#[derive(Default)]
pub struct TokenStore {
    tokens: RwLock<HashMap<String, UserRecords>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Records are inserted whole; a poisoned lock holds no torn record
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, UserRecords>> {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, UserRecords>> {
        self.tokens.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a record for a user and provider.
    ///
    /// If a record already exists it is replaced (upsert).
    pub fn save(&self, user_id: &str, provider_id: &str, record: CredentialRecord) {
        self.write()
            .entry(user_id.to_string())
            .or_default()
            .insert(provider_id.to_string(), record);
    }

    /// Retrieves a copy of the record for a user and provider.
    pub fn get(&self, user_id: &str, provider_id: &str) -> Option<CredentialRecord> {
        self.read()
            .get(user_id)
            .and_then(|records| records.get(provider_id))
            .cloned()
    }

    /// Returns an independent copy of every record stored for a user.
    ///
    /// Unknown users yield an empty map.
    pub fn get_all(&self, user_id: &str) -> HashMap<String, CredentialRecord> {
        self.read().get(user_id).cloned().unwrap_or_default()
    }

    /// Deletes the record for a user and provider.
    ///
    /// Removes the user entry entirely once its last record is gone.
    ///
    /// # Returns
    /// * `true` - A record was deleted
    /// * `false` - No record existed
    pub fn delete(&self, user_id: &str, provider_id: &str) -> bool {
        let mut tokens = self.write();
        let Some(records) = tokens.get_mut(user_id) else {
            return false;
        };

        let removed = records.remove(provider_id).is_some();
        if records.is_empty() {
            tokens.remove(user_id);
        }
        removed
    }

    /// Replaces the record only if it still equals `expected`.
    ///
    /// Used to commit a refresh without overwriting a record that was saved
    /// or deleted while the provider call was in flight.
    pub fn replace_if_unchanged(
        &self,
        user_id: &str,
        provider_id: &str,
        expected: &CredentialRecord,
        record: CredentialRecord,
    ) -> CompareAndSwap {
        let mut tokens = self.write();
        let Some(current) = tokens
            .get_mut(user_id)
            .and_then(|records| records.get_mut(provider_id))
        else {
            return CompareAndSwap::Missing;
        };

        if current != expected {
            return CompareAndSwap::Changed(current.clone());
        }

        *current = record;
        CompareAndSwap::Updated
    }

    /// Lists all (user_id, provider_id) pairs with their records.
    ///
    /// Used by the background sweep and the inventory log.
    pub fn list_all(&self) -> Vec<(String, String, CredentialRecord)> {
        let tokens = self.read();
        let mut entries: Vec<_> = tokens
            .iter()
            .flat_map(|(user_id, records)| {
                records.iter().map(move |(provider_id, record)| {
                    (user_id.clone(), provider_id.clone(), record.clone())
                })
            })
            .collect();
        entries.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        entries
    }

    /// Number of users with at least one record.
    pub fn user_count(&self) -> usize {
        self.read().len()
    }

    /// Total number of stored records.
    pub fn record_count(&self) -> usize {
        self.read().values().map(HashMap::len).sum()
    }
}
