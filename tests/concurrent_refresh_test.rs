// Concurrency tests for the lifecycle manager

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokenbroker::credentials::CredentialRecord;
use tokenbroker::lifecycle::LifecycleManager;
use tokenbroker::providers::{ProviderRegistry, RefreshCapability, TokenGrant};

/// Counts calls per refresh token and answers slowly.
#[derive(Default)]
struct CountingProvider {
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingProvider {
    fn calls_for(&self, refresh_token: &str) -> usize {
        self.calls.lock().unwrap().get(refresh_token).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl RefreshCapability for CountingProvider {
    async fn refresh(&self, _provider_id: &str, refresh_token: &str) -> anyhow::Result<TokenGrant> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(refresh_token.to_string())
            .or_insert(0) += 1;

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        Ok(TokenGrant::new(format!("{}-access", refresh_token))
            .with_refresh_token(format!("{}-rotated", refresh_token))
            .with_expiry(Utc::now() + Duration::hours(1)))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_provider_call_per_key() {
    let provider = Arc::new(CountingProvider::default());
    let capability: Arc<dyn RefreshCapability> = provider.clone();
    let manager = Arc::new(LifecycleManager::new(
        ProviderRegistry::new()
            .with("gmail", Arc::clone(&capability))
            .with("slack", capability),
    ));

    let keys: Vec<(String, &str)> = (0..5)
        .flat_map(|u| [(format!("user{}", u), "gmail"), (format!("user{}", u), "slack")])
        .collect();

    for (user_id, provider_id) in &keys {
        manager.save(
            user_id,
            provider_id,
            CredentialRecord::new(*provider_id, "expired")
                .with_refresh_token(format!("{}/{}", user_id, provider_id))
                .with_expiry(Utc::now() - Duration::seconds(1)),
        );
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        for (user_id, provider_id) in &keys {
            let manager = Arc::clone(&manager);
            let user_id = user_id.clone();
            let provider_id = provider_id.to_string();
            handles.push(tokio::spawn(async move {
                let record = manager.get(&user_id, &provider_id).await.unwrap();
                (user_id, provider_id, record)
            }));
        }
    }

    for handle in handles {
        let (user_id, provider_id, record) = handle.await.unwrap();
        assert_eq!(record.access_token, format!("{}/{}-access", user_id, provider_id));
        assert_eq!(record.provider_id, provider_id);
    }

    for (user_id, provider_id) in &keys {
        assert_eq!(provider.calls_for(&format!("{}/{}", user_id, provider_id)), 1);
    }
    assert_eq!(provider.total_calls(), keys.len());

    let stats = manager.stats();
    assert_eq!(stats.refresh.successes, keys.len() as u64);
    assert_eq!(stats.refresh.failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_during_refresh_never_see_partial_records() {
    let provider = Arc::new(CountingProvider::default());
    let manager = Arc::new(LifecycleManager::new(
        ProviderRegistry::new().with("slack", provider.clone() as Arc<dyn RefreshCapability>),
    ));
    manager.save(
        "u1",
        "slack",
        CredentialRecord::new("slack", "old-access")
            .with_refresh_token("R0")
            .with_expiry(Utc::now() - Duration::seconds(1)),
    );

    let refresher = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.refresh("u1", "slack").await })
    };

    // Raw store reads see either the old pair or the new pair
    let reader = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            for _ in 0..200 {
                let record = manager.store().get("u1", "slack").unwrap();
                match record.refresh_token() {
                    Some("R0") => {
                        assert_eq!(record.access_token, "old-access");
                        assert!(record.is_stale(Utc::now()));
                    }
                    Some("R0-rotated") => {
                        assert_eq!(record.access_token, "R0-access");
                        assert!(!record.is_stale(Utc::now()));
                    }
                    other => panic!("unexpected refresh token: {:?}", other),
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let record = refresher.await.unwrap().unwrap();
    reader.await.unwrap();

    assert_eq!(record.refresh_token(), Some("R0-rotated"));
    assert_eq!(provider.total_calls(), 1);
}
