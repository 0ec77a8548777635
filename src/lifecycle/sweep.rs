use super::LifecycleManager;
use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one proactive refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub refreshed: usize,
    pub failed: usize,
}

impl LifecycleManager {
    /// Refreshes every refreshable record that expires within `lead`.
    ///
    /// Records without a refresh token or without an expiry are skipped.
    /// Refreshes run concurrently and go through the same per-key guard as
    /// reads, so a sweep never duplicates a refresh already in flight.
    pub async fn refresh_expiring(&self, lead: Duration) -> SweepReport {
        let now = Utc::now();
        let due: Vec<_> = self
            .store
            .list_all()
            .into_iter()
            .filter(|(_, _, record)| record.refresh_token().is_some() && record.expires_within(lead, now))
            .collect();

        if due.is_empty() {
            return SweepReport::default();
        }

        debug!(count = due.len(), "Refreshing credentials close to expiry");

        let results = join_all(due.into_iter().map(|(user_id, provider_id, record)| async move {
            let result = self
                .refresh_observed(&user_id, &provider_id, record)
                .await;
            if let Err(e) = &result {
                warn!(
                    user_id = %user_id,
                    provider = %provider_id,
                    error = %e,
                    "Proactive refresh failed"
                );
            }
            result.is_ok()
        }))
        .await;

        let refreshed = results.iter().filter(|ok| **ok).count();
        SweepReport {
            refreshed,
            failed: results.len() - refreshed,
        }
    }
}

/// Converts the configured lead time, saturating instead of overflowing.
pub(super) fn lead_window(lead_seconds: i64) -> Duration {
    Duration::try_seconds(lead_seconds).unwrap_or(if lead_seconds < 0 {
        Duration::MIN
    } else {
        Duration::MAX
    })
}

/// Background task that refreshes credentials ahead of expiry.
pub async fn run_refresh_sweep(manager: Arc<LifecycleManager>, interval_seconds: u64, lead_seconds: i64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_seconds));
    let lead = lead_window(lead_seconds);

    loop {
        interval.tick().await;
        let report = manager.refresh_expiring(lead).await;
        debug!(
            refreshed = report.refreshed,
            failed = report.failed,
            "Refresh sweep complete, {} records stored",
            manager.store.record_count()
        );
    }
}
