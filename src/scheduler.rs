//! Periodic refresh of the portfolio snapshot.
//!
//! Polls on a short interval and refreshes only when the loaded data is older
//! than `refresh_interval_hours`. A failed refresh is not retried until the
//! next due check; there is no backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::controller::{Dashboard, RefreshOutcome};
use crate::feed::cache::is_stale;

/// How often the loop wakes up to check whether a refresh is due (15 minutes)
const POLL_INTERVAL_SECS: u64 = 900;

/// Time jump threshold to detect sleep/wake (5 minutes past the poll interval)
const TIME_JUMP_THRESHOLD_SECS: i64 = POLL_INTERVAL_SECS as i64 + 300;

pub struct RefreshScheduler {
    dashboard: Arc<Dashboard>,
    interval_hours: u32,
}

impl RefreshScheduler {
    pub fn new(dashboard: Arc<Dashboard>, interval_hours: u32) -> Self {
        Self {
            dashboard,
            interval_hours: interval_hours.max(1),
        }
    }

    /// True when nothing is loaded or the loaded data is older than the interval.
    pub fn is_due(&self) -> bool {
        match self.dashboard.snapshot().fetched_at {
            Some(fetched_at) => is_stale(&fetched_at, self.interval_hours),
            None => true,
        }
    }

    /// One due check; refreshes when needed.
    pub async fn tick(&self) -> Option<RefreshOutcome> {
        if !self.is_due() {
            return None;
        }
        log::info!(
            "Portfolio data older than {}h, refreshing",
            self.interval_hours
        );
        match self.dashboard.refresh().await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::warn!("Scheduled refresh failed: {}", e);
                None
            }
        }
    }

    /// Run indefinitely.
    pub async fn run(&self) {
        let mut last_check = Utc::now();
        self.tick().await;

        loop {
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;

            let now = Utc::now();
            let time_jump = (now - last_check).num_seconds();
            if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!(
                    "Detected system wake (time jumped {} seconds), checking refresh",
                    time_jump
                );
            }

            self.tick().await;
            last_check = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::feed::cache::SnapshotCache;
    use crate::feed::{FeedError, RawSheet, SheetSource};

    struct OneRow;

    #[async_trait]
    impl SheetSource for OneRow {
        async fn fetch_sheet(&self) -> Result<RawSheet, FeedError> {
            Ok(RawSheet {
                header: vec!["Solution Name".to_string()],
                rows: vec![vec!["Checkout".to_string()]],
            })
        }
    }

    #[tokio::test]
    async fn refreshes_only_when_due() {
        let dashboard = Arc::new(Dashboard::new(Arc::new(OneRow), None));
        let scheduler = RefreshScheduler::new(dashboard.clone(), 24);

        assert!(scheduler.is_due());
        assert_eq!(
            scheduler.tick().await,
            Some(RefreshOutcome::Live { solutions: 1 })
        );
        assert!(!scheduler.is_due());
        assert_eq!(scheduler.tick().await, None);
    }

    #[tokio::test]
    async fn stale_cache_triggers_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        let old = Utc::now() - chrono::Duration::hours(30);
        cache
            .store(&[crate::portfolio::test_support::solution(1, "Old")], old)
            .unwrap();

        let dashboard = Arc::new(Dashboard::new(
            Arc::new(OneRow),
            Some(SnapshotCache::new(dir.path())),
        ));
        dashboard.load_cached().unwrap();

        let scheduler = RefreshScheduler::new(dashboard.clone(), 24);
        assert!(scheduler.is_due());
        scheduler.tick().await;
        assert_eq!(dashboard.filtered()[0].name, "Checkout");
    }
}
