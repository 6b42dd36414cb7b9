pub mod controller;
pub mod error;
pub mod feed;
pub mod insights;
pub mod portfolio;
pub mod scheduler;
pub mod state;
pub mod types;
pub mod util;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use controller::Dashboard;
use error::DashboardError;
use feed::cache::SnapshotCache;
use feed::client::HttpSheetSource;
use insights::client::{ChatCompletionClient, NarrativeError};
use types::Config;

/// Wire a dashboard from configuration: HTTP feed, disk cache, and the
/// narrative provider when one is configured.
pub fn build_dashboard(config: &Config) -> Result<Dashboard, DashboardError> {
    let url = config.feed_url().map_err(DashboardError::Configuration)?;
    let cache_dir = config.cache_dir().map_err(DashboardError::Configuration)?;
    let source = HttpSheetSource::new(url)?;

    let dashboard = Dashboard::new(Arc::new(source), Some(SnapshotCache::new(cache_dir)));

    match ChatCompletionClient::from_config(&config.narrative) {
        Ok(client) => Ok(dashboard.with_narrative(Arc::new(client), config.narrative.timeout_secs)),
        Err(NarrativeError::NotConfigured) => {
            log::debug!("Narrative endpoint not configured; canned summaries only");
            Ok(dashboard)
        }
        Err(e) => Err(e.into()),
    }
}
