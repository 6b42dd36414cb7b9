//! Error types for portfolio loading and narrative generation
//!
//! Errors are classified by how the dashboard recovers:
//! - Transport: network failures and timeouts, recovered from the cached snapshot
//!   (or the canned narrative)
//! - MalformedPayload: the feed answered but the payload is unusable; fatal for
//!   that load attempt, no partial ingestion
//! - Configuration: missing or invalid config, requires user action

use thiserror::Error;

use crate::feed::cache::CacheError;
use crate::feed::FeedError;
use crate::insights::client::NarrativeError;

/// Crate-level error for dashboard operations
#[derive(Debug, Error)]
pub enum DashboardError {
    // Transport errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    // Payload errors
    #[error("Feed rejected the request: {0}")]
    FeedRejected(String),

    #[error("Malformed feed payload: {0}")]
    MalformedPayload(String),

    // Local errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("No data available: live fetch failed and no cached snapshot exists")]
    NoData,
}

impl DashboardError {
    /// Returns true if a cached snapshot (or canned narrative) can stand in
    pub fn is_recoverable_from_cache(&self) -> bool {
        matches!(self, DashboardError::Network(_) | DashboardError::Timeout(_))
    }

    /// Returns true if this error requires the user to fix something locally
    pub fn requires_user_action(&self) -> bool {
        matches!(self, DashboardError::Configuration(_))
    }

    pub fn kind(&self) -> ErrorKind {
        if self.requires_user_action() {
            ErrorKind::Configuration
        } else if self.is_recoverable_from_cache() {
            ErrorKind::Transport
        } else if matches!(self, DashboardError::Cache(_) | DashboardError::NoData) {
            ErrorKind::Local
        } else {
            ErrorKind::Payload
        }
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            DashboardError::Network(_) => "Check your connection. Showing the last cached data.",
            DashboardError::Timeout(_) => "The service took too long to answer. Try again.",
            DashboardError::FeedRejected(_) => {
                "The spreadsheet backend reported a failure. Check the sheet deployment."
            }
            DashboardError::MalformedPayload(_) => {
                "The sheet layout looks wrong. Check the header rows of the source sheet."
            }
            DashboardError::Configuration(_) => {
                "Check your configuration in ~/.portfolio-pulse/config.json"
            }
            DashboardError::Cache(_) => "Check permissions on the cache directory.",
            DashboardError::NoData => "Retry once the feed is reachable.",
        }
    }
}

impl From<FeedError> for DashboardError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Http(e) => DashboardError::Network(e.to_string()),
            FeedError::Timeout(secs) => DashboardError::Timeout(secs),
            FeedError::Status { status, body } => {
                DashboardError::Network(format!("HTTP {}: {}", status, body))
            }
            FeedError::Rejected(msg) => DashboardError::FeedRejected(msg),
            FeedError::TooFewRows(n) => DashboardError::MalformedPayload(format!(
                "expected at least 3 rows (section, header, data), got {}",
                n
            )),
            FeedError::Decode(msg) => DashboardError::MalformedPayload(msg),
        }
    }
}

impl From<NarrativeError> for DashboardError {
    fn from(err: NarrativeError) -> Self {
        match err {
            NarrativeError::Timeout(secs) => DashboardError::Timeout(secs),
            NarrativeError::NotConfigured => {
                DashboardError::Configuration("narrative endpoint is not configured".to_string())
            }
            NarrativeError::InvalidEndpoint(msg) => {
                DashboardError::Configuration(format!("invalid narrative endpoint: {}", msg))
            }
            other => DashboardError::Network(other.to_string()),
        }
    }
}

impl From<CacheError> for DashboardError {
    fn from(err: CacheError) -> Self {
        DashboardError::Cache(err.to_string())
    }
}

/// Serializable error banner shown inline with a retry affordance
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBanner {
    pub message: String,
    pub kind: ErrorKind,
    pub can_retry: bool,
    pub recovery_suggestion: String,
    pub dismissible: bool,
    /// True when the view is showing cached data instead of a live fetch
    pub showing_cached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Transport,
    Payload,
    Local,
    Configuration,
}

impl ErrorBanner {
    pub fn from_error(err: &DashboardError, showing_cached: bool) -> Self {
        ErrorBanner {
            message: err.to_string(),
            kind: err.kind(),
            can_retry: !err.requires_user_action(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
            dismissible: true,
            showing_cached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_fall_back_to_cache() {
        assert!(DashboardError::Network("down".into()).is_recoverable_from_cache());
        assert!(DashboardError::Timeout(30).is_recoverable_from_cache());
        assert!(!DashboardError::MalformedPayload("x".into()).is_recoverable_from_cache());
    }

    #[test]
    fn too_few_rows_is_a_payload_error() {
        let err: DashboardError = FeedError::TooFewRows(2).into();
        assert_eq!(err.kind(), ErrorKind::Payload);
        assert!(err.to_string().contains("got 2"));
    }

    #[test]
    fn banner_is_dismissible_and_retryable_for_transport() {
        let banner = ErrorBanner::from_error(&DashboardError::Network("refused".into()), true);
        assert!(banner.dismissible);
        assert!(banner.can_retry);
        assert!(banner.showing_cached);
        assert_eq!(banner.kind, ErrorKind::Transport);
    }

    #[test]
    fn configuration_banner_cannot_retry() {
        let banner =
            ErrorBanner::from_error(&DashboardError::Configuration("no feed".into()), false);
        assert!(!banner.can_retry);
        assert_eq!(banner.kind, ErrorKind::Configuration);
    }
}
