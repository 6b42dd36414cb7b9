//! Dashboard controller: owns the loaded portfolio and mediates every event.
//!
//! State lives behind a `parking_lot::Mutex` that is never held across an
//! `.await`. Each refresh takes a generation number; when a newer refresh
//! starts, whatever the older one brings back is discarded. Derived views are
//! recomputed from scratch on every read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{DashboardError, ErrorBanner};
use crate::feed::cache::SnapshotCache;
use crate::feed::SheetSource;
use crate::insights::client::{generate_narrative, NarrativeProvider};
use crate::insights::prompts::{build_narrative_prompt, canned_narrative};
use crate::insights::{Narrative, NarrativeSource};
use crate::portfolio::aggregate::{aggregate_with, AggregateContext, PortfolioAggregate};
use crate::portfolio::bau::{BauHoursExtractor, TextHeuristicExtractor};
use crate::portfolio::detectors::DetectorContext;
use crate::portfolio::filter::{filter_solutions_with, FilterCriteria};
use crate::portfolio::governance::{calculate_governance_with, GovernanceReport};
use crate::portfolio::metrics::DerivedMetrics;
use crate::portfolio::normalize::normalize_with_report;
use crate::portfolio::Solution;

pub const DEFAULT_NARRATIVE_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    Live,
    Cache,
}

/// Expected headers the last live load could not find. Not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderDrift {
    pub missing_headers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub solutions: Vec<Solution>,
    pub criteria: FilterCriteria,
    pub status: LoadStatus,
    pub origin: Option<DataOrigin>,
    pub fetched_at: Option<String>,
    pub content_hash: Option<String>,
    pub skipped_rows: usize,
    pub header_drift: Option<HeaderDrift>,
    pub banner: Option<ErrorBanner>,
    pub narrative: Option<Narrative>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            solutions: Vec::new(),
            criteria: FilterCriteria::default(),
            status: LoadStatus::Idle,
            origin: None,
            fetched_at: None,
            content_hash: None,
            skipped_rows: 0,
            header_drift: None,
            banner: None,
            narrative: None,
        }
    }
}

/// Typed events the dashboard reacts to.
#[derive(Debug, Clone)]
pub enum DashboardEvent {
    Refresh,
    LoadCached,
    SetCriteria(FilterCriteria),
    ClearFilters,
    DismissBanner,
    RequestNarrative,
}

/// What a refresh ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Live { solutions: usize },
    /// Live fetch failed with a transport error; the last good data is shown.
    Fallback { solutions: usize },
    /// A newer refresh started while this one was in flight.
    Superseded,
}

/// One solution plus everything derived for it.
#[derive(Debug, Clone, Serialize)]
pub struct SolutionView {
    #[serde(flatten)]
    pub solution: Solution,
    pub derived: DerivedMetrics,
}

// =============================================================================
// Controller
// =============================================================================

pub struct Dashboard {
    source: Arc<dyn SheetSource>,
    cache: Option<SnapshotCache>,
    narrative: Option<Arc<dyn NarrativeProvider>>,
    narrative_timeout_secs: u64,
    bau: Arc<dyn BauHoursExtractor>,
    state: Mutex<DashboardState>,
    generation: AtomicU64,
    narrative_generation: AtomicU64,
}

impl Dashboard {
    pub fn new(source: Arc<dyn SheetSource>, cache: Option<SnapshotCache>) -> Self {
        Self {
            source,
            cache,
            narrative: None,
            narrative_timeout_secs: DEFAULT_NARRATIVE_TIMEOUT_SECS,
            bau: Arc::new(TextHeuristicExtractor),
            state: Mutex::new(DashboardState::default()),
            generation: AtomicU64::new(0),
            narrative_generation: AtomicU64::new(0),
        }
    }

    pub fn with_narrative(mut self, provider: Arc<dyn NarrativeProvider>, timeout_secs: u64) -> Self {
        self.narrative = Some(provider);
        self.narrative_timeout_secs = timeout_secs;
        self
    }

    pub fn with_bau_extractor(mut self, bau: Arc<dyn BauHoursExtractor>) -> Self {
        self.bau = bau;
        self
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> DashboardState {
        self.state.lock().clone()
    }

    pub async fn dispatch(&self, event: DashboardEvent) -> Result<(), DashboardError> {
        log::debug!("Dashboard event: {:?}", event);
        match event {
            DashboardEvent::Refresh => self.refresh().await.map(|_| ()),
            DashboardEvent::LoadCached => self.load_cached().map(|_| ()),
            DashboardEvent::SetCriteria(criteria) => {
                self.state.lock().criteria = criteria;
                Ok(())
            }
            DashboardEvent::ClearFilters => {
                let mut state = self.state.lock();
                let as_of_month = state.criteria.as_of_month;
                state.criteria = FilterCriteria {
                    as_of_month,
                    ..Default::default()
                };
                Ok(())
            }
            DashboardEvent::DismissBanner => {
                self.state.lock().banner = None;
                Ok(())
            }
            DashboardEvent::RequestNarrative => {
                self.narrative().await;
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    /// Fetch, normalize and install a fresh snapshot.
    ///
    /// Transport failures fall back to the data already shown, then to the
    /// disk cache, and raise a banner. Payload failures keep whatever is
    /// shown and return the error.
    pub async fn refresh(&self) -> Result<RefreshOutcome, DashboardError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.lock().status = LoadStatus::Loading;

        let result = self.source.fetch_sheet().await;

        if self.generation.load(Ordering::SeqCst) != generation {
            log::info!("Discarding superseded refresh #{}", generation);
            return Ok(RefreshOutcome::Superseded);
        }

        match result {
            Ok(sheet) => {
                let report = normalize_with_report(&sheet.rows, &sheet.header);
                let fetched_at = Utc::now();
                let metadata = match &self.cache {
                    Some(cache) => match cache.store(&report.solutions, fetched_at) {
                        Ok(meta) => Some(meta),
                        Err(e) => {
                            log::warn!("Failed to cache portfolio snapshot: {}", e);
                            None
                        }
                    },
                    None => None,
                };

                let count = report.solutions.len();
                let mut state = self.state.lock();
                state.solutions = report.solutions;
                state.status = LoadStatus::Ready;
                state.origin = Some(DataOrigin::Live);
                state.fetched_at = Some(fetched_at.to_rfc3339());
                state.content_hash = metadata.map(|m| m.content_hash);
                state.skipped_rows = report.skipped_rows;
                state.header_drift = if report.missing_headers.is_empty() {
                    None
                } else {
                    Some(HeaderDrift {
                        missing_headers: report
                            .missing_headers
                            .iter()
                            .map(|h| h.to_string())
                            .collect(),
                    })
                };
                state.banner = None;
                state.narrative = None;

                log::info!("Loaded {} solutions from live feed", count);
                Ok(RefreshOutcome::Live { solutions: count })
            }
            Err(feed_err) => {
                let err = DashboardError::from(feed_err);
                log::warn!("Portfolio refresh failed: {}", err);
                self.recover(err)
            }
        }
    }

    fn recover(&self, err: DashboardError) -> Result<RefreshOutcome, DashboardError> {
        if !err.is_recoverable_from_cache() {
            let mut state = self.state.lock();
            state.status = if state.solutions.is_empty() {
                LoadStatus::Failed
            } else {
                LoadStatus::Ready
            };
            state.banner = Some(ErrorBanner::from_error(&err, state.origin.is_some()));
            return Err(err);
        }

        {
            let mut state = self.state.lock();
            if state.origin.is_some() {
                state.status = LoadStatus::Ready;
                state.banner = Some(ErrorBanner::from_error(&err, true));
                return Ok(RefreshOutcome::Fallback {
                    solutions: state.solutions.len(),
                });
            }
        }

        match self.load_cached() {
            Ok(count) => {
                self.state.lock().banner = Some(ErrorBanner::from_error(&err, true));
                Ok(RefreshOutcome::Fallback { solutions: count })
            }
            Err(cache_err) => {
                log::warn!("No cached snapshot to fall back to: {}", cache_err);
                let mut state = self.state.lock();
                state.status = LoadStatus::Failed;
                state.banner = Some(ErrorBanner::from_error(&err, false));
                Err(DashboardError::NoData)
            }
        }
    }

    /// Install the disk snapshot without touching the network.
    pub fn load_cached(&self) -> Result<usize, DashboardError> {
        let cache = self.cache.as_ref().ok_or(DashboardError::NoData)?;
        let snapshot = cache.load()?.ok_or(DashboardError::NoData)?;
        let count = snapshot.solutions.len();

        let mut state = self.state.lock();
        state.solutions = snapshot.solutions;
        state.status = LoadStatus::Ready;
        state.origin = Some(DataOrigin::Cache);
        state.fetched_at = snapshot.metadata.as_ref().map(|m| m.fetched_at.clone());
        state.content_hash = snapshot.metadata.map(|m| m.content_hash);
        state.header_drift = None;
        state.narrative = None;

        log::info!("Loaded {} solutions from cache", count);
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------------

    fn filtered_with_criteria(&self) -> (Vec<Solution>, FilterCriteria) {
        let (solutions, criteria) = {
            let state = self.state.lock();
            (state.solutions.clone(), state.criteria.clone())
        };
        let ctx = DetectorContext { bau: self.bau.as_ref() };
        (filter_solutions_with(&solutions, &criteria, &ctx), criteria)
    }

    /// Solutions passing the current criteria, in display order.
    pub fn filtered(&self) -> Vec<Solution> {
        self.filtered_with_criteria().0
    }

    pub fn rows(&self) -> Vec<SolutionView> {
        let ctx = DetectorContext { bau: self.bau.as_ref() };
        self.filtered()
            .into_iter()
            .map(|solution| {
                let derived = DerivedMetrics::compute(&solution, &ctx);
                SolutionView { solution, derived }
            })
            .collect()
    }

    pub fn summary(&self) -> PortfolioAggregate {
        let (solutions, criteria) = self.filtered_with_criteria();
        aggregate_with(
            &solutions,
            &AggregateContext {
                as_of_month: criteria.as_of_month,
                bau: self.bau.as_ref(),
            },
        )
    }

    pub fn governance(&self) -> GovernanceReport {
        calculate_governance_with(&self.filtered(), self.bau.as_ref())
    }

    /// Generate the narrative for the current view, falling back to the
    /// canned summary on any provider failure.
    pub async fn narrative(&self) -> Narrative {
        let generation = self.narrative_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let agg = self.summary();
        let gov = self.governance();

        let narrative = match &self.narrative {
            Some(provider) => {
                let prompt = build_narrative_prompt(&agg, &gov);
                match generate_narrative(provider.as_ref(), &prompt, self.narrative_timeout_secs)
                    .await
                {
                    Ok(text) => Narrative::from_text(text, NarrativeSource::Generated),
                    Err(e) => {
                        let err = DashboardError::from(e);
                        log::warn!("Narrative generation failed, using canned summary: {}", err);
                        self.state.lock().banner = Some(ErrorBanner::from_error(&err, false));
                        Narrative::from_text(canned_narrative(&agg, &gov), NarrativeSource::Fallback)
                    }
                }
            }
            None => {
                log::debug!("No narrative provider configured, using canned summary");
                Narrative::from_text(canned_narrative(&agg, &gov), NarrativeSource::Fallback)
            }
        };

        if self.narrative_generation.load(Ordering::SeqCst) == generation {
            self.state.lock().narrative = Some(narrative.clone());
        } else {
            log::debug!("Discarding superseded narrative #{}", generation);
        }
        narrative
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::error::ErrorKind;
    use crate::feed::{FeedError, RawSheet};
    use crate::insights::client::NarrativeError;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn sheet(names: &[&str]) -> RawSheet {
        RawSheet {
            header: strings(&[
                "Area",
                "Solution Name",
                "Owner",
                "Maturity",
                "Key Metric UX",
                "Target UX",
                "Jan",
                "Feb",
                "Key Metric BI",
                "Target BI",
                "Jan",
                "Feb",
            ]),
            rows: names
                .iter()
                .map(|n| {
                    strings(&[
                        "Payments", n, "Jane", "3. Mature", "CSAT", "80", "85", "90", "Conv",
                        "50", "60", "55",
                    ])
                })
                .collect(),
        }
    }

    /// Pops scripted responses in order.
    struct ScriptedSource {
        responses: parking_lot::Mutex<VecDeque<Result<RawSheet, FeedError>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<RawSheet, FeedError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: parking_lot::Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl SheetSource for ScriptedSource {
        async fn fetch_sheet(&self) -> Result<RawSheet, FeedError> {
            self.responses
                .lock()
                .pop_front()
                .unwrap_or(Err(FeedError::Timeout(30)))
        }
    }

    /// First call blocks until released; later calls answer immediately.
    struct GatedSource {
        calls: AtomicUsize,
        started: Notify,
        gate: Notify,
    }

    #[async_trait]
    impl SheetSource for GatedSource {
        async fn fetch_sheet(&self) -> Result<RawSheet, FeedError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.started.notify_one();
                self.gate.notified().await;
                Ok(sheet(&["Stale"]))
            } else {
                Ok(sheet(&["Fresh", "Fresher"]))
            }
        }
    }

    struct FailingNarrative;

    #[async_trait]
    impl NarrativeProvider for FailingNarrative {
        async fn complete(&self, _prompt: &str) -> Result<String, NarrativeError> {
            Err(NarrativeError::EmptyResponse)
        }
    }

    struct FixedNarrative;

    #[async_trait]
    impl NarrativeProvider for FixedNarrative {
        async fn complete(&self, _prompt: &str) -> Result<String, NarrativeError> {
            Ok("**KEY RISKS**\n• [HIGH RISK] Billing".to_string())
        }
    }

    fn names(dashboard: &Dashboard) -> Vec<String> {
        dashboard.filtered().into_iter().map(|s| s.name).collect()
    }

    #[tokio::test]
    async fn live_refresh_installs_solutions_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new(vec![Ok(sheet(&["Checkout", "", "Alerts"]))]);
        let dashboard = Dashboard::new(source, Some(SnapshotCache::new(dir.path())));

        let outcome = dashboard.refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Live { solutions: 2 });

        let state = dashboard.snapshot();
        assert_eq!(state.status, LoadStatus::Ready);
        assert_eq!(state.origin, Some(DataOrigin::Live));
        assert_eq!(state.skipped_rows, 1);
        assert!(state.content_hash.is_some());
        assert!(state.banner.is_none());
        // Problem, Platform, etc. are not in the test sheet
        let drift = state.header_drift.unwrap();
        assert!(drift.missing_headers.contains(&"Problem".to_string()));

        assert!(dir.path().join("solutions-snapshot.json").exists());
    }

    #[tokio::test]
    async fn transport_failure_falls_back_to_disk_cache() {
        let dir = tempfile::tempdir().unwrap();
        let seed = ScriptedSource::new(vec![Ok(sheet(&["Checkout"]))]);
        Dashboard::new(seed, Some(SnapshotCache::new(dir.path())))
            .refresh()
            .await
            .unwrap();

        let offline = ScriptedSource::new(vec![Err(FeedError::Timeout(30))]);
        let dashboard = Dashboard::new(offline, Some(SnapshotCache::new(dir.path())));
        let outcome = dashboard.refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Fallback { solutions: 1 });

        let state = dashboard.snapshot();
        assert_eq!(state.origin, Some(DataOrigin::Cache));
        let banner = state.banner.unwrap();
        assert_eq!(banner.kind, ErrorKind::Transport);
        assert!(banner.showing_cached);
        assert!(banner.dismissible);

        dashboard.dispatch(DashboardEvent::DismissBanner).await.unwrap();
        assert!(dashboard.snapshot().banner.is_none());
    }

    #[tokio::test]
    async fn transport_failure_without_cache_is_no_data() {
        let source = ScriptedSource::new(vec![Err(FeedError::Timeout(30))]);
        let dashboard = Dashboard::new(source, None);
        let err = dashboard.refresh().await.unwrap_err();
        assert!(matches!(err, DashboardError::NoData));
        assert_eq!(dashboard.snapshot().status, LoadStatus::Failed);
    }

    #[tokio::test]
    async fn malformed_payload_keeps_previous_data() {
        let source = ScriptedSource::new(vec![
            Ok(sheet(&["Checkout"])),
            Err(FeedError::TooFewRows(1)),
        ]);
        let dashboard = Dashboard::new(source, None);
        dashboard.refresh().await.unwrap();

        let err = dashboard.refresh().await.unwrap_err();
        assert!(matches!(err, DashboardError::MalformedPayload(_)));

        let state = dashboard.snapshot();
        assert_eq!(state.solutions.len(), 1);
        assert_eq!(state.banner.unwrap().kind, ErrorKind::Payload);
    }

    #[tokio::test]
    async fn superseded_refresh_is_discarded() {
        let source = Arc::new(GatedSource {
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            gate: Notify::new(),
        });
        let dashboard = Arc::new(Dashboard::new(source.clone(), None));

        let first = {
            let dashboard = dashboard.clone();
            tokio::spawn(async move { dashboard.refresh().await })
        };
        source.started.notified().await;

        let second = dashboard.refresh().await.unwrap();
        assert_eq!(second, RefreshOutcome::Live { solutions: 2 });

        source.gate.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first, RefreshOutcome::Superseded);
        assert_eq!(names(&dashboard), vec!["Fresh", "Fresher"]);
    }

    #[tokio::test]
    async fn criteria_events_drive_views() {
        let source = ScriptedSource::new(vec![Ok(sheet(&["Checkout", "Alerts"]))]);
        let dashboard = Dashboard::new(source, None);
        dashboard.dispatch(DashboardEvent::Refresh).await.unwrap();

        dashboard
            .dispatch(DashboardEvent::SetCriteria(FilterCriteria {
                search: "alert".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(names(&dashboard), vec!["Alerts"]);
        assert_eq!(dashboard.summary().total, 1);
        assert_eq!(dashboard.rows()[0].derived.performance_score, 100);

        dashboard.dispatch(DashboardEvent::ClearFilters).await.unwrap();
        assert_eq!(dashboard.governance().total, 2);
    }

    #[tokio::test]
    async fn narrative_falls_back_to_canned_summary() {
        let source = ScriptedSource::new(vec![Ok(sheet(&["Checkout"]))]);
        let dashboard =
            Dashboard::new(source, None).with_narrative(Arc::new(FailingNarrative), 30);
        dashboard.refresh().await.unwrap();

        let narrative = dashboard.narrative().await;
        assert_eq!(narrative.source, NarrativeSource::Fallback);
        assert!(!narrative.document.sections.is_empty());

        let state = dashboard.snapshot();
        assert!(state.narrative.is_some());
        assert_eq!(state.banner.unwrap().kind, ErrorKind::Transport);
    }

    #[tokio::test]
    async fn generated_narrative_is_formatted() {
        let source = ScriptedSource::new(vec![Ok(sheet(&["Checkout"]))]);
        let dashboard = Dashboard::new(source, None).with_narrative(Arc::new(FixedNarrative), 30);
        dashboard.refresh().await.unwrap();

        dashboard
            .dispatch(DashboardEvent::RequestNarrative)
            .await
            .unwrap();
        let narrative = dashboard.snapshot().narrative.unwrap();
        assert_eq!(narrative.source, NarrativeSource::Generated);
        assert!(narrative.html.contains("badge-critical"));
    }
}
