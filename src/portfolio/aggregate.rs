//! Portfolio roll-ups over a solution set.
//!
//! Rebuilt from scratch on every call. Counts and health are independent of
//! input order; list-valued outputs (quadrant members, distribution ties)
//! follow it.

use std::collections::HashMap;

use serde::Serialize;

use super::bau::{BauBucket, BauHoursExtractor, HOURS_PER_FTE};
use super::detectors::{DetectorContext, SmokeBadge};
use super::filter::current_month_index;
use super::metrics::{is_missing_or_zero, is_present, AutomationStatus, DerivedMetrics, RiskLevel};
use super::{MetricKind, Solution, MONTHS_PER_YEAR};

/// Label for blank categorical values in distribution tables.
pub const UNSPECIFIED: &str = "Unspecified";

/// Rounded integer percentage; 0 when `total` is 0.
pub fn percentage(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (part as f64 / total as f64 * 100.0).round() as u8
}

/// Inputs shared by every solution in one aggregation pass.
pub struct AggregateContext<'a> {
    /// Month (0 = Jan) used for the current-month coverage check.
    pub as_of_month: usize,
    pub bau: &'a dyn BauHoursExtractor,
}

impl Default for AggregateContext<'static> {
    fn default() -> Self {
        Self {
            as_of_month: current_month_index(),
            bau: DetectorContext::default().bau,
        }
    }
}

impl<'a> AggregateContext<'a> {
    pub fn detectors(&self) -> DetectorContext<'a> {
        DetectorContext { bau: self.bau }
    }
}

// =============================================================================
// Output types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quadrant {
    Star,
    Critical,
    Monitor,
    Improve,
}

impl Quadrant {
    /// Fixed thresholds on raw risk (0–10) and performance (0–100).
    pub fn classify(risk: f64, performance: u8) -> Self {
        if risk < 4.0 && performance >= 60 {
            Quadrant::Star
        } else if risk >= 7.0 && performance < 40 {
            Quadrant::Critical
        } else if risk >= 7.0 {
            Quadrant::Monitor
        } else {
            Quadrant::Improve
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuadrantEntry {
    pub id: u32,
    pub name: String,
    pub risk: f64,
    pub performance: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Quadrants {
    pub star: Vec<QuadrantEntry>,
    pub critical: Vec<QuadrantEntry>,
    pub monitor: Vec<QuadrantEntry>,
    pub improve: Vec<QuadrantEntry>,
}

impl Quadrants {
    fn push(&mut self, quadrant: Quadrant, entry: QuadrantEntry) {
        match quadrant {
            Quadrant::Star => self.star.push(entry),
            Quadrant::Critical => self.critical.push(entry),
            Quadrant::Monitor => self.monitor.push(entry),
            Quadrant::Improve => self.improve.push(entry),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionEntry {
    pub label: String,
    pub count: usize,
    pub percentage: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distributions {
    pub area: Vec<DistributionEntry>,
    pub maturity: Vec<DistributionEntry>,
    pub owner: Vec<DistributionEntry>,
    pub target_user: Vec<DistributionEntry>,
    pub platform: Vec<DistributionEntry>,
    pub journey_main: Vec<DistributionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BauSummary {
    pub high: usize,
    pub flagged: usize,
    pub normal: usize,
    pub unknown: usize,
    /// Sum over solutions with a recognised estimate.
    pub total_hours: f64,
}

impl BauSummary {
    pub fn fte_equivalent(&self) -> f64 {
        (self.total_hours / HOURS_PER_FTE * 10.0).round() / 10.0
    }

    fn record(&mut self, hours: Option<f64>) {
        match BauBucket::for_hours(hours) {
            BauBucket::High => self.high += 1,
            BauBucket::Flagged => self.flagged += 1,
            BauBucket::Normal => self.normal += 1,
            BauBucket::Unknown => self.unknown += 1,
        }
        if let Some(h) = hours {
            self.total_hours += h;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesCoverage {
    pub metric_defined: u8,
    pub current_month_data: u8,
    pub automated: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsCoverage {
    pub ux: SeriesCoverage,
    pub bi: SeriesCoverage,
}

impl MetricsCoverage {
    pub fn series(&self, kind: MetricKind) -> SeriesCoverage {
        match kind {
            MetricKind::Ux => self.ux,
            MetricKind::Bi => self.bi,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskLevelCounts {
    pub critical: usize,
    pub monitor: usize,
    pub datagaps: usize,
    pub unclassified: usize,
}

impl RiskLevelCounts {
    pub fn get(&self, level: RiskLevel) -> usize {
        match level {
            RiskLevel::Critical => self.critical,
            RiskLevel::Monitor => self.monitor,
            RiskLevel::Datagaps => self.datagaps,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SmokeBadgeCounts {
    pub critical: usize,
    pub warning: usize,
    pub clear: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioAggregate {
    pub total: usize,
    pub health_score: u8,
    pub measured_solutions: usize,
    pub quadrants: Quadrants,
    pub distributions: Distributions,
    pub bau: BauSummary,
    pub coverage: MetricsCoverage,
    pub risk_levels: RiskLevelCounts,
    pub smoke_badges: SmokeBadgeCounts,
}

// =============================================================================
// Computation
// =============================================================================

/// Group-by count, descending, ties in first-encountered order.
pub fn distribution<'s, F>(solutions: &'s [Solution], key: F) -> Vec<DistributionEntry>
where
    F: Fn(&'s Solution) -> &'s str,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(&str, usize)> = Vec::new();

    for solution in solutions {
        let raw = key(solution).trim();
        let label = if raw.is_empty() { UNSPECIFIED } else { raw };
        match index.get(label) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(label, counts.len());
                counts.push((label, 1));
            }
        }
    }

    // sort_by is stable, so equal counts keep encounter order
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    counts
        .into_iter()
        .map(|(label, count)| DistributionEntry {
            label: label.to_string(),
            count,
            percentage: percentage(count, solutions.len()),
        })
        .collect()
}

pub fn bau_summary(solutions: &[Solution], bau: &dyn BauHoursExtractor) -> BauSummary {
    let mut summary = BauSummary::default();
    for solution in solutions {
        summary.record(bau.extract_hours(solution));
    }
    summary
}

fn series_coverage(
    solutions: &[Solution],
    derived: &[DerivedMetrics],
    kind: MetricKind,
    month: usize,
) -> SeriesCoverage {
    let total = solutions.len();
    let month = month.min(MONTHS_PER_YEAR - 1);

    let defined = solutions
        .iter()
        .filter(|s| is_present(s.key_metric(kind)))
        .count();
    let current = solutions
        .iter()
        .filter(|s| !is_missing_or_zero(s.monthly(kind), month))
        .count();
    let automated = derived
        .iter()
        .filter(|d| d.automation.series_status(kind) == AutomationStatus::Automated)
        .count();

    SeriesCoverage {
        metric_defined: percentage(defined, total),
        current_month_data: percentage(current, total),
        automated: percentage(automated, total),
    }
}

/// Aggregate with the local calendar month and the default BAU extractor.
pub fn aggregate(solutions: &[Solution]) -> PortfolioAggregate {
    aggregate_with(solutions, &AggregateContext::default())
}

pub fn aggregate_with(solutions: &[Solution], ctx: &AggregateContext) -> PortfolioAggregate {
    let detector_ctx = ctx.detectors();
    let derived: Vec<DerivedMetrics> = solutions
        .iter()
        .map(|s| DerivedMetrics::compute(s, &detector_ctx))
        .collect();

    let mut quadrants = Quadrants::default();
    let mut risk_levels = RiskLevelCounts::default();
    let mut smoke_badges = SmokeBadgeCounts::default();
    let mut measured_sum = 0u64;
    let mut measured = 0usize;

    for (solution, d) in solutions.iter().zip(&derived) {
        if d.performance_measured {
            measured_sum += u64::from(d.performance_score);
            measured += 1;
        }

        quadrants.push(
            Quadrant::classify(d.risk_score, d.performance_score),
            QuadrantEntry {
                id: solution.id,
                name: solution.name.clone(),
                risk: d.risk_score,
                performance: d.performance_score,
            },
        );

        match d.risk_level {
            Some(RiskLevel::Critical) => risk_levels.critical += 1,
            Some(RiskLevel::Monitor) => risk_levels.monitor += 1,
            Some(RiskLevel::Datagaps) => risk_levels.datagaps += 1,
            None => risk_levels.unclassified += 1,
        }

        match d.smoke.badge() {
            Some(SmokeBadge::Critical) => smoke_badges.critical += 1,
            Some(SmokeBadge::Warning) => smoke_badges.warning += 1,
            None => smoke_badges.clear += 1,
        }
    }

    let health_score = if measured == 0 {
        0
    } else {
        (measured_sum as f64 / measured as f64).round() as u8
    };

    let distributions = Distributions {
        area: distribution(solutions, |s| s.area.as_str()),
        maturity: distribution(solutions, |s| s.maturity.as_str()),
        owner: distribution(solutions, |s| s.owner.as_str()),
        target_user: distribution(solutions, |s| s.target_user.as_str()),
        platform: distribution(solutions, |s| s.platform.as_str()),
        journey_main: distribution(solutions, |s| s.journey_main.as_str()),
    };

    let coverage = MetricsCoverage {
        ux: series_coverage(solutions, &derived, MetricKind::Ux, ctx.as_of_month),
        bi: series_coverage(solutions, &derived, MetricKind::Bi, ctx.as_of_month),
    };

    log::debug!(
        "Aggregated {} solutions: health {} over {} measured, {} critical",
        solutions.len(),
        health_score,
        measured,
        risk_levels.critical
    );

    PortfolioAggregate {
        total: solutions.len(),
        health_score,
        measured_solutions: measured,
        quadrants,
        distributions,
        bau: bau_summary(solutions, ctx.bau),
        coverage,
        risk_levels,
        smoke_badges,
    }
}
