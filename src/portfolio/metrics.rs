//! Per-solution metric derivation.
//!
//! Shared validity rule for monthly values and targets: a value is valid when
//! it is not blank, `N/A` or `-`, and a leading-number parse (the same
//! prefix rule a spreadsheet front-end applies, so `"80%"` reads as 80)
//! succeeds. Metric *names* and owners use the weaker presence rule since
//! they are text.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::detectors::{self, DetectorContext, SmokeReport};
use super::{MaturityStage, MetricKind, Solution, MONTHS_PER_YEAR};

/// Placeholders the sheet uses for "no value".
const PLACEHOLDERS: &[&str] = &["", "N/A", "-"];

/// Upper bound of the additive risk score.
pub const MAX_RISK_SCORE: f64 = 10.0;

fn re_leading_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?")
            .expect("leading number regex should compile")
    })
}

/// Parse the numeric prefix of a cell, ignoring trailing text ("80%", "12 users").
pub fn parse_leading_number(value: &str) -> Option<f64> {
    let m = re_leading_number().find(value.trim_start())?;
    m.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Presence rule: not blank and not a placeholder.
pub fn is_present(value: &str) -> bool {
    !PLACEHOLDERS.contains(&value.trim())
}

/// Parsed value under the validity rule, `None` when invalid.
pub fn valid_number(value: &str) -> Option<f64> {
    if !is_present(value) {
        return None;
    }
    parse_leading_number(value)
}

pub fn is_valid_value(value: &str) -> bool {
    valid_number(value).is_some()
}

/// Most recent valid value, scanning December back to January.
pub fn latest_valid_value(series: &[String]) -> Option<f64> {
    series.iter().rev().find_map(|v| valid_number(v))
}

/// True when the value at `month` is missing, a placeholder, or numerically zero.
pub fn is_missing_or_zero(series: &[String], month: usize) -> bool {
    match series.get(month).and_then(|v| valid_number(v)) {
        Some(v) => v == 0.0,
        None => true,
    }
}

// =============================================================================
// Performance vs target
// =============================================================================

/// Month-by-month achievement against target across both metric series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceResult {
    /// 0–100, rounded.
    pub score: u8,
    pub achieved_months: u32,
    pub measured_months: u32,
}

impl PerformanceResult {
    /// False when no month had both a valid value and a valid target.
    pub fn is_measured(&self) -> bool {
        self.measured_months > 0
    }
}

pub fn performance(solution: &Solution) -> PerformanceResult {
    let mut achieved = 0u32;
    let mut measured = 0u32;

    for kind in MetricKind::ALL {
        let Some(target) = valid_number(solution.target(kind)) else {
            continue;
        };
        for value in solution.monthly(kind).iter().filter_map(|v| valid_number(v)) {
            measured += 1;
            if value >= target {
                achieved += 1;
            }
        }
    }

    let score = if measured == 0 {
        0
    } else {
        (achieved as f64 / measured as f64 * 100.0).round() as u8
    };

    PerformanceResult {
        score,
        achieved_months: achieved,
        measured_months: measured,
    }
}

/// Performance-vs-target percentage. No data scores 0, same as 0% achievement;
/// use [`performance`] when the difference matters.
pub fn performance_score(solution: &Solution) -> u8 {
    performance(solution).score
}

// =============================================================================
// Risk score
// =============================================================================

fn maturity_risk(stage: Option<MaturityStage>) -> f64 {
    match stage {
        Some(MaturityStage::Development) => 4.0,
        Some(MaturityStage::Growth) => 2.0,
        Some(MaturityStage::Mature) => 0.0,
        Some(MaturityStage::Decline) => 3.0,
        None => 2.0,
    }
}

/// Additive 0–10 risk score from maturity and instrumentation gaps.
pub fn risk_score(solution: &Solution) -> f64 {
    let mut score = maturity_risk(solution.stage());

    if !is_present(&solution.key_metric_ux) {
        score += 1.5;
    }
    if !is_present(&solution.key_metric_bi) {
        score += 1.5;
    }
    if !is_valid_value(&solution.target_ux) {
        score += 1.0;
    }
    if !is_valid_value(&solution.target_bi) {
        score += 1.0;
    }
    if !is_present(&solution.owner) {
        score += 1.0;
    }

    score.min(MAX_RISK_SCORE)
}

// =============================================================================
// Automation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutomationStatus {
    Automated,
    Partial,
    Manual,
}

impl AutomationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationStatus::Automated => "Automated",
            AutomationStatus::Partial => "Partial",
            AutomationStatus::Manual => "Manual",
        }
    }

    fn for_series(valid_months: usize) -> Self {
        match valid_months {
            MONTHS_PER_YEAR => AutomationStatus::Automated,
            0 => AutomationStatus::Manual,
            _ => AutomationStatus::Partial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationBreakdown {
    pub status: AutomationStatus,
    pub ux_valid_months: usize,
    pub bi_valid_months: usize,
}

impl AutomationBreakdown {
    pub fn series_status(&self, kind: MetricKind) -> AutomationStatus {
        match kind {
            MetricKind::Ux => AutomationStatus::for_series(self.ux_valid_months),
            MetricKind::Bi => AutomationStatus::for_series(self.bi_valid_months),
        }
    }
}

/// Valid months for automation purposes; a literal zero does not count.
pub fn automated_months(series: &[String]) -> usize {
    series
        .iter()
        .filter_map(|v| valid_number(v))
        .filter(|v| *v != 0.0)
        .count()
}

pub fn automation(solution: &Solution) -> AutomationBreakdown {
    let ux = automated_months(&solution.monthly_ux);
    let bi = automated_months(&solution.monthly_bi);

    let status = if ux == MONTHS_PER_YEAR && bi == MONTHS_PER_YEAR {
        AutomationStatus::Automated
    } else if ux > 0 || bi > 0 {
        AutomationStatus::Partial
    } else {
        AutomationStatus::Manual
    };

    AutomationBreakdown {
        status,
        ux_valid_months: ux,
        bi_valid_months: bi,
    }
}

pub fn automation_status(solution: &Solution) -> AutomationStatus {
    automation(solution).status
}

// =============================================================================
// Risk level
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Critical,
    Monitor,
    Datagaps,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "critical",
            RiskLevel::Monitor => "monitor",
            RiskLevel::Datagaps => "datagaps",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(RiskLevel::Critical),
            "monitor" => Some(RiskLevel::Monitor),
            "datagaps" | "data-gaps" | "data_gaps" => Some(RiskLevel::Datagaps),
            _ => None,
        }
    }
}

fn has_data_gaps(solution: &Solution) -> bool {
    !is_present(&solution.key_metric_ux)
        || !is_present(&solution.key_metric_bi)
        || !is_present(&solution.owner)
        || !is_valid_value(&solution.target_ux)
        || !is_valid_value(&solution.target_bi)
}

/// Ordered classification, first match wins:
/// 1. critical: risk ≥ 7, Decline, and a metric name missing
/// 2. critical: 3+ smoke detectors
/// 3. monitor: 1–2 smoke detectors
/// 4. monitor: 4 ≤ risk < 7
/// 5. datagaps: any metric name, owner or target missing
pub fn classify_risk(risk: f64, smoke_count: usize, solution: &Solution) -> Option<RiskLevel> {
    let metric_missing =
        !is_present(&solution.key_metric_ux) || !is_present(&solution.key_metric_bi);

    if risk >= 7.0 && solution.stage() == Some(MaturityStage::Decline) && metric_missing {
        return Some(RiskLevel::Critical);
    }
    if smoke_count >= 3 {
        return Some(RiskLevel::Critical);
    }
    if (1..=2).contains(&smoke_count) {
        return Some(RiskLevel::Monitor);
    }
    if (4.0..7.0).contains(&risk) {
        return Some(RiskLevel::Monitor);
    }
    if has_data_gaps(solution) {
        return Some(RiskLevel::Datagaps);
    }
    None
}

pub fn categorize_risk(solution: &Solution, ctx: &DetectorContext) -> Option<RiskLevel> {
    let smoke = detectors::run_smoke_detectors(solution, ctx);
    classify_risk(risk_score(solution), smoke.count, solution)
}

// =============================================================================
// Bundle
// =============================================================================

/// Everything derived for one solution in one pass. Never stored on the solution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    pub performance_score: u8,
    pub performance_measured: bool,
    pub risk_score: f64,
    pub automation: AutomationBreakdown,
    pub smoke: SmokeReport,
    pub risk_level: Option<RiskLevel>,
}

impl DerivedMetrics {
    pub fn compute(solution: &Solution, ctx: &DetectorContext) -> Self {
        let perf = performance(solution);
        let risk = risk_score(solution);
        let smoke = detectors::run_smoke_detectors(solution, ctx);
        let risk_level = classify_risk(risk, smoke.count, solution);

        Self {
            performance_score: perf.score,
            performance_measured: perf.is_measured(),
            risk_score: risk,
            automation: automation(solution),
            smoke,
            risk_level,
        }
    }
}
