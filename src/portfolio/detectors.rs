//! Smoke detectors for per-solution anomalies.
//!
//! Each detector is a pure function over one solution that either fires a
//! `SmokeSignal` or stays quiet. The registry runs every detector
//! independently; the fired count drives the badge (3+ critical, 1–2 warning).

use serde::Serialize;

use super::bau::{BauHoursExtractor, TextHeuristicExtractor, HIGH_BAU_HOURS};
use super::metrics::{is_present, latest_valid_value, valid_number};
use super::{MaturityStage, MetricKind, Solution};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmokeRule {
    DownwardTrend,
    LackingMetrics,
    MaturitySignal,
    HighBau,
}

impl SmokeRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmokeRule::DownwardTrend => "downward_trend",
            SmokeRule::LackingMetrics => "lacking_metrics",
            SmokeRule::MaturitySignal => "maturity_signal",
            SmokeRule::HighBau => "high_bau",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

/// One fired detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeSignal {
    pub rule: SmokeRule,
    pub severity: Severity,
    pub message: String,
}

/// Badge derived from how many detectors fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmokeBadge {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeReport {
    pub count: usize,
    pub signals: Vec<SmokeSignal>,
}

impl SmokeReport {
    pub fn badge(&self) -> Option<SmokeBadge> {
        match self.count {
            0 => None,
            1 | 2 => Some(SmokeBadge::Warning),
            _ => Some(SmokeBadge::Critical),
        }
    }

    pub fn fired(&self, rule: SmokeRule) -> bool {
        self.signals.iter().any(|s| s.rule == rule)
    }
}

/// Context passed to each detector.
pub struct DetectorContext<'a> {
    pub bau: &'a dyn BauHoursExtractor,
}

static DEFAULT_EXTRACTOR: TextHeuristicExtractor = TextHeuristicExtractor;

impl Default for DetectorContext<'static> {
    fn default() -> Self {
        Self {
            bau: &DEFAULT_EXTRACTOR,
        }
    }
}

/// Function signature for a smoke detector.
pub type DetectorFn = fn(&Solution, &DetectorContext) -> Option<SmokeSignal>;

/// Detectors in evaluation order.
pub const DETECTORS: &[(SmokeRule, DetectorFn)] = &[
    (SmokeRule::DownwardTrend, detect_downward_trend),
    (SmokeRule::LackingMetrics, detect_lacking_metrics),
    (SmokeRule::MaturitySignal, detect_maturity_signal),
    (SmokeRule::HighBau, detect_high_bau),
];

/// Run every detector against one solution.
pub fn run_smoke_detectors(solution: &Solution, ctx: &DetectorContext) -> SmokeReport {
    let signals: Vec<SmokeSignal> = DETECTORS
        .iter()
        .filter_map(|(_, detector)| detector(solution, ctx))
        .collect();

    SmokeReport {
        count: signals.len(),
        signals,
    }
}

// ---------------------------------------------------------------------------
// Detector 1: Downward trend
// ---------------------------------------------------------------------------

/// Two consecutive month-over-month declines among the valid values of a
/// series. Needs at least three valid values to mean anything.
pub fn has_downward_trend(series: &[String]) -> bool {
    let values: Vec<f64> = series.iter().filter_map(|v| valid_number(v)).collect();
    if values.len() < 3 {
        return false;
    }
    values
        .windows(3)
        .any(|w| w[1] < w[0] && w[2] < w[1])
}

pub fn detect_downward_trend(solution: &Solution, _ctx: &DetectorContext) -> Option<SmokeSignal> {
    let declining: Vec<&str> = MetricKind::ALL
        .iter()
        .filter(|k| has_downward_trend(solution.monthly(**k)))
        .map(|k| k.as_str())
        .collect();

    if declining.is_empty() {
        return None;
    }

    Some(SmokeSignal {
        rule: SmokeRule::DownwardTrend,
        severity: Severity::Critical,
        message: format!(
            "{} declined two months in a row ({})",
            solution.name,
            declining.join(", ")
        ),
    })
}

// ---------------------------------------------------------------------------
// Detector 2: Lacking metrics
// ---------------------------------------------------------------------------

pub fn detect_lacking_metrics(solution: &Solution, _ctx: &DetectorContext) -> Option<SmokeSignal> {
    let missing: Vec<&str> = MetricKind::ALL
        .iter()
        .filter(|k| !is_present(solution.key_metric(**k)))
        .map(|k| k.as_str())
        .collect();

    if missing.is_empty() {
        return None;
    }

    Some(SmokeSignal {
        rule: SmokeRule::LackingMetrics,
        severity: Severity::Warning,
        message: format!("No {} key metric defined", missing.join(" or ")),
    })
}

// ---------------------------------------------------------------------------
// Detector 3: Maturity signal
// ---------------------------------------------------------------------------

/// Latest UX value below this in Growth/Mature stages is a maturity warning.
const WEAK_UX_VALUE: f64 = 40.0;

pub fn detect_maturity_signal(solution: &Solution, _ctx: &DetectorContext) -> Option<SmokeSignal> {
    match solution.stage() {
        Some(MaturityStage::Decline) => Some(SmokeSignal {
            rule: SmokeRule::MaturitySignal,
            severity: Severity::Critical,
            message: "Solution is in decline stage".to_string(),
        }),
        Some(stage @ (MaturityStage::Growth | MaturityStage::Mature)) => {
            let message = match latest_valid_value(&solution.monthly_ux) {
                None => format!("{} stage with no UX data reported", stage.as_str()),
                Some(v) if v < WEAK_UX_VALUE => {
                    format!("{} stage with weak UX value ({})", stage.as_str(), v)
                }
                Some(_) => return None,
            };
            Some(SmokeSignal {
                rule: SmokeRule::MaturitySignal,
                severity: Severity::Warning,
                message,
            })
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Detector 4: High BAU allocation
// ---------------------------------------------------------------------------

pub fn detect_high_bau(solution: &Solution, ctx: &DetectorContext) -> Option<SmokeSignal> {
    let hours = ctx.bau.extract_hours(solution)?;
    if hours < HIGH_BAU_HOURS {
        return None;
    }
    Some(SmokeSignal {
        rule: SmokeRule::HighBau,
        severity: Severity::Warning,
        message: format!("Estimated BAU effort of {:.0} hours/year (est.)", hours),
    })
}
