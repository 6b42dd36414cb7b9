//! Governance view: coverage, latest-month achievement and allocation.
//!
//! Reshapes metric derivation and aggregator primitives. The achievement rate
//! here only looks at each solution's most recent valid value, unlike the
//! all-months performance score.

use serde::Serialize;

use super::aggregate::{bau_summary, distribution, percentage, BauSummary, DistributionEntry};
use super::bau::BauHoursExtractor;
use super::detectors::DetectorContext;
use super::metrics::{automation_status, is_present, latest_valid_value, valid_number, AutomationStatus};
use super::{MetricKind, Solution};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Share {
    pub count: usize,
    pub percentage: u8,
}

impl Share {
    fn of(count: usize, total: usize) -> Self {
        Self {
            count,
            percentage: percentage(count, total),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceCoverage {
    pub ux_metric_defined: Share,
    pub bi_metric_defined: Share,
    pub ux_target_defined: Share,
    pub bi_target_defined: Share,
    /// Both metric names and both targets in place.
    pub fully_instrumented: Share,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementRate {
    /// Solutions with both a latest valid value and a valid target.
    pub evaluated: usize,
    pub achieved: usize,
    pub rate: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub ux: AchievementRate,
    pub bi: AchievementRate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutomationCounts {
    pub automated: usize,
    pub partial: usize,
    pub manual: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub maturity: Vec<DistributionEntry>,
    pub bau: BauSummary,
    pub total_hours: f64,
    pub fte_equivalent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceReport {
    pub total: usize,
    pub regulatory: usize,
    pub coverage: GovernanceCoverage,
    pub achievement: Achievement,
    pub automation: AutomationCounts,
    pub allocation: Allocation,
}

fn achievement_rate(solutions: &[Solution], kind: MetricKind) -> AchievementRate {
    let mut evaluated = 0;
    let mut achieved = 0;

    for solution in solutions {
        let latest = latest_valid_value(solution.monthly(kind));
        let target = valid_number(solution.target(kind));
        if let (Some(value), Some(target)) = (latest, target) {
            evaluated += 1;
            if value >= target {
                achieved += 1;
            }
        }
    }

    AchievementRate {
        evaluated,
        achieved,
        rate: percentage(achieved, evaluated),
    }
}

fn count_where(solutions: &[Solution], pred: impl Fn(&Solution) -> bool) -> Share {
    Share::of(solutions.iter().filter(|s| pred(s)).count(), solutions.len())
}

fn fully_instrumented(solution: &Solution) -> bool {
    MetricKind::ALL
        .iter()
        .all(|k| is_present(solution.key_metric(*k)) && valid_number(solution.target(*k)).is_some())
}

fn coverage(solutions: &[Solution]) -> GovernanceCoverage {
    GovernanceCoverage {
        ux_metric_defined: count_where(solutions, |s| is_present(&s.key_metric_ux)),
        bi_metric_defined: count_where(solutions, |s| is_present(&s.key_metric_bi)),
        ux_target_defined: count_where(solutions, |s| valid_number(&s.target_ux).is_some()),
        bi_target_defined: count_where(solutions, |s| valid_number(&s.target_bi).is_some()),
        fully_instrumented: count_where(solutions, fully_instrumented),
    }
}

pub fn calculate_governance(solutions: &[Solution]) -> GovernanceReport {
    calculate_governance_with(solutions, DetectorContext::default().bau)
}

pub fn calculate_governance_with(
    solutions: &[Solution],
    bau: &dyn BauHoursExtractor,
) -> GovernanceReport {
    let mut automation = AutomationCounts::default();
    for solution in solutions {
        match automation_status(solution) {
            AutomationStatus::Automated => automation.automated += 1,
            AutomationStatus::Partial => automation.partial += 1,
            AutomationStatus::Manual => automation.manual += 1,
        }
    }

    let bau = bau_summary(solutions, bau);
    let allocation = Allocation {
        maturity: distribution(solutions, |s| s.maturity.as_str()),
        total_hours: bau.total_hours,
        fte_equivalent: bau.fte_equivalent(),
        bau,
    };

    GovernanceReport {
        total: solutions.len(),
        regulatory: solutions.iter().filter(|s| s.is_regulatory()).count(),
        coverage: coverage(solutions),
        achievement: Achievement {
            ux: achievement_rate(solutions, MetricKind::Ux),
            bi: achievement_rate(solutions, MetricKind::Bi),
        },
        automation,
        allocation,
    }
}
