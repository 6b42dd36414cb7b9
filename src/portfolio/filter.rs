//! Filter evaluator.
//!
//! Criteria are an AND across independent dimensions; an empty selection for a
//! categorical dimension means "not filtered". The input slice is never
//! mutated and the output keeps normalizer order unless a sort key is set.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::detectors::DetectorContext;
use super::metrics::{categorize_risk, is_missing_or_zero, is_present, latest_valid_value, valid_number, RiskLevel};
use super::{MetricKind, Solution, MONTHS_PER_YEAR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    NameAsc,
    NameDesc,
    MaturityAsc,
    MaturityDesc,
    AreaAsc,
    AreaDesc,
    OwnerAsc,
    OwnerDesc,
}

impl SortKey {
    /// Accepts `name`, `name-desc`, `-owner`, `area-asc`, ...
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let (field, descending) = if let Some(rest) = value.strip_prefix('-') {
            (rest.to_string(), true)
        } else if let Some(rest) = value.strip_suffix("-desc") {
            (rest.to_string(), true)
        } else {
            (value.trim_end_matches("-asc").to_string(), false)
        };
        let key = match (field.as_str(), descending) {
            ("name", false) => SortKey::NameAsc,
            ("name", true) => SortKey::NameDesc,
            ("maturity", false) => SortKey::MaturityAsc,
            ("maturity", true) => SortKey::MaturityDesc,
            ("area", false) => SortKey::AreaAsc,
            ("area", true) => SortKey::AreaDesc,
            ("owner", false) => SortKey::OwnerAsc,
            ("owner", true) => SortKey::OwnerDesc,
            _ => return None,
        };
        Some(key)
    }

    fn field<'a>(&self, s: &'a Solution) -> &'a str {
        match self {
            SortKey::NameAsc | SortKey::NameDesc => &s.name,
            SortKey::MaturityAsc | SortKey::MaturityDesc => &s.maturity,
            SortKey::AreaAsc | SortKey::AreaDesc => &s.area,
            SortKey::OwnerAsc | SortKey::OwnerDesc => &s.owner,
        }
    }

    fn is_descending(&self) -> bool {
        matches!(
            self,
            SortKey::NameDesc | SortKey::MaturityDesc | SortKey::AreaDesc | SortKey::OwnerDesc
        )
    }

    fn compare(&self, a: &Solution, b: &Solution) -> Ordering {
        let ord = self
            .field(a)
            .to_lowercase()
            .cmp(&self.field(b).to_lowercase());
        if self.is_descending() {
            ord.reverse()
        } else {
            ord
        }
    }
}

/// Filter state owned by the caller and passed by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub areas: HashSet<String>,
    #[serde(default)]
    pub maturities: HashSet<String>,
    #[serde(default)]
    pub target_users: HashSet<String>,
    #[serde(default)]
    pub owners: HashSet<String>,
    #[serde(default)]
    pub sort: Option<SortKey>,
    #[serde(default)]
    pub below_target_only: bool,
    #[serde(default)]
    pub not_updated: Option<MetricKind>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    /// Month (0 = Jan) treated as "current" by the not-updated check.
    #[serde(default = "current_month_index")]
    pub as_of_month: usize,
}

/// Zero-based index of the local calendar month.
pub fn current_month_index() -> usize {
    chrono::Local::now().month0() as usize
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            search: String::new(),
            areas: HashSet::new(),
            maturities: HashSet::new(),
            target_users: HashSet::new(),
            owners: HashSet::new(),
            sort: None,
            below_target_only: false,
            not_updated: None,
            risk_level: None,
            as_of_month: current_month_index(),
        }
    }
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.search.trim().is_empty()
            && self.areas.is_empty()
            && self.maturities.is_empty()
            && self.target_users.is_empty()
            && self.owners.is_empty()
            && !self.below_target_only
            && self.not_updated.is_none()
            && self.risk_level.is_none()
    }
}

fn selected(set: &HashSet<String>, value: &str) -> bool {
    set.is_empty() || set.contains(value)
}

fn matches_search(solution: &Solution, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    [&solution.name, &solution.problem, &solution.solution_text]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Latest valid value strictly below a valid target. Missing data is not "below".
pub fn is_below_target(solution: &Solution, kind: MetricKind) -> bool {
    match (
        latest_valid_value(solution.monthly(kind)),
        valid_number(solution.target(kind)),
    ) {
        (Some(value), Some(target)) => value < target,
        _ => false,
    }
}

pub fn is_not_updated(solution: &Solution, kind: MetricKind, month: usize) -> bool {
    !is_present(solution.key_metric(kind))
        || is_missing_or_zero(solution.monthly(kind), month.min(MONTHS_PER_YEAR - 1))
}

/// Does one solution pass every dimension of the criteria?
pub fn matches(solution: &Solution, criteria: &FilterCriteria, ctx: &DetectorContext) -> bool {
    let needle = criteria.search.trim().to_lowercase();

    matches_search(solution, &needle)
        && selected(&criteria.areas, &solution.area)
        && selected(&criteria.maturities, &solution.maturity)
        && selected(&criteria.target_users, &solution.target_user)
        && selected(&criteria.owners, &solution.owner)
        && (!criteria.below_target_only
            || is_below_target(solution, MetricKind::Ux)
            || is_below_target(solution, MetricKind::Bi))
        && criteria
            .not_updated
            .map_or(true, |kind| is_not_updated(solution, kind, criteria.as_of_month))
        && criteria
            .risk_level
            .map_or(true, |level| categorize_risk(solution, ctx) == Some(level))
}

/// Filter and sort with the default BAU extractor.
pub fn filter_solutions(solutions: &[Solution], criteria: &FilterCriteria) -> Vec<Solution> {
    filter_solutions_with(solutions, criteria, &DetectorContext::default())
}

pub fn filter_solutions_with(
    solutions: &[Solution],
    criteria: &FilterCriteria,
    ctx: &DetectorContext,
) -> Vec<Solution> {
    let mut out: Vec<Solution> = solutions
        .iter()
        .filter(|s| matches(s, criteria, ctx))
        .cloned()
        .collect();

    if let Some(key) = criteria.sort {
        out.sort_by(|a, b| key.compare(a, b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::test_support::{series, solution};

    fn portfolio() -> Vec<Solution> {
        let mut a = solution(1, "Checkout");
        a.area = "Payments".to_string();
        a.owner = "Jane".to_string();

        let mut b = solution(2, "alerts");
        b.area = "Ops".to_string();
        b.owner = "Bob".to_string();
        b.problem = "Pager fatigue at NIGHT".to_string();
        b.monthly_ux = series(&["90", "70"]);

        let mut c = solution(3, "Billing");
        c.area = "Payments".to_string();
        c.owner = "Ana".to_string();
        c.key_metric_bi = "N/A".to_string();
        c.maturity = "4. Decline".to_string();

        vec![a, b, c]
    }

    fn names(solutions: &[Solution]) -> Vec<&str> {
        solutions.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn empty_criteria_keep_everything_in_order() {
        let all = portfolio();
        let out = filter_solutions(&all, &FilterCriteria::default());
        assert_eq!(names(&out), vec!["Checkout", "alerts", "Billing"]);
    }

    #[test]
    fn search_matches_any_text_field_case_insensitively() {
        let criteria = FilterCriteria {
            search: "night".to_string(),
            ..Default::default()
        };
        assert_eq!(names(&filter_solutions(&portfolio(), &criteria)), vec!["alerts"]);
    }

    #[test]
    fn categorical_sets_and_combine() {
        let criteria = FilterCriteria {
            areas: ["Payments".to_string()].into_iter().collect(),
            owners: ["Ana".to_string(), "Bob".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(names(&filter_solutions(&portfolio(), &criteria)), vec!["Billing"]);
    }

    #[test]
    fn below_target_uses_latest_valid_value() {
        let criteria = FilterCriteria {
            below_target_only: true,
            ..Default::default()
        };
        // alerts: latest UX 70 < 80
        assert_eq!(names(&filter_solutions(&portfolio(), &criteria)), vec!["alerts"]);
    }

    #[test]
    fn not_updated_checks_the_reference_month() {
        let criteria = FilterCriteria {
            not_updated: Some(MetricKind::Ux),
            as_of_month: 5,
            ..Default::default()
        };
        // alerts has no June UX value
        assert_eq!(names(&filter_solutions(&portfolio(), &criteria)), vec!["alerts"]);

        let criteria = FilterCriteria {
            not_updated: Some(MetricKind::Bi),
            as_of_month: 0,
            ..Default::default()
        };
        // Billing has no BI key metric
        assert_eq!(names(&filter_solutions(&portfolio(), &criteria)), vec!["Billing"]);
    }

    #[test]
    fn risk_level_filter_uses_categorization() {
        let criteria = FilterCriteria {
            risk_level: Some(RiskLevel::Monitor),
            ..Default::default()
        };
        // Billing: decline + lacking BI metric = 2 detectors
        assert_eq!(names(&filter_solutions(&portfolio(), &criteria)), vec!["Billing"]);
    }

    #[test]
    fn sort_is_case_insensitive_and_reversible() {
        let criteria = FilterCriteria {
            sort: Some(SortKey::NameAsc),
            ..Default::default()
        };
        assert_eq!(
            names(&filter_solutions(&portfolio(), &criteria)),
            vec!["alerts", "Billing", "Checkout"]
        );
        let criteria = FilterCriteria {
            sort: Some(SortKey::NameDesc),
            ..Default::default()
        };
        assert_eq!(
            names(&filter_solutions(&portfolio(), &criteria)),
            vec!["Checkout", "Billing", "alerts"]
        );
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let criteria = FilterCriteria {
            sort: Some(SortKey::AreaAsc),
            ..Default::default()
        };
        assert_eq!(
            names(&filter_solutions(&portfolio(), &criteria)),
            vec!["alerts", "Checkout", "Billing"]
        );
    }

    #[test]
    fn filtering_is_idempotent() {
        let all = portfolio();
        let criteria = FilterCriteria {
            areas: ["Payments".to_string()].into_iter().collect(),
            sort: Some(SortKey::OwnerDesc),
            ..Default::default()
        };
        let once = filter_solutions(&all, &criteria);
        let twice = filter_solutions(&once, &criteria);
        assert_eq!(once, twice);
    }

    #[test]
    fn sort_key_parsing() {
        assert_eq!(SortKey::parse("name"), Some(SortKey::NameAsc));
        assert_eq!(SortKey::parse("-owner"), Some(SortKey::OwnerDesc));
        assert_eq!(SortKey::parse("area-desc"), Some(SortKey::AreaDesc));
        assert_eq!(SortKey::parse("maturity-asc"), Some(SortKey::MaturityAsc));
        assert_eq!(SortKey::parse("risk"), None);
    }
}
