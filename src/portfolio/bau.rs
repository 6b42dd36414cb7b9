//! BAU (business-as-usual) effort extraction.
//!
//! The sheet has no structured BAU column; effort is written as free text in
//! whatever auxiliary columns a team chose ("2 FTE", "120 hours/month", ...).
//! Extraction is a best-effort estimate behind [`BauHoursExtractor`] so the
//! heuristic never leaks into scoring. `None` means "unknown", never zero.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::Solution;

/// Annual working hours of one full-time person.
pub const HOURS_PER_FTE: f64 = 1900.0;

/// Two people full time. At or above this the solution is a high BAU consumer.
pub const HIGH_BAU_HOURS: f64 = 2.0 * HOURS_PER_FTE;

/// One person full time. At or above this the allocation is flagged.
pub const FLAGGED_BAU_HOURS: f64 = HOURS_PER_FTE;

/// Source of annual BAU hours for a solution.
pub trait BauHoursExtractor: Send + Sync {
    /// Annual hours, or `None` when nothing parseable was found.
    fn extract_hours(&self, solution: &Solution) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BauBucket {
    High,
    Flagged,
    Normal,
    Unknown,
}

impl BauBucket {
    pub fn for_hours(hours: Option<f64>) -> Self {
        match hours {
            Some(h) if h >= HIGH_BAU_HOURS => BauBucket::High,
            Some(h) if h >= FLAGGED_BAU_HOURS => BauBucket::Flagged,
            Some(_) => BauBucket::Normal,
            None => BauBucket::Unknown,
        }
    }
}

/// Scrapes hours or headcount out of the `other_columns` text.
///
/// Only the value half of each `Header: value` pair is read, and each column
/// contributes its first recognised figure.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextHeuristicExtractor;

/// Separator between `Header: value` pairs in `other_columns`.
const COLUMN_SEPARATOR: &str = " | ";

fn re_hours() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:[.,]\d+)?)\s*(?:hrs?|hours?|h)\b\s*(?:(?:/|per|a)\s*(year|yr|annum|month|mo|week|wk))?",
        )
        .expect("bau hours regex should compile")
    })
}

fn re_headcount() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:[.,]\d+)?)\s*(?:fte|people|persons?|heads?|headcount)\b",
        )
        .expect("bau headcount regex should compile")
    })
}

/// `1,900` and `1,900.5` are thousands-grouped; `1,5` is a decimal comma.
fn parse_amount(raw: &str) -> Option<f64> {
    let (integral, fraction) = match raw.split_once('.') {
        Some((integral, fraction)) => (integral, Some(fraction)),
        None => (raw, None),
    };
    let mut groups = integral.split(',');
    let head = groups.next()?;
    let tail: Vec<&str> = groups.collect();

    let normalized = if !tail.is_empty() && tail.iter().all(|g| g.len() == 3) {
        let mut digits = head.to_string();
        tail.iter().for_each(|g| digits.push_str(g));
        if let Some(fraction) = fraction {
            digits.push('.');
            digits.push_str(fraction);
        }
        digits
    } else {
        raw.replace(',', ".")
    };
    normalized.parse::<f64>().ok()
}

fn hours_match(value: &str) -> Option<(usize, f64)> {
    let caps = re_hours().captures(value)?;
    let number = caps.get(1)?;
    let amount = parse_amount(number.as_str())?;
    let annual = match caps.get(2).map(|m| m.as_str().to_lowercase()).as_deref() {
        Some("month") | Some("mo") => amount * 12.0,
        Some("week") | Some("wk") => amount * 52.0,
        _ => amount,
    };
    Some((number.start(), annual))
}

fn headcount_match(value: &str) -> Option<(usize, f64)> {
    let caps = re_headcount().captures(value)?;
    let number = caps.get(1)?;
    let amount = parse_amount(number.as_str())?;
    Some((number.start(), amount * HOURS_PER_FTE))
}

/// Annual hours stated in one column value, taking whichever figure comes first.
fn column_hours(value: &str) -> Option<f64> {
    match (hours_match(value), headcount_match(value)) {
        (Some(h), Some(c)) => Some(if h.0 <= c.0 { h.1 } else { c.1 }),
        (Some(h), None) => Some(h.1),
        (None, Some(c)) => Some(c.1),
        (None, None) => None,
    }
}

impl BauHoursExtractor for TextHeuristicExtractor {
    fn extract_hours(&self, solution: &Solution) -> Option<f64> {
        let text = solution.other_columns.as_str();
        if text.trim().is_empty() {
            return None;
        }

        let total = text
            .split(COLUMN_SEPARATOR)
            .map(|pair| pair.split_once(": ").map_or(pair, |(_, value)| value))
            .filter_map(column_hours)
            .fold(None, |acc: Option<f64>, hours| Some(acc.unwrap_or(0.0) + hours));

        if total.is_none() {
            log::debug!(
                "No BAU effort recognised for solution {} ('{}')",
                solution.id,
                solution.name
            );
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::test_support::solution;

    fn hours(text: &str) -> Option<f64> {
        let mut s = solution(1, "A");
        s.other_columns = text.to_string();
        TextHeuristicExtractor.extract_hours(&s)
    }

    #[test]
    fn headcount_converts_to_annual_hours() {
        assert_eq!(hours("BAU Effort: 2 FTE"), Some(3800.0));
        assert_eq!(hours("Team: 1.5 people"), Some(2850.0));
    }

    #[test]
    fn periodic_hours_are_annualised() {
        assert_eq!(hours("BAU: 100 hours/month"), Some(1200.0));
        assert_eq!(hours("BAU: 10 hrs per week"), Some(520.0));
        assert_eq!(hours("BAU: 2000 hours"), Some(2000.0));
    }

    #[test]
    fn thousands_separators_are_not_decimals() {
        assert_eq!(hours("BAU: 1,900 hours per year"), Some(1900.0));
        assert_eq!(hours("BAU: 4,000 hours/yr"), Some(4000.0));
        assert_eq!(hours("BAU: 1,250.5 hours"), Some(1250.5));
        assert_eq!(hours("Team: 1,5 FTE"), Some(2850.0));
        assert_eq!(
            BauBucket::for_hours(hours("BAU: 1,900 hours per year")),
            BauBucket::Flagged
        );
        assert_eq!(BauBucket::for_hours(hours("BAU: 4,000 hours/yr")), BauBucket::High);
    }

    #[test]
    fn header_text_is_ignored() {
        assert_eq!(hours("BAU 2024 Hours: 300 hours"), Some(300.0));
        assert_eq!(hours("BAU 2024 Hours: see wiki"), None);
    }

    #[test]
    fn first_figure_per_column_wins() {
        assert_eq!(hours("BAU: 2 FTE (3800 hours/yr)"), Some(3800.0));
        assert_eq!(hours("BAU: 120 hours/month, about 1 FTE"), Some(1440.0));
    }

    #[test]
    fn separate_columns_add_up() {
        assert_eq!(hours("Ops BAU: 1 FTE | Support BAU: 100 hours"), Some(2000.0));
    }

    #[test]
    fn unparseable_text_is_unknown() {
        assert_eq!(hours(""), None);
        assert_eq!(hours("Notes: handled by the platform team"), None);
    }

    #[test]
    fn buckets() {
        assert_eq!(BauBucket::for_hours(Some(3800.0)), BauBucket::High);
        assert_eq!(BauBucket::for_hours(Some(3799.0)), BauBucket::Flagged);
        assert_eq!(BauBucket::for_hours(Some(1900.0)), BauBucket::Flagged);
        assert_eq!(BauBucket::for_hours(Some(10.0)), BauBucket::Normal);
        assert_eq!(BauBucket::for_hours(None), BauBucket::Unknown);
    }
}
