//! Portfolio derivation engine.
//!
//! Everything in here is pure: normalized `Solution` records go in, derived
//! metrics and roll-ups come out. Nothing is cached between passes, so every
//! filter or data change recomputes from scratch against the latest rules.
//!
//! Modules:
//! - normalize: raw sheet rows → `Solution` via a header schema
//! - filter: multi-dimension filter + stable sort
//! - metrics: validity rule, performance, risk score, automation, risk level
//! - detectors: smoke-detector registry
//! - bau: BAU hours extraction (best-effort heuristic)
//! - aggregate: portfolio roll-ups
//! - governance: governance view reshaping

pub mod aggregate;
pub mod bau;
pub mod detectors;
pub mod filter;
pub mod governance;
pub mod metrics;
pub mod normalize;

use serde::{Deserialize, Serialize};

/// Number of monthly slots in a metric series (Jan..Dec).
pub const MONTHS_PER_YEAR: usize = 12;

/// Month abbreviations as they appear in the sheet header row.
pub const MONTH_ABBREVIATIONS: [&str; MONTHS_PER_YEAR] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// One portfolio product/initiative, as loaded from the sheet.
///
/// Created once per load and never mutated; the next successful load replaces
/// the whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub id: u32,
    #[serde(default)]
    pub area: String,
    pub name: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub solution_text: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub maturity: String,
    #[serde(default)]
    pub target_user: String,
    #[serde(default)]
    pub indirect_user: String,
    #[serde(default)]
    pub journey_main: String,
    #[serde(default)]
    pub journey_collateral: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub regulatory: String,
    #[serde(default, rename = "keyMetricUX")]
    pub key_metric_ux: String,
    #[serde(default, rename = "keyMetricBI")]
    pub key_metric_bi: String,
    #[serde(default, rename = "targetUX")]
    pub target_ux: String,
    #[serde(default, rename = "targetBI")]
    pub target_bi: String,
    #[serde(default = "empty_series", rename = "monthlyUX")]
    pub monthly_ux: Vec<String>,
    #[serde(default = "empty_series", rename = "monthlyBI")]
    pub monthly_bi: Vec<String>,
    /// Unmapped sheet columns as `Header: value` pairs, for BAU extraction only.
    #[serde(default)]
    pub other_columns: String,
}

pub(crate) fn empty_series() -> Vec<String> {
    vec![String::new(); MONTHS_PER_YEAR]
}

impl Solution {
    /// Regulatory flag: free text interpreted as yes/no by substring.
    pub fn is_regulatory(&self) -> bool {
        self.regulatory.to_lowercase().contains("yes")
    }

    pub fn stage(&self) -> Option<MaturityStage> {
        MaturityStage::parse(&self.maturity)
    }

    pub fn key_metric(&self, kind: MetricKind) -> &str {
        match kind {
            MetricKind::Ux => &self.key_metric_ux,
            MetricKind::Bi => &self.key_metric_bi,
        }
    }

    pub fn target(&self, kind: MetricKind) -> &str {
        match kind {
            MetricKind::Ux => &self.target_ux,
            MetricKind::Bi => &self.target_bi,
        }
    }

    pub fn monthly(&self, kind: MetricKind) -> &[String] {
        match kind {
            MetricKind::Ux => &self.monthly_ux,
            MetricKind::Bi => &self.monthly_bi,
        }
    }
}

/// The two parallel metric panels tracked per solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "UX")]
    Ux,
    #[serde(rename = "BI")]
    Bi,
}

impl MetricKind {
    pub const ALL: [MetricKind; 2] = [MetricKind::Ux, MetricKind::Bi];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Ux => "UX",
            MetricKind::Bi => "BI",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ux" => Some(MetricKind::Ux),
            "bi" => Some(MetricKind::Bi),
            _ => None,
        }
    }
}

/// Lifecycle stage. The sheet value is an open string ("1. Development",
/// "4. Decline", ...); unrecognized values map to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaturityStage {
    Development,
    Growth,
    Mature,
    Decline,
}

impl MaturityStage {
    pub fn parse(value: &str) -> Option<Self> {
        let lower = value.trim().to_lowercase();
        if lower.contains("development") {
            Some(MaturityStage::Development)
        } else if lower.contains("growth") {
            Some(MaturityStage::Growth)
        } else if lower.contains("mature") {
            Some(MaturityStage::Mature)
        } else if lower.contains("decline") {
            Some(MaturityStage::Decline)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaturityStage::Development => "1. Development",
            MaturityStage::Growth => "2. Growth",
            MaturityStage::Mature => "3. Mature",
            MaturityStage::Decline => "4. Decline",
        }
    }
}
