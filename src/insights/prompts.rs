//! Narrative prompt template and the canned fallback summary.
//!
//! Both produce the same constrained format the formatter understands:
//! `**SECTION**` headings, `•` findings, and one of the severity markers.

use crate::portfolio::aggregate::PortfolioAggregate;
use crate::portfolio::governance::GovernanceReport;

pub const MARKER_HIGH: &str = "[HIGH RISK]";
pub const MARKER_MEDIUM: &str = "[MEDIUM RISK]";
pub const MARKER_ATTENTION: &str = "[ATTENTION NEEDED]";

/// Most names listed per quadrant in the prompt.
const MAX_NAMED: usize = 8;

fn named(entries: &[crate::portfolio::aggregate::QuadrantEntry]) -> String {
    if entries.is_empty() {
        return "none".to_string();
    }
    let mut names: Vec<&str> = entries.iter().take(MAX_NAMED).map(|e| e.name.as_str()).collect();
    if entries.len() > MAX_NAMED {
        names.push("…");
    }
    names.join(", ")
}

pub fn build_narrative_prompt(agg: &PortfolioAggregate, gov: &GovernanceReport) -> String {
    let mut prompt = String::with_capacity(4_000);

    prompt.push_str("You are a portfolio governance analyst writing a short executive summary ");
    prompt.push_str("of an internal product portfolio.\n\n");

    prompt.push_str("# Portfolio Data\n\n");
    prompt.push_str(&format!("- Solutions: {}\n", agg.total));
    prompt.push_str(&format!(
        "- Health score: {}% (over {} measured solutions)\n",
        agg.health_score, agg.measured_solutions
    ));
    prompt.push_str(&format!(
        "- Risk levels: {} critical, {} monitor, {} data gaps\n",
        agg.risk_levels.critical, agg.risk_levels.monitor, agg.risk_levels.datagaps
    ));
    prompt.push_str(&format!(
        "- Smoke detectors: {} critical badges, {} warning badges\n",
        agg.smoke_badges.critical, agg.smoke_badges.warning
    ));
    prompt.push_str(&format!(
        "- Quadrants: {} star, {} critical, {} monitor, {} improve\n",
        agg.quadrants.star.len(),
        agg.quadrants.critical.len(),
        agg.quadrants.monitor.len(),
        agg.quadrants.improve.len()
    ));
    prompt.push_str(&format!("- Critical quadrant: {}\n", named(&agg.quadrants.critical)));
    prompt.push_str(&format!("- Monitor quadrant: {}\n", named(&agg.quadrants.monitor)));
    prompt.push_str(&format!(
        "- Metric coverage: UX defined {}%, BI defined {}%, fully instrumented {}%\n",
        agg.coverage.ux.metric_defined,
        agg.coverage.bi.metric_defined,
        gov.coverage.fully_instrumented.percentage
    ));
    prompt.push_str(&format!(
        "- Current-month data: UX {}%, BI {}%\n",
        agg.coverage.ux.current_month_data, agg.coverage.bi.current_month_data
    ));
    prompt.push_str(&format!(
        "- Latest-month target achievement: UX {}% of {}, BI {}% of {}\n",
        gov.achievement.ux.rate,
        gov.achievement.ux.evaluated,
        gov.achievement.bi.rate,
        gov.achievement.bi.evaluated
    ));
    prompt.push_str(&format!(
        "- Automation: {} automated, {} partial, {} manual\n",
        gov.automation.automated, gov.automation.partial, gov.automation.manual
    ));
    prompt.push_str(&format!(
        "- BAU load: {} high, {} flagged, {} unknown (≈{} FTE estimated)\n\n",
        agg.bau.high,
        agg.bau.flagged,
        agg.bau.unknown,
        gov.allocation.fte_equivalent
    ));

    prompt.push_str("# Output Format\n\n");
    prompt.push_str("Write three sections with these exact headings on their own lines:\n");
    prompt.push_str("**KEY RISKS**\n**DATA QUALITY**\n**RECOMMENDATIONS**\n\n");
    prompt.push_str("Under each heading write 2-4 findings, one per line, each starting with `• `.\n");
    prompt.push_str(&format!(
        "Prefix a finding with {} for critical exposure, {} for items to monitor, \
         or {} for missing or stale data.\n",
        MARKER_HIGH, MARKER_MEDIUM, MARKER_ATTENTION
    ));
    prompt.push_str("Use only the numbers above. No preamble, no closing remarks.\n");

    prompt
}

/// Deterministic summary used when the narrative endpoint is unavailable.
pub fn canned_narrative(agg: &PortfolioAggregate, gov: &GovernanceReport) -> String {
    let mut out = String::new();

    out.push_str("**KEY RISKS**\n");
    if agg.risk_levels.critical > 0 {
        out.push_str(&format!(
            "• {} {} solution(s) are classified critical.\n",
            MARKER_HIGH, agg.risk_levels.critical
        ));
    }
    if agg.risk_levels.monitor > 0 {
        out.push_str(&format!(
            "• {} {} solution(s) need monitoring.\n",
            MARKER_MEDIUM, agg.risk_levels.monitor
        ));
    }
    out.push_str(&format!(
        "• Portfolio health is {}% across {} measured solution(s).\n",
        agg.health_score, agg.measured_solutions
    ));

    out.push_str("\n**DATA QUALITY**\n");
    out.push_str(&format!(
        "• {} {}% of solutions are fully instrumented.\n",
        MARKER_ATTENTION, gov.coverage.fully_instrumented.percentage
    ));
    out.push_str(&format!(
        "• Current-month data: UX {}%, BI {}%.\n",
        agg.coverage.ux.current_month_data, agg.coverage.bi.current_month_data
    ));

    out.push_str("\n**RECOMMENDATIONS**\n");
    out.push_str("• Review critical solutions with their owners.\n");
    out.push_str("• Define missing key metrics and targets before the next review.\n");

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::aggregate::{aggregate_with, AggregateContext};
    use crate::portfolio::governance::calculate_governance;
    use crate::portfolio::test_support::solution;

    #[test]
    fn prompt_embeds_counts_and_format_rules() {
        let solutions = vec![solution(1, "Checkout"), solution(2, "Alerts")];
        let agg = aggregate_with(
            &solutions,
            &AggregateContext {
                as_of_month: 0,
                ..Default::default()
            },
        );
        let gov = calculate_governance(&solutions);
        let prompt = build_narrative_prompt(&agg, &gov);

        assert!(prompt.contains("- Solutions: 2"));
        assert!(prompt.contains("Health score: 100%"));
        assert!(prompt.contains("**KEY RISKS**"));
        assert!(prompt.contains(MARKER_ATTENTION));
    }

    #[test]
    fn canned_summary_omits_empty_risk_lines() {
        let agg = aggregate_with(&[], &AggregateContext::default());
        let gov = calculate_governance(&[]);
        let text = canned_narrative(&agg, &gov);
        assert!(!text.contains(MARKER_HIGH));
        assert!(text.contains("**DATA QUALITY**"));
    }
}
