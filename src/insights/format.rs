//! Narrative formatter: `**SECTION**` / `•` text into badge-annotated sections.
//!
//! Marker mapping is fixed: `[HIGH RISK]` → critical, `[MEDIUM RISK]` →
//! monitor, `[ATTENTION NEEDED]` → datagaps. Text before the first heading is
//! kept in an untitled section. Unrecognised lines become paragraphs.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::prompts::{MARKER_ATTENTION, MARKER_HIGH, MARKER_MEDIUM};
use crate::portfolio::metrics::RiskLevel;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub text: String,
    pub badge: Option<RiskLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeSection {
    pub title: String,
    pub findings: Vec<Finding>,
    pub paragraphs: Vec<String>,
}

impl NarrativeSection {
    fn is_empty(&self) -> bool {
        self.title.is_empty() && self.findings.is_empty() && self.paragraphs.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NarrativeDocument {
    pub sections: Vec<NarrativeSection>,
}

fn re_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\*\*([^*]+)\*\*:?$").expect("narrative heading regex should compile")
    })
}

fn re_bullet() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:•|-|\*)\s+(.*)$").expect("narrative bullet regex should compile")
    })
}

fn re_bold() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*([^*]+)\*\*").expect("narrative bold regex should compile"))
}

pub fn badge_label(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical => "HIGH RISK",
        RiskLevel::Monitor => "MEDIUM RISK",
        RiskLevel::Datagaps => "ATTENTION NEEDED",
    }
}

/// Strip the first severity marker from a finding and return its badge.
pub fn extract_badge(text: &str) -> (String, Option<RiskLevel>) {
    for (marker, level) in [
        (MARKER_HIGH, RiskLevel::Critical),
        (MARKER_MEDIUM, RiskLevel::Monitor),
        (MARKER_ATTENTION, RiskLevel::Datagaps),
    ] {
        if let Some(pos) = text.find(marker) {
            let mut stripped = String::with_capacity(text.len());
            stripped.push_str(&text[..pos]);
            stripped.push_str(&text[pos + marker.len()..]);
            let cleaned = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
            return (cleaned, Some(level));
        }
    }
    (text.trim().to_string(), None)
}

pub fn parse_narrative(text: &str) -> NarrativeDocument {
    let mut sections = Vec::new();
    let mut current = NarrativeSection::default();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(caps) = re_heading().captures(line) {
            if !current.is_empty() {
                sections.push(std::mem::take(&mut current));
            }
            current.title = caps[1].trim().to_string();
        } else if let Some(caps) = re_bullet().captures(line) {
            let (text, badge) = extract_badge(&caps[1]);
            current.findings.push(Finding { text, badge });
        } else {
            current.paragraphs.push(line.to_string());
        }
    }
    if !current.is_empty() {
        sections.push(current);
    }

    NarrativeDocument { sections }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn inline(text: &str) -> String {
    re_bold()
        .replace_all(&escape_html(text), "<strong>$1</strong>")
        .into_owned()
}

/// HTML fragment with one `<section>` per narrative section.
pub fn render_html(doc: &NarrativeDocument) -> String {
    let mut html = String::from("<div class=\"ai-insights\">");

    for section in &doc.sections {
        html.push_str("<section class=\"insight-section\">");
        if !section.title.is_empty() {
            html.push_str(&format!("<h4>{}</h4>", escape_html(&section.title)));
        }
        for p in &section.paragraphs {
            html.push_str(&format!("<p>{}</p>", inline(p)));
        }
        if !section.findings.is_empty() {
            html.push_str("<ul>");
            for finding in &section.findings {
                html.push_str("<li>");
                if let Some(level) = finding.badge {
                    html.push_str(&format!(
                        "<span class=\"badge badge-{}\">{}</span> ",
                        level.as_str(),
                        badge_label(level)
                    ));
                }
                html.push_str(&inline(&finding.text));
                html.push_str("</li>");
            }
            html.push_str("</ul>");
        }
        html.push_str("</section>");
    }

    html.push_str("</div>");
    html
}

/// Plain-text rendering for terminals.
pub fn render_text(doc: &NarrativeDocument) -> String {
    let mut out = String::new();
    for section in &doc.sections {
        if !section.title.is_empty() {
            out.push_str(&section.title);
            out.push('\n');
        }
        for p in &section.paragraphs {
            out.push_str(p);
            out.push('\n');
        }
        for finding in &section.findings {
            match finding.badge {
                Some(level) => out.push_str(&format!("  • ({}) {}\n", level.as_str(), finding.text)),
                None => out.push_str(&format!("  • {}\n", finding.text)),
            }
        }
        out.push('\n');
    }
    out
}
