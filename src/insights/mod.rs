//! AI narrative summary.
//!
//! Modules:
//! - prompts: fixed prompt template and canned fallback text
//! - client: chat-completion provider with timeout
//! - format: marker/badge parser and HTML rendering

pub mod client;
pub mod format;
pub mod prompts;

use serde::Serialize;

use self::format::NarrativeDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeSource {
    Generated,
    Fallback,
}

/// A formatted narrative ready to display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Narrative {
    pub source: NarrativeSource,
    pub raw: String,
    pub document: NarrativeDocument,
    pub html: String,
}

impl Narrative {
    pub fn from_text(raw: String, source: NarrativeSource) -> Self {
        let document = format::parse_narrative(&raw);
        let html = format::render_html(&document);
        Self {
            source,
            raw,
            document,
            html,
        }
    }
}
