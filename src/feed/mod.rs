//! Spreadsheet feed: wire payload, decoding, and the source seam.
//!
//! The backend is an opaque endpoint answering
//! `{ "success": bool, "data": [[cell]], "error"?: string }`. Row 0 is a
//! section banner and ignored, row 1 is the header row, rows 2.. are data.
//!
//! Modules:
//! - client: reqwest-backed `SheetSource`
//! - cache: last-good snapshot mirrored to disk

pub mod cache;
pub mod client;

use async_trait::async_trait;
use serde::Deserialize;

/// Section row + header row + at least one data row.
pub const MIN_PAYLOAD_ROWS: usize = 3;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Feed request timed out after {0} seconds")]
    Timeout(u64),
    #[error("Feed returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Feed reported failure: {0}")]
    Rejected(String),
    #[error("Feed payload has {0} rows, need at least 3")]
    TooFewRows(usize),
    #[error("Failed to decode feed payload: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SheetPayload {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Header row and data rows with every cell coerced to text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Coerce one JSON cell to text. Nulls become empty and integral numbers
/// print without a fractional part, matching what the sheet displays.
pub fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn row_to_strings(row: &[serde_json::Value]) -> Vec<String> {
    row.iter().map(cell_to_string).collect()
}

impl SheetPayload {
    /// Validate and split into header + rows. No partial ingestion on failure.
    pub fn into_sheet(self) -> Result<RawSheet, FeedError> {
        if !self.success {
            return Err(FeedError::Rejected(
                self.error
                    .unwrap_or_else(|| "success flag was false".to_string()),
            ));
        }
        if self.data.len() < MIN_PAYLOAD_ROWS {
            return Err(FeedError::TooFewRows(self.data.len()));
        }

        let mut data = self.data.into_iter().skip(1);
        let header = data
            .next()
            .map(|r| row_to_strings(&r))
            .unwrap_or_default();
        let rows = data.map(|r| row_to_strings(&r)).collect();

        Ok(RawSheet { header, rows })
    }
}

/// Parse a response body into a validated sheet.
pub fn decode_payload(body: &str) -> Result<RawSheet, FeedError> {
    let payload: SheetPayload =
        serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;
    payload.into_sheet()
}

// ---------------------------------------------------------------------------
// Source seam
// ---------------------------------------------------------------------------

/// Anything that can produce the raw sheet: the HTTP client, or a fake in tests.
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn fetch_sheet(&self) -> Result<RawSheet, FeedError>;
}
