//! HTTP client for the spreadsheet feed.
//!
//! One GET per fetch, no retries. Timeouts surface as `FeedError::Timeout` so
//! the controller can fall back to the cached snapshot.

use std::time::Duration;

use async_trait::async_trait;

use super::{decode_payload, FeedError, RawSheet, SheetSource};

/// Upper bound on one feed round trip.
pub const FEED_TIMEOUT_SECS: u64 = 30;

pub struct HttpSheetSource {
    client: reqwest::Client,
    url: url::Url,
    timeout_secs: u64,
}

impl HttpSheetSource {
    pub fn new(url: url::Url) -> Result<Self, FeedError> {
        Self::with_timeout(url, FEED_TIMEOUT_SECS)
    }

    pub fn with_timeout(url: url::Url, timeout_secs: u64) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url,
            timeout_secs,
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> FeedError {
        if err.is_timeout() {
            FeedError::Timeout(self.timeout_secs)
        } else {
            FeedError::Http(err)
        }
    }
}

#[async_trait]
impl SheetSource for HttpSheetSource {
    async fn fetch_sheet(&self) -> Result<RawSheet, FeedError> {
        log::debug!("Fetching portfolio sheet from {}", self.url);

        let resp = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Status { status, body });
        }

        let body = resp.text().await.map_err(|e| self.map_transport(e))?;
        let sheet = decode_payload(&body)?;

        log::info!(
            "Fetched portfolio sheet: {} header columns, {} rows",
            sheet.header.len(),
            sheet.rows.len()
        );
        Ok(sheet)
    }
}
