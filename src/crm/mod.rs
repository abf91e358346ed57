//! CRM REST collaborators
//!
//! Script lookup, transcript persistence and the one-shot interest
//! notification. Script fetch and transcript save are idempotent and go
//! through the retry loop; interest notifications are best-effort.

pub mod retry;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::call::transcript::TranscriptEntry;
use crate::config::CrmConfig;
use crate::{Error, Result};

pub use retry::RetryPolicy;

/// Call script fetched from the CRM
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    pub id: String,
    /// Behavioral prompt for the AI backend; opaque payload, never parsed
    pub prompt: String,
}

/// One-shot interest notification payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestNotification {
    pub call_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_phone: Option<String>,
    pub signal: String,
    pub transcript: String,
    pub detected_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptUpload<'a> {
    call_id: &'a str,
    entries: &'a [TranscriptEntry],
}

/// Client for the CRM REST backend
#[derive(Clone)]
pub struct CrmClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CrmClient {
    #[must_use]
    pub fn new(config: &CrmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch the call script by id, retrying transient failures
    ///
    /// # Errors
    ///
    /// Returns an error when the script cannot be fetched after retries.
    pub async fn fetch_script(&self, script_id: &str) -> Result<Script> {
        let url = format!("{}/scripts/{script_id}", self.base_url);
        let response = self
            .send_with_retry(|| self.client.get(&url))
            .await?;
        Ok(response.json().await?)
    }

    /// Persist the pending transcript entries for a call, retrying
    /// transient failures (the upload is idempotent on the CRM side)
    ///
    /// # Errors
    ///
    /// Returns an error when the save fails after retries; callers keep the
    /// entries pending and try again on the next flush.
    pub async fn save_transcript(
        &self,
        call_id: &str,
        entries: &[TranscriptEntry],
    ) -> Result<()> {
        let url = format!("{}/calls/{call_id}/transcript", self.base_url);
        let body = TranscriptUpload { call_id, entries };
        self.send_with_retry(|| self.client.post(&url).json(&body))
            .await?;
        Ok(())
    }

    /// Post the one-shot interest notification; single attempt only
    ///
    /// # Errors
    ///
    /// Returns an error on any HTTP failure; the caller logs and moves on.
    pub async fn notify_interest(&self, notification: &InterestNotification) -> Result<()> {
        let url = format!("{}/interest", self.base_url);
        let response = self.client.post(&url).json(notification).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Crm(format!("interest post failed {status}: {body}")));
        }
        Ok(())
    }

    /// Send a request, retrying recoverable failures with backoff
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs);
                    let body = response.text().await.unwrap_or_default();

                    if attempt >= self.retry.max_retries || !retry::is_recoverable(status, &body) {
                        return Err(Error::Crm(format!("crm returned {status}: {body}")));
                    }

                    let delay = retry::delay_for_attempt(&self.retry, attempt, retry_after);
                    tracing::warn!(status, attempt, ?delay, "crm call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if attempt >= self.retry.max_retries {
                        return Err(e.into());
                    }
                    let delay = retry::delay_for_attempt(&self.retry, attempt, None);
                    tracing::warn!(error = %e, attempt, ?delay, "crm call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
            attempt += 1;
        }
    }
}
