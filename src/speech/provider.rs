//! External speech synthesis provider
//!
//! Requests synthesis over HTTP and forwards the streamed audio response
//! chunk-by-chunk to the telephony sink as it arrives. Nothing is buffered
//! whole; first-audio latency is the design goal.

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::SynthConfig;
use crate::telephony::{self, TelephonySink};
use crate::{Error, Result};

/// Source of synthesized audio for one sentence
///
/// The pipeline consumer drives exactly one `stream_to` call at a time per
/// call; implementations must honor `cancel` between chunks so barge-in
/// takes effect before the next frame goes out.
#[async_trait]
pub trait SpeechSource: Send + Sync + 'static {
    /// Synthesize `text` and forward each audio chunk to `sink`
    ///
    /// Returning `Ok` covers both completion and cancellation; `Err` means
    /// the provider failed and the sentence is skipped.
    async fn stream_to(
        &self,
        text: &str,
        sink: &TelephonySink,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

#[derive(serde::Serialize)]
struct SynthRequest<'a> {
    input: &'a str,
    voice: &'a str,
    model: &'a str,
}

/// HTTP synthesis client
pub struct Synthesizer {
    client: reqwest::Client,
    url: String,
    api_key: String,
    voice: String,
    model: String,
}

impl Synthesizer {
    #[must_use]
    pub fn new(config: &SynthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            voice: config.voice.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl SpeechSource for Synthesizer {
    async fn stream_to(
        &self,
        text: &str,
        sink: &TelephonySink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let request = SynthRequest {
            input: text,
            voice: &self.voice,
            model: &self.model,
        };

        let response = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            sent = self
                .client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send() => sent?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("provider error {status}: {body}")));
        }

        let mut stream = response.bytes_stream();
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    // Already-downloaded but unsent audio is discarded here
                    return Ok(());
                }
                chunk = stream.next() => match chunk {
                    None => return Ok(()),
                    Some(Ok(bytes)) => {
                        let payload = telephony::encode_audio(&bytes);
                        if sink.send_audio(&payload).await.is_err() {
                            // Telephony side is gone; the call is tearing down
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => {
                        return Err(Error::Synthesis(format!("stream interrupted: {e}")));
                    }
                },
            }
        }
    }
}
