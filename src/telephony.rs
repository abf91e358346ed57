//! Telephony media-stream protocol
//!
//! JSON frame types for the inbound media-stream WebSocket and a clonable
//! sink handle for the outbound direction. Malformed frames are dropped by
//! callers; nothing here tears down a connection.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Inbound frame from the telephony media stream
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A new call leg started streaming
    Start { start: StartInfo },
    /// One chunk of caller audio
    Media { media: MediaPayload },
    /// The call leg stopped
    Stop,
    /// Any other event ("connected", "mark", ...) — ignored
    #[serde(other)]
    Other,
}

/// Stream-start metadata
#[derive(Debug, Clone, Deserialize)]
pub struct StartInfo {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: CustomParameters,
}

/// Caller-supplied parameters attached to the stream
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomParameters {
    #[serde(rename = "scriptId", default)]
    pub script_id: Option<String>,
    #[serde(rename = "contactPhone", default)]
    pub contact_phone: Option<String>,
}

/// Base64 audio payload of a media frame
#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    pub payload: String,
}

/// Outbound frame to the telephony media stream
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// One chunk of AI audio
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaOut,
    },
    /// Discard any audio buffered or playing on the far end (barge-in)
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

/// Outbound base64 audio payload
#[derive(Debug, Clone, Serialize)]
pub struct MediaOut {
    pub payload: String,
}

/// Encode raw audio bytes for the outbound telephony protocol
#[must_use]
pub fn encode_audio(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Clonable handle for sending frames back to one call's telephony connection
#[derive(Clone)]
pub struct TelephonySink {
    stream_sid: String,
    tx: mpsc::Sender<OutboundFrame>,
}

impl TelephonySink {
    #[must_use]
    pub fn new(stream_sid: String, tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self { stream_sid, tx }
    }

    /// Forward one base64 audio chunk to the caller
    ///
    /// # Errors
    ///
    /// Returns an error when the telephony connection has gone away.
    pub async fn send_audio(&self, payload_b64: &str) -> Result<()> {
        self.tx
            .send(OutboundFrame::Media {
                stream_sid: self.stream_sid.clone(),
                media: MediaOut {
                    payload: payload_b64.to_string(),
                },
            })
            .await
            .map_err(|_| Error::Telephony("connection closed".to_string()))
    }

    /// Tell the far end to drop any buffered or playing audio
    ///
    /// # Errors
    ///
    /// Returns an error when the telephony connection has gone away.
    pub async fn clear(&self) -> Result<()> {
        self.tx
            .send(OutboundFrame::Clear {
                stream_sid: self.stream_sid.clone(),
            })
            .await
            .map_err(|_| Error::Telephony("connection closed".to_string()))
    }

    #[must_use]
    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }
}
