//! Wire events received from the speech-to-speech backend
//!
//! Only the event types the gateway acts on are modeled; everything else
//! falls into `Other` and is ignored. Malformed frames are dropped by the
//! reader with a warning, never propagated as errors.

use serde::Deserialize;

/// One server event, tagged by its `type` field
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum BackendEvent {
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "session.updated")]
    SessionUpdated,

    #[serde(rename = "response.created")]
    ResponseCreated { response: ResponseRef },
    #[serde(rename = "response.done")]
    ResponseDone,

    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },
    #[serde(rename = "response.audio.done")]
    AudioDone,

    #[serde(rename = "response.text.delta")]
    TextDelta { delta: String },
    #[serde(rename = "response.text.done")]
    TextDone,

    /// Transcript of backend-synthesized audio, streamed alongside it
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: String },
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone,

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },

    #[serde(rename = "error")]
    Error { error: BackendErrorInfo },

    #[serde(other)]
    Other,
}

/// Minimal reference to a backend response
#[derive(Debug, Deserialize)]
pub struct ResponseRef {
    pub id: String,
}

/// Error payload attached to backend `error` events
#[derive(Debug, Deserialize)]
pub struct BackendErrorInfo {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl BackendErrorInfo {
    /// Session lifetime exceeded; the call cannot continue on this socket
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        self.code.as_deref() == Some("session_expired")
            || self.message.contains("maximum duration")
    }
}
