//! AI backend session
//!
//! One WebSocket session per call to the speech-to-speech backend. A writer
//! task owns the sink; the reader task maps wire events onto [`CallEvent`]s
//! for the turn engine. The session is configured with caller-speech
//! detection disabled so the greeting cannot be interrupted; [`arm_vad`]
//! turns detection on once the greeting turn completes.
//!
//! [`arm_vad`]: BackendSession::arm_vad

pub mod events;

use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use crate::call::turn::CallEvent;
use crate::config::{BackendConfig, OutputMode, VadSettings};
use crate::{Error, Result};

pub use events::BackendEvent;

/// Telephony carries 8 kHz mu-law on both legs
const AUDIO_FORMAT: &str = "g711_ulaw";

/// Live session with the speech-to-speech backend
pub struct BackendSession {
    outbound: mpsc::Sender<Message>,
    /// Id of the response currently in flight, if any; makes cancellation
    /// idempotent
    active_response: Arc<Mutex<Option<String>>>,
    vad: VadSettings,
}

impl BackendSession {
    /// Connect, configure the session, and spawn the reader/writer tasks
    ///
    /// Events from the backend arrive on `call_events` until the socket
    /// closes. The initial configuration disables caller-speech detection
    /// and sets the given instructions.
    ///
    /// # Errors
    ///
    /// Returns an error when the WebSocket handshake or the initial
    /// configuration send fails.
    pub async fn connect(
        config: &BackendConfig,
        instructions: &str,
        call_events: mpsc::Sender<CallEvent>,
    ) -> Result<Self> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Backend(format!("invalid backend url: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| Error::Backend(format!("invalid api key: {e}")))?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws, _) = connect_async(request).await?;
        let (mut sink, mut stream) = ws.split();

        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(64);
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let active_response = Arc::new(Mutex::new(None));
        let reader_active = Arc::clone(&active_response);
        tokio::spawn(async move {
            while let Some(incoming) = stream.next().await {
                match incoming {
                    Ok(Message::Text(raw)) => {
                        let event = match serde_json::from_str::<BackendEvent>(&raw) {
                            Ok(event) => event,
                            Err(e) => {
                                tracing::warn!(error = %e, "dropping malformed backend frame");
                                continue;
                            }
                        };
                        if let Some(mapped) = map_event(event, &reader_active) {
                            if call_events.send(mapped).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            let _ = call_events
                .send(CallEvent::Fatal("backend session closed".to_string()))
                .await;
        });

        let session = Self {
            outbound,
            active_response,
            vad: config.vad,
        };
        session
            .send_json(&initial_session_update(config, instructions))
            .await?;
        Ok(session)
    }

    /// Forward one base64 audio chunk from the caller
    ///
    /// # Errors
    ///
    /// Returns an error when the session writer has shut down.
    pub async fn append_audio(&self, audio_b64: &str) -> Result<()> {
        self.send_json(&serde_json::json!({
            "type": "input_audio_buffer.append",
            "audio": audio_b64,
        }))
        .await
    }

    /// Ask the backend to produce a response (the greeting turn)
    ///
    /// # Errors
    ///
    /// Returns an error when the session writer has shut down.
    pub async fn start_response(&self) -> Result<()> {
        self.send_json(&serde_json::json!({ "type": "response.create" }))
            .await
    }

    /// Cancel the in-flight response, if any
    ///
    /// A no-op when nothing is in flight, so barge-in and the unsolicited
    /// response guard can both call it without coordination.
    ///
    /// # Errors
    ///
    /// Returns an error when the session writer has shut down.
    pub async fn cancel_response(&self) -> Result<()> {
        let in_flight = self.active_response.lock().expect("response lock").take();
        let Some(response_id) = in_flight else {
            return Ok(());
        };
        self.send_json(&serde_json::json!({
            "type": "response.cancel",
            "response_id": response_id,
        }))
        .await
    }

    /// Enable caller-speech detection with steady-state sensitivity
    ///
    /// # Errors
    ///
    /// Returns an error when the session writer has shut down.
    pub async fn arm_vad(&self) -> Result<()> {
        self.send_json(&serde_json::json!({
            "type": "session.update",
            "session": {
                "turn_detection": {
                    "type": "server_vad",
                    "threshold": self.vad.threshold,
                    "prefix_padding_ms": self.vad.prefix_padding_ms,
                    "silence_duration_ms": self.vad.silence_duration_ms,
                },
            },
        }))
        .await
    }

    /// Close the session; the writer task shuts down once the channel drains
    pub async fn close(&self) {
        let _ = self.outbound.send(Message::Close(None)).await;
    }

    async fn send_json(&self, value: &serde_json::Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.outbound
            .send(Message::Text(raw.into()))
            .await
            .map_err(|_| Error::Backend("backend session writer closed".to_string()))
    }
}

/// Initial configuration: detection off until the greeting lands, caller
/// transcription on, modalities per output mode
fn initial_session_update(config: &BackendConfig, instructions: &str) -> serde_json::Value {
    let modalities = match config.output {
        OutputMode::BackendAudio => serde_json::json!(["audio", "text"]),
        OutputMode::ExternalSynthesis => serde_json::json!(["text"]),
    };
    serde_json::json!({
        "type": "session.update",
        "session": {
            "modalities": modalities,
            "voice": config.voice,
            "instructions": instructions,
            "input_audio_format": AUDIO_FORMAT,
            "output_audio_format": AUDIO_FORMAT,
            "turn_detection": serde_json::Value::Null,
            "input_audio_transcription": { "model": "whisper-1" },
        },
    })
}

/// Map one wire event to a call event, tracking the in-flight response id
fn map_event(event: BackendEvent, active: &Arc<Mutex<Option<String>>>) -> Option<CallEvent> {
    match event {
        BackendEvent::SessionCreated | BackendEvent::Other => None,
        BackendEvent::SessionUpdated => Some(CallEvent::BackendReady),
        BackendEvent::ResponseCreated { response } => {
            *active.lock().expect("response lock") = Some(response.id);
            Some(CallEvent::AssistantResponseStarted)
        }
        BackendEvent::ResponseDone => {
            active.lock().expect("response lock").take();
            Some(CallEvent::AssistantResponseDone)
        }
        BackendEvent::AudioDelta { delta } => Some(CallEvent::AssistantAudioDelta(delta)),
        BackendEvent::AudioDone => Some(CallEvent::AssistantAudioDone),
        BackendEvent::TextDelta { delta } | BackendEvent::AudioTranscriptDelta { delta } => {
            Some(CallEvent::AssistantTextDelta(delta))
        }
        BackendEvent::TextDone | BackendEvent::AudioTranscriptDone => {
            Some(CallEvent::AssistantTextFinal)
        }
        BackendEvent::SpeechStarted => Some(CallEvent::CallerSpeechStarted),
        BackendEvent::SpeechStopped => Some(CallEvent::CallerSpeechStopped),
        BackendEvent::TranscriptionCompleted { transcript } => {
            let text = transcript.trim();
            if text.is_empty() {
                None
            } else {
                Some(CallEvent::CallerUtterance(text.to_string()))
            }
        }
        BackendEvent::Error { error } => {
            if error.is_session_expired() {
                Some(CallEvent::Fatal(format!(
                    "backend session expired: {}",
                    error.message
                )))
            } else {
                tracing::warn!(
                    code = ?error.code,
                    message = %error.message,
                    "backend reported a non-fatal error"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active() -> Arc<Mutex<Option<String>>> {
        Arc::new(Mutex::new(None))
    }

    #[test]
    fn response_lifecycle_tracks_active_id() {
        let slot = active();
        let created: BackendEvent = serde_json::from_str(
            r#"{"type":"response.created","response":{"id":"resp_9"}}"#,
        )
        .unwrap();
        assert!(matches!(
            map_event(created, &slot),
            Some(CallEvent::AssistantResponseStarted)
        ));
        assert_eq!(slot.lock().unwrap().as_deref(), Some("resp_9"));

        let done: BackendEvent = serde_json::from_str(r#"{"type":"response.done"}"#).unwrap();
        assert!(matches!(
            map_event(done, &slot),
            Some(CallEvent::AssistantResponseDone)
        ));
        assert!(slot.lock().unwrap().is_none());
    }

    #[test]
    fn audio_transcript_deltas_feed_text_stream() {
        let slot = active();
        let event: BackendEvent = serde_json::from_str(
            r#"{"type":"response.audio_transcript.delta","delta":"Bom dia"}"#,
        )
        .unwrap();
        match map_event(event, &slot) {
            Some(CallEvent::AssistantTextDelta(text)) => assert_eq!(text, "Bom dia"),
            other => panic!("wrong mapping: {other:?}"),
        }
    }

    #[test]
    fn empty_transcription_is_dropped() {
        let slot = active();
        let event: BackendEvent = serde_json::from_str(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"  "}"#,
        )
        .unwrap();
        assert!(map_event(event, &slot).is_none());
    }

    #[test]
    fn non_fatal_backend_error_is_swallowed() {
        let slot = active();
        let event: BackendEvent = serde_json::from_str(
            r#"{"type":"error","error":{"code":"invalid_request_error","message":"nope"}}"#,
        )
        .unwrap();
        assert!(map_event(event, &slot).is_none());
    }

    #[test]
    fn session_expiry_is_fatal() {
        let slot = active();
        let event: BackendEvent = serde_json::from_str(
            r#"{"type":"error","error":{"code":"session_expired","message":"too long"}}"#,
        )
        .unwrap();
        assert!(matches!(map_event(event, &slot), Some(CallEvent::Fatal(_))));
    }

    #[test]
    fn initial_update_disables_detection_and_sets_format() {
        let config = BackendConfig {
            url: "wss://backend.test/v1".to_string(),
            api_key: "k".to_string(),
            voice: "alloy".to_string(),
            output: OutputMode::ExternalSynthesis,
            vad: VadSettings::default(),
            fallback_prompt: String::new(),
            style_directives: String::new(),
        };
        let update = initial_session_update(&config, "Seja breve.");
        let session = &update["session"];
        assert!(session["turn_detection"].is_null());
        assert_eq!(session["modalities"], serde_json::json!(["text"]));
        assert_eq!(session["input_audio_format"], AUDIO_FORMAT);
        assert_eq!(session["instructions"], "Seja breve.");
    }
}
