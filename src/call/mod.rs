//! Per-call orchestration
//!
//! One [`CallSession`] per media stream. The session owns the transcript,
//! the turn engine, the backend session, and (in external-synthesis mode)
//! the speech pipeline; its run loop multiplexes caller audio, backend
//! events, pipeline signals, and the periodic transcript flush, then
//! interprets the engine's actions as I/O.

pub mod registry;
pub mod transcript;
pub mod turn;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::BackendSession;
use crate::config::{Config, OutputMode};
use crate::crm::{CrmClient, InterestNotification};
use crate::interest::Classifier;
use crate::speech::{PipelineSignal, SentenceBuffer, SpeechSource, SynthPipeline, Synthesizer};
use crate::telephony::{StartInfo, TelephonySink};

pub use registry::{CallHandle, CallRegistry};
pub use transcript::{Role, TranscriptEntry, TranscriptLog};
pub use turn::{Action, CallEvent, TurnEngine};

/// Channels feeding a call session's run loop
pub struct CallChannels {
    pub events: mpsc::Receiver<CallEvent>,
    pub signals: mpsc::Receiver<PipelineSignal>,
    pub caller_audio: mpsc::Receiver<String>,
    /// Sender for caller audio payloads, held by the stream reader
    pub caller_audio_tx: mpsc::Sender<String>,
}

/// State and collaborators for one live call
pub struct CallSession {
    call_sid: String,
    caller_phone: Option<String>,
    engine: TurnEngine,
    transcript: TranscriptLog,
    /// Assistant text accumulated for the in-flight response
    assistant_buf: String,
    segments: SentenceBuffer,
    sink: TelephonySink,
    backend: Option<BackendSession>,
    pipeline: Option<SynthPipeline>,
    crm: CrmClient,
    classifier: Classifier,
    flush_interval: Duration,
    cancel: CancellationToken,
    /// Keeps the signal channel open in backend-audio mode, where no
    /// pipeline exists to hold a sender
    _signal_keepalive: mpsc::Sender<PipelineSignal>,
}

impl CallSession {
    /// Build the session for a freshly started media stream
    ///
    /// Fetches the call script (falling back to the default prompt) and
    /// connects the backend. A backend connection failure does not fail the
    /// call; it proceeds silently and ends when the caller hangs up.
    pub async fn establish(
        config: &Config,
        crm: CrmClient,
        start: StartInfo,
        sink: TelephonySink,
        cancel: CancellationToken,
    ) -> (Self, CallChannels) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (signal_tx, signal_rx) = mpsc::channel(16);
        let (audio_tx, audio_rx) = mpsc::channel(256);

        let prompt = match start.custom_parameters.script_id.as_deref() {
            Some(script_id) => match crm.fetch_script(script_id).await {
                Ok(script) => script.prompt,
                Err(e) => {
                    tracing::warn!(
                        call_sid = %start.call_sid,
                        script_id,
                        error = %e,
                        "script fetch failed, using fallback prompt"
                    );
                    config.backend.fallback_prompt.clone()
                }
            },
            None => config.backend.fallback_prompt.clone(),
        };
        let instructions = format!("{prompt}\n\n{}", config.backend.style_directives);

        let backend = match BackendSession::connect(&config.backend, &instructions, event_tx).await
        {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!(
                    call_sid = %start.call_sid,
                    error = %e,
                    "backend connection failed, call will be silent"
                );
                None
            }
        };

        let pipeline = match config.backend.output {
            OutputMode::BackendAudio => None,
            OutputMode::ExternalSynthesis => {
                let source: Arc<dyn SpeechSource> = Arc::new(Synthesizer::new(&config.synth));
                Some(SynthPipeline::spawn(
                    source,
                    sink.clone(),
                    signal_tx.clone(),
                    cancel.clone(),
                ))
            }
        };

        let session = Self {
            call_sid: start.call_sid,
            caller_phone: start.custom_parameters.contact_phone,
            engine: TurnEngine::new(config.interest.min_utterances),
            transcript: TranscriptLog::new(),
            assistant_buf: String::new(),
            segments: SentenceBuffer::new(),
            sink,
            backend,
            pipeline,
            crm,
            classifier: Classifier::new(&config.interest),
            flush_interval: config.crm.flush_interval,
            cancel,
            _signal_keepalive: signal_tx,
        };
        let channels = CallChannels {
            events: event_rx,
            signals: signal_rx,
            caller_audio: audio_rx,
            caller_audio_tx: audio_tx,
        };
        (session, channels)
    }

    /// Drive the call until teardown
    pub async fn run(mut self, mut channels: CallChannels) {
        drop(channels.caller_audio_tx);
        let mut flush = tokio::time::interval(self.flush_interval);
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it
        flush.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                Some(payload) = channels.caller_audio.recv() => {
                    if let Some(backend) = &self.backend {
                        if let Err(e) = backend.append_audio(&payload).await {
                            tracing::warn!(call_sid = %self.call_sid, error = %e, "dropping caller audio");
                        }
                    }
                }
                Some(event) = channels.events.recv() => {
                    if self.on_event(event).await {
                        break;
                    }
                }
                Some(signal) = channels.signals.recv() => match signal {
                    // The synthesized turn finished playing out
                    PipelineSignal::Drained => {
                        if self.on_event(CallEvent::AssistantAudioDone).await {
                            break;
                        }
                    }
                },
                _ = flush.tick() => self.flush_transcript().await,
            }
        }

        self.close().await;
    }

    /// Apply one event to the engine and perform the requested side
    /// effects; returns true when the call must end
    async fn on_event(&mut self, event: CallEvent) -> bool {
        for action in self.engine.handle(event) {
            match action {
                Action::StartResponse => {
                    if let Some(backend) = &self.backend {
                        if let Err(e) = backend.start_response().await {
                            tracing::warn!(call_sid = %self.call_sid, error = %e, "start_response failed");
                        }
                    }
                }
                Action::CancelResponse => {
                    if let Some(backend) = &self.backend {
                        if let Err(e) = backend.cancel_response().await {
                            tracing::warn!(call_sid = %self.call_sid, error = %e, "cancel_response failed");
                        }
                    }
                }
                Action::BeginSpeaking => {
                    if let Some(pipeline) = &self.pipeline {
                        pipeline.begin_turn();
                    }
                }
                Action::ClearPlayback => self.clear_playback().await,
                Action::ArmVad => {
                    if let Some(backend) = &self.backend {
                        if let Err(e) = backend.arm_vad().await {
                            tracing::warn!(call_sid = %self.call_sid, error = %e, "arm_vad failed");
                        }
                    }
                }
                Action::RecordUtterance(text) => {
                    tracing::debug!(call_sid = %self.call_sid, %text, "caller utterance");
                    self.transcript.append(Role::Caller, &text);
                }
                Action::ClassifyInterest(text) => self.classify_interest(&text).await,
                Action::SegmentDelta(text) => {
                    self.assistant_buf.push_str(&text);
                    if let Some(pipeline) = &self.pipeline {
                        for sentence in self.segments.push(&text) {
                            pipeline.enqueue(sentence);
                        }
                    }
                }
                Action::FlushSegments => {
                    if let Some(pipeline) = &self.pipeline {
                        if let Some(tail) = self.segments.flush() {
                            pipeline.enqueue(tail);
                        }
                        pipeline.mark_final();
                    }
                    self.record_assistant_text();
                }
                Action::ForwardAudio(payload) => {
                    if self.sink.send_audio(&payload).await.is_err() {
                        // Telephony side is gone; the stream reader will
                        // cancel the call momentarily
                        tracing::debug!(call_sid = %self.call_sid, "telephony sink closed");
                    }
                }
                Action::EndCall(reason) => {
                    tracing::warn!(call_sid = %self.call_sid, %reason, "ending call");
                    return true;
                }
            }
        }
        false
    }

    /// Barge-in: silence the line and keep whatever the AI managed to say
    async fn clear_playback(&mut self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.cancel_turn();
        }
        self.segments.clear();
        self.record_assistant_text();
        if self.sink.clear().await.is_err() {
            tracing::debug!(call_sid = %self.call_sid, "telephony sink closed");
        }
    }

    /// Move the accumulated assistant text into the transcript
    fn record_assistant_text(&mut self) {
        let text = std::mem::take(&mut self.assistant_buf);
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.transcript.append(Role::Assistant, trimmed);
        }
    }

    /// One-shot interest notification; fires at most once per call
    async fn classify_interest(&mut self, text: &str) {
        let Some(signal) = self.classifier.classify(text) else {
            return;
        };
        self.engine.mark_interest_fired();
        tracing::info!(call_sid = %self.call_sid, %signal, "interest detected");

        let notification = InterestNotification {
            call_id: self.call_sid.clone(),
            caller_phone: self.caller_phone.clone(),
            signal,
            transcript: self.transcript.full_text(),
            detected_at: chrono::Utc::now(),
        };
        // Best effort; a lost notification is not worth disturbing the call
        if let Err(e) = self.crm.notify_interest(&notification).await {
            tracing::warn!(call_sid = %self.call_sid, error = %e, "interest notification failed");
        }
    }

    /// Upload pending transcript entries; entries stay pending on failure
    async fn flush_transcript(&mut self) {
        if self.transcript.pending().is_empty() {
            return;
        }
        match self
            .crm
            .save_transcript(&self.call_sid, self.transcript.pending())
            .await
        {
            Ok(()) => self.transcript.mark_flushed(),
            Err(e) => {
                tracing::warn!(call_sid = %self.call_sid, error = %e, "transcript flush failed");
            }
        }
    }

    /// Final flush and backend teardown
    async fn close(&mut self) {
        self.record_assistant_text();
        self.flush_transcript().await;
        if let Some(backend) = &self.backend {
            backend.close().await;
        }
        tracing::info!(
            call_sid = %self.call_sid,
            utterances = self.engine.utterance_count(),
            turns = self.engine.turns_completed(),
            interest = self.engine.interest_fired(),
            "call finished"
        );
    }
}
