//! Turn-taking state machine
//!
//! The coordinating core of a call: a pure transition engine that consumes
//! caller-speech and AI-response lifecycle events and decides when the AI
//! may speak, when to cancel it, and when to clear buffered audio. No I/O
//! happens here; the call session interprets the returned actions, which
//! keeps every transition testable without live sockets.

/// Conversational state of one call
///
/// At most one of `AiSpeaking` / `CallerSpeaking` holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Waiting for the backend to deliver the greeting; caller-speech
    /// detection is intentionally disabled
    GreetingPending,
    /// The AI is producing audible output
    AiSpeaking,
    /// Silence; the next caller utterance opens the next turn
    WaitingForCaller,
    /// The caller is talking
    CallerSpeaking,
}

/// Events consumed by the state machine
///
/// Produced by the AI backend session reader and the synthesis pipeline,
/// delivered over the call's event channel.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// Session handshake acknowledged by the backend
    BackendReady,
    /// Caller started talking (backend VAD)
    CallerSpeechStarted,
    /// Caller stopped talking
    CallerSpeechStopped,
    /// Completed caller utterance with its transcription
    CallerUtterance(String),
    /// Streamed AI text chunk
    AssistantTextDelta(String),
    /// AI text stream complete for the current response
    AssistantTextFinal,
    /// Streamed AI audio chunk (backend-audio mode), base64
    AssistantAudioDelta(String),
    /// All AI audio for the current response has been delivered
    AssistantAudioDone,
    /// The backend opened a new response
    AssistantResponseStarted,
    /// The backend finished the current response
    AssistantResponseDone,
    /// Unrecoverable backend condition; the call must end
    Fatal(String),
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Ask the backend to produce a response (greeting)
    StartResponse,
    /// Cancel the in-flight backend response; idempotent, a no-op when
    /// nothing is in flight
    CancelResponse,
    /// A legitimate AI turn began; reset the synthesis pipeline for it
    BeginSpeaking,
    /// Drop queued sentences and buffered far-end audio (barge-in)
    ClearPlayback,
    /// Enable caller-speech detection with steady-state sensitivity
    ArmVad,
    /// Append a caller utterance to the transcript
    RecordUtterance(String),
    /// Run the interest classifier over this utterance
    ClassifyInterest(String),
    /// Route this AI text chunk to segmentation/transcription
    SegmentDelta(String),
    /// The AI text stream ended; flush the trailing fragment
    FlushSegments,
    /// Forward this AI audio chunk to the caller
    ForwardAudio(String),
    /// Tear the call down
    EndCall(String),
}

/// Pure per-call transition engine
#[derive(Debug)]
pub struct TurnEngine {
    state: TurnState,
    greeting_issued: bool,
    utterance_count: u32,
    turns_completed: u32,
    caller_spoke_since_last_turn: bool,
    interest_fired: bool,
    min_utterances: u32,
}

impl TurnEngine {
    #[must_use]
    pub fn new(min_utterances: u32) -> Self {
        Self {
            state: TurnState::GreetingPending,
            greeting_issued: false,
            utterance_count: 0,
            turns_completed: 0,
            caller_spoke_since_last_turn: false,
            interest_fired: false,
            min_utterances,
        }
    }

    #[must_use]
    pub fn state(&self) -> TurnState {
        self.state
    }

    #[must_use]
    pub fn utterance_count(&self) -> u32 {
        self.utterance_count
    }

    #[must_use]
    pub fn turns_completed(&self) -> u32 {
        self.turns_completed
    }

    #[must_use]
    pub fn interest_fired(&self) -> bool {
        self.interest_fired
    }

    /// Record that the one-shot interest notification went out; no further
    /// `ClassifyInterest` actions will be emitted for this call
    pub fn mark_interest_fired(&mut self) {
        self.interest_fired = true;
    }

    /// Apply one event, returning the side effects the session must perform
    pub fn handle(&mut self, event: CallEvent) -> Vec<Action> {
        match event {
            CallEvent::BackendReady => self.on_backend_ready(),
            CallEvent::CallerSpeechStarted => self.on_caller_speech_started(),
            CallEvent::CallerSpeechStopped => self.on_caller_speech_stopped(),
            CallEvent::CallerUtterance(text) => self.on_caller_utterance(text),
            CallEvent::AssistantTextDelta(text) => self.on_text_delta(text),
            CallEvent::AssistantTextFinal => self.on_text_final(),
            CallEvent::AssistantAudioDelta(payload) => self.on_audio_delta(payload),
            CallEvent::AssistantAudioDone => self.on_audio_done(),
            CallEvent::AssistantResponseStarted => self.on_response_started(),
            CallEvent::AssistantResponseDone => self.on_response_done(),
            CallEvent::Fatal(reason) => vec![Action::EndCall(reason)],
        }
    }

    /// The backend acknowledges configuration more than once (re-arming VAD
    /// after the greeting re-triggers the same event); the greeting must
    /// fire exactly once regardless.
    fn on_backend_ready(&mut self) -> Vec<Action> {
        if self.state == TurnState::GreetingPending && !self.greeting_issued {
            self.greeting_issued = true;
            vec![Action::StartResponse]
        } else {
            Vec::new()
        }
    }

    fn on_caller_speech_started(&mut self) -> Vec<Action> {
        match self.state {
            // Caller speech during the greeting is ignored, not an interruption
            TurnState::GreetingPending => Vec::new(),
            // Barge-in: cancel the response and silence the line immediately
            TurnState::AiSpeaking => {
                self.state = TurnState::CallerSpeaking;
                self.caller_spoke_since_last_turn = true;
                vec![Action::CancelResponse, Action::ClearPlayback]
            }
            TurnState::WaitingForCaller => {
                self.state = TurnState::CallerSpeaking;
                self.caller_spoke_since_last_turn = true;
                Vec::new()
            }
            TurnState::CallerSpeaking => Vec::new(),
        }
    }

    fn on_caller_speech_stopped(&mut self) -> Vec<Action> {
        if self.state == TurnState::CallerSpeaking {
            self.state = TurnState::WaitingForCaller;
        }
        Vec::new()
    }

    fn on_caller_utterance(&mut self, text: String) -> Vec<Action> {
        self.utterance_count += 1;
        self.caller_spoke_since_last_turn = true;
        if self.state != TurnState::GreetingPending {
            self.state = TurnState::WaitingForCaller;
        }

        let mut actions = vec![Action::RecordUtterance(text.clone())];
        if self.utterance_count >= self.min_utterances && !self.interest_fired {
            actions.push(Action::ClassifyInterest(text));
        }
        actions
    }

    fn on_text_delta(&mut self, text: String) -> Vec<Action> {
        // Trailing deltas of a cancelled response are dropped
        if matches!(self.state, TurnState::AiSpeaking | TurnState::GreetingPending) {
            vec![Action::SegmentDelta(text)]
        } else {
            Vec::new()
        }
    }

    fn on_text_final(&mut self) -> Vec<Action> {
        if matches!(self.state, TurnState::AiSpeaking | TurnState::GreetingPending) {
            vec![Action::FlushSegments]
        } else {
            Vec::new()
        }
    }

    fn on_audio_delta(&mut self, payload: String) -> Vec<Action> {
        if matches!(self.state, TurnState::AiSpeaking | TurnState::GreetingPending) {
            vec![Action::ForwardAudio(payload)]
        } else {
            Vec::new()
        }
    }

    fn on_audio_done(&mut self) -> Vec<Action> {
        if self.state == TurnState::AiSpeaking {
            self.state = TurnState::WaitingForCaller;
        }
        Vec::new()
    }

    fn on_response_started(&mut self) -> Vec<Action> {
        match self.state {
            // The greeting turn; state advances on response completion
            TurnState::GreetingPending => vec![Action::BeginSpeaking],
            TurnState::WaitingForCaller => {
                // A response the caller never asked for: the backend is
                // continuing its own monologue. Cancel it.
                if !self.caller_spoke_since_last_turn && self.turns_completed >= 1 {
                    vec![Action::CancelResponse]
                } else {
                    self.state = TurnState::AiSpeaking;
                    self.caller_spoke_since_last_turn = false;
                    vec![Action::BeginSpeaking]
                }
            }
            // A response racing the caller's voice loses
            TurnState::CallerSpeaking => vec![Action::CancelResponse],
            TurnState::AiSpeaking => Vec::new(),
        }
    }

    fn on_response_done(&mut self) -> Vec<Action> {
        self.turns_completed += 1;
        if self.state == TurnState::GreetingPending {
            // Greeting delivered: enable caller-speech detection and open
            // the floor
            self.state = TurnState::WaitingForCaller;
            self.caller_spoke_since_last_turn = false;
            vec![Action::ArmVad]
        } else {
            Vec::new()
        }
    }
}
