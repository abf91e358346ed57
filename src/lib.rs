//! Voxbridge - telephony voice gateway for speech-to-speech AI
//!
//! Bridges a telephony media-stream WebSocket to a speech-to-speech AI
//! backend, one session per call:
//! - Turn-taking state machine with barge-in handling
//! - Sentence-level external speech synthesis with per-turn cancellation
//! - One-shot interest keyword classification
//! - Transcript persistence to a CRM REST backend
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │              Telephony provider                   │
//! │        media-stream WebSocket (mu-law)            │
//! └───────────────────────┬──────────────────────────┘
//!                         │
//! ┌───────────────────────▼──────────────────────────┐
//! │                   Voxbridge                       │
//! │  Turn engine │ Synth pipeline │ Interest │ CRM    │
//! └───────────────────────┬──────────────────────────┘
//!                         │
//! ┌───────────────────────▼──────────────────────────┐
//! │         Speech-to-speech AI backend               │
//! │      realtime WebSocket (VAD, transcription)      │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod backend;
pub mod call;
pub mod config;
pub mod crm;
pub mod error;
pub mod interest;
pub mod speech;
pub mod telephony;

pub use config::{Config, OutputMode};
pub use error::{Error, Result};
