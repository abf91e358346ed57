//! Configuration for the voxbridge gateway
//!
//! All tunables come from `VOX_*` environment variables with sensible
//! defaults; only the backend API key (and the synthesis key when external
//! synthesis is enabled) are required.

use std::time::Duration;

use crate::{Error, Result};

/// Fixed conversational-style directives appended to every script prompt.
/// Treated as opaque configuration payload by the backend; never parsed.
const STYLE_DIRECTIVES: &str = "Fale de forma natural e breve, como em uma \
ligação telefônica. Faça uma pergunta por vez e aguarde a resposta. Nunca \
leia listas ou enumerações longas em voz alta.";

/// Voxbridge gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// AI backend session configuration
    pub backend: BackendConfig,

    /// External synthesis provider configuration
    pub synth: SynthConfig,

    /// CRM REST collaborator configuration
    pub crm: CrmConfig,

    /// Interest classification configuration
    pub interest: InterestConfig,
}

/// Where the AI's audible output comes from
///
/// The two modes are mutually exclusive: either the backend streams audio
/// directly, or it streams text which is segmented and sent to the external
/// synthesis provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// The backend synthesizes its own audio
    BackendAudio,
    /// The backend streams text; voxbridge synthesizes via the external provider
    ExternalSynthesis,
}

/// AI backend (speech-to-speech) session configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// WebSocket URL of the speech-to-speech backend
    pub url: String,

    /// API key for the backend (`VOX_BACKEND_API_KEY`)
    pub api_key: String,

    /// Voice identifier for backend-synthesized audio
    pub voice: String,

    /// Output modality
    pub output: OutputMode,

    /// Caller-speech-detection parameters, applied when VAD is armed
    /// after the greeting turn completes
    pub vad: VadSettings,

    /// Base instructions used when no script can be fetched
    pub fallback_prompt: String,

    /// Conversational-style directives appended to the script prompt
    pub style_directives: String,
}

/// Steady-state caller-speech-detection sensitivity
#[derive(Debug, Clone, Copy)]
pub struct VadSettings {
    /// Detection threshold (0.0 - 1.0)
    pub threshold: f64,
    /// Audio included before detected speech, in milliseconds
    pub prefix_padding_ms: u32,
    /// Trailing silence that ends an utterance, in milliseconds
    pub silence_duration_ms: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            prefix_padding_ms: 300,
            silence_duration_ms: 700,
        }
    }
}

/// External speech synthesis provider configuration
#[derive(Debug, Clone)]
pub struct SynthConfig {
    /// Synthesis endpoint URL
    pub url: String,
    /// API key (`VOX_SYNTH_API_KEY`, required in external-synthesis mode)
    pub api_key: String,
    /// Voice identifier
    pub voice: String,
    /// Model identifier
    pub model: String,
}

/// CRM REST collaborator configuration
#[derive(Debug, Clone)]
pub struct CrmConfig {
    /// Base URL for script lookup, transcript persistence and interest
    /// notifications
    pub base_url: String,
    /// How often pending transcript entries are flushed during a call
    pub flush_interval: Duration,
}

/// Interest classification configuration
///
/// Thresholds and keyword vocabularies are deliberately configuration, not
/// constants; the boundary values below are starting points, not gospel.
#[derive(Debug, Clone)]
pub struct InterestConfig {
    /// Caller utterances required before classification starts
    pub min_utterances: u32,
    /// Utterances with fewer words than this are never classified
    pub min_words: usize,
    /// Positive keywords in priority order; the matched keyword is the signal
    pub positive: Vec<String>,
    /// Negative keywords; any match short-circuits to "not interested"
    pub negative: Vec<String>,
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            min_utterances: 2,
            min_words: 3,
            positive: [
                "quero agendar",
                "agendar",
                "marcar uma reunião",
                "quanto custa",
                "qual o valor",
                "qual o preço",
                "me manda uma proposta",
                "tenho interesse",
                "me interessa",
                "pode me ligar",
            ]
            .map(String::from)
            .to_vec(),
            negative: [
                "não tenho interesse",
                "sem interesse",
                "não quero",
                "não me interessa",
                "pare de ligar",
                "não liga mais",
                "remover meu número",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from `VOX_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns an error when a required key is missing or a value fails to
    /// parse.
    pub fn from_env() -> Result<Self> {
        let output = match env_or("VOX_OUTPUT_MODE", "backend_audio").as_str() {
            "backend_audio" => OutputMode::BackendAudio,
            "external_synthesis" => OutputMode::ExternalSynthesis,
            other => {
                return Err(Error::Config(format!(
                    "VOX_OUTPUT_MODE must be backend_audio or external_synthesis, got {other}"
                )))
            }
        };

        let backend_key = std::env::var("VOX_BACKEND_API_KEY")
            .map_err(|_| Error::Config("VOX_BACKEND_API_KEY is required".to_string()))?;

        let synth_key = std::env::var("VOX_SYNTH_API_KEY").unwrap_or_default();
        if output == OutputMode::ExternalSynthesis && synth_key.is_empty() {
            return Err(Error::Config(
                "VOX_SYNTH_API_KEY is required in external_synthesis mode".to_string(),
            ));
        }

        let vad = VadSettings {
            threshold: parse_env("VOX_VAD_THRESHOLD", VadSettings::default().threshold)?,
            prefix_padding_ms: parse_env(
                "VOX_VAD_PREFIX_PADDING_MS",
                VadSettings::default().prefix_padding_ms,
            )?,
            silence_duration_ms: parse_env(
                "VOX_VAD_SILENCE_DURATION_MS",
                VadSettings::default().silence_duration_ms,
            )?,
        };

        let interest = InterestConfig {
            min_utterances: parse_env(
                "VOX_INTEREST_MIN_UTTERANCES",
                InterestConfig::default().min_utterances,
            )?,
            min_words: parse_env("VOX_INTEREST_MIN_WORDS", InterestConfig::default().min_words)?,
            positive: keyword_list("VOX_INTEREST_POSITIVE", InterestConfig::default().positive),
            negative: keyword_list("VOX_INTEREST_NEGATIVE", InterestConfig::default().negative),
        };

        Ok(Self {
            backend: BackendConfig {
                url: env_or(
                    "VOX_BACKEND_URL",
                    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview",
                ),
                api_key: backend_key,
                voice: env_or("VOX_BACKEND_VOICE", "alloy"),
                output,
                vad,
                fallback_prompt: env_or(
                    "VOX_FALLBACK_PROMPT",
                    "Você é um assistente de atendimento telefônico educado e objetivo.",
                ),
                style_directives: env_or("VOX_STYLE_DIRECTIVES", STYLE_DIRECTIVES),
            },
            synth: SynthConfig {
                url: env_or("VOX_SYNTH_URL", "https://api.openai.com/v1/audio/speech"),
                api_key: synth_key,
                voice: env_or("VOX_SYNTH_VOICE", "alloy"),
                model: env_or("VOX_SYNTH_MODEL", "tts-1"),
            },
            crm: CrmConfig {
                base_url: env_or("VOX_CRM_URL", "http://localhost:3000"),
                flush_interval: Duration::from_secs(parse_env("VOX_FLUSH_INTERVAL_SECS", 15u64)?),
            },
            interest,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated keyword list from the environment
fn keyword_list(key: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default,
    }
}
