//! Shared helpers for integration tests

use std::time::Duration;

use voxbridge::config::{
    BackendConfig, Config, CrmConfig, InterestConfig, OutputMode, SynthConfig, VadSettings,
};

/// A config pointing at test endpoints; nothing is actually contacted
pub fn test_config() -> Config {
    Config {
        backend: BackendConfig {
            url: "wss://backend.test/v1".to_string(),
            api_key: "test-key".to_string(),
            voice: "alloy".to_string(),
            output: OutputMode::BackendAudio,
            vad: VadSettings::default(),
            fallback_prompt: "Seja educado.".to_string(),
            style_directives: "Fale de forma breve.".to_string(),
        },
        synth: SynthConfig {
            url: "https://synth.test/speech".to_string(),
            api_key: String::new(),
            voice: "alloy".to_string(),
            model: "tts-1".to_string(),
        },
        crm: CrmConfig {
            base_url: "http://crm.test".to_string(),
            flush_interval: Duration::from_secs(15),
        },
        interest: InterestConfig::default(),
    }
}
