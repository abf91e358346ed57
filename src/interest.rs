//! Keyword-based interest classification
//!
//! A caller utterance is matched against a negative keyword set first (any
//! hit short-circuits), then against a positive set in priority order. The
//! matched positive keyword doubles as the signal reported to the CRM.

use crate::config::InterestConfig;

/// Stateless keyword/negation matcher over a single utterance
#[derive(Debug, Clone)]
pub struct Classifier {
    min_words: usize,
    positive: Vec<String>,
    negative: Vec<String>,
}

impl Classifier {
    #[must_use]
    pub fn new(config: &InterestConfig) -> Self {
        Self {
            min_words: config.min_words,
            positive: config.positive.iter().map(|k| k.to_lowercase()).collect(),
            negative: config.negative.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Classify one utterance, returning the matched signal keyword
    ///
    /// Pure and idempotent: identical input always yields identical output.
    /// Utterances below the word minimum are never classified.
    #[must_use]
    pub fn classify(&self, text: &str) -> Option<String> {
        let normalized = text.trim().to_lowercase();

        if normalized.split_whitespace().count() < self.min_words {
            return None;
        }

        if self.negative.iter().any(|k| normalized.contains(k.as_str())) {
            return None;
        }

        self.positive
            .iter()
            .find(|k| normalized.contains(k.as_str()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&InterestConfig::default())
    }

    #[test]
    fn scheduling_utterance_matches() {
        let signal = classifier().classify("quero agendar uma reunião semana que vem");
        assert_eq!(signal.as_deref(), Some("quero agendar"));
    }

    #[test]
    fn pricing_utterance_matches() {
        let signal = classifier().classify("mas quanto custa isso");
        assert_eq!(signal.as_deref(), Some("quanto custa"));
    }

    #[test]
    fn negation_short_circuits() {
        // "tenho interesse" is a positive keyword, but the negative set wins
        assert_eq!(classifier().classify("não tenho interesse, obrigado"), None);
    }

    #[test]
    fn short_utterances_never_classified() {
        assert_eq!(classifier().classify("ok"), None);
        assert_eq!(classifier().classify("quero agendar"), None);
    }

    #[test]
    fn case_and_whitespace_insensitive() {
        let signal = classifier().classify("  QUERO AGENDAR uma visita amanhã ");
        assert_eq!(signal.as_deref(), Some("quero agendar"));
    }

    #[test]
    fn unrelated_utterance_does_not_match() {
        assert_eq!(classifier().classify("o tempo está bonito hoje"), None);
    }

    #[test]
    fn idempotent_for_identical_input() {
        let c = classifier();
        let a = c.classify("quero agendar uma conversa");
        let b = c.classify("quero agendar uma conversa");
        assert_eq!(a, b);
    }
}
