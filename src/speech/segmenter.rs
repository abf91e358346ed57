//! Incremental sentence segmentation for streamed AI text
//!
//! Sentence boundaries are a simple terminal-punctuation scan (`.`, `!`,
//! `?`) from the start of the buffer. Abbreviations like "Dr." are split
//! eagerly; that is a documented limitation, not a defect to silently fix.

/// Split a buffer into complete sentences and a trailing remainder
///
/// Returned sentences are trimmed and never empty; the remainder keeps any
/// text after the last terminal punctuation mark.
#[must_use]
pub fn split_sentences(buffer: &str) -> (Vec<String>, String) {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, c) in buffer.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let sentence = buffer[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = end;
        }
    }

    (sentences, buffer[start..].to_string())
}

/// Stateful buffer that extracts speakable sentences from a token stream
#[derive(Debug, Default)]
pub struct SentenceBuffer {
    buf: String,
}

impl SentenceBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append streamed text and return any newly completed sentences in
    /// emission order
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buf.push_str(delta);
        let (sentences, rest) = split_sentences(&self.buf);
        self.buf = rest;
        sentences
    }

    /// Emit the trailing fragment as a final sentence on response completion
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let trimmed = rest.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Discard any buffered fragment (barge-in)
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_complete_sentence_and_keeps_fragment() {
        let mut buf = SentenceBuffer::new();
        assert_eq!(buf.push("Hello there. How are"), vec!["Hello there."]);
        assert_eq!(buf.push(" you?"), vec!["How are you?"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn multiple_sentences_in_one_delta() {
        let mut buf = SentenceBuffer::new();
        let out = buf.push("Bom dia! Tudo bem? Vamos começar");
        assert_eq!(out, vec!["Bom dia!", "Tudo bem?"]);
        assert_eq!(buf.flush().as_deref(), Some("Vamos começar"));
    }

    #[test]
    fn flush_emits_trailing_fragment_once() {
        let mut buf = SentenceBuffer::new();
        buf.push("até logo");
        assert_eq!(buf.flush().as_deref(), Some("até logo"));
        assert_eq!(buf.flush(), None);
    }

    #[test]
    fn never_emits_empty_sentences() {
        let mut buf = SentenceBuffer::new();
        assert!(buf.push("...").is_empty());
        assert!(buf.push("  .  ! ").is_empty());
        assert_eq!(buf.flush(), None);
    }

    #[test]
    fn clear_discards_fragment() {
        let mut buf = SentenceBuffer::new();
        buf.push("metade de uma frase");
        buf.clear();
        assert_eq!(buf.flush(), None);
    }

    #[test]
    fn split_is_pure() {
        let (sentences, rest) = split_sentences("Um. Dois. Trê");
        assert_eq!(sentences, vec!["Um.", "Dois."]);
        assert_eq!(rest, " Trê");
    }

    #[test]
    fn multibyte_terminal_boundary() {
        let (sentences, rest) = split_sentences("Olá! çafé");
        assert_eq!(sentences, vec!["Olá!"]);
        assert_eq!(rest, " çafé");
    }
}
