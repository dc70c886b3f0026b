//! Sentence segmentation for streaming LLM output
//!
//! Token deltas arrive in arbitrary fragments; synthesis wants whole
//! sentences. The segmenter buffers deltas and emits a sentence whenever a
//! terminator run completes, so the first sentence reaches TTS while the
//! rest of the response is still streaming.

use once_cell::sync::Lazy;
use regex::Regex;

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '?' | '!' | '\n')
}

/// Buffers streaming text and yields complete sentences
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return any sentences completed by it.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);

        let mut sentences = Vec::new();
        while let Some(idx) = self.buffer.find(is_terminator) {
            // Swallow a run of terminators ("...", "?!") as one boundary
            let mut end = idx + 1;
            for c in self.buffer[end..].chars() {
                if is_terminator(c) {
                    end += c.len_utf8();
                } else {
                    break;
                }
            }

            let rest = self.buffer.split_off(end);
            let sentence = std::mem::replace(&mut self.buffer, rest);
            let trimmed = sentence.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
        }
        sentences
    }

    /// Drain whatever remains after the stream ends.
    pub fn flush(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buffer);
        let trimmed = tail.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

static UNSPEAKABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[*_`#~\x{1F300}-\x{1FAFF}\x{2600}-\x{27BF}\x{FE0F}\x{200D}]")
        .expect("sanitizer pattern is valid")
});

/// Strip markdown markers and emoji that synthesis would read aloud.
pub fn sanitize_for_speech(text: &str) -> String {
    let cleaned = UNSPEAKABLE.replace_all(text, "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentences_emitted_at_boundaries() {
        let mut seg = SentenceSegmenter::new();
        assert!(seg.push("Hello the").is_empty());
        assert_eq!(seg.push("re. How are").as_slice(), ["Hello there."]);
        assert_eq!(seg.push(" you? I").as_slice(), ["How are you?"]);
        assert_eq!(seg.flush().as_deref(), Some("I"));
    }

    #[test]
    fn test_terminator_runs_collapse() {
        let mut seg = SentenceSegmenter::new();
        let sentences = seg.push("Wait... really?! Yes");
        assert_eq!(sentences.as_slice(), ["Wait...", "really?!"]);
        assert_eq!(seg.flush().as_deref(), Some("Yes"));
    }

    #[test]
    fn test_newline_is_a_boundary() {
        let mut seg = SentenceSegmenter::new();
        assert_eq!(seg.push("First line\nsecond").as_slice(), ["First line"]);
    }

    #[test]
    fn test_flush_empty_buffer() {
        let mut seg = SentenceSegmenter::new();
        assert!(seg.flush().is_none());
        seg.push("   ");
        assert!(seg.flush().is_none());
    }

    #[test]
    fn test_sanitize_strips_markup_and_emoji() {
        assert_eq!(sanitize_for_speech("**Sure!** Here you go \u{1F600}"), "Sure! Here you go");
        assert_eq!(sanitize_for_speech("`code` and _emphasis_"), "code and emphasis");
        assert_eq!(sanitize_for_speech("  spaced   out  "), "spaced out");
    }
}
