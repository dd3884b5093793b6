//! Wake word detection
//!
//! Detection runs on transcripts: the wake word is a case-insensitive
//! substring of the recognized text. The rest of the transcript is the query.

use regex::Regex;

use crate::{Error, Result};

/// Characters dropped between the wake word and the query
const SEPARATORS: &[char] = &[',', '.', '!', '?', ':', ';', '-'];

/// Detects a wake word in recognized text
#[derive(Debug, Clone)]
pub struct WakeWordDetector {
    wake_word: String,
    pattern: Regex,
}

impl WakeWordDetector {
    /// Create a detector for `wake_word` (e.g. "jarvis")
    ///
    /// # Errors
    ///
    /// Returns error if the wake word is empty
    pub fn new(wake_word: &str) -> Result<Self> {
        let normalized = wake_word.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(Error::Config("wake word must not be empty".to_string()));
        }

        let pattern = Regex::new(&format!("(?i){}", regex::escape(&normalized)))
            .map_err(|e| Error::Config(format!("invalid wake word: {e}")))?;

        tracing::debug!(wake_word = %normalized, "wake word detector initialized");

        Ok(Self {
            wake_word: normalized,
            pattern,
        })
    }

    /// Check if transcribed text contains the wake word
    #[must_use]
    pub fn check_wake_word(&self, transcript: &str) -> bool {
        let found = self.pattern.is_match(transcript);
        if found {
            tracing::info!(wake_word = %self.wake_word, transcript, "wake word detected");
        }
        found
    }

    /// The transcript with the wake word and the punctuation around it removed
    ///
    /// Text on both sides is kept, so "What time is it, Jarvis?" yields
    /// "What time is it". Returns the whole transcript trimmed when the wake
    /// word is absent.
    #[must_use]
    pub fn extract_command(&self, transcript: &str) -> String {
        let Some(m) = self.pattern.find(transcript) else {
            return transcript.trim().to_string();
        };

        let is_separator = |c: char| c.is_whitespace() || SEPARATORS.contains(&c);
        let before = transcript[..m.start()].trim_end_matches(is_separator).trim_start();
        let after = transcript[m.end()..].trim_start_matches(is_separator).trim_end();

        match (before.is_empty(), after.is_empty()) {
            (true, _) => after.to_string(),
            (false, true) => before.to_string(),
            (false, false) => format!("{before} {after}"),
        }
    }

    /// The configured wake word (lowercase)
    #[must_use]
    pub fn wake_word(&self) -> &str {
        &self.wake_word
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_word_detection() {
        let detector = WakeWordDetector::new("jarvis").unwrap();

        assert!(!detector.check_wake_word("hello world"));
        assert!(detector.check_wake_word("Jarvis, what's up?"));
    }

    #[test]
    fn test_extract_command() {
        let detector = WakeWordDetector::new("hey orin").unwrap();
        assert_eq!(
            detector.extract_command("Hey Orin, what's the weather?"),
            "what's the weather?"
        );
        assert_eq!(detector.extract_command("Hey Orin"), "");
        assert_eq!(detector.extract_command("Hey Orin..."), "");
    }

    #[test]
    fn test_extract_command_trailing_wake_word() {
        let detector = WakeWordDetector::new("jarvis").unwrap();
        assert_eq!(detector.extract_command("Tell me a joke, Jarvis"), "Tell me a joke");
        assert_eq!(
            detector.extract_command("What time is it, Jarvis?"),
            "What time is it"
        );
        assert_eq!(
            detector.extract_command("so Jarvis, what's the date"),
            "so what's the date"
        );
    }

    #[test]
    fn test_empty_wake_word_rejected() {
        assert!(WakeWordDetector::new("   ").is_err());
    }
}
