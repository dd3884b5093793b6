//! Small text and transcript helpers

use std::path::{Path, PathBuf};

use crate::Result;

/// Collapse runs of whitespace and trim
#[must_use]
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Current local timestamp formatted for file names (`YYYY-MM-DD_HH-MM-SS`)
#[must_use]
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Default transcript path inside `dir`: `conversation_<timestamp>.txt`
#[must_use]
pub fn transcript_path(dir: &Path) -> PathBuf {
    dir.join(format!("conversation_{}.txt", timestamp()))
}

/// Record of the user/bot exchanges of one session
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    exchanges: Vec<(String, String)>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub const fn new() -> Self {
        Self {
            exchanges: Vec::new(),
        }
    }

    /// Append one exchange
    pub fn record(&mut self, user: &str, bot: &str) {
        self.exchanges.push((user.to_string(), bot.to_string()));
    }

    /// Number of recorded exchanges
    #[must_use]
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Render as alternating `User:` / `Bot:` lines
    #[must_use]
    pub fn render(&self) -> String {
        self.exchanges
            .iter()
            .map(|(user, bot)| format!("User: {user}\nBot: {bot}\n"))
            .collect()
    }

    /// Write the transcript, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render())?;
        tracing::info!(path = %path.display(), exchanges = self.len(), "saved conversation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  what   time\tis it \n"), "what time is it");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = timestamp();
        assert_eq!(ts.len(), 19);
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "_");
    }

    #[test]
    fn test_transcript_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("chat.txt");

        let mut transcript = Transcript::new();
        transcript.record("hello", "Hi there!");
        transcript.record("what time is it", "The current time is 09:15 AM.");
        transcript.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "User: hello\nBot: Hi there!\nUser: what time is it\nBot: The current time is 09:15 AM.\n"
        );
    }
}
