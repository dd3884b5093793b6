//! Command handler
//!
//! Matches recognized text against configured command phrases and answers
//! without involving the language model. Built-in commands are checked in a
//! fixed order before any custom command, so custom handlers can extend the
//! vocabulary but never shadow a built-in.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use chrono::NaiveDateTime;
use regex::Regex;

use crate::Result;
use crate::config::CommandsConfig;
use crate::utils::clean_text;

/// Location at the end of a weather question ("... in Paris?")
static LOCATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bin|\bat|\bfor)\s+([a-z][a-z\s]*?)\s*[?.!]*$").expect("valid regex")
});

/// Prefix marking a command phrase as a regular expression
const REGEX_PREFIX: &str = "re:";

/// Reply to an exit command
pub const GOODBYE: &str = "Goodbye!";

/// Response-producing function for a custom command
pub type CustomHandler = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Source of the current local time
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Command kind tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Ends the session
    Exit,
    /// Current time
    Time,
    /// Current date
    Date,
    /// Weather report
    Weather,
    /// Lists the known commands
    Help,
    /// Registered at runtime
    Custom(String),
}

impl CommandKind {
    /// Built-in kinds in priority order (exit is matched separately)
    pub const BUILTIN: [Self; 4] = [Self::Time, Self::Date, Self::Weather, Self::Help];

    /// Parse a configuration tag
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "exit" => Self::Exit,
            "time" => Self::Time,
            "date" => Self::Date,
            "weather" => Self::Weather,
            "help" => Self::Help,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Configuration tag
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::Exit => "exit",
            Self::Time => "time",
            Self::Date => "date",
            Self::Weather => "weather",
            Self::Help => "help",
            Self::Custom(tag) => tag,
        }
    }

    /// Whether this kind is built in
    #[must_use]
    pub const fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Result of a matched command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    /// Which command matched
    pub kind: CommandKind,
    /// Text to speak
    pub text: String,
}

impl CommandResponse {
    /// Whether this response ends the session
    #[must_use]
    pub fn ends_session(&self) -> bool {
        self.kind == CommandKind::Exit
    }
}

/// Single trigger rule
#[derive(Debug, Clone)]
enum MatchRule {
    /// Lowercase phrase matched as a substring
    Phrase(String),
    /// Case-insensitive regular expression
    Pattern(Regex),
}

impl MatchRule {
    /// Parse a configured phrase; invalid regexes are logged and skipped
    fn parse(raw: &str) -> Option<Self> {
        if let Some(pattern) = raw.strip_prefix(REGEX_PREFIX) {
            return match Regex::new(&format!("(?i){pattern}")) {
                Ok(regex) => Some(Self::Pattern(regex)),
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "invalid command pattern, skipping");
                    None
                }
            };
        }

        let phrase = clean_text(raw).to_lowercase();
        if phrase.is_empty() {
            None
        } else {
            Some(Self::Phrase(phrase))
        }
    }

    fn matches(&self, lowercase_input: &str) -> bool {
        match self {
            Self::Phrase(phrase) => lowercase_input.contains(phrase.as_str()),
            Self::Pattern(regex) => regex.is_match(lowercase_input),
        }
    }
}

/// A command kind with its trigger rules and, for custom kinds, its handler
#[derive(Clone)]
pub struct CommandPattern {
    kind: CommandKind,
    phrases: Vec<String>,
    rules: Vec<MatchRule>,
    handler: Option<CustomHandler>,
}

impl CommandPattern {
    fn new(kind: CommandKind, phrases: &[String], handler: Option<CustomHandler>) -> Self {
        Self {
            kind,
            phrases: phrases.to_vec(),
            rules: phrases.iter().filter_map(|p| MatchRule::parse(p)).collect(),
            handler,
        }
    }

    /// Kind of this pattern
    #[must_use]
    pub const fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// Configured trigger phrases
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    fn matches(&self, lowercase_input: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(lowercase_input))
    }
}

impl fmt::Debug for CommandPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandPattern")
            .field("kind", &self.kind)
            .field("phrases", &self.phrases)
            .field("custom", &self.handler.is_some())
            .finish()
    }
}

/// Dispatches recognized text to built-in and custom commands
pub struct CommandHandler {
    exit_phrases: Vec<String>,
    builtins: Vec<CommandPattern>,
    custom: Vec<CommandPattern>,
    configured_custom: BTreeMap<String, Vec<String>>,
    clock: Clock,
}

impl CommandHandler {
    /// Create a handler from the configured command templates
    #[must_use]
    pub fn new(config: &CommandsConfig) -> Self {
        let exit_phrases = config
            .exit_commands
            .iter()
            .map(|p| normalize_exit(p))
            .filter(|p| !p.is_empty())
            .collect();

        let builtins = CommandKind::BUILTIN
            .into_iter()
            .map(|kind| {
                let phrases = config
                    .custom_commands
                    .get(kind.tag())
                    .cloned()
                    .unwrap_or_default();
                CommandPattern::new(kind, &phrases, None)
            })
            .collect();

        let configured_custom = config
            .custom_commands
            .iter()
            .filter(|(tag, _)| !CommandKind::from_tag(tag).is_builtin())
            .map(|(tag, phrases)| (tag.trim().to_lowercase(), phrases.clone()))
            .collect();

        tracing::info!("command handler initialized");

        Self {
            exit_phrases,
            builtins,
            custom: Vec::new(),
            configured_custom,
            clock: Arc::new(|| chrono::Local::now().naive_local()),
        }
    }

    /// Replace the clock used by the time and date commands
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Register a handler for a custom kind listed in `commands.custom_commands`
    ///
    /// Returns false when the kind has no configured phrases or names a
    /// built-in command.
    pub fn add_custom_command_handler(&mut self, kind: &str, handler: CustomHandler) -> bool {
        let tag = kind.trim().to_lowercase();
        let Some(phrases) = self.configured_custom.get(&tag).cloned() else {
            tracing::warn!(kind, "command type not found in configuration");
            return false;
        };

        self.register_command(&tag, &phrases, handler)
    }

    /// Register a custom command with explicit trigger phrases
    ///
    /// Custom commands are checked after every built-in, in registration
    /// order. Returns false when `kind` names a built-in command.
    pub fn register_command(
        &mut self,
        kind: &str,
        phrases: &[String],
        handler: CustomHandler,
    ) -> bool {
        let kind = CommandKind::from_tag(kind);
        if kind.is_builtin() {
            tracing::warn!(%kind, "cannot register a custom handler for a built-in command");
            return false;
        }

        let pattern = CommandPattern::new(kind.clone(), phrases, Some(handler));
        if pattern.rules.is_empty() {
            tracing::warn!(%kind, "custom command has no usable phrases");
            return false;
        }

        if let Some(existing) = self.custom.iter_mut().find(|p| p.kind == kind) {
            *existing = pattern;
        } else {
            self.custom.push(pattern);
        }

        tracing::info!(%kind, "added custom command handler");
        true
    }

    /// Registered patterns in match order
    pub fn patterns(&self) -> impl Iterator<Item = &CommandPattern> {
        self.builtins.iter().chain(self.custom.iter())
    }

    /// Try to answer `text` as a command
    ///
    /// Returns `None` when no command matches, or when a custom handler
    /// fails; the caller then falls through to the language model.
    #[must_use]
    pub fn try_handle(&self, text: &str) -> Option<CommandResponse> {
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return None;
        }

        if self.exit_phrases.contains(&normalize_exit(&cleaned)) {
            return Some(CommandResponse {
                kind: CommandKind::Exit,
                text: GOODBYE.to_string(),
            });
        }

        let lowercase = cleaned.to_lowercase();
        let pattern = self.patterns().find(|p| p.matches(&lowercase))?;
        tracing::info!(kind = %pattern.kind, "detected command");

        let text = match (&pattern.kind, &pattern.handler) {
            (CommandKind::Time, _) => self.time_response(),
            (CommandKind::Date, _) => self.date_response(),
            (CommandKind::Weather, _) => weather_response(&cleaned),
            (CommandKind::Help, _) => self.help_response(),
            (_, Some(handler)) => match handler(&cleaned) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(kind = %pattern.kind, error = %e, "custom command failed");
                    return None;
                }
            },
            (kind, None) => {
                tracing::warn!(%kind, "command has no handler");
                return None;
            }
        };

        Some(CommandResponse {
            kind: pattern.kind.clone(),
            text,
        })
    }

    fn time_response(&self) -> String {
        let now = (self.clock)();
        format!("The current time is {}.", now.format("%I:%M %p"))
    }

    fn date_response(&self) -> String {
        let now = (self.clock)();
        format!("Today is {}.", now.format("%A, %B %d, %Y"))
    }

    fn help_response(&self) -> String {
        let mut help = String::from("Here are the commands I understand:\n");

        for pattern in self.patterns().filter(|p| !p.phrases().is_empty()) {
            let label = match pattern.kind() {
                CommandKind::Time => "Ask for the time".to_string(),
                CommandKind::Date => "Ask for the date".to_string(),
                CommandKind::Weather => "Ask for weather".to_string(),
                CommandKind::Help => "Ask for help".to_string(),
                kind => format!("Custom command '{kind}'"),
            };
            help.push_str(&format!("- {label}: {}\n", pattern.phrases().join(", ")));
        }

        help.push_str(&format!("- Exit commands: {}\n", self.exit_phrases.join(", ")));
        help
    }
}

/// Placeholder weather answer for the location named in `command`
fn weather_response(command: &str) -> String {
    let location = LOCATION_REGEX
        .captures(command)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "your location".to_string());

    format!(
        "I can't check the weather in {location} right now. \
         No weather service is configured; register a custom command to add one."
    )
}

fn normalize_exit(text: &str) -> String {
    clean_text(text)
        .to_lowercase()
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .to_string()
}
