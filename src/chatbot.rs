//! Conversation orchestrator
//!
//! Owns the turn loop: wait for the wake word, capture a query, answer it
//! with a command or the language model, then speak the answer. Turns run
//! strictly one after another and nothing inside a turn is fatal.

use std::path::PathBuf;

use crate::commands::{CommandHandler, CustomHandler};
use crate::config::Config;
use crate::model::{APOLOGY, ConversationHistory, LanguageModel};
use crate::translation::{Translation, base_code};
use crate::utils::{Transcript, transcript_path};
use crate::voice::{Heard, SpeechInput, SpeechOutput, WakeWordDetector};
use crate::{Error, Result};

/// Prompt spoken when the wake word arrives without a query
pub const LISTENING_PROMPT: &str = "I'm listening";

/// Reply when speech could not be recognized
pub const NOT_UNDERSTOOD: &str = "Sorry, I didn't catch that.";

/// Directory for saved conversations when none is configured
const DEFAULT_CONVERSATION_DIR: &str = "conversations";

/// Where the orchestrator is in a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    /// Waiting for the wake word
    Idle,
    /// Capturing the query
    Listening,
    /// Answering with a matched command
    Command,
    /// Answering with the language model
    Generating,
    /// Playing the answer
    Speaking,
}

/// Everything known about one turn
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    /// Captured audio, when the query came from a microphone
    pub raw_audio: Option<Vec<f32>>,
    /// Query text with the wake word removed
    pub recognized_text: String,
    /// Language the user spoke
    pub detected_language: String,
    /// Whether a command answered the query
    pub is_command: bool,
    /// Answer in the user's language
    pub response_text: String,
    /// Whether the answer ends the session
    pub ends_session: bool,
}

/// What the loop should do after a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Wait for the next turn
    Continue,
    /// Stop the loop
    Exit,
}

/// The voice assistant
pub struct Chatbot {
    input: Box<dyn SpeechInput>,
    output: Box<dyn SpeechOutput>,
    model: Box<dyn LanguageModel>,
    translation: Translation,
    commands: CommandHandler,
    wake_word: WakeWordDetector,
    history: ConversationHistory,
    transcript: Transcript,
    transcript_path: Option<PathBuf>,
    auto_detect: bool,
    default_language: String,
    state: ChatState,
}

impl Chatbot {
    /// Assemble an assistant from its stages
    ///
    /// # Errors
    ///
    /// Returns error if the configured wake word is unusable
    pub fn new(
        config: &Config,
        input: Box<dyn SpeechInput>,
        output: Box<dyn SpeechOutput>,
        model: Box<dyn LanguageModel>,
        translation: Translation,
    ) -> Result<Self> {
        let wake_word = WakeWordDetector::new(&config.wake_word)?;

        let transcript_path = config.logging.save_conversations.then(|| {
            let dir = config
                .logging
                .conversation_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONVERSATION_DIR));
            transcript_path(&dir)
        });

        tracing::info!(
            wake_word = %wake_word.wake_word(),
            model = model.name(),
            translation = translation.is_enabled(),
            "chatbot initialized"
        );

        Ok(Self {
            input,
            output,
            model,
            translation,
            commands: CommandHandler::new(&config.commands),
            wake_word,
            history: ConversationHistory::from_config(&config.model),
            transcript: Transcript::new(),
            transcript_path,
            auto_detect: config.language.auto_detect,
            default_language: base_code(&config.language.default),
            state: ChatState::Idle,
        })
    }

    /// Use a specific command handler (e.g. with a fixed clock)
    #[must_use]
    pub fn with_commands(mut self, commands: CommandHandler) -> Self {
        self.commands = commands;
        self
    }

    /// Save the conversation to `path` when the loop ends
    #[must_use]
    pub fn with_transcript_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.transcript_path = path;
        }
        self
    }

    /// Register a handler for a custom command kind listed in configuration
    pub fn add_custom_command_handler(&mut self, kind: &str, handler: CustomHandler) -> bool {
        self.commands.add_custom_command_handler(kind, handler)
    }

    /// The command handler, for registering commands with explicit phrases
    pub fn commands_mut(&mut self) -> &mut CommandHandler {
        &mut self.commands
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> ChatState {
        self.state
    }

    /// Exchanges recorded so far
    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Feed recognized text while idle
    ///
    /// When it contains the wake word the assistant starts listening and
    /// the text after the wake word is returned (possibly empty).
    /// Otherwise nothing changes.
    pub fn observe_wake(&mut self, text: &str) -> Option<String> {
        if self.state != ChatState::Idle || !self.wake_word.check_wake_word(text) {
            return None;
        }
        Some(self.wake(text))
    }

    fn wake(&mut self, text: &str) -> String {
        self.state = ChatState::Listening;
        self.wake_word.extract_command(text)
    }

    /// Answer a query with a command or the language model
    pub async fn process_input(&mut self, heard: Heard) -> ConversationTurn {
        let text = heard.text.trim().to_string();
        let reported = heard.language.as_deref().map(base_code);

        tracing::info!(query = %text, language = ?reported, "processing input");

        if let Some(response) = self.commands.try_handle(&text) {
            self.state = ChatState::Command;
            return ConversationTurn {
                raw_audio: heard.audio,
                recognized_text: text,
                detected_language: reported.unwrap_or_else(|| self.default_language.clone()),
                is_command: true,
                ends_session: response.ends_session(),
                response_text: response.text,
            };
        }

        self.state = ChatState::Generating;
        let language = match reported {
            Some(code) => code,
            None if self.auto_detect => self.translation.detect_language(&text).await,
            None => self.default_language.clone(),
        };
        let pivot = self.translation.to_pivot(&text, &language).await;

        let reply = {
            let context = self.history.context_for(&pivot);
            self.model.generate(&context, &pivot).await
        };
        let reply = match reply {
            Ok(reply) => {
                self.history.push(pivot, reply.clone());
                reply
            }
            Err(e) => {
                tracing::error!(error = %e, "error generating response");
                APOLOGY.to_string()
            }
        };

        let response_text = self.translation.from_pivot(&reply, &language).await;

        ConversationTurn {
            raw_audio: heard.audio,
            recognized_text: text,
            detected_language: language,
            is_command: false,
            response_text,
            ends_session: false,
        }
    }

    /// Print, record and speak a turn's answer
    pub async fn respond(&mut self, turn: &ConversationTurn) {
        self.state = ChatState::Speaking;
        println!("Bot: {}", turn.response_text);
        self.transcript
            .record(&turn.recognized_text, &turn.response_text);
        self.say(&turn.response_text, &turn.detected_language).await;
        self.state = ChatState::Idle;
    }

    async fn say(&mut self, text: &str, language: &str) {
        if let Err(e) = self.output.speak(text, language).await {
            tracing::error!(error = %e, "error speaking");
        }
        self.input.discard_pending();
    }

    /// Capture the query, or `None` when nothing usable was heard
    async fn listen_for_query(&mut self) -> Result<Option<Heard>> {
        self.state = ChatState::Listening;
        match self.input.listen().await {
            Ok(heard) => Ok(Some(heard)),
            Err(Error::InputClosed) => Err(Error::InputClosed),
            Err(Error::NoSpeech) => {
                tracing::debug!("no speech detected");
                Ok(None)
            }
            Err(e) if e.is_recognition() => {
                tracing::warn!(error = %e, "could not recognize query");
                let language = self.default_language.clone();
                self.say(NOT_UNDERSTOOD, &language).await;
                Ok(None)
            }
            Err(e) => {
                tracing::error!(error = %e, "error listening");
                Ok(None)
            }
        }
    }

    /// Wait for the wake word and return the query spoken with it, if any
    async fn wait_for_wake(&mut self) -> Result<Option<Heard>> {
        match self.input.listen_for_wake_word(&self.wake_word).await {
            Ok(Some(heard)) => self.accept_wake(heard).await,
            Ok(None) => Ok(None),
            Err(Error::InputClosed) => Err(Error::InputClosed),
            Err(e) => {
                tracing::trace!(error = %e, "nothing usable while idle");
                Ok(None)
            }
        }
    }

    /// Strip the wake word from `heard`, prompting for the query when
    /// nothing else was said
    async fn accept_wake(&mut self, heard: Heard) -> Result<Option<Heard>> {
        let command = self.wake(&heard.text);
        if command.is_empty() {
            let language = self.default_language.clone();
            self.say(LISTENING_PROMPT, &language).await;
            return self.listen_for_query().await;
        }
        Ok(Some(Heard {
            text: command,
            ..heard
        }))
    }

    /// Capture a query directly, dropping a wake word if one was included
    async fn listen_direct(&mut self) -> Result<Option<Heard>> {
        match self.listen_for_query().await? {
            Some(heard) if self.wake_word.check_wake_word(&heard.text) => {
                self.accept_wake(heard).await
            }
            other => Ok(other),
        }
    }

    /// Run one turn
    pub async fn run_turn(&mut self) -> TurnOutcome {
        self.state = ChatState::Idle;

        let query = if self.input.requires_wake_word() {
            self.wait_for_wake().await
        } else {
            self.listen_direct().await
        };

        let heard = match query {
            Ok(Some(heard)) => heard,
            Ok(None) => {
                self.state = ChatState::Idle;
                return TurnOutcome::Continue;
            }
            Err(_) => {
                tracing::info!("input closed");
                self.state = ChatState::Idle;
                return TurnOutcome::Exit;
            }
        };

        let turn = self.process_input(heard).await;
        self.respond(&turn).await;

        if turn.ends_session {
            TurnOutcome::Exit
        } else {
            TurnOutcome::Continue
        }
    }

    /// Run turns until an exit command, end of input, or Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the conversation transcript cannot be saved
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(wake_word = %self.wake_word.wake_word(), "assistant running");

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("interrupted, shutting down");
                    break;
                }
                outcome = self.run_turn() => {
                    if outcome == TurnOutcome::Exit {
                        break;
                    }
                }
            }
        }

        self.finish()
    }

    /// Save the transcript if requested
    ///
    /// # Errors
    ///
    /// Returns error if the transcript cannot be written
    pub fn finish(&self) -> Result<()> {
        match &self.transcript_path {
            Some(path) if !self.transcript.is_empty() => self.transcript.save(path),
            _ => Ok(()),
        }
    }
}
