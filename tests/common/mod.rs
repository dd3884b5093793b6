//! Shared test utilities

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use polyglot::voice::{Heard, SpeechInput, SpeechOutput, WakeWordDetector};
use polyglot::{Error, Exchange, LanguageModel, Result, Translator};

/// 2024-03-05 21:07, a Tuesday
#[must_use]
pub fn fixed_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5)
        .and_then(|d| d.and_hms_opt(21, 7, 0))
        .expect("valid date")
}

/// Input that replays a fixed script, then reports end of input
pub struct ScriptedInput {
    script: VecDeque<Result<Heard>>,
    wake_required: bool,
}

impl ScriptedInput {
    /// Spoken input: queries need the wake word
    pub fn voice(script: Vec<Result<Heard>>) -> Self {
        Self {
            script: script.into(),
            wake_required: true,
        }
    }

    /// Typed input: no wake word
    pub fn typed(lines: &[&str]) -> Self {
        Self {
            script: lines.iter().map(|l| Ok(Heard::text(*l))).collect(),
            wake_required: false,
        }
    }

    fn next(&mut self) -> Result<Heard> {
        self.script.pop_front().unwrap_or(Err(Error::InputClosed))
    }
}

#[async_trait(?Send)]
impl SpeechInput for ScriptedInput {
    async fn listen(&mut self) -> Result<Heard> {
        self.next()
    }

    async fn listen_for_wake_word(
        &mut self,
        wake_word: &WakeWordDetector,
    ) -> Result<Option<Heard>> {
        let heard = self.next()?;
        Ok(wake_word.check_wake_word(&heard.text).then_some(heard))
    }

    fn requires_wake_word(&self) -> bool {
        self.wake_required
    }
}

/// Output that records `(text, language)` of everything spoken
#[derive(Clone, Default)]
pub struct RecordingOutput {
    pub spoken: Rc<RefCell<Vec<(String, String)>>>,
}

impl RecordingOutput {
    pub fn texts(&self) -> Vec<String> {
        self.spoken.borrow().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait(?Send)]
impl SpeechOutput for RecordingOutput {
    async fn speak(&mut self, text: &str, language: &str) -> Result<()> {
        self.spoken
            .borrow_mut()
            .push((text.to_string(), language.to_string()));
        Ok(())
    }
}

/// Output whose speaker is broken
pub struct BrokenOutput;

#[async_trait(?Send)]
impl SpeechOutput for BrokenOutput {
    async fn speak(&mut self, _text: &str, _language: &str) -> Result<()> {
        Err(Error::Synthesis("no output device".to_string()))
    }
}

/// Model that answers with a fixed reply and records its inputs
#[derive(Clone)]
pub struct RecordingModel {
    pub reply: String,
    /// `(input, number of history exchanges)` per call
    pub calls: Arc<Mutex<Vec<(String, usize)>>>,
}

impl RecordingModel {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(input, _)| input.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for RecordingModel {
    async fn generate(&self, history: &[&Exchange], input: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((input.to_string(), history.len()));
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Model whose server is down
pub struct DownModel;

#[async_trait]
impl LanguageModel for DownModel {
    async fn generate(&self, _history: &[&Exchange], _input: &str) -> Result<String> {
        Err(Error::Model("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "down"
    }
}

/// Translator backed by a phrase table
pub struct PhraseBook {
    phrases: HashMap<String, String>,
    language: String,
    /// Number of language detections requested
    pub detections: Arc<AtomicUsize>,
}

impl PhraseBook {
    pub fn new(language: &str, pairs: &[(&str, &str)]) -> Self {
        let mut phrases = HashMap::new();
        for (a, b) in pairs {
            phrases.insert((*a).to_string(), (*b).to_string());
            phrases.insert((*b).to_string(), (*a).to_string());
        }
        Self {
            phrases,
            language: language.to_string(),
            detections: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Translator for PhraseBook {
    async fn detect(&self, _text: &str) -> Result<String> {
        self.detections.fetch_add(1, Ordering::SeqCst);
        Ok(self.language.clone())
    }

    async fn translate(&self, text: &str, _source: &str, _target: &str) -> Result<String> {
        self.phrases
            .get(text)
            .cloned()
            .ok_or_else(|| Error::Translation(format!("no entry for {text}")))
    }

    fn name(&self) -> &'static str {
        "phrasebook"
    }
}
