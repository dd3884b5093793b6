//! Conversational language model
//!
//! The assistant talks to any server exposing an OpenAI-compatible
//! `/chat/completions` endpoint. Context is a rolling window of recent
//! exchanges, trimmed to both an exchange count and a rough token budget.

use std::collections::VecDeque;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::{Error, Result};

/// Static reply used when generation fails
pub const APOLOGY: &str = "Sorry, I couldn't come up with a response.";

/// One user/assistant exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// What the user said (pivot language)
    pub user: String,
    /// What the model replied (pivot language)
    pub assistant: String,
}

impl Exchange {
    fn tokens(&self) -> usize {
        count_tokens(&self.user) + count_tokens(&self.assistant)
    }
}

/// Approximate token count (whitespace-separated words)
#[must_use]
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Bounded recent-history buffer used to prime the model
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    exchanges: VecDeque<Exchange>,
    max_exchanges: usize,
    max_tokens: usize,
}

impl ConversationHistory {
    /// Create an empty history
    #[must_use]
    pub fn new(max_exchanges: usize, max_tokens: usize) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(max_exchanges),
            max_exchanges,
            max_tokens,
        }
    }

    /// Create from model configuration
    #[must_use]
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.max_history, config.max_context_tokens)
    }

    /// Record an exchange, evicting the oldest beyond the limit
    pub fn push(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        if self.max_exchanges == 0 {
            return;
        }
        while self.exchanges.len() >= self.max_exchanges {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(Exchange {
            user: user.into(),
            assistant: assistant.into(),
        });
    }

    /// Most recent exchanges that fit alongside `input` in the token budget
    ///
    /// Oldest exchanges are dropped first. Returned oldest to newest.
    #[must_use]
    pub fn context_for(&self, input: &str) -> Vec<&Exchange> {
        let mut budget = self.max_tokens.saturating_sub(count_tokens(input));
        let mut kept = Vec::new();

        for exchange in self.exchanges.iter().rev() {
            let tokens = exchange.tokens();
            if tokens > budget {
                break;
            }
            budget -= tokens;
            kept.push(exchange);
        }

        kept.reverse();
        kept
    }

    /// Number of stored exchanges
    #[must_use]
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Whether no exchanges are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

/// A conversational model that replies to user input
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a reply to `input` given the prior exchanges
    async fn generate(&self, history: &[&Exchange], input: &str) -> Result<String>;

    /// Model name for logs
    fn name(&self) -> &str;
}

/// OpenAI-compatible chat completions client
pub struct ChatModel {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

impl ChatModel {
    /// Create a client from model configuration
    #[must_use]
    pub fn new(config: &ModelConfig, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.name.clone(),
            max_tokens: config.max_length,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for ChatModel {
    async fn generate(&self, history: &[&Exchange], input: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() * 2 + 1);
        for exchange in history {
            messages.push(ChatMessage {
                role: "user",
                content: &exchange.user,
            });
            messages.push(ChatMessage {
                role: "assistant",
                content: &exchange.assistant,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: input,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        };

        tracing::debug!(
            model = %self.model,
            context = history.len(),
            "requesting completion"
        );

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Model(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("API error {status}: {body}")));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Model(format!("failed to parse response: {e}")))?;

        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if reply.is_empty() {
            return Err(Error::Model("empty completion".to_string()));
        }

        Ok(reply)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = ConversationHistory::new(2, 1024);
        history.push("one", "1");
        history.push("two", "2");
        history.push("three", "3");

        assert_eq!(history.len(), 2);
        let context = history.context_for("next");
        assert_eq!(context[0].user, "two");
        assert_eq!(context[1].user, "three");
    }

    #[test]
    fn test_context_respects_token_budget() {
        let mut history = ConversationHistory::new(5, 10);
        history.push("a b c", "d e f");
        history.push("g h", "i j");

        // 2 tokens of input leaves 8: only the newest exchange (4) fits
        // before the older one (6) would overflow
        let context = history.context_for("k l");
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].user, "g h");

        let context = history.context_for("");
        assert_eq!(context.len(), 2);
    }

    #[test]
    fn test_zero_history_keeps_nothing() {
        let mut history = ConversationHistory::new(0, 1024);
        history.push("hello", "hi");
        assert!(history.is_empty());
    }

    #[test]
    fn test_count_tokens() {
        assert_eq!(count_tokens("  tell me   a joke "), 4);
        assert_eq!(count_tokens(""), 0);
    }
}
