//! Translation between the user's language and the model's pivot language
//!
//! Backends implement [`Translator`] and report failures as
//! [`Error::Translation`](crate::Error::Translation). [`Translation`] wraps a
//! backend with the assistant's policy: a failed translation passes the
//! original text through unchanged instead of aborting the turn.

mod google;
mod languages;
mod libre;

use async_trait::async_trait;

pub use google::GoogleTranslator;
pub use languages::{LANGUAGES, base_code, is_known_code, language_code, language_name};
pub use libre::LibreTranslator;

use crate::Result;
use crate::config::Config;

/// Language the conversational model works in
pub const PIVOT_LANGUAGE: &str = "en";

/// A translation service backend
#[async_trait]
pub trait Translator: Send + Sync {
    /// Detect the language code of `text`
    async fn detect(&self, text: &str) -> Result<String>;

    /// Translate `text` from `source` to `target`
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Best-effort translation to and from the pivot language
pub struct Translation {
    backend: Option<Box<dyn Translator>>,
    default_language: String,
}

impl Translation {
    /// Wrap a backend
    #[must_use]
    pub fn new(backend: Box<dyn Translator>, default_language: &str) -> Self {
        tracing::info!(
            backend = backend.name(),
            default_language,
            "translator initialized"
        );
        Self {
            backend: Some(backend),
            default_language: base_code(default_language),
        }
    }

    /// Translation that always passes text through
    #[must_use]
    pub fn disabled(default_language: &str) -> Self {
        Self {
            backend: None,
            default_language: base_code(default_language),
        }
    }

    /// Build from configuration
    ///
    /// Falls back to pass-through when translation is disabled or the
    /// selected backend has no credentials.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let language = &config.language;
        if !language.translation_enabled {
            tracing::info!("translation disabled");
            return Self::disabled(&language.default);
        }

        let url = language.translation_url.clone();
        let backend: Option<Box<dyn Translator>> =
            match language.translation_provider.to_lowercase().as_str() {
                "libretranslate" | "libre" => Some(Box::new(LibreTranslator::new(
                    url,
                    config.api_keys.libretranslate.clone(),
                ))),
                "google" => match &config.api_keys.google_translate {
                    Some(key) => Some(Box::new(GoogleTranslator::new(key.clone(), url))),
                    None => {
                        tracing::warn!(
                            "GOOGLE_TRANSLATE_API_KEY not set, translation will pass text through"
                        );
                        None
                    }
                },
                other => {
                    tracing::warn!(provider = other, "unknown translation provider");
                    None
                }
            };

        backend.map_or_else(
            || Self::disabled(&language.default),
            |b| Self::new(b, &language.default),
        )
    }

    /// Whether a backend is configured
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Detect the language of `text`, falling back to the default language
    pub async fn detect_language(&self, text: &str) -> String {
        let Some(backend) = &self.backend else {
            return self.default_language.clone();
        };

        if text.trim().is_empty() {
            return self.default_language.clone();
        }

        match backend.detect(text).await {
            Ok(code) => {
                let code = base_code(&code);
                tracing::debug!(language = %code, "detected language");
                code
            }
            Err(e) => {
                tracing::error!(error = %e, "error detecting language");
                self.default_language.clone()
            }
        }
    }

    /// Translate user text from `source` into the pivot language
    pub async fn to_pivot(&self, text: &str, source: &str) -> String {
        self.translate(text, source, PIVOT_LANGUAGE).await
    }

    /// Translate a model reply from the pivot language into `target`
    pub async fn from_pivot(&self, text: &str, target: &str) -> String {
        self.translate(text, PIVOT_LANGUAGE, target).await
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        let source = base_code(source);
        let target = base_code(target);

        if text.trim().is_empty() || source == target {
            return text.to_string();
        }

        let Some(backend) = &self.backend else {
            return text.to_string();
        };

        match backend.translate(text, &source, &target).await {
            Ok(translated) => {
                tracing::debug!(%source, %target, "translated");
                translated
            }
            Err(e) => {
                tracing::error!(%source, %target, error = %e, "translation failed, passing text through");
                text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::Error;

    /// Backend that uppercases text and records calls
    struct Shouting {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Translator for Shouting {
        async fn detect(&self, _text: &str) -> Result<String> {
            Ok("es-ES".to_string())
        }

        async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((source.to_string(), target.to_string()));
            Ok(text.to_uppercase())
        }

        fn name(&self) -> &'static str {
            "shouting"
        }
    }

    /// Backend whose service is unreachable
    struct Unavailable;

    #[async_trait]
    impl Translator for Unavailable {
        async fn detect(&self, _text: &str) -> Result<String> {
            Err(Error::Translation("connection refused".to_string()))
        }

        async fn translate(&self, _text: &str, _source: &str, _target: &str) -> Result<String> {
            Err(Error::Translation("connection refused".to_string()))
        }

        fn name(&self) -> &'static str {
            "unavailable"
        }
    }

    #[tokio::test]
    async fn test_unavailable_service_is_identity() {
        let translation = Translation::new(Box::new(Unavailable), "en");
        let text = "¿Qué hora es?";

        let pivot = translation.to_pivot(text, "es").await;
        assert_eq!(pivot, text);
        assert_eq!(translation.from_pivot(&pivot, "es").await, text);
    }

    #[tokio::test]
    async fn test_detect_falls_back_to_default() {
        let translation = Translation::new(Box::new(Unavailable), "fr");
        assert_eq!(translation.detect_language("bonjour").await, "fr");
    }

    #[tokio::test]
    async fn test_detect_normalizes_region() {
        let translation = Translation::new(
            Box::new(Shouting {
                calls: Mutex::new(Vec::new()),
            }),
            "en",
        );
        assert_eq!(translation.detect_language("hola").await, "es");
    }

    #[tokio::test]
    async fn test_same_language_skips_backend() {
        let translation = Translation::new(
            Box::new(Shouting {
                calls: Mutex::new(Vec::new()),
            }),
            "en",
        );

        assert_eq!(translation.to_pivot("hello", "en-US").await, "hello");
        assert_eq!(translation.to_pivot("hola", "es").await, "HOLA");
        assert_eq!(translation.from_pivot("", "es").await, "");
    }

    #[tokio::test]
    async fn test_disabled_passes_through() {
        let translation = Translation::disabled("de");
        assert!(!translation.is_enabled());
        assert_eq!(translation.to_pivot("guten tag", "de").await, "guten tag");
        assert_eq!(translation.detect_language("guten tag").await, "de");
    }

    #[test]
    fn test_from_config_without_key_is_disabled() {
        let config = Config::default();
        assert!(!Translation::from_config(&config).is_enabled());

        let mut config = Config::default();
        config.api_keys.google_translate = Some("key".to_string());
        assert!(Translation::from_config(&config).is_enabled());

        config.language.translation_enabled = false;
        assert!(!Translation::from_config(&config).is_enabled());
    }
}
