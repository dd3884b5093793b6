//! Interactive first-run setup wizard (`polyglot setup`)

use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input, Select};

use crate::Config;
use crate::config::RivaConfig;
use crate::config::file::{config_file_path, read_config_file, write_config_file};
use crate::translation::{is_known_code, language_code};

const STT_PROVIDERS: [&str; 2] = ["whisper", "deepgram"];
const TTS_ENGINES: [&str; 4] = ["local", "openai", "elevenlabs", "riva"];
const TRANSLATION_PROVIDERS: [&str; 3] = ["google", "libretranslate", "none"];

/// Run the interactive setup wizard
///
/// # Errors
///
/// Returns error if user input fails or config cannot be written
pub fn run_setup(path: Option<&Path>) -> anyhow::Result<()> {
    println!("Polyglot Setup\n");

    let config_path = path
        .map(Path::to_path_buf)
        .or_else(config_file_path)
        .unwrap_or_else(|| PathBuf::from("config.json"));

    let mut config = if config_path.exists() {
        println!("Existing config found at {}\n", config_path.display());
        read_config_file(&config_path)?
    } else {
        Config::default()
    };

    // 1. Wake word
    config.wake_word = Input::new()
        .with_prompt("Wake word")
        .default(config.wake_word.clone())
        .interact_text()?;

    // 2. Language model endpoint
    config.model.api_url = Input::new()
        .with_prompt("Chat completions endpoint (OpenAI-compatible)")
        .default(config.model.api_url.clone())
        .interact_text()?;
    config.model.name = Input::new()
        .with_prompt("Model name")
        .default(config.model.name.clone())
        .interact_text()?;

    // 3. Speech recognition
    let stt_idx = Select::new()
        .with_prompt("Speech recognition provider")
        .items(&STT_PROVIDERS)
        .default(position(&STT_PROVIDERS, &config.speech.input.provider))
        .interact()?;
    config.speech.input.provider = STT_PROVIDERS[stt_idx].to_string();
    match STT_PROVIDERS[stt_idx] {
        "deepgram" => {
            config.api_keys.deepgram =
                prompt_key("Deepgram", "DEEPGRAM_API_KEY", config.api_keys.deepgram.take())?;
        }
        _ => {
            config.api_keys.openai =
                prompt_key("OpenAI", "OPENAI_API_KEY", config.api_keys.openai.take())?;
        }
    }

    // 4. Speech output
    let tts_idx = Select::new()
        .with_prompt("Speech engine")
        .items(&TTS_ENGINES)
        .default(position(&TTS_ENGINES, &config.speech.output.engine))
        .interact()?;
    config.speech.output.engine = TTS_ENGINES[tts_idx].to_string();
    match TTS_ENGINES[tts_idx] {
        "openai" if config.api_keys.openai.is_none() => {
            config.api_keys.openai = prompt_key("OpenAI", "OPENAI_API_KEY", None)?;
        }
        "elevenlabs" => {
            config.api_keys.elevenlabs = prompt_key(
                "ElevenLabs",
                "ELEVENLABS_API_KEY",
                config.api_keys.elevenlabs.take(),
            )?;
        }
        "riva" => {
            let mut riva: RivaConfig = config.riva().clone();
            riva.enabled = true;
            riva.server_url = Input::new()
                .with_prompt("Riva server URL")
                .default(riva.server_url.clone())
                .interact_text()?;
            riva.voice_name = Input::new()
                .with_prompt("Riva voice")
                .default(riva.voice_name.clone())
                .interact_text()?;
            config.riva = None;
            config.speech.riva = riva;
        }
        _ => {}
    }

    // 5. Translation
    let translation_idx = Select::new()
        .with_prompt("Translation provider")
        .items(&TRANSLATION_PROVIDERS)
        .default(if config.language.translation_enabled {
            position(&TRANSLATION_PROVIDERS, &config.language.translation_provider)
        } else {
            2
        })
        .interact()?;
    match TRANSLATION_PROVIDERS[translation_idx] {
        "none" => config.language.translation_enabled = false,
        provider => {
            config.language.translation_enabled = true;
            config.language.translation_provider = provider.to_string();
            if provider == "google" {
                config.api_keys.google_translate = prompt_key(
                    "Google Translate",
                    "GOOGLE_TRANSLATE_API_KEY",
                    config.api_keys.google_translate.take(),
                )?;
            } else {
                let url: String = Input::new()
                    .with_prompt("LibreTranslate URL (blank for libretranslate.com)")
                    .default(config.language.translation_url.clone().unwrap_or_default())
                    .allow_empty(true)
                    .interact_text()?;
                config.language.translation_url = (!url.is_empty()).then_some(url);
            }
        }
    }

    // 6. Default language
    let language: String = Input::new()
        .with_prompt("Default language (name or code)")
        .default(config.language.default.clone())
        .validate_with(|input: &String| -> Result<(), String> {
            if is_known_code(&language_code(input)) {
                Ok(())
            } else {
                Err(format!("unknown language: {input}"))
            }
        })
        .interact_text()?;
    config.set_default_language(&language_code(&language));

    // 7. Conversation logs
    config.logging.save_conversations = Confirm::new()
        .with_prompt("Save conversation transcripts?")
        .default(config.logging.save_conversations)
        .interact()?;

    config.validate()?;
    write_config_file(&config_path, &config)?;
    println!("\nConfig written to {}", config_path.display());
    println!("\nSetup complete! Run `polyglot -v` to start.");

    Ok(())
}

/// Ask for an API key, keeping the existing one on blank input
fn prompt_key(
    service: &str,
    env_hint: &str,
    existing: Option<String>,
) -> anyhow::Result<Option<String>> {
    let prompt = existing.as_deref().map_or_else(
        || format!("{service} API key ({env_hint}, blank to skip)"),
        |k| format!("{service} API key (current: {}, leave blank to keep)", mask_key(k)),
    );

    let input: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;

    Ok(if input.trim().is_empty() {
        existing
    } else {
        Some(input.trim().to_string())
    })
}

/// Show only the ends of a secret
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

fn position(options: &[&str], current: &str) -> usize {
    options
        .iter()
        .position(|o| o.eq_ignore_ascii_case(current))
        .unwrap_or(0)
}
