use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use polyglot::config::LoggingConfig;
use polyglot::config::file::{config_file_path, write_config_file};
use polyglot::translation::{LANGUAGES, is_known_code, language_code};
use polyglot::voice::{
    AudioCapture, AudioPlayback, MicrophoneListener, Silent, SpeechInput, SpeechOutput, TextInput,
    TextToSpeech, list_input_devices, rms, sine_tone,
};
use polyglot::{ChatModel, Chatbot, Config, Translation};

/// Polyglot - multilingual voice assistant
#[derive(Parser)]
#[command(name = "polyglot", version, about)]
struct Cli {
    /// Configuration file (JSON, or TOML when it ends in .toml)
    #[arg(short, long, env = "POLYGLOT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Type instead of speaking; no wake word needed
    #[arg(long)]
    text: bool,

    /// Print responses without speaking them
    #[arg(long)]
    mute: bool,

    /// Language to listen in (name or code); disables auto-detection
    #[arg(short, long)]
    language: Option<String>,

    /// Override the wake word
    #[arg(long)]
    wake_word: Option<String>,

    /// Save the conversation to this file on exit
    #[arg(long)]
    save_transcript: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the assistant (default)
    Run,
    /// List supported languages
    Languages,
    /// List microphones and their indexes
    Devices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Write a config file with default settings
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Interactive first-run setup
    Setup,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    // These work without a valid configuration
    match &cli.command {
        Some(Command::Setup) => {
            polyglot::logging::init(&LoggingConfig::default(), cli.verbose)?;
            return polyglot::setup::run_setup(cli.config.as_deref());
        }
        Some(Command::InitConfig { force }) => {
            polyglot::logging::init(&LoggingConfig::default(), cli.verbose)?;
            return init_config(cli.config.as_deref(), *force);
        }
        Some(Command::Languages) => {
            print_languages();
            return Ok(());
        }
        _ => {}
    }

    let loaded = Config::load(cli.config.as_deref());
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    polyglot::logging::init(&logging, cli.verbose)?;

    let mut config = loaded?;
    apply_cli_overrides(&mut config, &cli)?;
    tracing::debug!(?config, "loaded configuration");

    match &cli.command {
        None | Some(Command::Run) => run_assistant(config, &cli).await,
        Some(Command::Devices) => list_devices(),
        Some(Command::TestMic { duration }) => test_mic(&config, *duration).await,
        Some(Command::TestSpeaker) => test_speaker(),
        Some(Command::TestTts { text }) => test_tts(&config, text).await,
        Some(Command::Setup | Command::InitConfig { .. } | Command::Languages) => Ok(()),
    }
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) -> anyhow::Result<()> {
    if let Some(language) = &cli.language {
        let code = language_code(language);
        if !is_known_code(&code) {
            anyhow::bail!("unknown language: {language} (see `polyglot languages`)");
        }
        config.set_default_language(&code);
        config.language.auto_detect = false;
    }

    if let Some(wake_word) = &cli.wake_word {
        config.wake_word.clone_from(wake_word);
    }

    config.validate()?;
    Ok(())
}

/// Run the conversation loop
#[allow(clippy::future_not_send)]
async fn run_assistant(config: Config, cli: &Cli) -> anyhow::Result<()> {
    tracing::info!(
        text_mode = cli.text,
        mute = cli.mute,
        language = %config.language.default,
        "starting polyglot"
    );

    let input: Box<dyn SpeechInput> = if cli.text {
        Box::new(TextInput::stdin())
    } else {
        Box::new(MicrophoneListener::from_config(&config)?)
    };

    let output: Box<dyn SpeechOutput> = if cli.mute {
        Box::new(Silent)
    } else {
        Box::new(TextToSpeech::from_config(&config))
    };

    // Only hand the OpenAI key to OpenAI itself
    let model_key = config
        .model
        .api_url
        .contains("api.openai.com")
        .then(|| config.api_keys.openai.clone())
        .flatten();
    let model = ChatModel::new(&config.model, model_key);
    let translation = Translation::from_config(&config);

    let mut chatbot = Chatbot::new(&config, input, output, Box::new(model), translation)?
        .with_transcript_path(cli.save_transcript.clone());

    if cli.text {
        println!("Polyglot ready. Type a message (\"exit\" to quit).");
    } else {
        println!("Polyglot ready. Say \"{}\" to start.", config.wake_word);
    }

    chatbot.run().await?;
    Ok(())
}

/// Print the language table
fn print_languages() {
    println!("{:<24} CODE", "LANGUAGE");
    for (name, code) in LANGUAGES {
        println!("{name:<24} {code}");
    }
}

/// List input devices
fn list_devices() -> anyhow::Result<()> {
    let devices = list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found");
        return Ok(());
    }

    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("{:>3}: {}{marker}", device.index, device.name);
    }
    println!("\nSet speech.input.device_index to choose a microphone.");
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new(config.speech.input.device_index)?;
    capture.start()?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!(
        "Speech threshold: {:.4} RMS",
        config.speech.input.energy_threshold / 32768.0
    );
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: polyglot devices (and set speech.input.device_index)");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24000;
    let samples = sine_tone(440.0, 2.0, sample_rate);
    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    AudioPlayback::new()?.play(&samples, sample_rate)?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Speak a test phrase with the configured engine
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    let tts = TextToSpeech::from_config(config);
    println!("Testing {} TTS with text: \"{text}\"\n", tts.engine_name());

    tts.say(text, &config.language.default).await?;

    println!("Done!");
    Ok(())
}

/// Write default settings to the config file
fn init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(config_file_path)
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    write_config_file(&path, &Config::default())?;
    println!("Config written to {}", path.display());
    Ok(())
}
