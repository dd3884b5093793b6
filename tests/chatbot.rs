//! Conversation loop integration tests

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{
    BrokenOutput, DownModel, PhraseBook, RecordingModel, RecordingOutput, ScriptedInput,
    fixed_time,
};
use polyglot::chatbot::{LISTENING_PROMPT, NOT_UNDERSTOOD};
use polyglot::model::APOLOGY;
use polyglot::voice::Heard;
use polyglot::{
    ChatState, Chatbot, CommandHandler, Config, Error, LanguageModel, Translation, TurnOutcome,
};

fn spoken(text: &str) -> polyglot::Result<Heard> {
    Ok(Heard::text(text))
}

fn spoken_in(text: &str, language: &str) -> polyglot::Result<Heard> {
    Ok(Heard {
        text: text.to_string(),
        language: Some(language.to_string()),
        audio: Some(vec![0.0; 1600]),
    })
}

fn build(
    config: &Config,
    input: ScriptedInput,
    output: RecordingOutput,
    model: Box<dyn LanguageModel>,
    translation: Translation,
) -> Chatbot {
    Chatbot::new(config, Box::new(input), Box::new(output), model, translation)
        .unwrap()
        .with_commands(
            CommandHandler::new(&config.commands).with_clock(Arc::new(fixed_time)),
        )
}

#[tokio::test]
async fn test_time_command_skips_model() {
    let config = Config::default();
    let output = RecordingOutput::default();
    let model = RecordingModel::new("unused");

    let mut bot = build(
        &config,
        ScriptedInput::voice(vec![spoken("Jarvis, what time is it?")]),
        output.clone(),
        Box::new(model.clone()),
        Translation::disabled("en"),
    );

    assert_eq!(bot.run_turn().await, TurnOutcome::Continue);
    assert_eq!(output.texts(), vec!["The current time is 09:07 PM."]);
    assert!(model.inputs().is_empty());
    assert_eq!(bot.state(), ChatState::Idle);
}

#[tokio::test]
async fn test_query_goes_to_model() {
    let config = Config::default();
    let output = RecordingOutput::default();
    let model = RecordingModel::new("Why did the scarecrow win an award?");

    let mut bot = build(
        &config,
        ScriptedInput::voice(vec![spoken("Jarvis, tell me a joke")]),
        output.clone(),
        Box::new(model.clone()),
        Translation::disabled("en"),
    );

    bot.run_turn().await;
    assert_eq!(model.inputs(), vec!["tell me a joke"]);
    assert_eq!(output.texts(), vec!["Why did the scarecrow win an award?"]);
    assert_eq!(
        bot.transcript().render(),
        "User: tell me a joke\nBot: Why did the scarecrow win an award?\n"
    );
}

#[tokio::test]
async fn test_process_input_translates_through_pivot() {
    let config = Config::default();
    let output = RecordingOutput::default();
    let model = RecordingModel::new("Here is a joke.");
    let phrases = PhraseBook::new(
        "es",
        &[
            ("cuéntame un chiste", "tell me a joke"),
            ("Aquí tienes un chiste.", "Here is a joke."),
        ],
    );

    let mut bot = build(
        &config,
        ScriptedInput::voice(Vec::new()),
        output.clone(),
        Box::new(model.clone()),
        Translation::new(Box::new(phrases), "en"),
    );

    let turn = bot
        .process_input(spoken_in("cuéntame un chiste", "es-ES").unwrap())
        .await;

    assert_eq!(model.inputs(), vec!["tell me a joke"]);
    assert_eq!(turn.detected_language, "es");
    assert_eq!(turn.response_text, "Aquí tienes un chiste.");
    assert!(!turn.is_command);
    assert_eq!(turn.raw_audio.as_ref().map(Vec::len), Some(1600));
    assert_eq!(bot.state(), ChatState::Generating);

    bot.respond(&turn).await;
    assert_eq!(
        output.spoken.borrow().as_slice(),
        [("Aquí tienes un chiste.".to_string(), "es".to_string())]
    );
    assert_eq!(bot.state(), ChatState::Idle);
}

#[tokio::test]
async fn test_detects_language_when_unreported() {
    let config = Config::default();
    let model = RecordingModel::new("Hello!");
    let phrases = PhraseBook::new("fr", &[("bonjour", "hello"), ("Bonjour !", "Hello!")]);

    let mut bot = build(
        &config,
        ScriptedInput::voice(Vec::new()),
        RecordingOutput::default(),
        Box::new(model.clone()),
        Translation::new(Box::new(phrases), "en"),
    );

    let turn = bot.process_input(Heard::text("bonjour")).await;
    assert_eq!(turn.detected_language, "fr");
    assert_eq!(turn.response_text, "Bonjour !");
    assert_eq!(model.inputs(), vec!["hello"]);
}

#[tokio::test]
async fn test_untranslatable_text_passes_through() {
    let config = Config::default();
    let model = RecordingModel::new("I am not sure.");

    let mut bot = build(
        &config,
        ScriptedInput::voice(Vec::new()),
        RecordingOutput::default(),
        Box::new(model.clone()),
        Translation::new(Box::new(PhraseBook::new("de", &[])), "en"),
    );

    let turn = bot.process_input(spoken_in("wie spät ist es", "de").unwrap()).await;
    assert_eq!(model.inputs(), vec!["wie spät ist es"]);
    assert_eq!(turn.response_text, "I am not sure.");
}

#[tokio::test]
async fn test_history_grows_between_turns() {
    let config = Config::default();
    let model = RecordingModel::new("Sure.");

    let mut bot = build(
        &config,
        ScriptedInput::typed(&["first question", "second question"]),
        RecordingOutput::default(),
        Box::new(model.clone()),
        Translation::disabled("en"),
    );

    bot.run_turn().await;
    bot.run_turn().await;

    let calls = model.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            ("first question".to_string(), 0),
            ("second question".to_string(), 1)
        ]
    );
}

#[tokio::test]
async fn test_model_failure_apologizes() {
    let config = Config::default();
    let output = RecordingOutput::default();

    let mut bot = build(
        &config,
        ScriptedInput::voice(vec![spoken("Jarvis what is love")]),
        output.clone(),
        Box::new(DownModel),
        Translation::disabled("en"),
    );

    assert_eq!(bot.run_turn().await, TurnOutcome::Continue);
    assert_eq!(output.texts(), vec![APOLOGY]);
}

#[tokio::test]
async fn test_bare_wake_word_prompts_then_listens() {
    let config = Config::default();
    let output = RecordingOutput::default();

    let mut bot = build(
        &config,
        ScriptedInput::voice(vec![spoken("Jarvis!"), spoken("what day is it")]),
        output.clone(),
        Box::new(RecordingModel::new("unused")),
        Translation::disabled("en"),
    );

    bot.run_turn().await;
    assert_eq!(
        output.texts(),
        vec![LISTENING_PROMPT, "Today is Tuesday, March 05, 2024."]
    );
}

#[tokio::test]
async fn test_speech_without_wake_word_is_ignored() {
    let config = Config::default();
    let output = RecordingOutput::default();
    let model = RecordingModel::new("unused");

    let mut bot = build(
        &config,
        ScriptedInput::voice(vec![spoken("what time is it")]),
        output.clone(),
        Box::new(model.clone()),
        Translation::disabled("en"),
    );

    assert_eq!(bot.run_turn().await, TurnOutcome::Continue);
    assert!(output.texts().is_empty());
    assert!(model.inputs().is_empty());
    assert!(bot.transcript().is_empty());
}

#[tokio::test]
async fn test_unrecognized_query_reprompts() {
    let config = Config::default();
    let output = RecordingOutput::default();

    let mut bot = build(
        &config,
        ScriptedInput::voice(vec![
            spoken("Jarvis"),
            Err(Error::Unintelligible),
            spoken("Jarvis"),
            Err(Error::NoSpeech),
        ]),
        output.clone(),
        Box::new(RecordingModel::new("unused")),
        Translation::disabled("en"),
    );

    bot.run_turn().await;
    bot.run_turn().await;

    // silence after the prompt is not answered
    assert_eq!(
        output.texts(),
        vec![LISTENING_PROMPT, NOT_UNDERSTOOD, LISTENING_PROMPT]
    );
    assert!(bot.transcript().is_empty());
}

#[tokio::test]
async fn test_speaker_failure_is_not_fatal() {
    let config = Config::default();

    let mut bot = Chatbot::new(
        &config,
        Box::new(ScriptedInput::typed(&["hello", "exit"])),
        Box::new(BrokenOutput),
        Box::new(RecordingModel::new("Hi!")),
        Translation::disabled("en"),
    )
    .unwrap();

    assert_eq!(bot.run_turn().await, TurnOutcome::Continue);
    assert_eq!(bot.run_turn().await, TurnOutcome::Exit);
    assert_eq!(bot.transcript().len(), 2);
}

#[tokio::test]
async fn test_exit_command_ends_run_and_saves_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat.txt");
    let config = Config::default();
    let output = RecordingOutput::default();

    let mut bot = build(
        &config,
        ScriptedInput::typed(&["hello", "Goodbye!", "never read"]),
        output.clone(),
        Box::new(RecordingModel::new("Hi there!")),
        Translation::disabled("en"),
    )
    .with_transcript_path(Some(path.clone()));

    bot.run().await.unwrap();

    assert_eq!(output.texts(), vec!["Hi there!", "Goodbye!"]);
    let saved = std::fs::read_to_string(&path).unwrap();
    assert_eq!(saved, "User: hello\nBot: Hi there!\nUser: Goodbye!\nBot: Goodbye!\n");
}

#[tokio::test]
async fn test_end_of_input_stops_without_saving_empty_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat.txt");
    let config = Config::default();

    let mut bot = build(
        &config,
        ScriptedInput::typed(&[]),
        RecordingOutput::default(),
        Box::new(RecordingModel::new("unused")),
        Translation::disabled("en"),
    )
    .with_transcript_path(Some(path.clone()));

    bot.run().await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_custom_command_through_chatbot() {
    let mut config = Config::default();
    config
        .commands
        .custom_commands
        .insert("lights".to_string(), vec!["turn on the lights".to_string()]);
    let output = RecordingOutput::default();
    let model = RecordingModel::new("unused");

    let mut bot = build(
        &config,
        ScriptedInput::typed(&["Turn on the lights please", "what time is it"]),
        output.clone(),
        Box::new(model.clone()),
        Translation::disabled("en"),
    );

    assert!(bot.add_custom_command_handler("lights", Arc::new(|_| Ok("Lights on.".to_string()))));
    // built-ins stay ahead of custom commands
    assert!(bot.commands_mut().register_command(
        "clock",
        &["what time".to_string()],
        Arc::new(|_| Ok("custom clock".to_string())),
    ));

    bot.run_turn().await;
    bot.run_turn().await;

    assert_eq!(output.texts(), vec!["Lights on.", "The current time is 09:07 PM."]);
    assert!(model.inputs().is_empty());
}

#[tokio::test]
async fn test_custom_wake_word() {
    let mut config = Config::default();
    config.wake_word = "hey polly".to_string();
    let output = RecordingOutput::default();
    let model = RecordingModel::new("Hello.");

    let mut bot = build(
        &config,
        ScriptedInput::voice(vec![spoken("Jarvis, hi"), spoken("Hey Polly, hi")]),
        output.clone(),
        Box::new(model.clone()),
        Translation::disabled("en"),
    );

    bot.run_turn().await;
    bot.run_turn().await;
    assert_eq!(model.inputs(), vec!["hi"]);
}

#[tokio::test]
async fn test_trailing_wake_word_keeps_query() {
    let config = Config::default();
    let output = RecordingOutput::default();
    let model = RecordingModel::new("Knock knock.");

    let mut bot = build(
        &config,
        ScriptedInput::voice(vec![
            spoken("Tell me a joke, Jarvis"),
            spoken("What time is it, Jarvis?"),
        ]),
        output.clone(),
        Box::new(model.clone()),
        Translation::disabled("en"),
    );

    bot.run_turn().await;
    bot.run_turn().await;

    assert_eq!(model.inputs(), vec!["Tell me a joke"]);
    assert_eq!(
        output.texts(),
        vec!["Knock knock.", "The current time is 09:07 PM."]
    );
}

#[tokio::test]
async fn test_typed_wake_word_is_stripped() {
    let config = Config::default();
    let output = RecordingOutput::default();
    let model = RecordingModel::new("Knock knock.");

    let mut bot = build(
        &config,
        ScriptedInput::typed(&["Jarvis, tell me a joke", "Jarvis, exit"]),
        output.clone(),
        Box::new(model.clone()),
        Translation::disabled("en"),
    );

    assert_eq!(bot.run_turn().await, TurnOutcome::Continue);
    assert_eq!(bot.run_turn().await, TurnOutcome::Exit);

    assert_eq!(model.inputs(), vec!["tell me a joke"]);
    assert_eq!(output.texts(), vec!["Knock knock.", "Goodbye!"]);
    assert_eq!(
        bot.transcript().render(),
        "User: tell me a joke\nBot: Knock knock.\nUser: exit\nBot: Goodbye!\n"
    );
}

#[tokio::test]
async fn test_commands_skip_language_detection() {
    let config = Config::default();
    let phrases = PhraseBook::new("fr", &[("bonjour", "hello"), ("Bonjour !", "Hello!")]);
    let detections = Arc::clone(&phrases.detections);

    let mut bot = build(
        &config,
        ScriptedInput::voice(Vec::new()),
        RecordingOutput::default(),
        Box::new(RecordingModel::new("Hello!")),
        Translation::new(Box::new(phrases), "en"),
    );

    let turn = bot.process_input(Heard::text("what time is it")).await;
    assert!(turn.is_command);
    assert_eq!(turn.detected_language, "en");
    assert_eq!(detections.load(Ordering::SeqCst), 0);

    let turn = bot.process_input(Heard::text("bonjour")).await;
    assert_eq!(turn.detected_language, "fr");
    assert_eq!(detections.load(Ordering::SeqCst), 1);
}
