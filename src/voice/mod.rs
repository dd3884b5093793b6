//! Voice processing module
//!
//! Handles audio capture, phrase endpointing, wake word detection,
//! recognition, synthesis, and playback.

mod capture;
mod listener;
mod playback;
mod segmenter;
mod stt;
mod tts;
mod wake_word;

pub use capture::{
    AudioCapture, InputDevice, SAMPLE_RATE, downmix, list_input_devices, resample, samples_to_wav,
};
pub use listener::{Heard, MicrophoneListener, SpeechInput, TextInput};
pub use playback::{AudioPlayback, decode_mp3, decode_wav, sine_tone};
pub use segmenter::{Endpointing, Segment, Segmenter, SegmenterState, rms};
pub use stt::{SpeechToText, Transcription};
pub use tts::{LocalProgram, LocalVoice, Silent, SpeechOutput, SynthesizedAudio, TextToSpeech};
pub use wake_word::WakeWordDetector;
