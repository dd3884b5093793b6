//! Energy-based phrase endpointing
//!
//! Splits a live sample stream into phrases: speech starts when the RMS
//! energy of a chunk rises above the threshold and ends after a pause of
//! sustained silence. Waiting too long for speech to start is a timeout.

use crate::config::SpeechInputConfig;

/// Minimum voiced duration for a phrase to count (seconds)
const MIN_SPEECH_SECS: f32 = 0.3;

/// Full-scale amplitude of 16-bit audio, the scale thresholds are given in
const INT16_SCALE: f32 = 32768.0;

/// Endpointing parameters, in seconds and 16-bit amplitude units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpointing {
    /// RMS energy above which a chunk counts as speech (16-bit scale)
    pub energy_threshold: f32,
    /// Silence that ends a phrase
    pub pause: f32,
    /// Wait for speech to start before giving up
    pub timeout: f32,
    /// Longest phrase captured before it is cut off
    pub phrase_limit: f32,
}

impl Endpointing {
    /// Parameters for a spoken query
    #[must_use]
    pub const fn query(config: &SpeechInputConfig) -> Self {
        Self {
            energy_threshold: config.energy_threshold,
            pause: config.pause_threshold,
            timeout: config.timeout,
            phrase_limit: config.phrase_time_limit,
        }
    }

    /// Parameters for a short wake phrase
    #[must_use]
    pub const fn wake_phrase(config: &SpeechInputConfig) -> Self {
        Self {
            energy_threshold: config.energy_threshold,
            pause: config.pause_threshold,
            timeout: 1.0,
            phrase_limit: 3.0,
        }
    }
}

/// Segmenter progress after a chunk
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Keep feeding audio
    Pending,
    /// A phrase finished; contains its samples
    Complete(Vec<f32>),
    /// No speech started before the timeout
    TimedOut,
}

/// Segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech to start
    Waiting,
    /// Accumulating a phrase
    Speaking,
}

/// Splits a sample stream into phrases
pub struct Segmenter {
    threshold: f32,
    pause_samples: usize,
    timeout_samples: usize,
    limit_samples: usize,
    min_speech_samples: usize,
    state: SegmenterState,
    buffer: Vec<f32>,
    waited: usize,
    silence: usize,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn seconds_to_samples(secs: f32, sample_rate: u32) -> usize {
    (secs.max(0.0) * sample_rate as f32) as usize
}

impl Segmenter {
    /// Create a segmenter for audio at `sample_rate`
    #[must_use]
    pub fn new(endpointing: Endpointing, sample_rate: u32) -> Self {
        Self {
            threshold: endpointing.energy_threshold / INT16_SCALE,
            pause_samples: seconds_to_samples(endpointing.pause, sample_rate),
            timeout_samples: seconds_to_samples(endpointing.timeout, sample_rate),
            limit_samples: seconds_to_samples(endpointing.phrase_limit, sample_rate),
            min_speech_samples: seconds_to_samples(MIN_SPEECH_SECS, sample_rate),
            state: SegmenterState::Waiting,
            buffer: Vec::new(),
            waited: 0,
            silence: 0,
        }
    }

    /// Feed a chunk of mono samples
    pub fn process(&mut self, samples: &[f32]) -> Segment {
        if samples.is_empty() {
            return Segment::Pending;
        }

        let energy = rms(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            SegmenterState::Waiting => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.silence = 0;
                    tracing::trace!(energy, "speech started");
                } else {
                    self.waited += samples.len();
                    if self.waited >= self.timeout_samples {
                        tracing::trace!("timed out waiting for speech");
                        self.reset();
                        return Segment::TimedOut;
                    }
                }
            }
            SegmenterState::Speaking => {
                self.buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                tracing::trace!(
                    buffer_len = self.buffer.len(),
                    silence = self.silence,
                    is_speech,
                    energy,
                    "speaking"
                );

                let voiced = self.buffer.len().saturating_sub(self.silence);
                if self.silence >= self.pause_samples {
                    if voiced >= self.min_speech_samples {
                        tracing::debug!(samples = self.buffer.len(), "phrase complete");
                        return Segment::Complete(self.finish());
                    }
                    // A click or a cough, keep waiting for real speech
                    self.waited += self.buffer.len();
                    self.state = SegmenterState::Waiting;
                    self.buffer.clear();
                    self.silence = 0;
                } else if self.buffer.len() >= self.limit_samples {
                    tracing::debug!(samples = self.buffer.len(), "phrase time limit reached");
                    return Segment::Complete(self.finish());
                }
            }
        }

        Segment::Pending
    }

    fn finish(&mut self) -> Vec<f32> {
        let phrase = std::mem::take(&mut self.buffer);
        self.reset();
        phrase
    }

    /// Reset to waiting with an empty buffer and a fresh timeout
    pub fn reset(&mut self) {
        self.state = SegmenterState::Waiting;
        self.buffer.clear();
        self.waited = 0;
        self.silence = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    /// Samples accumulated for the current phrase
    #[must_use]
    pub fn buffered(&self) -> &[f32] {
        &self.buffer
    }
}

/// RMS energy of audio samples (full scale 1.0)
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
