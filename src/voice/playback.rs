//! Audio playback to speakers

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig};

use super::capture::resample;
use crate::{Error, Result};

/// Plays mono audio to the default output device
pub struct AudioPlayback {
    device: Device,
}

impl AudioPlayback {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self { device })
    }

    /// Find an f32 output config at `sample_rate`, mono first then stereo
    fn config_for(&self, sample_rate: u32) -> Option<StreamConfig> {
        let ranges: Vec<_> = self
            .device
            .supported_output_configs()
            .ok()?
            .filter(|c| c.sample_format() == SampleFormat::F32)
            .filter(|c| {
                c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .collect();

        ranges
            .iter()
            .find(|c| c.channels() == 1)
            .or_else(|| ranges.iter().find(|c| c.channels() == 2))
            .or_else(|| ranges.first())
            .map(|c| c.clone().with_sample_rate(SampleRate(sample_rate)).config())
    }

    /// Play mono samples recorded at `sample_rate`
    ///
    /// Resamples to the device's default rate when it cannot play the
    /// source rate directly. Blocks until playback completes.
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    pub fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        if let Some(config) = self.config_for(sample_rate) {
            return self.play_blocking(samples.to_vec(), config);
        }

        let device_rate = self
            .device
            .default_output_config()
            .map_err(|e| Error::Audio(e.to_string()))?
            .sample_rate()
            .0;
        let config = self
            .config_for(device_rate)
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        tracing::debug!(from = sample_rate, to = device_rate, "resampling for playback");
        let resampled = resample(samples, sample_rate, device_rate)?;
        self.play_blocking(resampled, config)
    }

    /// Play audio from MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3(&self, mp3_data: &[u8]) -> Result<()> {
        let (samples, sample_rate) = decode_mp3(mp3_data)?;
        self.play(&samples, sample_rate)
    }

    /// Play audio from WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_wav(&self, wav_data: &[u8]) -> Result<()> {
        let (samples, sample_rate) = decode_wav(wav_data)?;
        self.play(&samples, sample_rate)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn play_blocking(&self, samples: Vec<f32>, config: StreamConfig) -> Result<()> {
        let channels = usize::from(config.channels);
        let sample_rate = config.sample_rate.0;
        let sample_count = samples.len();

        let samples = Arc::new(samples);
        let position = Arc::new(Mutex::new(0usize));
        let finished = Arc::new(Mutex::new(false));

        let samples_clone = Arc::clone(&samples);
        let position_clone = Arc::clone(&position);
        let finished_clone = Arc::clone(&finished);

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut pos) = position_clone.lock() else {
                        return;
                    };

                    for frame in data.chunks_mut(channels) {
                        let sample = samples_clone.get(*pos).copied().unwrap_or_else(|| {
                            if let Ok(mut done) = finished_clone.lock() {
                                *done = true;
                            }
                            0.0
                        });

                        for out in frame.iter_mut() {
                            *out = sample;
                        }

                        if *pos < samples_clone.len() {
                            *pos += 1;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(sample_rate);
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.lock().map_or(true, |done| *done) {
            if start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, sample_rate, "playback complete");

        Ok(())
    }
}

/// Sine tone for speaker checks
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn sine_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> Vec<f32> {
    let count = (sample_rate as f32 * duration_secs) as usize;
    (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the data is not valid MP3
#[allow(clippy::cast_sign_loss)]
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate as u32;
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 contained no audio frames".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Decode WAV bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the data is not a supported WAV
#[allow(clippy::cast_precision_loss)]
pub fn decode_wav(wav_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let reader =
        hound::WavReader::new(Cursor::new(wav_data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    Ok((
        super::capture::downmix(&interleaved, usize::from(spec.channels)),
        spec.sample_rate,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{SAMPLE_RATE, samples_to_wav};

    #[test]
    fn test_decode_wav_matches_encoding() {
        let tone = sine_tone(440.0, 0.1, SAMPLE_RATE);
        let wav = samples_to_wav(&tone, SAMPLE_RATE).unwrap();

        let (decoded, rate) = decode_wav(&wav).unwrap();
        assert_eq!(rate, SAMPLE_RATE);
        assert_eq!(decoded.len(), tone.len());
        assert!(decoded.iter().zip(&tone).all(|(a, b)| (a - b).abs() < 1e-3));
    }

    #[test]
    fn test_decode_mp3_rejects_garbage() {
        assert!(decode_mp3(b"not an mp3").is_err());
    }
}
