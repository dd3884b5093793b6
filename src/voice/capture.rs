//! Audio capture from microphone

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use crate::{Error, Result};

/// Sample rate for recognition audio (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// An input device as listed by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    /// Position in the host's device list (what `device_index` refers to)
    pub index: usize,
    /// Device name
    pub name: String,
    /// Whether this is the host's default input
    pub is_default: bool,
}

/// List the host's input devices
///
/// # Errors
///
/// Returns error if the host cannot enumerate devices
pub fn list_input_devices() -> Result<Vec<InputDevice>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| format!("device {index}"));
            InputDevice {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
            }
        })
        .collect();

    Ok(devices)
}

/// Pick the input device at `index`, falling back to the default device
fn select_device(index: Option<usize>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(index) = index {
        let found = host
            .input_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .nth(index);
        match found {
            Some(device) => return Ok(device),
            None => tracing::warn!(
                device_index = index,
                "microphone index out of range, using default device"
            ),
        }
    }

    host.default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))
}

fn supports_rate(range: &SupportedStreamConfigRange, rate: u32) -> bool {
    range.min_sample_rate() <= SampleRate(rate) && range.max_sample_rate() >= SampleRate(rate)
}

/// Choose an f32 input config, preferring mono at the speech rate
fn select_config(device: &Device) -> Result<StreamConfig> {
    let ranges: Vec<SupportedStreamConfigRange> = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    if let Some(range) = ranges
        .iter()
        .find(|c| c.channels() == 1 && supports_rate(c, SAMPLE_RATE))
        .or_else(|| ranges.iter().find(|c| supports_rate(c, SAMPLE_RATE)))
    {
        return Ok(range.clone().with_sample_rate(SampleRate(SAMPLE_RATE)).config());
    }

    // Device cannot capture at 16kHz; capture natively and resample later
    ranges
        .into_iter()
        .min_by_key(|c| c.channels())
        .map(|c| c.with_max_sample_rate().config())
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))
}

/// Captures mono audio from an input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the input device at `device_index` (default device when `None`)
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(device_index: Option<usize>) -> Result<Self> {
        let device = select_device(device_index)?;
        let config = select_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let channels = usize::from(self.config.channels);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(downmix(data, channels));
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Take the mono samples captured since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Clear the audio buffer
    pub fn clear_buffer(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Rate the device actually captures at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Average interleaved frames down to one channel
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono audio between rates
///
/// The final partial chunk is zero-padded and the output trimmed to the
/// expected length, so no trailing audio is dropped.
///
/// # Errors
///
/// Returns error if the resampler cannot be built
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output = Vec::new();

    for chunk in input.chunks(chunk_size) {
        let mut block = chunk.to_vec();
        block.resize(chunk_size, 0.0);
        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round();
    output.truncate(expected as usize);

    Ok(output.iter().map(|&s| s as f32).collect())
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let stereo = [0.5, 0.1, -0.2, -0.4];
        let mono = downmix(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!((mono[1] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_resample_length() {
        let samples = vec![0.1f32; 48000];
        let resampled = resample(&samples, 48000, SAMPLE_RATE).unwrap();
        assert!(resampled.len() <= 16000);
        assert!(resampled.len() > 14000);

        let same = resample(&samples, 16000, 16000).unwrap();
        assert_eq!(same.len(), samples.len());
    }
}
