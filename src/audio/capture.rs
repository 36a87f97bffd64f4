use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{SampleFormat, WavSpec, WavWriter};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapRb,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sample rate of every [`AudioClip`]
pub const CLIP_SAMPLE_RATE: u32 = 16_000;

/// Longest recording kept in the ring buffer
const MAX_RECORDING_SECS: usize = 120;

/// Microphone capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No default input device
    #[error("no input device available")]
    NoDevice,

    /// The device refused to open or control the stream
    #[error("audio stream error: {0}")]
    Stream(String),

    /// Encoding the clip as WAV failed
    #[error("failed to encode recording: {0}")]
    Encode(String),
}

/// Audio captured between hotkey press and release (16kHz mono)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
}

impl AudioClip {
    /// Wraps 16kHz mono samples
    #[must_use]
    pub const fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Captured samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// True when nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Clip length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Sample counts stay far below 2^52
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(CLIP_SAMPLE_RATE)
    }

    /// Encodes the clip as a 16-bit PCM WAV payload
    ///
    /// # Errors
    /// Returns error if the WAV writer fails
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, CaptureError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: CLIP_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = WavWriter::new(&mut cursor, spec)
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
            for &sample in &self.samples {
                // f32 in [-1, 1] → i16 full scale
                #[allow(clippy::cast_possible_truncation)]
                let pcm = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                writer
                    .write_sample(pcm)
                    .map_err(|e| CaptureError::Encode(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| CaptureError::Encode(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

/// Push-to-talk microphone
#[cfg_attr(test, mockall::automock)]
pub trait AudioRecorder {
    /// Starts capturing, discarding anything captured before
    ///
    /// # Errors
    /// Returns error if the stream cannot be resumed
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stops capturing and returns the clip
    ///
    /// # Errors
    /// Returns error if the stream cannot be paused
    fn stop(&mut self) -> Result<AudioClip, CaptureError>;
}

/// Microphone on the default input device (CPAL)
pub struct CpalRecorder {
    /// Kept alive to prevent stream drop
    stream: cpal::Stream,
    ring_buffer_consumer: HeapCons<f32>,
    is_recording: Arc<AtomicBool>,
    device_sample_rate: u32,
    device_channels: u16,
}

impl CpalRecorder {
    /// Opens the default input device with its default config, paused
    ///
    /// # Errors
    /// Returns error if there is no input device or the stream cannot be built
    pub fn new() -> Result<Self, CaptureError> {
        info!("initializing audio capture");

        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
        info!("using input device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        let device_sample_rate = supported_config.sample_rate().0;
        let device_channels = supported_config.channels();
        info!(
            sample_rate = device_sample_rate,
            channels = device_channels,
            "device config"
        );

        let capacity =
            (device_sample_rate as usize) * (device_channels as usize) * MAX_RECORDING_SECS;
        let (mut producer, ring_buffer_consumer) = HeapRb::<f32>::new(capacity).split();

        let is_recording = Arc::new(AtomicBool::new(false));
        let is_recording_clone = Arc::clone(&is_recording);

        let stream = device
            .build_input_stream(
                &supported_config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if is_recording_clone.load(Ordering::Relaxed) {
                        let pushed = producer.push_slice(data);
                        if pushed < data.len() {
                            warn!("ring buffer full, dropped {} samples", data.len() - pushed);
                        }
                    }
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        // Mic stays inactive until the hotkey is pressed
        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        stream
            .pause()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        info!("audio stream initialized (paused)");

        Ok(Self {
            stream,
            ring_buffer_consumer,
            is_recording,
            device_sample_rate,
            device_channels,
        })
    }
}

impl AudioRecorder for CpalRecorder {
    fn start(&mut self) -> Result<(), CaptureError> {
        let _span = tracing::debug_span!("start_recording").entered();
        self.ring_buffer_consumer.clear();

        // Flag before resume so the first callback is kept
        self.is_recording.store(true, Ordering::Relaxed);
        self.stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        debug!("recording started");
        Ok(())
    }

    fn stop(&mut self) -> Result<AudioClip, CaptureError> {
        let _span = tracing::debug_span!("stop_recording").entered();
        self.is_recording.store(false, Ordering::Relaxed);
        self.stream
            .pause()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        let samples: Vec<f32> = self.ring_buffer_consumer.pop_iter().collect();
        info!(samples = samples.len(), "ring buffer drained");

        Ok(AudioClip::new(to_clip_samples(
            &samples,
            self.device_sample_rate,
            self.device_channels,
        )))
    }
}

/// Downmixes interleaved device samples to mono and resamples to 16kHz
#[must_use]
pub fn to_clip_samples(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<f32> {
    let mono = downmix(samples, channels);
    if sample_rate == CLIP_SAMPLE_RATE || mono.is_empty() {
        return mono;
    }
    resample_linear(&mono, sample_rate, CLIP_SAMPLE_RATE)
}

fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels_f32 = f32::from(channels);
    samples
        .chunks(usize::from(channels))
        .map(|frame| frame.iter().sum::<f32>() / channels_f32)
        .collect()
}

/// Linear interpolation resampler
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub(crate) fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = ((samples.len() as f64) / ratio).ceil() as usize;
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let src = (i as f64) * ratio;
            let floor = (src.floor() as usize).min(last);
            let ceil = (floor + 1).min(last);
            let fract = src - src.floor();
            let s1 = f64::from(samples[floor]);
            let s2 = f64::from(samples[ceil]);
            s1.mul_add(1.0 - fract, s2 * fract) as f32
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::float_cmp)] // Test assertions with known exact values
mod tests {
    use super::*;

    #[test]
    fn test_stereo_to_mono_conversion() {
        let stereo = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let result = to_clip_samples(&stereo, CLIP_SAMPLE_RATE, 2);
        assert_eq!(result, vec![1.5, 3.5, 5.5]);
    }

    #[test]
    fn test_mono_passthrough_no_resampling() {
        let mono = vec![0.1, 0.2, 0.3];
        assert_eq!(to_clip_samples(&mono, CLIP_SAMPLE_RATE, 1), mono);
    }

    #[test]
    fn test_downsampling_48khz_to_16khz() {
        let samples: Vec<f32> = (0..48).map(|i| i as f32).collect();
        let result = to_clip_samples(&samples, 48_000, 1);

        assert_eq!(result.len(), 16);
        assert_eq!(result[0], 0.0);
        assert_eq!(result[1], 3.0);
        assert_eq!(result[15], 45.0);
    }

    #[test]
    fn test_upsampling_8khz_to_16khz_interpolates() {
        let result = resample_linear(&[0.0, 1.0], 8_000, 16_000);
        assert_eq!(result, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_empty_input_stays_empty() {
        assert!(to_clip_samples(&[], 44_100, 2).is_empty());
    }

    #[test]
    fn test_clip_duration() {
        let clip = AudioClip::new(vec![0.0; 8_000]);
        assert!((clip.duration_secs() - 0.5).abs() < f64::EPSILON);
        assert!(!clip.is_empty());
        assert!(AudioClip::new(Vec::new()).is_empty());
    }

    #[test]
    fn test_wav_encoding_roundtrips_through_hound() {
        let clip = AudioClip::new(vec![0.0, 0.5, -0.5, 1.0]);
        let bytes = clip.to_wav_bytes().unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, CLIP_SAMPLE_RATE);
        assert_eq!(spec.channels, 1);
        assert_eq!(reader.len(), 4);
    }

    #[test]
    #[ignore = "requires a microphone"]
    fn test_capture_on_default_device() {
        let mut recorder = CpalRecorder::new().unwrap();
        recorder.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));
        let clip = recorder.stop().unwrap();
        assert!(clip.duration_secs() < 1.0);
    }
}
