use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::SampleFormat;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::capture::resample_linear;

/// Silence kept after the last frame so the device can drain
const CUE_TAIL: Duration = Duration::from_millis(100);

/// Cue playback errors (never fatal to a recording session)
#[derive(Debug, Error)]
pub enum CueError {
    /// No playable file for the asset name
    #[error("sound asset not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file is not a readable WAV
    #[error("failed to decode sound asset {}: {reason}", .path.display())]
    Decode {
        /// Resolved file
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// The playback thread could not be started
    #[error("failed to start cue playback: {0}")]
    Spawn(String),
}

/// Fire-and-forget playback of named sound assets
#[cfg_attr(test, mockall::automock)]
pub trait CuePlayer {
    /// Starts playing `asset` and returns without waiting for it to finish
    ///
    /// # Errors
    /// Returns error if the asset cannot be found or decoded
    fn play(&self, asset: &str) -> Result<(), CueError>;
}

/// Decoded cue, interleaved samples
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCue {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

/// Plays WAV cues from a directory on the default output device
pub struct CpalCuePlayer {
    assets_dir: PathBuf,
}

impl CpalCuePlayer {
    /// Player resolving asset names against `assets_dir`
    #[must_use]
    pub const fn new(assets_dir: PathBuf) -> Self {
        Self { assets_dir }
    }

    /// Maps an asset name to a WAV file
    ///
    /// Relative names are looked up in the assets directory. Only WAV can be
    /// decoded, so `beep.mp3` also matches `beep.wav`.
    ///
    /// # Errors
    /// Returns [`CueError::NotFound`] if no WAV file exists for the name
    pub fn resolve(&self, asset: &str) -> Result<PathBuf, CueError> {
        let named = Path::new(asset);
        let base = if named.is_absolute() {
            named.to_path_buf()
        } else {
            self.assets_dir.join(named)
        };

        [base.clone(), base.with_extension("wav")]
            .into_iter()
            .find(|candidate| is_wav(candidate) && candidate.is_file())
            .ok_or(CueError::NotFound(base))
    }
}

impl CuePlayer for CpalCuePlayer {
    fn play(&self, asset: &str) -> Result<(), CueError> {
        let path = self.resolve(asset)?;
        let cue = decode_wav(&path)?;
        debug!(path = %path.display(), samples = cue.samples.len(), "playing cue");

        // cpal streams are not Send, so the whole device lifecycle lives on
        // the playback thread
        thread::Builder::new()
            .name("cue-playback".to_owned())
            .spawn(move || {
                if let Err(e) = play_blocking(&cue) {
                    warn!(path = %path.display(), error = %e, "cue playback failed");
                }
            })
            .map_err(|e| CueError::Spawn(e.to_string()))?;

        Ok(())
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
}

/// Reads a WAV file into normalized f32 samples
///
/// # Errors
/// Returns [`CueError::Decode`] if the file is not a valid WAV
pub fn decode_wav(path: &Path) -> Result<DecodedCue, CueError> {
    let decode_err = |e: hound::Error| CueError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let reader = hound::WavReader::open(path).map_err(decode_err)?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_err)?,
        SampleFormat::Int => {
            let scale = 2_f32.powi(i32::from(spec.bits_per_sample) - 1);
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| normalize_int(value, scale)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(decode_err)?
        }
    };

    Ok(DecodedCue {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

// i32 → f32: cue precision is irrelevant
#[allow(clippy::cast_precision_loss)]
fn normalize_int(value: i32, scale: f32) -> f32 {
    value as f32 / scale
}

/// Converts a decoded cue to the device's rate and channel layout
#[must_use]
pub fn adapt_frames(cue: &DecodedCue, channels: u16, sample_rate: u32) -> Vec<f32> {
    let source_channels = usize::from(cue.channels.max(1));
    let mono: Vec<f32> = cue
        .samples
        .chunks(source_channels)
        .map(|frame| {
            #[allow(clippy::cast_precision_loss)]
            let width = frame.len() as f32;
            frame.iter().sum::<f32>() / width
        })
        .collect();

    let resampled = resample_linear(&mono, cue.sample_rate, sample_rate);
    let target_channels = usize::from(channels.max(1));
    resampled
        .iter()
        .flat_map(|&sample| std::iter::repeat(sample).take(target_channels))
        .collect()
}

fn play_blocking(cue: &DecodedCue) -> anyhow::Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device available"))?;
    let config: cpal::StreamConfig = device.default_output_config()?.into();

    let frames = adapt_frames(cue, config.channels, config.sample_rate.0);
    #[allow(clippy::cast_precision_loss)]
    let secs =
        frames.len() as f64 / (f64::from(config.sample_rate.0) * f64::from(config.channels));

    let mut position = 0;
    let stream = device.build_output_stream(
        &config,
        move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
            for sample in out.iter_mut() {
                *sample = frames.get(position).copied().unwrap_or(0.0);
                position += 1;
            }
        },
        |err| warn!("cue stream error: {}", err),
        None,
    )?;
    stream.play()?;

    thread::sleep(Duration::from_secs_f64(secs) + CUE_TAIL);
    Ok(())
}
