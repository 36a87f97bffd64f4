/// Push-to-talk microphone capture
pub mod capture;
/// Recording start/stop sound cues
pub mod cue;

pub use capture::{AudioClip, AudioRecorder, CaptureError, CpalRecorder};
pub use cue::{CpalCuePlayer, CueError, CuePlayer};
