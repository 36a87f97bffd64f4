//! Holdtype - push-to-talk dictation client
//!
//! Hold the configured key to record, release it to transcribe; the text is
//! spliced into the buffer where the cursor was when recording started.

/// Microphone capture and sound cues
pub mod audio;
/// Configuration management
pub mod config;
/// Input handling (global keys, text buffer)
pub mod input;
/// Recording lifecycle state machine
pub mod recording;
/// Settings record synchronized with the backend
pub mod settings;
/// Telemetry and logging
pub mod telemetry;
/// Transcription backend client
pub mod transcription;

#[cfg(test)]
mod test_support;
