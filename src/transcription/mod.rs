/// HTTP client for the transcription endpoint
pub mod client;

pub use client::{
    HttpTranscriber, Transcriber, Transcript, TranscriptionError, TranscriptionOptions,
};
