//! Push-to-talk recording lifecycle

/// Key-driven `Idle → Recording → Processing` state machine
pub mod controller;

pub use controller::{
    RecordingController, RecordingState, SessionError, SessionOutcome, SessionReport,
    Transition, DEFAULT_PROCESSING_TIMEOUT,
};
