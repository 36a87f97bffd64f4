use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::audio::{AudioRecorder, CaptureError, CuePlayer};
use crate::input::{generate_text_preview, KeyAction, KeyEvent, KeySubscription, SharedBuffer};
use crate::settings::{CueChoice, Settings};
use crate::transcription::{Transcriber, Transcript, TranscriptionError, TranscriptionOptions};

/// Default bound on the transcription wait
pub const DEFAULT_PROCESSING_TIMEOUT: Duration = Duration::from_secs(30);

/// Push-to-talk state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// Waiting for the hotkey
    Idle,
    /// Hotkey held, microphone open
    Recording,
    /// Hotkey released, transcription in flight
    Processing,
}

/// Why a session ended without inserting text
#[derive(Debug, Error)]
pub enum SessionError {
    /// The microphone could not be started or stopped
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Nothing was captured between press and release
    #[error("no audio captured")]
    NoAudio,

    /// The backend failed or answered with malformed data
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    /// The backend did not answer in time
    #[error("transcription timed out after {}s", .0.as_secs())]
    TranscriptionTimeout(Duration),
}

/// A completed session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// What the backend recognized
    pub transcript: Transcript,
    /// Char offset the text was inserted at (after clamping)
    pub inserted_at: usize,
    /// Buffer cursor after insertion
    pub cursor: usize,
    /// Time between press and release
    pub recorded_for: Duration,
}

/// Result of one press/release cycle
pub type SessionOutcome = Result<SessionReport, SessionError>;

/// What a key event did to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The event did not concern the machine in its current state
    Ignored,
    /// `Idle → Recording`
    Started,
    /// `Recording → Processing`
    Stopped,
}

#[derive(Debug, Clone)]
struct RecordingSession {
    hotkey: String,
    cursor_offset: usize,
    started_at: Instant,
}

type TranscriptionFuture =
    Pin<Box<dyn Future<Output = Result<Transcript, TranscriptionError>> + Send>>;

struct ProcessingJob {
    cursor_offset: usize,
    recorded_for: Duration,
    deadline: tokio::time::Instant,
    future: TranscriptionFuture,
}

/// Drives recording sessions from global key events
pub struct RecordingController {
    settings: watch::Receiver<Option<Settings>>,
    buffer: SharedBuffer,
    transcriber: Arc<dyn Transcriber>,
    recorder: Box<dyn AudioRecorder>,
    cues: Box<dyn CuePlayer>,
    processing_timeout: Duration,
    state: RecordingState,
    session: Option<RecordingSession>,
    pending: Option<ProcessingJob>,
}

impl RecordingController {
    /// Controller in `Idle`, reading the hotkey from `settings` on every event
    #[must_use]
    pub fn new(
        settings: watch::Receiver<Option<Settings>>,
        buffer: SharedBuffer,
        transcriber: Arc<dyn Transcriber>,
        recorder: Box<dyn AudioRecorder>,
        cues: Box<dyn CuePlayer>,
    ) -> Self {
        Self {
            settings,
            buffer,
            transcriber,
            recorder,
            cues,
            processing_timeout: DEFAULT_PROCESSING_TIMEOUT,
            state: RecordingState::Idle,
            session: None,
            pending: None,
        }
    }

    /// Overrides the transcription wait bound
    #[must_use]
    pub fn with_processing_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> RecordingState {
        self.state
    }

    /// The buffer transcripts are inserted into
    #[must_use]
    pub const fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// Applies one key event
    ///
    /// # Errors
    /// Returns error if the session had to be aborted (capture failure or
    /// an empty clip); the machine is back in `Idle` in that case.
    pub fn handle_key(&mut self, event: &KeyEvent) -> Result<Transition, SessionError> {
        match (event.action, self.state) {
            (KeyAction::Down, RecordingState::Idle) => {
                let Some(settings) = self.matching_settings(&event.key) else {
                    return Ok(Transition::Ignored);
                };
                self.start_session(&settings, &event.key)?;
                Ok(Transition::Started)
            }
            (KeyAction::Up, RecordingState::Recording) => {
                let is_session_key = self
                    .session
                    .as_ref()
                    .is_some_and(|session| session.hotkey.eq_ignore_ascii_case(&event.key));
                if !is_session_key {
                    return Ok(Transition::Ignored);
                }
                self.stop_session()?;
                Ok(Transition::Stopped)
            }
            (action, state) => {
                debug!(key = %event.key, ?action, ?state, "key event ignored");
                Ok(Transition::Ignored)
            }
        }
    }

    /// Waits for the in-flight transcription and applies it
    ///
    /// Returns `None` when nothing is being processed. Cancel-safe: dropping
    /// the future leaves the transcription pending.
    pub async fn finish_processing(&mut self) -> Option<SessionOutcome> {
        let job = self.pending.as_mut()?;
        let result = tokio::time::timeout_at(job.deadline, &mut job.future).await;
        let job = self.pending.take()?;
        self.state = RecordingState::Idle;

        let outcome = match result {
            Ok(Ok(transcript)) => Ok(self.insert_transcript(transcript, &job)),
            Ok(Err(e)) => Err(SessionError::Transcription(e)),
            Err(_) => Err(SessionError::TranscriptionTimeout(self.processing_timeout)),
        };

        match &outcome {
            Ok(report) => info!(
                words = report.transcript.word_count,
                cursor = report.cursor,
                "processing complete: Processing → Idle"
            ),
            Err(e) => warn!(error = %e, "session failed: Processing → Idle"),
        }
        Some(outcome)
    }

    /// Runs until `shutdown` resolves or the key source closes
    ///
    /// The subscription is dropped on return, releasing the key listener
    /// slot. Every finished or aborted session is sent to `outcomes`.
    pub async fn run<F>(
        mut self,
        mut keys: KeySubscription,
        outcomes: mpsc::UnboundedSender<SessionOutcome>,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("recording controller running");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                event = keys.recv() => {
                    let Some(event) = event else {
                        info!("key source closed");
                        break;
                    };
                    if let Err(e) = self.handle_key(&event) {
                        let _ = outcomes.send(Err(e));
                    }
                }
                Some(outcome) = self.finish_processing(), if self.pending.is_some() => {
                    let _ = outcomes.send(outcome);
                }
            }
        }

        self.abandon();
    }

    fn matching_settings(&self, key: &str) -> Option<Settings> {
        let settings = self.settings.borrow();
        Option::as_ref(&*settings)
            .filter(|settings| settings.matches_hotkey(key))
            .cloned()
    }

    fn start_session(&mut self, settings: &Settings, key: &str) -> Result<(), SessionError> {
        let cursor_offset = self
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cursor();

        if let Err(e) = self.recorder.start() {
            warn!(error = %e, "failed to start capture, session aborted");
            return Err(SessionError::Capture(e));
        }

        self.session = Some(RecordingSession {
            hotkey: key.to_owned(),
            cursor_offset,
            started_at: Instant::now(),
        });
        self.state = RecordingState::Recording;
        info!(key, cursor_offset, "hotkey pressed: Idle → Recording");

        self.play_cue(&settings.start_sound, "start");
        Ok(())
    }

    fn stop_session(&mut self) -> Result<(), SessionError> {
        let Some(session) = self.session.take() else {
            self.state = RecordingState::Idle;
            return Ok(());
        };
        let recorded_for = session.started_at.elapsed();

        let settings = self.settings.borrow().clone().unwrap_or_default();
        let clip = self.recorder.stop();
        self.play_cue(&settings.end_sound, "end");

        let clip = match clip {
            Ok(clip) => clip,
            Err(e) => {
                self.state = RecordingState::Idle;
                warn!(error = %e, "failed to stop capture, session aborted");
                return Err(SessionError::Capture(e));
            }
        };
        if clip.is_empty() {
            self.state = RecordingState::Idle;
            info!("no audio captured: Recording → Idle");
            return Err(SessionError::NoAudio);
        }

        info!(
            recorded_ms = recorded_for.as_millis(),
            audio_secs = clip.duration_secs(),
            "hotkey released: Recording → Processing"
        );

        let options = TranscriptionOptions::from_settings(&settings);
        let transcriber = Arc::clone(&self.transcriber);
        self.pending = Some(ProcessingJob {
            cursor_offset: session.cursor_offset,
            recorded_for,
            deadline: tokio::time::Instant::now() + self.processing_timeout,
            future: Box::pin(async move { transcriber.transcribe(clip, options).await }),
        });
        self.state = RecordingState::Processing;
        Ok(())
    }

    fn insert_transcript(&self, transcript: Transcript, job: &ProcessingJob) -> SessionReport {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let inserted_at = job.cursor_offset.min(buffer.char_len());
        let cursor = buffer.insert_at(inserted_at, &transcript.text);
        drop(buffer);

        info!(
            inserted_at,
            preview = %generate_text_preview(&transcript.text),
            "transcript inserted"
        );
        SessionReport {
            transcript,
            inserted_at,
            cursor,
            recorded_for: job.recorded_for,
        }
    }

    fn play_cue(&self, choice: &CueChoice, which: &'static str) {
        let Some(asset) = choice.asset() else {
            debug!(cue = which, "cue disabled");
            return;
        };
        if let Err(e) = self.cues.play(asset) {
            warn!(cue = which, asset, error = %e, "failed to play cue");
        }
    }

    fn abandon(&mut self) {
        match self.state {
            RecordingState::Recording => {
                if let Err(e) = self.recorder.stop() {
                    warn!(error = %e, "failed to stop capture on shutdown");
                }
                info!("recording discarded on shutdown");
            }
            RecordingState::Processing => info!("pending transcription discarded on shutdown"),
            RecordingState::Idle => {}
        }
        self.session = None;
        self.pending = None;
        self.state = RecordingState::Idle;
    }
}
