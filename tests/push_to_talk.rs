//! End-to-end push-to-talk flow
//!
//! Wires the settings store, key hub, controller and buffer together with
//! in-memory backends, so no microphone, speaker or server is needed.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use holdtype::audio::{AudioClip, AudioRecorder, CaptureError, CueError, CuePlayer};
use holdtype::input::{KeyEvent, KeyHub, TextBuffer};
use holdtype::recording::{RecordingController, SessionError, SessionOutcome};
use holdtype::settings::{
    FetchError, PersistenceError, ResetConfirmation, Settings, SettingsApi, SettingsStore,
};
use holdtype::transcription::{Transcriber, Transcript, TranscriptionError, TranscriptionOptions};

/// Backend that lowercases the hotkey on save, like a normalizing server
#[derive(Default)]
struct InMemoryBackend {
    stored: Mutex<Settings>,
}

#[async_trait]
impl SettingsApi for InMemoryBackend {
    async fn fetch(&self) -> Result<Settings, FetchError> {
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn save(&self, settings: &Settings) -> Result<(), PersistenceError> {
        let mut normalized = settings.clone();
        normalized.record_key = normalized.record_key.to_lowercase();
        *self.stored.lock().unwrap() = normalized;
        Ok(())
    }

    async fn reset(&self) -> Result<(), PersistenceError> {
        *self.stored.lock().unwrap() = Settings::default();
        Ok(())
    }
}

struct FixedRecorder;

impl AudioRecorder for FixedRecorder {
    fn start(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<AudioClip, CaptureError> {
        Ok(AudioClip::new(vec![0.2; 3_200]))
    }
}

#[derive(Clone, Default)]
struct RecordingCues {
    played: Arc<Mutex<Vec<String>>>,
}

impl CuePlayer for RecordingCues {
    fn play(&self, asset: &str) -> Result<(), CueError> {
        self.played.lock().unwrap().push(asset.to_owned());
        Ok(())
    }
}

struct EchoTranscriber {
    reply: Result<&'static str, u16>,
}

#[async_trait]
impl Transcriber for EchoTranscriber {
    async fn transcribe(
        &self,
        _clip: AudioClip,
        _options: TranscriptionOptions,
    ) -> Result<Transcript, TranscriptionError> {
        match self.reply {
            Ok(text) => Ok(Transcript::new(text, 0.2)),
            Err(status) => Err(TranscriptionError::Backend {
                status,
                detail: "unavailable".to_owned(),
            }),
        }
    }
}

/// Publishes `events`, waits for one outcome, then stops the controller
async fn drive_session(
    controller: RecordingController,
    hub: &KeyHub,
    events: Vec<KeyEvent>,
) -> SessionOutcome {
    let keys = hub.subscribe();
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async {
        for event in events {
            hub.publish(event);
        }
        let outcome = tokio::time::timeout(Duration::from_secs(5), outcome_rx.recv())
            .await
            .expect("no session outcome")
            .expect("outcome channel closed");
        let _ = stop_tx.send(());
        outcome
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };

    let ((), outcome) = tokio::join!(controller.run(keys, outcome_tx, shutdown), driver);
    outcome
}

#[tokio::test]
async fn test_dictation_uses_backend_confirmed_hotkey() {
    let store = SettingsStore::new(Arc::new(InMemoryBackend::default()));
    store.load().await.unwrap();

    let confirmed = store
        .update(Settings {
            record_key: "F8".to_owned(),
            ..Settings::default()
        })
        .await
        .unwrap();
    assert_eq!(confirmed.record_key, "f8");
    assert_eq!(store.current().unwrap().record_key, "f8");

    let mut buffer = TextBuffer::new("abcd");
    buffer.set_cursor(2);
    let buffer = buffer.shared();
    let cues = RecordingCues::default();
    let controller = RecordingController::new(
        store.subscribe(),
        Arc::clone(&buffer),
        Arc::new(EchoTranscriber { reply: Ok("hello") }),
        Box::new(FixedRecorder),
        Box::new(cues.clone()),
    );

    let hub = KeyHub::new();
    let outcome = drive_session(
        controller,
        &hub,
        vec![
            KeyEvent::down("a"),
            KeyEvent::up("a"),
            KeyEvent::down("f8"),
            KeyEvent::down("f8"),
            KeyEvent::up("f8"),
        ],
    )
    .await;

    let report = outcome.unwrap();
    assert_eq!(report.cursor, 7);
    let buffer = buffer.lock().unwrap();
    assert_eq!(buffer.text(), "abhellocd");
    assert_eq!(buffer.cursor(), 7);
    assert_eq!(*cues.played.lock().unwrap(), vec!["beep.mp3", "stop.mp3"]);
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test]
async fn test_reset_restores_default_hotkey() {
    let backend = Arc::new(InMemoryBackend::default());
    *backend.stored.lock().unwrap() = Settings {
        record_key: "alt".to_owned(),
        ..Settings::default()
    };
    let store = SettingsStore::new(backend);
    store.load().await.unwrap();
    assert_eq!(store.current().unwrap().record_key, "alt");

    let restored = store
        .reset(ResetConfirmation::acknowledge_history_loss())
        .await
        .unwrap();
    assert_eq!(restored, Settings::default());

    let buffer = TextBuffer::default().shared();
    let controller = RecordingController::new(
        store.subscribe(),
        Arc::clone(&buffer),
        Arc::new(EchoTranscriber { reply: Ok("reset works") }),
        Box::new(FixedRecorder),
        Box::new(RecordingCues::default()),
    );

    let hub = KeyHub::new();
    let outcome = drive_session(
        controller,
        &hub,
        vec![
            KeyEvent::down("alt"),
            KeyEvent::up("alt"),
            KeyEvent::down("ctrl"),
            KeyEvent::up("ctrl"),
        ],
    )
    .await;

    assert!(outcome.is_ok());
    assert_eq!(buffer.lock().unwrap().text(), "reset works");
}

#[tokio::test]
async fn test_backend_failure_is_reported_and_buffer_kept() {
    let store = SettingsStore::new(Arc::new(InMemoryBackend::default()));
    store.load().await.unwrap();

    let buffer = TextBuffer::new("draft").shared();
    let controller = RecordingController::new(
        store.subscribe(),
        Arc::clone(&buffer),
        Arc::new(EchoTranscriber { reply: Err(503) }),
        Box::new(FixedRecorder),
        Box::new(RecordingCues::default()),
    );

    let hub = KeyHub::new();
    let outcome = drive_session(
        controller,
        &hub,
        vec![KeyEvent::down("ctrl"), KeyEvent::up("ctrl")],
    )
    .await;

    assert!(matches!(
        outcome,
        Err(SessionError::Transcription(TranscriptionError::Backend { status: 503, .. }))
    ));
    assert_eq!(buffer.lock().unwrap().text(), "draft");
}
