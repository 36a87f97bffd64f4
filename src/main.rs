use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

use holdtype::audio::{CpalCuePlayer, CpalRecorder};
use holdtype::config::Config;
use holdtype::input::{generate_text_preview, KeyHub, TextBuffer};
use holdtype::recording::{RecordingController, SessionError, SessionOutcome};
use holdtype::settings::{HttpSettingsApi, SettingsStore};
use holdtype::telemetry;
use holdtype::transcription::HttpTranscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    println!("✓ Config loaded from ~/.holdtype.toml");

    telemetry::init(&config.telemetry)?;
    tracing::info!("holdtype starting");

    // Settings
    let api = HttpSettingsApi::new(&config.backend.base_url, config.backend.request_timeout())?;
    let store = Arc::new(SettingsStore::new(Arc::new(api)));
    match store.load().await {
        Ok(settings) => {
            println!("✓ Settings loaded (hotkey: {})", settings.record_key);
            if !store.api_key_configured() {
                tracing::warn!("no API key configured, transcription requests may be rejected");
            }
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "initial settings load failed, hotkey inactive until the backend answers"
            );
            println!("⚠ Settings unavailable: {e}");
        }
    }

    if let Some(interval) = config.backend.settings_refresh() {
        tokio::spawn(refresh_settings(Arc::clone(&store), interval));
    }

    // Audio and transcription
    let transcriber =
        HttpTranscriber::new(&config.backend.base_url, config.backend.request_timeout())?;
    let recorder = CpalRecorder::new().context("failed to initialize audio capture")?;
    let cues = CpalCuePlayer::new(Config::expand_path(&config.cues.assets_dir)?);
    println!("✓ Audio initialized");

    let buffer = TextBuffer::default().shared();
    let controller = RecordingController::new(
        store.subscribe(),
        Arc::clone(&buffer),
        Arc::new(transcriber),
        Box::new(recorder),
        Box::new(cues),
    )
    .with_processing_timeout(config.session.processing_timeout());

    let keys = KeyHub::global()?.subscribe();
    println!("✓ Listening for global key events");

    let (outcomes, outcome_rx) = mpsc::unbounded_channel();
    tokio::spawn(report_outcomes(outcome_rx));

    tracing::info!("event loop starting (press Ctrl+C to exit)");
    println!("\nHoldtype is running. Hold the hotkey to dictate.");
    println!("Press Ctrl+C to exit.\n");

    // The controller owns the cpal stream, which is not Send, so it runs
    // on the main task instead of being spawned
    controller
        .run(keys, outcomes, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await;

    println!("\nShutting down...");
    let text = buffer
        .lock()
        .map(|buffer| buffer.text().to_owned())
        .unwrap_or_default();
    tracing::info!(chars = text.chars().count(), "final buffer");
    Ok(())
}

async fn refresh_settings(store: Arc<SettingsStore>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    // First tick fires immediately; the initial load already happened
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = store.load().await {
            tracing::debug!(error = %e, "background settings refresh failed");
        }
    }
}

async fn report_outcomes(mut outcomes: mpsc::UnboundedReceiver<SessionOutcome>) {
    while let Some(outcome) = outcomes.recv().await {
        match outcome {
            Ok(report) => println!(
                "✓ Inserted {} words: {}",
                report.transcript.word_count,
                generate_text_preview(&report.transcript.text)
            ),
            Err(SessionError::NoAudio) => println!("⚠ No audio captured"),
            Err(e) => println!("✗ {e}"),
        }
    }
}
