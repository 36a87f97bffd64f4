use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::audio::AudioClip;
use crate::settings::Settings;

/// Errors that can occur during transcription
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The clip could not be prepared for upload
    #[error("failed to prepare audio for upload: {0}")]
    Payload(String),

    /// The endpoint could not be reached
    #[error("transcription request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status
    #[error("transcription backend returned {status}: {detail}")]
    Backend {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        detail: String,
    },

    /// The backend answered with something other than a transcript
    #[error("malformed transcription response: {0}")]
    Malformed(String),
}

/// Model selection sent along with the audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionOptions {
    /// Speech-to-text model
    pub model: String,
    /// Spoken language, `None` for automatic detection
    pub language: Option<String>,
    /// Model used to format the transcript
    pub llm_model: String,
    /// Bearer credential
    pub api_key: Option<String>,
}

impl TranscriptionOptions {
    /// Options taken from the settings record at release time
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model: settings.transcription_model.clone(),
            language: settings.language_hint().map(str::to_owned),
            llm_model: settings.llm_model.clone(),
            api_key: settings
                .has_api_key()
                .then(|| settings.openai_api_key.clone())
                .flatten(),
        }
    }
}

/// Recognized text returned by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Text to insert
    pub text: String,
    /// Length of the recognized audio in seconds
    pub duration_secs: f64,
    /// Number of words in `text`
    pub word_count: usize,
}

impl Transcript {
    /// Transcript whose word count is derived from `text`
    #[must_use]
    pub fn new(text: impl Into<String>, duration_secs: f64) -> Self {
        let text = text.into();
        let word_count = count_words(&text);
        Self {
            text,
            duration_secs,
            word_count,
        }
    }
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Speech-to-text round trip
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes a recorded clip
    ///
    /// # Errors
    /// Returns error if the backend fails or answers with malformed data
    async fn transcribe(
        &self,
        clip: AudioClip,
        options: TranscriptionOptions,
    ) -> Result<Transcript, TranscriptionError>;
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    word_count: Option<usize>,
}

/// `Transcriber` backed by the HTTP transcription endpoint
pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
}

impl HttpTranscriber {
    /// Creates a client for `<base_url>/transcribe`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            url: format!("{}/transcribe", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        clip: AudioClip,
        options: TranscriptionOptions,
    ) -> Result<Transcript, TranscriptionError> {
        let wav = clip
            .to_wav_bytes()
            .map_err(|e| TranscriptionError::Payload(e.to_string()))?;

        tracing::info!(
            url = %self.url,
            model = %options.model,
            language = ?options.language,
            audio_secs = clip.duration_secs(),
            payload_bytes = wav.len(),
            "uploading recording"
        );

        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscriptionError::Payload(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", options.model.clone())
            .text("llm_model", options.llm_model.clone());
        if let Some(language) = options.language.clone() {
            form = form.text("language", language);
        }

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &options.api_key {
            request = request.bearer_auth(key);
        }

        let start = std::time::Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_owned());
            return Err(TranscriptionError::Backend {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;
        let transcript = parse_response(&body, clip.duration_secs())?;

        tracing::info!(
            words = transcript.word_count,
            round_trip_ms = start.elapsed().as_millis(),
            "transcription completed"
        );
        Ok(transcript)
    }
}

/// Parses the backend body, filling gaps from the recorded clip
fn parse_response(body: &str, clip_secs: f64) -> Result<Transcript, TranscriptionError> {
    let response: TranscriptionResponse =
        serde_json::from_str(body).map_err(|e| TranscriptionError::Malformed(e.to_string()))?;

    let word_count = response
        .word_count
        .unwrap_or_else(|| count_words(&response.text));
    Ok(Transcript {
        duration_secs: response.duration.unwrap_or(clip_secs),
        word_count,
        text: response.text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve_once;

    #[test]
    fn test_parse_full_response() {
        let body = r#"{"text": "hello there", "duration": 1.5, "word_count": 2}"#;
        let transcript = parse_response(body, 9.0).unwrap();
        assert_eq!(transcript.text, "hello there");
        assert!((transcript.duration_secs - 1.5).abs() < f64::EPSILON);
        assert_eq!(transcript.word_count, 2);
    }

    #[test]
    fn test_parse_fills_missing_fields() {
        let transcript = parse_response(r#"{"text": "one two three"}"#, 2.25).unwrap();
        assert_eq!(transcript.word_count, 3);
        assert!((transcript.duration_secs - 2.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_rejects_missing_text() {
        let result = parse_response(r#"{"detail": "quota exceeded"}"#, 1.0);
        assert!(matches!(result, Err(TranscriptionError::Malformed(_))));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_response("<html>502</html>", 1.0),
            Err(TranscriptionError::Malformed(_))
        ));
    }

    #[test]
    fn test_options_from_settings() {
        let settings = Settings {
            transcription_language: Some("automatic".to_owned()),
            openai_api_key: Some(" ".to_owned()),
            ..Settings::default()
        };
        let options = TranscriptionOptions::from_settings(&settings);
        assert_eq!(options.model, "gpt-4o-transcribe");
        assert_eq!(options.llm_model, "gpt-4o-mini");
        assert_eq!(options.language, None);
        assert_eq!(options.api_key, None);

        let settings = Settings {
            transcription_language: Some("de".to_owned()),
            openai_api_key: Some("sk-1".to_owned()),
            ..Settings::default()
        };
        let options = TranscriptionOptions::from_settings(&settings);
        assert_eq!(options.language.as_deref(), Some("de"));
        assert_eq!(options.api_key.as_deref(), Some("sk-1"));
    }

    #[test]
    fn test_transcript_counts_words() {
        assert_eq!(Transcript::new("  hello   world \n again", 1.0).word_count, 3);
        assert_eq!(Transcript::new("", 0.0).word_count, 0);
    }

    fn options(api_key: Option<&str>, language: Option<&str>) -> TranscriptionOptions {
        TranscriptionOptions {
            model: "gpt-4o-transcribe".to_owned(),
            language: language.map(str::to_owned),
            llm_model: "gpt-4o-mini".to_owned(),
            api_key: api_key.map(str::to_owned),
        }
    }

    fn transcriber_for(base_url: &str) -> HttpTranscriber {
        HttpTranscriber::new(base_url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_form_with_bearer() {
        let (base_url, server) =
            serve_once(200, r#"{"text": "hallo welt", "duration": 0.4}"#).await;

        let transcript = transcriber_for(&base_url)
            .transcribe(AudioClip::new(vec![0.1; 1_600]), options(Some("sk-1"), Some("de")))
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert_eq!(request.request_line(), "POST /api/transcribe HTTP/1.1");
        assert_eq!(request.header("authorization"), Some("Bearer sk-1"));
        assert!(request
            .header("content-type")
            .is_some_and(|value| value.starts_with("multipart/form-data; boundary=")));

        let body = request.body_text();
        assert!(body.contains(r#"name="file"; filename="recording.wav""#));
        assert!(body.contains("audio/wav"));
        assert!(body.contains("RIFF"));
        assert!(body.contains("name=\"model\"\r\n\r\ngpt-4o-transcribe"));
        assert!(body.contains("name=\"llm_model\"\r\n\r\ngpt-4o-mini"));
        assert!(body.contains("name=\"language\"\r\n\r\nde"));

        assert_eq!(transcript.text, "hallo welt");
        assert_eq!(transcript.word_count, 2);
    }

    #[tokio::test]
    async fn test_upload_without_key_or_language() {
        let (base_url, server) = serve_once(200, r#"{"text": "hello"}"#).await;

        transcriber_for(&base_url)
            .transcribe(AudioClip::new(vec![0.1; 1_600]), options(None, None))
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert_eq!(request.header("authorization"), None);
        let body = request.body_text();
        assert!(!body.contains(r#"name="language""#));
        assert!(body.contains(r#"name="model""#));
    }

    #[tokio::test]
    async fn test_blank_key_from_settings_sends_no_header() {
        let (base_url, server) = serve_once(200, r#"{"text": "hello"}"#).await;
        let settings = Settings {
            openai_api_key: Some("   ".to_owned()),
            ..Settings::default()
        };

        transcriber_for(&base_url)
            .transcribe(
                AudioClip::new(vec![0.1; 160]),
                TranscriptionOptions::from_settings(&settings),
            )
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert_eq!(request.header("authorization"), None);
    }

    #[tokio::test]
    async fn test_error_status_is_backend_error() {
        let (base_url, server) = serve_once(503, r#"{"detail": "model overloaded"}"#).await;

        let err = transcriber_for(&base_url)
            .transcribe(AudioClip::new(vec![0.1; 160]), options(Some("sk-1"), None))
            .await
            .unwrap_err();
        server.await.unwrap();

        match err {
            TranscriptionError::Backend { status, detail } => {
                assert_eq!(status, 503);
                assert!(detail.contains("model overloaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore = "depends on port 9 being closed on the host"]
    async fn test_unreachable_backend_is_request_error() {
        let options = TranscriptionOptions::from_settings(&Settings::default());
        let result = transcriber_for("http://127.0.0.1:9/api")
            .transcribe(AudioClip::new(vec![0.0; 160]), options)
            .await;
        assert!(matches!(result, Err(TranscriptionError::Request(_))));
    }
}
