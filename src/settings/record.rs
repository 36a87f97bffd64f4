use serde::{Deserialize, Serialize, Serializer};

/// Hotkey used when the backend has no value
pub const DEFAULT_RECORD_KEY: &str = "ctrl";
/// Speech-to-text model used when the backend has no value
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "gpt-4o-transcribe";
/// Formatting model used when the backend has no value
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
/// Cue played on entering `Recording` when the backend has no value
pub const DEFAULT_START_SOUND: &str = "beep.mp3";
/// Cue played on entering `Processing` when the backend has no value
pub const DEFAULT_END_SOUND: &str = "stop.mp3";

/// Language values that mean "let the backend detect it"
const AUTOMATIC_LANGUAGE: [&str; 2] = ["auto", "automatic"];

/// Wire value for automatic detection; the backend ignores `null` on save
pub const AUTOMATIC_LANGUAGE_CODE: &str = "automatic";

/// Sound played at a recording boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CueChoice {
    /// Play nothing
    None,
    /// Play the named sound asset
    Asset(String),
}

impl CueChoice {
    /// Asset name, or `None` when the cue is disabled
    #[must_use]
    pub fn asset(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Asset(name) => Some(name),
        }
    }
}

impl From<String> for CueChoice {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            Self::None
        } else {
            Self::Asset(trimmed.to_owned())
        }
    }
}

impl From<&str> for CueChoice {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<CueChoice> for String {
    fn from(value: CueChoice) -> Self {
        match value {
            CueChoice::None => "none".to_owned(),
            CueChoice::Asset(name) => name,
        }
    }
}

/// The single configuration record owned by the backend
///
/// Missing or `null` fields coming off the wire are replaced by the
/// documented defaults, so a partially populated record is still usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireSettings")]
pub struct Settings {
    /// Key whose press/release brackets a recording session
    pub record_key: String,
    /// Credential forwarded to the transcription backend
    pub openai_api_key: Option<String>,
    /// Speech-to-text model identifier
    pub transcription_model: String,
    /// Spoken language code; `None` means automatic detection
    #[serde(serialize_with = "serialize_language")]
    pub transcription_language: Option<String>,
    /// Model used by the backend to format the transcript
    pub llm_model: String,
    /// Cue played when recording starts
    pub start_sound: CueChoice,
    /// Cue played when recording stops
    pub end_sound: CueChoice,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            record_key: DEFAULT_RECORD_KEY.to_owned(),
            openai_api_key: None,
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_owned(),
            transcription_language: None,
            llm_model: DEFAULT_LLM_MODEL.to_owned(),
            start_sound: CueChoice::from(DEFAULT_START_SOUND),
            end_sound: CueChoice::from(DEFAULT_END_SOUND),
        }
    }
}

impl Settings {
    /// Configured hotkey, or `None` when it is blank
    #[must_use]
    pub fn hotkey(&self) -> Option<&str> {
        let key = self.record_key.trim();
        (!key.is_empty()).then_some(key)
    }

    /// Case-insensitive comparison of a key name against the hotkey
    ///
    /// A blank hotkey never matches anything.
    #[must_use]
    pub fn matches_hotkey(&self, key: &str) -> bool {
        self.hotkey()
            .is_some_and(|hotkey| hotkey.to_lowercase() == key.trim().to_lowercase())
    }

    /// Language hint for the backend, `None` for automatic detection
    #[must_use]
    pub fn language_hint(&self) -> Option<&str> {
        language_code(self.transcription_language.as_deref())
    }

    /// Whether a non-blank API key is set
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.openai_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

fn language_code(language: Option<&str>) -> Option<&str> {
    language.map(str::trim).filter(|lang| {
        !lang.is_empty()
            && !AUTOMATIC_LANGUAGE
                .iter()
                .any(|auto| lang.eq_ignore_ascii_case(auto))
    })
}

/// Writes automatic detection as `"automatic"`, never `null`
#[allow(clippy::ref_option)] // Signature fixed by `serialize_with`
fn serialize_language<S: Serializer>(
    language: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let code = language_code(language.as_deref()).unwrap_or(AUTOMATIC_LANGUAGE_CODE);
    serializer.serialize_str(code)
}

/// Lenient wire shape: every field optional, `null` tolerated
#[derive(Deserialize)]
struct WireSettings {
    #[serde(default)]
    record_key: Option<String>,
    #[serde(default)]
    openai_api_key: Option<String>,
    #[serde(default)]
    transcription_model: Option<String>,
    #[serde(default)]
    transcription_language: Option<String>,
    #[serde(default)]
    llm_model: Option<String>,
    #[serde(default)]
    start_sound: Option<String>,
    #[serde(default)]
    end_sound: Option<String>,
}

impl From<WireSettings> for Settings {
    fn from(wire: WireSettings) -> Self {
        let defaults = Self::default();
        Self {
            record_key: wire.record_key.unwrap_or(defaults.record_key),
            openai_api_key: wire.openai_api_key,
            transcription_model: wire
                .transcription_model
                .unwrap_or(defaults.transcription_model),
            transcription_language: wire.transcription_language,
            llm_model: wire.llm_model.unwrap_or(defaults.llm_model),
            start_sound: wire
                .start_sound
                .map_or(defaults.start_sound, CueChoice::from),
            end_sound: wire.end_sound.map_or(defaults.end_sound, CueChoice::from),
        }
    }
}
