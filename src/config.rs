use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG: &str = r#"[backend]
base_url = "http://127.0.0.1:5000/api"
request_timeout_secs = 60
settings_refresh_secs = 30

[session]
processing_timeout_secs = 30

[cues]
assets_dir = "~/.holdtype/sounds"

[telemetry]
enabled = true
log_path = "~/.holdtype/holdtype.log"
filter = "info"
"#;

/// Local application configuration (`~/.holdtype.toml`)
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub cues: CueConfig,
    pub telemetry: TelemetryConfig,
}

/// Where the settings and transcription endpoints live
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Interval between background settings reloads, 0 disables them
    pub settings_refresh_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000/api".to_owned(),
            request_timeout_secs: 60,
            settings_refresh_secs: 30,
        }
    }
}

impl BackendConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn settings_refresh(&self) -> Option<Duration> {
        if self.settings_refresh_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.settings_refresh_secs))
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub processing_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            processing_timeout_secs: 30,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CueConfig {
    pub assets_dir: String,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            assets_dir: "~/.holdtype/sounds".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log to `log_path` instead of stdout
    pub enabled: bool,
    pub log_path: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: "~/.holdtype/holdtype.log".to_owned(),
            filter: "info".to_owned(),
        }
    }
}

impl Config {
    /// Load config from ~/.holdtype.toml, writing the default file first if missing
    ///
    /// # Errors
    /// Returns error if HOME is unset or the file cannot be read or parsed
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        Self::load_from(&config_path)
    }

    /// Load config from an explicit path
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        toml::from_str(&contents).context("failed to parse config TOML")
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".holdtype.toml"))
    }

    fn create_default(path: &Path) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        Ok(())
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if the path starts with `~/` and HOME is unset
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}
