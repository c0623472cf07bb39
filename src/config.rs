//! Konfiguration
//!
//! Wird aus `config.json` im App-Konfigurationsverzeichnis geladen und
//! danach über Umgebungsvariablen überschrieben:
//! - Linux: `~/.config/agentic-call/config.json`
//! - macOS: `~/Library/Application Support/com.agentic.agentic-call/config.json`
//! - Windows: `%APPDATA%/agentic/agentic-call/config/config.json`
//!
//! | Variable | Feld |
//! |---|---|
//! | `AGENTIC_SIGNALING_URL` | `peer.server` |
//! | `AGENTIC_ID_PREFIX` | `id_prefix` |
//! | `AGENTIC_FFT_SIZE` | `media.fft_size` |
//! | `AGENTIC_LOG` | `log_filter` |

use crate::identity::{is_valid_prefix, DEFAULT_PREFIX};
use crate::media::{is_valid_fft_size, MediaSettings};
use crate::session::SessionConfig;
use crate::transport::PeerOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

// ============================================================================
// CONSTANTS
// ============================================================================

pub const ENV_SIGNALING_URL: &str = "AGENTIC_SIGNALING_URL";
pub const ENV_ID_PREFIX: &str = "AGENTIC_ID_PREFIX";
pub const ENV_FFT_SIZE: &str = "AGENTIC_FFT_SIZE";
pub const ENV_LOG: &str = "AGENTIC_LOG";

/// Standard-Filter für das Logging
pub const DEFAULT_LOG_FILTER: &str = "info,agentic_call=debug";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Präfix der generierten Agent-ID
    pub id_prefix: String,
    pub peer: PeerOptions,
    pub media: MediaSettings,
    /// `EnvFilter`-Direktiven
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_PREFIX.to_string(),
            peer: PeerOptions::default(),
            media: MediaSettings::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    /// Lädt die Konfiguration aus dem Standard-Pfad und der Umgebung
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(config_path().as_deref())
    }

    /// Wie `load`, aber mit explizitem Dateipfad
    ///
    /// Eine fehlende Datei ist kein Fehler.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {:?}", path);
                Self::from_file(path)?
            }
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Übernimmt Overrides aus der Umgebung
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_SIGNALING_URL) {
            self.peer.server = Url::parse(&value).map_err(|_| ConfigError::InvalidValue {
                key: ENV_SIGNALING_URL,
                value: value.clone(),
            })?;
        }

        if let Some(value) = lookup(ENV_ID_PREFIX) {
            self.id_prefix = value;
        }

        if let Some(value) = lookup(ENV_FFT_SIZE) {
            self.media.fft_size =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_FFT_SIZE,
                        value: value.clone(),
                    })?;
        }

        if let Some(value) = lookup(ENV_LOG) {
            self.log_filter = value;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_prefix(&self.id_prefix) {
            return Err(ConfigError::InvalidValue {
                key: "id_prefix",
                value: self.id_prefix.clone(),
            });
        }
        if !is_valid_fft_size(self.media.fft_size) {
            return Err(ConfigError::InvalidValue {
                key: "media.fft_size",
                value: self.media.fft_size.to_string(),
            });
        }
        if self.media.frame_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "media.frame_interval_ms",
                value: "0".to_string(),
            });
        }
        if self.peer.debug > 3 {
            return Err(ConfigError::InvalidValue {
                key: "peer.debug",
                value: self.peer.debug.to_string(),
            });
        }
        Ok(())
    }

    /// Konfiguration für den Session Controller
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            id_prefix: self.id_prefix.clone(),
            peer: self.peer.clone(),
        }
    }
}

/// Standard-Pfad der Konfigurationsdatei
pub fn config_path() -> Option<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "agentic", "agentic-call")?;
    Some(proj_dirs.config_dir().join("config.json"))
}

// ============================================================================
// TESTS
// ============================================================================
