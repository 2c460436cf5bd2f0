//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Environment variable consulted when `assistant.api_key` is not set.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

// ---------------------------------------------------------------------------
// AssistantConfig
// ---------------------------------------------------------------------------

/// Settings for the generative backend that performs search, rewriting and
/// speech synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Base URL of the `generateContent` API, without a trailing slash.
    pub base_url: String,
    /// API key.  `None` means read [`API_KEY_ENV`] at startup.
    pub api_key: Option<String>,
    /// Model used for grounded search and the query rewrites.
    pub text_model: String,
    /// Model used for text-to-speech.
    pub speech_model: String,
    /// Prebuilt voice name passed to the speech model.
    pub voice: String,
    /// Maximum seconds to wait for any single backend call.
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key: None,
            text_model: "gemini-2.5-flash".into(),
            speech_model: "gemini-2.5-flash-preview-tts".into(),
            voice: "Kore".into(),
            timeout_secs: 60,
        }
    }
}

impl AssistantConfig {
    /// The configured key, or the value of [`API_KEY_ENV`].
    ///
    /// Empty strings are treated as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }
}

// ---------------------------------------------------------------------------
// FlowConfig
// ---------------------------------------------------------------------------

/// Tunables for the search flow state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// How long the Analyzing phase stays visible, in milliseconds.
    pub analyze_delay_ms: u64,
    /// Number of completed searches kept in the history.
    pub history_capacity: usize,
    /// Query used when the random-topic request yields nothing.
    pub random_fallback_query: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            analyze_delay_ms: 600,
            history_capacity: 20,
            random_fallback_query: "interesting facts about the universe".into(),
        }
    }
}

impl FlowConfig {
    pub fn analyze_delay(&self) -> Duration {
        Duration::from_millis(self.analyze_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Format of the PCM audio returned by the speech model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz of the speech payload.
    pub sample_rate: u32,
    /// Interleaved channel count of the speech payload.
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_search::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend connection settings.
    pub assistant: AssistantConfig,
    /// Search flow settings.
    pub flow: FlowConfig,
    /// Speech payload format.
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.assistant.base_url, loaded.assistant.base_url);
        assert_eq!(original.assistant.api_key, loaded.assistant.api_key);
        assert_eq!(original.assistant.text_model, loaded.assistant.text_model);
        assert_eq!(original.assistant.speech_model, loaded.assistant.speech_model);
        assert_eq!(original.assistant.voice, loaded.assistant.voice);
        assert_eq!(original.flow.analyze_delay_ms, loaded.flow.analyze_delay_ms);
        assert_eq!(original.flow.history_capacity, loaded.flow.history_capacity);
        assert_eq!(original.audio.sample_rate, loaded.audio.sample_rate);
        assert_eq!(original.audio.channels, loaded.audio.channels);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.flow.history_capacity, 20);
        assert_eq!(config.audio.sample_rate, 24_000);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.flow.analyze_delay(), Duration::from_millis(600));
        assert_eq!(cfg.flow.history_capacity, 20);
        assert_eq!(cfg.audio.sample_rate, 24_000);
        assert_eq!(cfg.audio.channels, 1);
        assert_eq!(cfg.assistant.text_model, "gemini-2.5-flash");
        assert!(cfg.assistant.api_key.is_none());
    }

    /// Sections omitted from the file fall back to their defaults.
    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[flow]\nanalyze_delay_ms = 0\n").expect("write");

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.flow.analyze_delay_ms, 0);
        assert_eq!(cfg.flow.history_capacity, 20);
        assert_eq!(cfg.assistant.voice, "Kore");
    }

    #[test]
    fn configured_api_key_wins_over_environment() {
        let mut cfg = AssistantConfig::default();
        cfg.api_key = Some("from-file".into());
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("from-file"));
    }
}
