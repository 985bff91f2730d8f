//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every section is `#[serde(default)]` so a partial `settings.toml` only
//! overrides what it names.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// LinkConfig
// ---------------------------------------------------------------------------

/// Settings for the duplex channel to the agent backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// WebSocket endpoint of the backend bus.
    pub url: String,
    /// Fixed delay before a reconnect attempt.  There is no backoff.
    pub reconnect_delay_ms: u64,
    /// Upper bound on one WebSocket handshake.  A timeout counts as a
    /// failed connect and schedules the usual retry.
    pub connect_timeout_ms: u64,
    /// Backend log level pushed as `system.config_update` on every open.
    pub log_level: String,
}

impl LinkConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".into(),
            reconnect_delay_ms: 5_000,
            connect_timeout_ms: 10_000,
            log_level: "INFO".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Presentation timing for completed narrative turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Display time granted per character of cleaned text.
    pub per_char_ms: u64,
    /// Lower bound of a turn's display time.
    pub min_ms: u64,
    /// Upper bound of a turn's display time.
    pub max_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            per_char_ms: 50,
            min_ms: 2_000,
            max_ms: 8_000,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamConfig
// ---------------------------------------------------------------------------

/// Streaming text reassembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Directive names recognised inside `[name:value]` tags.
    pub directives: Vec<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            directives: vec!["pose".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for TTS audio playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Head start given to the first chunk of a turn to absorb jitter.
    pub lookahead_ms: u64,
    /// Open the default output device.  When `false` (or when no device is
    /// available) playback runs against a simulated wall-clock device.
    pub use_device: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 100,
            use_device: true,
        }
    }
}

// ---------------------------------------------------------------------------
// BackendConfig
// ---------------------------------------------------------------------------

/// Request/response collaborator used for roster, history and global config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the HTTP API (no trailing slash).
    pub base_url: String,
    /// Retry delay while the backend reports it is still initializing.
    pub warmup_retry_ms: u64,
    /// Retry delay after a transport or HTTP failure.
    pub error_retry_ms: u64,
    /// Attempts per fetch before giving up.
    pub max_attempts: u32,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            warmup_retry_ms: 2_000,
            error_retry_ms: 3_000,
            max_attempts: 10,
            timeout_secs: 10,
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
/// use avatar_sync::config::AppConfig;
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
    /// Backend channel settings.
    pub link: LinkConfig,
    /// Turn presentation timing.
    pub speech: SpeechConfig,
    /// Streaming text settings.
    pub stream: StreamConfig,
    /// Audio playback settings.
    pub audio: AudioConfig,
    /// HTTP collaborator settings.
    pub backend: BackendConfig,
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
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        let default = AppConfig::default();

        assert_eq!(config.link.url, default.link.url);
        assert_eq!(config.speech.min_ms, default.speech.min_ms);
        assert_eq!(config.audio.lookahead_ms, default.audio.lookahead_ms);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.link.url, "ws://localhost:8000/ws");
        assert_eq!(cfg.link.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(cfg.link.connect_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.link.log_level, "INFO");
        assert_eq!(cfg.speech.per_char_ms, 50);
        assert_eq!(cfg.speech.min_ms, 2_000);
        assert_eq!(cfg.speech.max_ms, 8_000);
        assert_eq!(cfg.stream.directives, vec!["pose".to_string()]);
        assert_eq!(cfg.audio.lookahead_ms, 100);
        assert_eq!(cfg.backend.warmup_retry_ms, 2_000);
        assert_eq!(cfg.backend.error_retry_ms, 3_000);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.link.url = "ws://stage.local:9000/ws".into();
        cfg.link.reconnect_delay_ms = 1_500;
        cfg.speech.max_ms = 12_000;
        cfg.stream.directives = vec!["pose".into(), "emotion".into()];
        cfg.audio.use_device = false;
        cfg.backend.max_attempts = 3;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.link.url, "ws://stage.local:9000/ws");
        assert_eq!(loaded.link.reconnect_delay_ms, 1_500);
        assert_eq!(loaded.speech.max_ms, 12_000);
        assert_eq!(loaded.stream.directives.len(), 2);
        assert!(!loaded.audio.use_device);
        assert_eq!(loaded.backend.max_attempts, 3);
    }

    /// A file that only names one section keeps defaults for the rest.
    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[speech]\nper_char_ms = 80\n").expect("write");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.speech.per_char_ms, 80);
        assert_eq!(loaded.speech.min_ms, 2_000);
        assert_eq!(loaded.link.reconnect_delay_ms, 5_000);
    }
}
