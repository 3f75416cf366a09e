//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Voice used when the user has not picked one.
pub const DEFAULT_VOICE_ID: &str = "DYkrAHD8iwork3YSUBbs";

/// Slowest playback speed accepted from the user.
pub const MIN_SPEED: f32 = 0.5;
/// Fastest playback speed accepted from the user.
pub const MAX_SPEED: f32 = 2.0;

/// Clamp a user-supplied speed multiplier into `[MIN_SPEED, MAX_SPEED]`.
///
/// Non-finite input falls back to normal speed.
///
/// ```
/// use read_aloud::config::clamp_speed;
///
/// assert_eq!(clamp_speed(1.25), 1.25);
/// assert_eq!(clamp_speed(9.0), 2.0);
/// assert_eq!(clamp_speed(f32::NAN), 1.0);
/// ```
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        1.0
    }
}

// ---------------------------------------------------------------------------
// FailurePolicy
// ---------------------------------------------------------------------------

/// What a session does when a segment's audio cannot be decoded or played.
///
/// Synthesis (network) failures always end the session; this policy only
/// covers the local decode/output step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// End the session in `Failed` and discard the remaining segments.
    Abort,
    /// Log the failure and continue with the next segment.
    Skip,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::Abort
    }
}

// ---------------------------------------------------------------------------
// SynthesisConfig
// ---------------------------------------------------------------------------

/// Settings for the remote speech-synthesis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Base URL of the API endpoint (no trailing slash).
    pub base_url: String,
    /// API key sent as `xi-api-key`.  `None` until the user configures one;
    /// reading cannot start without it.
    pub api_key: Option<String>,
    /// Voice identifier appended to the synthesis URL.
    pub voice_id: String,
    /// Synthesis model identifier.
    pub model_id: String,
    /// Voice stability (0.0 – 1.0).
    pub stability: f32,
    /// Similarity boost (0.0 – 1.0).
    pub similarity_boost: f32,
    /// Maximum seconds to wait for one synthesis response.
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".into(),
            api_key: None,
            voice_id: DEFAULT_VOICE_ID.into(),
            model_id: "eleven_monolingual_v1".into(),
            stability: 0.5,
            similarity_boost: 0.75,
            timeout_secs: 30,
        }
    }
}

impl SynthesisConfig {
    /// The configured API key, treating an empty or blank string as absent.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Settings for segmenting and playing text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Playback speed multiplier (1.0 = normal).
    pub speed: f32,
    /// Maximum characters per synthesized segment.
    pub max_segment_chars: usize,
    /// Behaviour on decode/output failure.
    pub failure_policy: FailurePolicy,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            max_segment_chars: crate::chunk::DEFAULT_MAX_SEGMENT_CHARS,
            failure_policy: FailurePolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// CoordinatorConfig
// ---------------------------------------------------------------------------

/// Timing knobs for the process coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// How long a reachability probe may take before the context is
    /// considered unprovisioned.
    pub probe_timeout_ms: u64,
    /// Pause after installing reader machinery into a context.
    pub settle_delay_ms: u64,
    /// How long to wait for a previous owner to acknowledge `stop`.
    pub stop_ack_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 250,
            settle_delay_ms: 100,
            stop_ack_timeout_ms: 1_000,
        }
    }
}

impl CoordinatorConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn stop_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_ack_timeout_ms)
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
/// use read_aloud::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let mut config = AppConfig::load().unwrap();
///
/// config.synthesis.api_key = Some("sk-...".into());
/// config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote synthesis settings.
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    /// Segmenting / playback settings.
    #[serde(default)]
    pub playback: PlaybackConfig,
    /// Coordinator timing.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
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

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");

        assert_eq!(config.synthesis.voice_id, DEFAULT_VOICE_ID);
        assert!(config.synthesis.api_key.is_none());
        assert_eq!(config.playback.speed, 1.0);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.synthesis.base_url, "https://api.elevenlabs.io");
        assert_eq!(cfg.synthesis.model_id, "eleven_monolingual_v1");
        assert_eq!(cfg.synthesis.stability, 0.5);
        assert_eq!(cfg.synthesis.similarity_boost, 0.75);
        assert_eq!(cfg.playback.max_segment_chars, 4_000);
        assert_eq!(cfg.playback.failure_policy, FailurePolicy::Abort);
        assert_eq!(cfg.coordinator.settle_delay_ms, 100);
    }

    /// Verify that modified non-default values survive a round trip.
    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.synthesis.api_key = Some("xi-test".into());
        cfg.synthesis.voice_id = "voice-42".into();
        cfg.playback.speed = 1.5;
        cfg.playback.failure_policy = FailurePolicy::Skip;
        cfg.coordinator.probe_timeout_ms = 50;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.synthesis.api_key.as_deref(), Some("xi-test"));
        assert_eq!(loaded.synthesis.voice_id, "voice-42");
        assert_eq!(loaded.playback.speed, 1.5);
        assert_eq!(loaded.playback.failure_policy, FailurePolicy::Skip);
        assert_eq!(loaded.coordinator.probe_timeout_ms, 50);
    }

    /// A file holding only the key the user typed in still loads.
    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[synthesis]\nbase_url = \"http://localhost:9\"\napi_key = \"k\"\nvoice_id = \"v\"\nmodel_id = \"m\"\nstability = 0.1\nsimilarity_boost = 0.2\ntimeout_secs = 5\n")
            .expect("write");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(loaded.synthesis.credential(), Some("k"));
        assert_eq!(loaded.playback.speed, 1.0);
        assert_eq!(loaded.coordinator.stop_ack_timeout_ms, 1_000);
    }

    #[test]
    fn blank_api_key_is_not_a_credential() {
        let mut cfg = SynthesisConfig::default();
        assert_eq!(cfg.credential(), None);

        cfg.api_key = Some("   ".into());
        assert_eq!(cfg.credential(), None);

        cfg.api_key = Some(" abc ".into());
        assert_eq!(cfg.credential(), Some("abc"));
    }

    #[test]
    fn speed_is_clamped() {
        assert_eq!(clamp_speed(0.1), MIN_SPEED);
        assert_eq!(clamp_speed(3.0), MAX_SPEED);
        assert_eq!(clamp_speed(f32::INFINITY), 1.0);
    }
}
