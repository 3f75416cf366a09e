//! Configuration module for read-aloud.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform directories, TOML persistence via
//! `AppConfig::load` / `AppConfig::save`, and the [`SettingsStore`] seam the
//! coordinator reads credentials and speed through.

pub mod paths;
pub mod settings;
pub mod store;

pub use paths::AppPaths;
pub use settings::{
    clamp_speed, AppConfig, CoordinatorConfig, FailurePolicy, PlaybackConfig, SynthesisConfig,
    DEFAULT_VOICE_ID, MAX_SPEED, MIN_SPEED,
};
pub use store::{FileSettingsStore, MemorySettingsStore, SettingsStore};
