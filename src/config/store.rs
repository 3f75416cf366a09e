//! Persisted settings seam.
//!
//! The coordinator reads the credential, voice and speed at the start of
//! every session and writes the speed back whenever the user changes it.
//! [`FileSettingsStore`] backs this with `settings.toml`;
//! [`MemorySettingsStore`] keeps everything in memory.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;

use super::{AppConfig, AppPaths};

/// Load/save access to the persisted [`AppConfig`].
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<AppConfig>;

    fn save(&self, config: &AppConfig) -> Result<()>;

    /// Read-modify-write helper.
    fn update(&self, apply: &mut dyn FnMut(&mut AppConfig)) -> Result<AppConfig> {
        let mut config = self.load()?;
        apply(&mut config);
        self.save(&config)?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// FileSettingsStore
// ---------------------------------------------------------------------------

/// `settings.toml` on disk.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform default location.
    pub fn default_location() -> Self {
        Self::new(AppPaths::new().settings_file)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<AppConfig> {
        AppConfig::load_from(&self.path)
    }

    fn save(&self, config: &AppConfig) -> Result<()> {
        config.save_to(&self.path)
    }
}

// ---------------------------------------------------------------------------
// MemorySettingsStore
// ---------------------------------------------------------------------------

/// In-memory store, used when nothing should touch the user's config file.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    config: Mutex<AppConfig>,
}

impl MemorySettingsStore {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<AppConfig> {
        let guard = self.config.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }

    fn save(&self, config: &AppConfig) -> Result<()> {
        let mut guard = self.config.lock().unwrap_or_else(|e| e.into_inner());
        *guard = config.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_update_persists() {
        let dir = tempdir().expect("temp dir");
        let store = FileSettingsStore::new(dir.path().join("nested").join("settings.toml"));

        let updated = store
            .update(&mut |cfg| cfg.playback.speed = 1.75)
            .expect("update");
        assert_eq!(updated.playback.speed, 1.75);

        let reloaded = store.load().expect("load");
        assert_eq!(reloaded.playback.speed, 1.75);
        assert!(store.path().exists());
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemorySettingsStore::default();
        assert!(store.load().unwrap().synthesis.api_key.is_none());

        store
            .update(&mut |cfg| cfg.synthesis.api_key = Some("secret".into()))
            .unwrap();
        assert_eq!(
            store.load().unwrap().synthesis.credential(),
            Some("secret")
        );
    }
}
