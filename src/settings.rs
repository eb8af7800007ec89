//! Importer settings with persistence
//!
//! Settings are saved to `~/.config/mapsmodels/settings.toml`

use std::fs;
use std::path::{Path, PathBuf};

use mapsmodels_import::ImportPreferences;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// All importer settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub import: ImportPreferences,
    pub defaults: ImportDefaults,
}

/// Defaults for options that can also be given per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportDefaults {
    /// Draw calls to import (<= 0 for all)
    pub max_blocks: i64,
    /// Use the experimental extraction strategy
    pub experimental: bool,
}

impl Default for ImportDefaults {
    fn default() -> Self {
        Self {
            max_blocks: -1,
            experimental: false,
        }
    }
}

impl AppSettings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mapsmodels"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.toml"))
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            warn!("Could not determine config directory");
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No settings file found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(settings) => {
                    info!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse settings: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read settings file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let Some(path) = Self::settings_path() else {
            anyhow::bail!("Could not determine config directory");
        };
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            // Create config directory if it doesn't exist
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mapsmodels_core::GraphicsApi;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings::load_from(&dir.path().join("settings.toml"));
        assert_eq!(settings, AppSettings::default());
        assert!(settings.import.parallel);
        assert_eq!(settings.defaults.max_blocks, -1);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let mut settings = AppSettings::default();
        settings.import.expected_api = Some(GraphicsApi::Vulkan);
        settings.import.texture_cache_dir = Some(PathBuf::from("/tmp/tiles"));
        settings.defaults.max_blocks = 200;

        settings.save_to(&path).unwrap();
        assert_eq!(AppSettings::load_from(&path), settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[defaults]\nexperimental = true\n").unwrap();
        let settings = AppSettings::load_from(&path);
        assert!(settings.defaults.experimental);
        assert_eq!(settings.defaults.max_blocks, -1);
        assert!(settings.import.parallel);
    }

    #[test]
    fn broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "this is [not toml").unwrap();
        assert_eq!(AppSettings::load_from(&path), AppSettings::default());
    }
}
