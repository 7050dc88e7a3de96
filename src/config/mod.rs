// Configuration management for melodytail
// Handles loading/saving settings, with sensible defaults when config is missing

use anyhow::Result;
use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::catalog::client::DEFAULT_BASE_URL;
use crate::playback::state::DEFAULT_VOLUME;

/// Environment override for the catalog client id.
pub const CLIENT_ID_ENV: &str = "JAMENDO_CLIENT_ID";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub playback: PlaybackConfig,
    pub library: LibraryConfig,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub client_id: String,
    pub base_url: String,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub default_volume: f32,
    pub ready_timeout_ms: u64,
    pub prefetch_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub liked_tracks_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            playback: PlaybackConfig::default(),
            library: LibraryConfig::default(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: 20,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: DEFAULT_VOLUME,
            ready_timeout_ms: 1000,
            prefetch_threshold: 5,
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let data_dir = data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("melodytail");

        Self {
            liked_tracks_path: data_dir.join("liked-tracks.json"),
        }
    }
}

impl PlaybackConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

impl Config {
    /// Load from the default location, writing defaults there on first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            if let Err(e) = config.save_to(config_path) {
                warn!(path = %config_path.display(), error = %e, "Could not write default config");
            } else {
                info!(path = %config_path.display(), "Wrote default config");
            }
            config
        };

        if let Ok(client_id) = std::env::var(CLIENT_ID_ENV) {
            if !client_id.trim().is_empty() {
                config.catalog.client_id = client_id.trim().to_string();
            }
        }
        config.sanitize();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content)?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("melodytail");

        Ok(config_dir.join("config.toml"))
    }

    // hand-edited files can carry nonsense; pull it back into range
    fn sanitize(&mut self) {
        if self.catalog.page_size == 0 {
            self.catalog.page_size = CatalogConfig::default().page_size;
        }
        let volume = self.playback.default_volume;
        self.playback.default_volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { DEFAULT_VOLUME };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.catalog.page_size, 20);
        assert_eq!(config.playback.prefetch_threshold, 5);
        assert_eq!(config.playback.ready_timeout(), Duration::from_millis(1000));
        assert!(path.exists());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[playback]\ndefault_volume = 3.5\n\n[catalog]\npage_size = 0\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.playback.default_volume, 1.0);
        assert_eq!(config.catalog.page_size, 20);
        assert_eq!(config.catalog.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.playback.prefetch_threshold = 8;
        config.library.liked_tracks_path = dir.path().join("liked.json");
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.playback.prefetch_threshold, 8);
        assert_eq!(loaded.library.liked_tracks_path, dir.path().join("liked.json"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "catalog = [not valid").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
