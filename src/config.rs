// src/config.rs

use crate::types::{Config, StorageConfig};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from a YAML file. A missing file is not an error;
    /// every setting has a default, so an absent config runs the stock setup.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

impl StorageConfig {
    pub fn backgrounds_dir(&self) -> PathBuf {
        Path::new(&self.root).join("backgrounds")
    }

    pub fn media_dir(&self) -> PathBuf {
        Path::new(&self.root).join("media")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load(Path::new("/nonexistent/config.yaml")).unwrap();
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.capture.height, 480);
        assert_eq!(config.detection.min_moving_frames, 5);
        assert_eq!(config.detection.min_area, 5000.0);
        assert_eq!(config.detection.max_silent_frames, 20);
        assert_eq!(config.storage.file_prefix, "cat");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "capture:\n  crop_top: 0.25\ndetection:\n  min_area: 1200\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.capture.crop_top, 0.25);
        assert_eq!(config.detection.min_area, 1200.0);
        // untouched sections fall back to defaults
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.detection.max_silent_frames, 20);
    }

    #[test]
    fn test_storage_paths() {
        let storage = StorageConfig {
            root: "/var/lib/flapwatch".to_string(),
            file_prefix: "cat".to_string(),
        };
        assert_eq!(
            storage.backgrounds_dir(),
            PathBuf::from("/var/lib/flapwatch/backgrounds")
        );
        assert_eq!(storage.media_dir(), PathBuf::from("/var/lib/flapwatch/media"));
    }
}
