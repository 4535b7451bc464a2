use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{extract::DEFAULT_PREVIEW_LENGTH, NoteError, Result};

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Root directory for everything the application stores
    pub data_dir: PathBuf,

    /// Primary note store (`{ "data": { "notes": ... } }`)
    pub store_file: PathBuf,

    /// Secondary locked-set store (`{ "<id>": true }`)
    pub locked_notes_file: PathBuf,

    /// Preferences such as theme and the lock password digest
    pub state_file: PathBuf,

    /// Root of asset storage (images, attachments)
    pub assets_dir: PathBuf,

    /// Where export bundles are written
    pub export_dir: PathBuf,

    /// Preview length in characters
    pub preview_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config::with_data_dir(default_data_dir())
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "notebox")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".notebox"))
}

impl Config {
    /// Lays every path out under `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Config {
            store_file: data_dir.join("notes").join("data.json"),
            locked_notes_file: data_dir.join("locked_notes.json"),
            state_file: data_dir.join("state.json"),
            assets_dir: data_dir.join("assets"),
            export_dir: data_dir.join("export"),
            preview_length: DEFAULT_PREVIEW_LENGTH,
            data_dir,
        }
    }

    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "notebox")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from(".notebox").join("config.json"))
    }

    /// Reads configuration from `path`, falling back to defaults when the
    /// file does not exist. A file that exists but cannot be parsed is an
    /// error: silently ignoring it could point the app at an empty store.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let raw = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| NoteError::ConfigError {
            message: format!("{}: {}", path.display(), e),
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::write_json_atomic(path, self, true)
    }

    /// Creates the directories the application writes into.
    pub fn ensure_directories(&self) -> Result<()> {
        let store_dir = self.store_file.parent().unwrap_or(&self.data_dir);
        for dir in [&self.data_dir, &store_dir.to_path_buf(), &self.assets_dir] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                fs::create_dir_all(dir).map_err(|_| NoteError::DirectoryError {
                    path: dir.to_path_buf(),
                })?;
            }
        }
        Ok(())
    }
}
