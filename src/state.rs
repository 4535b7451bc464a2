use std::{fs, path::Path};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{write_json_atomic, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Auto,
    Light,
    Dark,
}

impl ThemeMode {
    pub fn from_name(name: &str) -> Option<ThemeMode> {
        match name.to_ascii_lowercase().as_str() {
            "auto" => Some(ThemeMode::Auto),
            "light" => Some(ThemeMode::Light),
            "dark" => Some(ThemeMode::Dark),
            _ => None,
        }
    }
}

/// Process-wide preferences, read at startup and written back on change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    pub theme_mode: ThemeMode,
    /// SHA-256 hex digest of the note lock password, once one is set
    pub shared_secret_hash: Option<String>,
}

impl AppState {
    /// Reads state from `path`; a missing or unreadable file gives defaults.
    pub fn load(path: &Path) -> AppState {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("No application state at {}", path.display());
                return AppState::default();
            }
        };
        serde_json::from_slice(&raw).unwrap_or_else(|e| {
            warn!("Ignoring unreadable application state {}: {}", path.display(), e);
            AppState::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self, true)
    }

    pub fn has_shared_secret(&self) -> bool {
        self.shared_secret_hash.is_some()
    }
}
