use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::bridge::ScreenSize;
use crate::sensing::SamplingConfig;

pub const SETTINGS_FILE: &str = "settings.json";
pub const DATA_DIR_ENV: &str = "DESKREPLAY_DATA_DIR";
const APP_DIR_NAME: &str = "deskreplay";
const FALLBACK_DATA_DIR: &str = "deskreplay-data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    pub min_step_delay_ms: u64,
    pub default_speed: f64,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            min_step_delay_ms: 100,
            default_speed: 1.0,
        }
    }
}

impl ReplaySettings {
    pub fn min_step_delay(&self) -> Duration {
        Duration::from_millis(self.min_step_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sampling: SamplingConfig,
    /// Used when the desktop cannot report its own size.
    pub screen: ScreenSize,
    pub replay: ReplaySettings,
    pub storage: StorageSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings in {}: {err}", path.display());
                Settings::default()
            })
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn in_data_dir(data_dir: &Path) -> Result<Self> {
        Self::new(data_dir.join(SETTINGS_FILE))
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Settings {
        self.read().clone()
    }

    /// Writes the current settings when no settings file exists yet, so there is one to edit.
    /// Returns whether a file was written.
    pub fn write_if_missing(&self) -> Result<bool> {
        let guard = self.write();
        if self.path.exists() {
            return Ok(false);
        }
        self.persist(&guard)?;
        Ok(true)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

/// `--data-dir`, then `$DESKREPLAY_DATA_DIR`, then the platform data dir, then `./deskreplay-data`.
pub fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    resolve_data_dir_from(
        flag,
        std::env::var_os(DATA_DIR_ENV).map(PathBuf::from),
        dirs::data_dir(),
    )
}

fn resolve_data_dir_from(
    flag: Option<PathBuf>,
    env: Option<PathBuf>,
    platform: Option<PathBuf>,
) -> PathBuf {
    flag.or(env.filter(|dir| !dir.as_os_str().is_empty()))
        .or_else(|| platform.map(|dir| dir.join(APP_DIR_NAME)))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
}
