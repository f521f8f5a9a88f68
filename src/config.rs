use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The persisted user preferences: a single flat JSON object.
///
/// Every field has a built-in default, applied per key, so a partially
/// written or corrupt settings file degrades to defaults instead of
/// failing the load.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Preferences {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_download_path")]
    pub download_path: PathBuf,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_auto_best_audio")]
    pub auto_best_audio: bool,
}

fn default_theme() -> String {
    "system".to_string()
}

fn default_download_path() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("./downloads"))
}

fn default_quality() -> String {
    "320 kbps (High)".to_string()
}

fn default_format() -> String {
    "mp3".to_string()
}

fn default_auto_best_audio() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            download_path: default_download_path(),
            quality: default_quality(),
            format: default_format(),
            auto_best_audio: default_auto_best_audio(),
        }
    }
}

/// Loads and persists [`Preferences`].
///
/// Reads never fail: an absent or unreadable file yields defaults. Writes
/// are best-effort: a failure is logged and the in-memory value stands.
#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    prefs: Preferences,
}

impl PreferenceStore {
    /// Open the store at the default per-user location
    /// (`<config_dir>/musicube/settings.json`).
    pub fn open_default() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("musicube")
            .join("settings.json");
        Self::open(path)
    }

    /// Open the store backed by `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let prefs = Self::read_file(&path);
        Self { path, prefs }
    }

    fn read_file(path: &Path) -> Preferences {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(prefs) => prefs,
                Err(e) => {
                    log::warn!("Settings file {:?} is corrupt ({}); using defaults", path, e);
                    Preferences::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Preferences::default(),
            Err(e) => {
                log::warn!("Failed to read settings file {:?} ({}); using defaults", path, e);
                Preferences::default()
            }
        }
    }

    pub fn get(&self) -> &Preferences {
        &self.prefs
    }

    /// Mutate the preferences and persist the whole file immediately.
    ///
    /// A write failure is logged, never raised; the in-memory update is
    /// kept either way.
    pub fn set(&mut self, update: impl FnOnce(&mut Preferences)) {
        update(&mut self.prefs);
        self.save();
    }

    fn save(&self) {
        if let Some(dir) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                log::warn!("Failed to create config directory {:?}: {}", dir, e);
                return;
            }
        }
        match serde_json::to_string_pretty(&self.prefs) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&self.path, content) {
                    log::warn!("Failed to save settings to {:?}: {}", self.path, e);
                }
            }
            Err(e) => log::warn!("Failed to serialize settings: {}", e),
        }
    }
}
