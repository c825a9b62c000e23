//! Editor configuration, persisted as TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::io::ExportFormat;
use crate::{log_info, log_warn};

const SETTINGS_FILE: &str = "photofe.toml";

/// Per-user folders the editor writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppDir {
    /// Settings. Roams on Windows.
    Config,
    /// Session logs and other disposable state.
    Data,
}

/// Resolve the PhotoFE folder of `kind` for the current user.
///
/// Linux follows XDG (`~/.config/photofe`, `~/.local/share/photofe`).
/// macOS keeps both under `~/Library/Application Support/PhotoFE`.
/// Windows splits them between `%APPDATA%` and `%LOCALAPPDATA%`.
/// `None` when the environment names no home folder at all.
pub fn app_dir(kind: AppDir) -> Option<PathBuf> {
    let var = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);

    if cfg!(target_os = "windows") {
        let base = match kind {
            AppDir::Config => var("APPDATA"),
            AppDir::Data => var("LOCALAPPDATA").or_else(|| var("APPDATA")),
        };
        return base.or_else(|| var("USERPROFILE")).map(|b| b.join("PhotoFE"));
    }
    if cfg!(target_os = "macos") {
        return var("HOME").map(|h| h.join("Library").join("Application Support").join("PhotoFE"));
    }
    let base = match kind {
        AppDir::Config => var("XDG_CONFIG_HOME").or_else(|| var("HOME").map(|h| h.join(".config"))),
        AppDir::Data => var("XDG_DATA_HOME").or_else(|| var("HOME").map(|h| h.join(".local").join("share"))),
    };
    base.map(|b| b.join("photofe"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Number of snapshots kept by the undo history.
    pub max_undo_steps: usize,
    /// Approximate byte budget for history snapshots.
    pub max_history_bytes: usize,
    /// Largest accepted upload payload in bytes.
    pub max_upload_bytes: usize,
    pub export_format: ExportFormat,
    /// 0..=100
    pub export_quality: u8,
    pub default_font_family: String,
    pub remote_poll_attempts: u32,
    pub remote_poll_interval_ms: u64,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: 50,
            max_history_bytes: 512 * 1024 * 1024,
            max_upload_bytes: 10 * 1024 * 1024,
            export_format: ExportFormat::Png,
            export_quality: 90,
            default_font_family: "Arial".to_string(),
            remote_poll_attempts: 60,
            remote_poll_interval_ms: 500,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file, inside [`app_dir`]`(AppDir::Config)`.
    pub fn settings_path() -> Option<PathBuf> {
        app_dir(AppDir::Config).map(|dir| dir.join(SETTINGS_FILE))
    }

    /// Load settings from the default location (defaults if missing or corrupt).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(s) => s,
            Err(e) => {
                log_warn!("Ignoring settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings.sanitized())
    }

    pub fn save(&self) -> Result<()> {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        log_info!("Settings written to {}", path.display());
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.remote_poll_interval_ms)
    }

    pub fn sanitized(mut self) -> Self {
        self.max_undo_steps = self.max_undo_steps.max(1);
        self.export_quality = self.export_quality.min(100);
        self.remote_poll_attempts = self.remote_poll_attempts.max(1);
        if self.default_font_family.trim().is_empty() {
            self.default_font_family = Self::default().default_font_family;
        }
        self
    }
}
