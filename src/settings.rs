//! Tree limits and field rules, loaded from a JSON settings file.
//!
//! Missing files mean defaults. A file that exists but cannot be read or
//! parsed is reported and ignored, so a broken settings file never blocks
//! tree editing.

use std::path::{Path, PathBuf};

use anyhow::Context;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Environment variable naming an alternative settings file.
pub const SETTINGS_ENV: &str = "TABTREE_SETTINGS";

static DEFAULT_SETTINGS_PATH: Lazy<Option<PathBuf>> =
    Lazy::new(|| dirs::config_dir().map(|dir| dir.join("tabtree").join("settings.json")));

static DEFAULT_STORE_PATH: Lazy<Option<PathBuf>> =
    Lazy::new(|| dirs::data_dir().map(|dir| dir.join("tabtree").join("tabs.json")));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tabs may sit at depths `0..max_depth`.
    pub max_depth: usize,
    pub title_max_len: usize,
    pub group_name_max_len: usize,
    /// Require URLs to parse and use the http or https scheme.
    pub require_http_url: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_depth: 10,
            title_max_len: 50,
            group_name_max_len: 100,
            require_http_url: true,
        }
    }
}

impl Settings {
    /// Resolves the settings file and loads it, falling back to defaults.
    ///
    /// Lookup order: `explicit`, then `$TABTREE_SETTINGS`, then
    /// `<config_dir>/tabtree/settings.json`.
    pub fn load(explicit: Option<&Path>) -> Self {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(SETTINGS_ENV).map(PathBuf::from))
            .or_else(|| DEFAULT_SETTINGS_PATH.clone());

        match path {
            Some(path) => Self::load_or_default(&path),
            None => Self::default(),
        }
    }

    /// Loads `path`, returning defaults when it is missing or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!(path = %path.display(), "ignoring settings file: {err:#}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        if settings.max_depth == 0 {
            anyhow::bail!("max_depth must be at least 1");
        }
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))
    }

    /// Default location of the CLI's snapshot file.
    pub fn default_store_path() -> Option<PathBuf> {
        DEFAULT_STORE_PATH.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tabtree-settings-{}-{name}", std::process::id()))
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"max_depth": 3}"#).unwrap();
        assert_eq!(settings.max_depth, 3);
        assert_eq!(settings.title_max_len, 50);
        assert!(settings.require_http_url);
    }

    #[test]
    fn missing_file_means_defaults() {
        let settings = Settings::load_or_default(&temp_path("absent.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn invalid_file_falls_back() {
        let path = temp_path("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_or_default(&path), Settings::default());

        std::fs::write(&path, r#"{"max_depth": 0}"#).unwrap();
        assert_eq!(Settings::load_or_default(&path), Settings::default());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn explicit_path_wins() {
        let path = temp_path("explicit.json");
        let custom = Settings {
            max_depth: 4,
            ..Settings::default()
        };
        custom.save_to(&path).unwrap();
        assert_eq!(Settings::load(Some(&path)), custom);
        std::fs::remove_file(&path).unwrap();
    }
}
