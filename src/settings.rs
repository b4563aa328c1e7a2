//! User settings (`settings.toml` in the perigee home). All fields are
//! optional on disk; a missing file means defaults.

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub proxy: Proxy,
    pub legacy_version_file: LegacyVersionFile,
}

/// HTTP(S) proxy for downloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Proxy {
    pub enable: bool,
    pub url: String,
}

/// Whether plugin-defined legacy version files (`.nvmrc`, `.sdkmanrc`, ...)
/// participate in project-scope resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyVersionFile {
    pub enable: bool,
}

impl Default for LegacyVersionFile {
    fn default() -> LegacyVersionFile {
        LegacyVersionFile { enable: true }
    }
}

impl Settings {
    /// Loads settings from `path`; a missing file yields the defaults,
    /// malformed TOML is a hard error.
    pub fn load(path: &Path) -> Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }
}
