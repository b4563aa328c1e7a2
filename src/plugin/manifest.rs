//! A declarative plugin backed by `{plugins}/{tool}/plugin.toml`.
//!
//! ```toml
//! name = "nodejs"
//! latest = "21.5.0"
//! legacy_filenames = [".nvmrc", ".node-version"]
//!
//! [versions."20.5.0"]
//! url = "https://nodejs.org/dist/v20.5.0/node-v20.5.0-linux-x64.tar.gz"
//! sha256 = "..."
//! note = "lts"
//!
//! [versions."20.5.0".additions.npm]
//! version = "9.8.0"
//! url = "https://..."
//!
//! [env]
//! vars = { NODE_HOME = "{path}" }
//! paths = ["{path}/bin"]
//! ```
//!
//! `{path}` in the env templates expands to the main runtime directory,
//! `{version}` to the installed version.

use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::Path};

use crate::checksum::Checksum;
use crate::envs::Envs;
use crate::error::Error;
use crate::plugin::{
    AvailableVersion, Hook, InstallSource, Plugin, PreInstallResult, PreUseContext, Source,
};
use crate::runtime::{compare_versions, RuntimePackage};

pub const MANIFEST_FILENAME: &str = "plugin.toml";

#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    #[serde(default)]
    latest: Option<String>,
    #[serde(default)]
    legacy_filenames: Vec<String>,
    #[serde(default)]
    versions: BTreeMap<String, VersionEntry>,
    #[serde(default)]
    env: EnvTemplate,
}

#[derive(Debug, Default, Deserialize)]
struct VersionEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    sha512: Option<String>,
    #[serde(default)]
    sha1: Option<String>,
    #[serde(default)]
    md5: Option<String>,
    #[serde(default)]
    note: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    additions: BTreeMap<String, AdditionEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AdditionEntry {
    version: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    sha512: Option<String>,
    #[serde(default)]
    sha1: Option<String>,
    #[serde(default)]
    md5: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EnvTemplate {
    #[serde(default)]
    vars: BTreeMap<String, String>,
    #[serde(default)]
    paths: Vec<String>,
}

#[derive(Debug)]
pub struct ManifestPlugin {
    manifest: Manifest,
}

impl ManifestPlugin {
    /// Loads the manifest for `tool` from the plugin directory. A missing
    /// manifest is [`Error::ManifestNotFound`] so callers can tell "no such
    /// plugin" apart from a broken one.
    pub fn load(plugins_dir: &Path, tool: &str) -> Result<ManifestPlugin> {
        let path = plugins_dir.join(tool).join(MANIFEST_FILENAME);
        if !path.exists() {
            return Err(Error::ManifestNotFound(tool.to_string()).into());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let manifest: Manifest =
            toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(ManifestPlugin { manifest })
    }

    fn entry(&self, version: &str) -> Result<&VersionEntry> {
        self.manifest
            .versions
            .get(version)
            .ok_or_else(|| Error::NotFound(format!("{} {version}", self.manifest.name)).into())
    }

    fn expand(&self, template: &str, package: &RuntimePackage) -> String {
        template
            .replace("{path}", &package.main.path.to_string_lossy())
            .replace("{version}", package.version())
    }
}

fn source_of(url: &Option<String>) -> Source {
    match url {
        Some(url) => Source::Remote(url.clone()),
        None => Source::None,
    }
}

impl Plugin for ManifestPlugin {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn available(&self) -> Result<Vec<AvailableVersion>> {
        let mut versions: Vec<AvailableVersion> = self
            .manifest
            .versions
            .iter()
            .map(|(version, entry)| AvailableVersion {
                version: version.clone(),
                note: entry.note.clone(),
            })
            .collect();
        versions.sort_by(|a, b| compare_versions(&b.version, &a.version));
        Ok(versions)
    }

    fn pre_install(&self, version: &str) -> Result<PreInstallResult> {
        let version = match &self.manifest.latest {
            Some(latest) if version == "latest" || version.is_empty() => latest.as_str(),
            _ => version,
        };
        let entry = self.entry(version)?;

        let main = InstallSource {
            name: self.manifest.name.clone(),
            version: version.to_string(),
            source: source_of(&entry.url),
            headers: entry.headers.clone(),
            checksum: Checksum::from_fields(
                entry.sha256.as_deref(),
                entry.sha512.as_deref(),
                entry.sha1.as_deref(),
                entry.md5.as_deref(),
            ),
            note: entry.note.clone(),
        };

        let additions = entry
            .additions
            .iter()
            .map(|(name, addition)| InstallSource {
                name: name.clone(),
                version: addition.version.clone(),
                source: source_of(&addition.url),
                headers: entry.headers.clone(),
                checksum: Checksum::from_fields(
                    addition.sha256.as_deref(),
                    addition.sha512.as_deref(),
                    addition.sha1.as_deref(),
                    addition.md5.as_deref(),
                ),
                note: String::new(),
            })
            .collect();

        Ok(PreInstallResult { main, additions })
    }

    fn env_keys(&self, package: &RuntimePackage) -> Result<Envs> {
        let mut envs = Envs::new();
        for (key, template) in &self.manifest.env.vars {
            envs.vars.set(key.clone(), self.expand(template, package));
        }
        for template in &self.manifest.env.paths {
            envs.paths.add(self.expand(template, package));
        }
        Ok(envs)
    }

    fn has_hook(&self, hook: Hook) -> bool {
        match hook {
            Hook::PreUse => self.manifest.latest.is_some(),
            Hook::ParseLegacyFile => !self.manifest.legacy_filenames.is_empty(),
            other => other.required(),
        }
    }

    fn pre_use(&self, ctx: &PreUseContext<'_>) -> Result<String> {
        match &self.manifest.latest {
            Some(latest) if ctx.version == "latest" => Ok(latest.clone()),
            _ => Err(Error::NoResultProvided.into()),
        }
    }

    fn legacy_filenames(&self) -> Vec<String> {
        self.manifest.legacy_filenames.clone()
    }

    fn parse_legacy_file(&self, _filename: &str, content: &str) -> Result<Option<String>> {
        let version = content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.trim_start_matches('v').to_string());
        Ok(version.filter(|v| !v.is_empty()))
    }
}
