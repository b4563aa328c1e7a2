//! A configurable in-memory plugin for tests. Compiled unconditionally so
//! integration tests can drive the manager without network or manifests.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::envs::Envs;
use crate::error::Error;
use crate::plugin::{
    AvailableVersion, Hook, InstallSource, Plugin, PreInstallResult, PreUseContext, Source,
};
use crate::runtime::{compare_versions, RuntimePackage};

/// Installs by staging nothing ([`Source::None`]); the staged directory is
/// created empty by the manager, which is all activation needs.
pub struct FakePlugin {
    name: String,
    versions: Vec<String>,
    /// Alias -> concrete version, answered from the pre-use hook.
    aliases: BTreeMap<String, String>,
    vars: BTreeMap<String, String>,
    /// Subdirectory of the runtime added to PATH, e.g. `bin`.
    bin_dir: Option<String>,
    legacy_filenames: Vec<String>,
}

impl FakePlugin {
    pub fn new(name: impl Into<String>, versions: &[&str]) -> FakePlugin {
        FakePlugin {
            name: name.into(),
            versions: versions.iter().map(|v| v.to_string()).collect(),
            aliases: BTreeMap::new(),
            vars: BTreeMap::new(),
            bin_dir: None,
            legacy_filenames: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str, version: &str) -> FakePlugin {
        self.aliases.insert(alias.to_string(), version.to_string());
        self
    }

    pub fn with_var(mut self, key: &str, value: &str) -> FakePlugin {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_bin_dir(mut self, dir: &str) -> FakePlugin {
        self.bin_dir = Some(dir.to_string());
        self
    }

    pub fn with_legacy_filename(mut self, filename: &str) -> FakePlugin {
        self.legacy_filenames.push(filename.to_string());
        self
    }
}

impl Plugin for FakePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn available(&self) -> Result<Vec<AvailableVersion>> {
        let mut versions: Vec<AvailableVersion> = self
            .versions
            .iter()
            .map(|v| AvailableVersion {
                version: v.clone(),
                note: String::new(),
            })
            .collect();
        versions.sort_by(|a, b| compare_versions(&b.version, &a.version));
        Ok(versions)
    }

    fn pre_install(&self, version: &str) -> Result<PreInstallResult> {
        let version = self
            .aliases
            .get(version)
            .map(String::as_str)
            .unwrap_or(version);
        if !self.versions.iter().any(|v| v == version) {
            return Err(Error::NotFound(format!("{} {version}", self.name)).into());
        }
        Ok(PreInstallResult {
            main: InstallSource {
                name: self.name.clone(),
                version: version.to_string(),
                source: Source::None,
                ..Default::default()
            },
            additions: Vec::new(),
        })
    }

    fn env_keys(&self, package: &RuntimePackage) -> Result<Envs> {
        let mut envs = Envs::new();
        for (key, value) in &self.vars {
            envs.vars.set(key.clone(), value.clone());
        }
        let bin = match &self.bin_dir {
            Some(dir) => package.main.path.join(dir),
            None => package.main.path.clone(),
        };
        envs.paths.add(bin.to_string_lossy().to_string());
        Ok(envs)
    }

    fn has_hook(&self, hook: Hook) -> bool {
        match hook {
            Hook::PreUse => !self.aliases.is_empty(),
            Hook::ParseLegacyFile => !self.legacy_filenames.is_empty(),
            other => other.required(),
        }
    }

    fn pre_use(&self, ctx: &PreUseContext<'_>) -> Result<String> {
        match self.aliases.get(ctx.version) {
            Some(version) => Ok(version.clone()),
            None => Err(Error::NoResultProvided.into()),
        }
    }

    fn legacy_filenames(&self) -> Vec<String> {
        self.legacy_filenames.clone()
    }

    fn parse_legacy_file(&self, _filename: &str, content: &str) -> Result<Option<String>> {
        let version = content.trim();
        if version.is_empty() {
            return Ok(None);
        }
        Ok(Some(version.to_string()))
    }
}
