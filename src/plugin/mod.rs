//! The contract between the core and tool plugins.
//!
//! A plugin answers three required questions: which versions exist
//! ([`Plugin::available`]), where to fetch one from ([`Plugin::pre_install`])
//! and what environment an installed package exports
//! ([`Plugin::env_keys`]). Everything else is optional and advertised
//! through [`Plugin::has_hook`].

pub mod manifest;
pub mod testing;

use anyhow::Result;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::checksum::Checksum;
use crate::envs::Envs;
use crate::error::Error;
use crate::runtime::RuntimePackage;
use crate::scope::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Available,
    PreInstall,
    EnvKeys,
    PostInstall,
    PreUse,
    ParseLegacyFile,
    PreUninstall,
}

impl Hook {
    /// Required hooks must exist on every plugin; optional ones are probed
    /// via [`Plugin::has_hook`] before being called.
    pub fn required(&self) -> bool {
        matches!(self, Hook::Available | Hook::PreInstall | Hook::EnvKeys)
    }
}

/// One version a plugin knows how to install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailableVersion {
    pub version: String,
    pub note: String,
}

/// Where an install payload comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Source {
    /// Nothing to fetch; the plugin stages the files itself in post-install.
    #[default]
    None,
    Remote(String),
    Local(PathBuf),
}

/// One payload to stage: the main runtime or an addition.
#[derive(Debug, Clone, Default)]
pub struct InstallSource {
    pub name: String,
    pub version: String,
    pub source: Source,
    /// Extra HTTP headers for the download (auth tokens, accept headers).
    pub headers: BTreeMap<String, String>,
    pub checksum: Option<Checksum>,
    pub note: String,
}

/// The resolved install plan for one requested version.
#[derive(Debug, Clone)]
pub struct PreInstallResult {
    pub main: InstallSource,
    pub additions: Vec<InstallSource>,
}

/// Inputs to the pre-use hook.
pub struct PreUseContext<'a> {
    pub cwd: &'a Path,
    pub scope: Scope,
    /// The user's requested version, possibly partial; empty when the user
    /// gave none.
    pub version: &'a str,
    pub previous_version: Option<&'a str>,
    /// Installed versions, ascending.
    pub installed: &'a [String],
}

pub trait Plugin {
    fn name(&self) -> &str;

    /// Versions this plugin can install, newest first.
    fn available(&self) -> Result<Vec<AvailableVersion>>;

    /// Resolves a requested version (possibly an alias like `latest`) into a
    /// concrete install plan.
    fn pre_install(&self, version: &str) -> Result<PreInstallResult>;

    /// The environment an installed package exports.
    fn env_keys(&self, package: &RuntimePackage) -> Result<Envs>;

    /// Whether an optional hook is implemented. Required hooks always are.
    fn has_hook(&self, hook: Hook) -> bool {
        hook.required()
    }

    /// Runs after all payloads are staged under `package.package_path`,
    /// before the install is considered complete. Compilation, permission
    /// fixes, that sort of thing.
    fn post_install(&self, _package: &RuntimePackage) -> Result<()> {
        Ok(())
    }

    /// Gives the plugin the first say in version resolution. Returning
    /// [`Error::NoResultProvided`] hands resolution back to the core; any
    /// other error aborts.
    fn pre_use(&self, _ctx: &PreUseContext<'_>) -> Result<String> {
        Err(Error::NoResultProvided.into())
    }

    /// Legacy version-file names this plugin understands (`.nvmrc`, ...).
    fn legacy_filenames(&self) -> Vec<String> {
        Vec::new()
    }

    /// Extracts a version from the content of one of
    /// [`Plugin::legacy_filenames`]; `Ok(None)` means the file had nothing
    /// usable.
    fn parse_legacy_file(&self, _filename: &str, _content: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Runs before an installed package is deleted.
    fn pre_uninstall(&self, _package: &RuntimePackage) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_hooks_are_fixed() {
        assert!(Hook::Available.required());
        assert!(Hook::PreInstall.required());
        assert!(Hook::EnvKeys.required());
        assert!(!Hook::PreUse.required());
        assert!(!Hook::ParseLegacyFile.required());
        assert!(!Hook::PostInstall.required());
        assert!(!Hook::PreUninstall.required());
    }
}
