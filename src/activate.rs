//! Activation: recording tool versions per scope, maintaining shim links
//! and composing the resulting shell environment.

use anyhow::{Context as _, Result};
use std::{
    collections::BTreeMap,
    path::PathBuf,
};

use crate::config::{ConfigChain, ConfigFile};
use crate::envs::{merge_by_scope_priority, Envs};
use crate::error::Error;
use crate::link::{self, LinkOutcome};
use crate::manager::Manager;
use crate::plugin::Hook;
use crate::runtime::RuntimePackage;
use crate::scope::Scope;

/// Attribute set on a project-scope entry that opts out of project shims;
/// the activation then only lives in the session.
pub const UNLINK_ATTR: &str = "unlink";

impl Manager {
    /// Loads the three scope configs in merge order. Plugin legacy version
    /// files (`.nvmrc` and friends) back-fill project entries for installed
    /// tools that the project config does not pin, when enabled in settings.
    pub fn load_chain(&mut self) -> Result<ConfigChain> {
        let mut chain = ConfigChain::new();
        for scope in Scope::MERGE_PRIORITY {
            let mut config = ConfigFile::load_dir(self.meta.config_dir(scope))?;
            if scope == Scope::Project && self.settings.legacy_version_file.enable {
                self.backfill_from_legacy_files(&mut config)?;
            }
            chain.add(config, scope);
        }
        Ok(chain)
    }

    fn backfill_from_legacy_files(&mut self, config: &mut ConfigFile) -> Result<()> {
        for tool in self.installed_tools() {
            if config.tools.get(&tool).is_some() {
                continue;
            }
            let plugin = match self.plugin(&tool) {
                Ok(plugin) => plugin,
                // A leftover install without its plugin should not break
                // everything else.
                Err(err) => {
                    log::debug!("skipping {tool}: {err:#}");
                    continue;
                }
            };
            if !plugin.has_hook(Hook::ParseLegacyFile) {
                continue;
            }
            for filename in plugin.legacy_filenames() {
                let path = self.meta.working.directory.join(&filename);
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                if let Some(version) = plugin.parse_legacy_file(&filename, &content)? {
                    log::debug!("{tool} {version} pinned by {filename}");
                    // In memory only; the legacy file stays the source of
                    // truth and must never be shadowed by a written config.
                    config.set_transient(tool.clone(), version);
                    break;
                }
            }
        }
        Ok(())
    }

    // -------------------- shims --------------------

    /// Links every runtime of `package` into the scope's shim directory.
    /// Returns how many links were actually created or retargeted; an
    /// already-correct link is left untouched and not counted.
    pub fn create_shims_for_scope(
        &self,
        package: &RuntimePackage,
        scope: Scope,
    ) -> Result<usize> {
        let shim_dir = self.meta.shim_dir(scope);
        let mut mutated = 0;
        for runtime in std::iter::once(&package.main).chain(package.additions.iter()) {
            let outcome = link::ensure_link(&runtime.path, &shim_dir.join(&runtime.name))?;
            if outcome != LinkOutcome::Unchanged {
                mutated += 1;
            }
        }
        Ok(mutated)
    }

    pub fn remove_shims_for_scope(&self, package: &RuntimePackage, scope: Scope) -> Result<()> {
        let shim_dir = self.meta.shim_dir(scope);
        for runtime in std::iter::once(&package.main).chain(package.additions.iter()) {
            link::remove_link(&shim_dir.join(&runtime.name))?;
        }
        Ok(())
    }

    /// A copy of `package` whose runtime paths go through the scope's shim
    /// directory. Purely a path rewrite; nothing on disk is touched.
    fn shim_view(&self, package: &RuntimePackage, scope: Scope) -> RuntimePackage {
        let shim_dir = self.meta.shim_dir(scope);
        let mut view = package.clone();
        view.main.path = shim_dir.join(&view.main.name);
        for addition in &mut view.additions {
            addition.path = shim_dir.join(&addition.name);
        }
        view
    }

    // -------------------- use / unuse --------------------

    /// Activates `tool` at the given scope, returning the concrete version.
    ///
    /// The version is recorded in the target scope's config and in the
    /// session config; session shims are always refreshed so the current
    /// shell picks the change up immediately. With `unlink` (project scope
    /// only) no project shim directory is created and the attribute is
    /// recorded so later activations keep honouring it.
    pub fn use_version(
        &mut self,
        tool: &str,
        request: &str,
        scope: Scope,
        unlink: bool,
    ) -> Result<String> {
        let mut chain = self.load_chain()?;
        let previous = chain
            .get_tool_version(tool)
            .map(|(version, _)| version.to_string());

        let version = self.resolve_version(tool, request, scope, previous.as_deref())?;
        if !self.is_installed(tool, &version) {
            return Err(Error::version_not_installed(tool, &version).into());
        }
        let package = self.package(tool, &version)?;

        let unlink = unlink && scope == Scope::Project;
        if let Some(config) = chain.get_mut_by_scope(scope) {
            if unlink {
                let mut attr = BTreeMap::new();
                attr.insert(UNLINK_ATTR.to_string(), "true".to_string());
                config.pin_with_attr(tool, version.clone(), attr);
            } else {
                config.pin(tool, version.clone());
            }
        }
        if scope != Scope::Session {
            if let Some(config) = chain.get_mut_by_scope(Scope::Session) {
                config.pin(tool, version.clone());
            }
        }

        self.create_shims_for_scope(&package, Scope::Session)?;
        if scope != Scope::Session && !unlink {
            self.create_shims_for_scope(&package, scope)?;
        }

        chain.save()?;
        log::info!("now using {tool} {version} ({scope})");
        Ok(version)
    }

    /// Deactivates `tool` at the given scope and in the session. Shims go
    /// first, then the config entries; returns whether anything was removed.
    pub fn unuse(&mut self, tool: &str, scope: Scope) -> Result<bool> {
        let mut chain = self.load_chain()?;
        let mut removed = false;

        let mut scopes = vec![scope];
        if scope != Scope::Session {
            scopes.push(Scope::Session);
        }
        for target in scopes {
            let Some(config) = chain.get_mut_by_scope(target) else {
                continue;
            };
            let Some(entry) = config.tools.get(tool).cloned() else {
                continue;
            };
            if self.is_installed(tool, &entry.version) {
                let package = self.package(tool, &entry.version)?;
                self.remove_shims_for_scope(&package, target)?;
            }
            if let Some(config) = chain.get_mut_by_scope(target) {
                config.unpin(tool);
            }
            removed = true;
        }

        if removed {
            chain.save()?;
            log::info!("no longer using {tool} ({scope})");
        }
        Ok(removed)
    }

    /// The version answering "what is active for this tool right now":
    /// scopes are consulted most specific first, and a recorded version only
    /// counts if it (or a fuzzy match of it) is actually installed.
    pub fn current_version(&mut self, tool: &str) -> Result<Option<(String, Scope)>> {
        let chain = self.load_chain()?;
        let installed = self.installed_ascending(tool);
        for scope in Scope::LOOKUP_PRIORITY {
            let Some(config) = chain.get_by_scope(scope) else {
                continue;
            };
            let Some(recorded) = config.tools.get_version(tool) else {
                continue;
            };
            if installed.iter().any(|v| v == recorded) {
                return Ok(Some((recorded.to_string(), scope)));
            }
            let prefix = format!("{recorded}.");
            if let Some(found) = installed.iter().find(|v| v.starts_with(&prefix)) {
                return Ok(Some((found.clone(), scope)));
            }
        }
        Ok(None)
    }

    /// Deletes an installed version, deactivating it everywhere first so no
    /// scope is left pointing at a removed directory.
    ///
    /// A recorded pin counts as pointing here when it is the exact version
    /// or when it is a fuzzy pin that currently resolves to it, the same
    /// rule `current_version` applies; a fuzzy pin that resolves to another
    /// installed version is left alone.
    pub fn uninstall(&mut self, tool: &str, version: &str) -> Result<()> {
        let package = self.package(tool, version)?;
        let mut chain = self.load_chain()?;
        let mut dirty = false;
        for scope in Scope::MERGE_PRIORITY {
            let Some(config) = chain.get_mut_by_scope(scope) else {
                continue;
            };
            let Some(recorded) = config.tools.get_version(tool).map(str::to_string) else {
                continue;
            };
            let resolves_here = recorded == version
                || self.match_installed(tool, &recorded).as_deref() == Some(version);
            if resolves_here {
                config.unpin(tool);
                self.remove_shims_for_scope(&package, scope)?;
                dirty = true;
            }
        }
        if dirty {
            chain.save()?;
        }
        self.remove_package(tool, version)
    }

    // -------------------- environment --------------------

    /// Composes the full environment across scopes. Each scope contributes
    /// the env keys of its recorded tools, routed through that scope's shim
    /// directory; project entries carrying the unlink attribute route
    /// through the session shims instead.
    pub fn compose_envs(&mut self) -> Result<Envs> {
        let chain = self.load_chain()?;
        let mut by_scope: BTreeMap<Scope, Envs> = BTreeMap::new();

        for scope in Scope::MERGE_PRIORITY {
            let Some(config) = chain.get_by_scope(scope) else {
                continue;
            };
            let tools: Vec<_> = config
                .tools
                .iter()
                .map(|(name, tool)| (name.clone(), tool.clone()))
                .collect();

            let mut envs = Envs::new();
            for (tool, entry) in tools {
                let Some(version) = self.match_installed(&tool, &entry.version) else {
                    log::debug!("{tool} {} recorded at {scope} but not installed", entry.version);
                    continue;
                };
                let plugin = self.plugin(&tool)?;
                let package = self.package(&tool, &version)?;

                let shim_scope = if scope == Scope::Project
                    && entry.attr.get(UNLINK_ATTR).map(String::as_str) == Some("true")
                {
                    Scope::Session
                } else {
                    scope
                };
                let view = self.shim_view(&package, shim_scope);
                let keys = plugin
                    .env_keys(&view)
                    .with_context(|| format!("env keys failed for {tool} {version}"))?;
                envs.merge(&keys);
            }
            if !envs.is_empty() {
                by_scope.insert(scope, envs);
            }
        }

        Ok(merge_by_scope_priority(&by_scope, &Scope::LOOKUP_PRIORITY))
    }

    fn match_installed(&self, tool: &str, recorded: &str) -> Option<String> {
        let installed = self.installed_ascending(tool);
        if installed.iter().any(|v| v == recorded) {
            return Some(recorded.to_string());
        }
        let prefix = format!("{recorded}.");
        installed.into_iter().find(|v| v.starts_with(&prefix))
    }

    /// The config files whose mtimes decide whether a cached env render is
    /// still valid.
    pub fn watched_config_files(&self) -> Vec<(Scope, PathBuf)> {
        Scope::MERGE_PRIORITY
            .iter()
            .map(|scope| {
                (
                    *scope,
                    crate::config::determine_config_path(self.meta.config_dir(*scope)),
                )
            })
            .collect()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::envs::VarValue;
    use crate::paths::{PathMeta, PathOptions};
    use crate::plugin::testing::FakePlugin;
    use std::{fs, path::Path, rc::Rc};
    use tempfile::tempdir;

    fn manager_in(root: &Path) -> Manager {
        let meta = PathMeta::new(PathOptions {
            home: Some(root.join("home")),
            working_dir: root.join("work"),
            pid: Some(77),
            ..Default::default()
        })
        .unwrap();
        let mut manager = Manager::new(meta).unwrap();
        manager.register_plugin(Rc::new(
            FakePlugin::new("nodejs", &["20.5.0", "20.11.1", "21.0.0"])
                .with_var("NODE_ENV_SOURCE", "perigee")
                .with_bin_dir("bin"),
        ));
        manager
    }

    #[test]
    fn use_records_both_target_and_session() {
        let root = tempdir().unwrap();
        let mut manager = manager_in(root.path());
        manager.install("nodejs", "20.5.0").unwrap();

        let version = manager
            .use_version("nodejs", "20", Scope::Project, false)
            .unwrap();
        assert_eq!(version, "20.5.0");

        let chain = manager.load_chain().unwrap();
        let project = chain.get_by_scope(Scope::Project).unwrap();
        assert_eq!(project.tools.get_version("nodejs"), Some("20.5.0"));
        let session = chain.get_by_scope(Scope::Session).unwrap();
        assert_eq!(session.tools.get_version("nodejs"), Some("20.5.0"));

        // Shims in both the project and session directories.
        assert!(manager
            .meta
            .shim_dir(Scope::Project)
            .join("nodejs")
            .is_symlink());
        assert!(manager
            .meta
            .shim_dir(Scope::Session)
            .join("nodejs")
            .is_symlink());
    }

    #[test]
    fn use_of_missing_version_fails() {
        let root = tempdir().unwrap();
        let mut manager = manager_in(root.path());
        let err = manager
            .use_version("nodejs", "20", Scope::Session, false)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::VersionNotInstalled { .. })
        ));
    }

    #[test]
    fn unlink_keeps_project_shims_away() {
        let root = tempdir().unwrap();
        let mut manager = manager_in(root.path());
        manager.install("nodejs", "20.5.0").unwrap();

        manager
            .use_version("nodejs", "20.5.0", Scope::Project, true)
            .unwrap();

        assert!(!manager.meta.shim_dir(Scope::Project).exists());
        assert!(manager
            .meta
            .shim_dir(Scope::Session)
            .join("nodejs")
            .is_symlink());

        let mut chain = manager.load_chain().unwrap();
        let entry = chain
            .get_mut_by_scope(Scope::Project)
            .unwrap()
            .tools
            .get("nodejs")
            .cloned()
            .unwrap();
        assert_eq!(entry.attr.get(UNLINK_ATTR).map(String::as_str), Some("true"));

        // Env routes the project entry through the session shims.
        let envs = manager.compose_envs().unwrap();
        let session_bin = manager
            .meta
            .shim_dir(Scope::Session)
            .join("nodejs/bin")
            .to_string_lossy()
            .to_string();
        assert!(envs.paths.iter().any(|p| p == &session_bin));
    }

    #[test]
    fn repeated_use_is_idempotent_on_shims() {
        let root = tempdir().unwrap();
        let mut manager = manager_in(root.path());
        manager.install("nodejs", "20.5.0").unwrap();
        manager
            .use_version("nodejs", "20.5.0", Scope::Global, false)
            .unwrap();

        let package = manager.package("nodejs", "20.5.0").unwrap();
        assert_eq!(
            manager
                .create_shims_for_scope(&package, Scope::Global)
                .unwrap(),
            0
        );

        // Switching versions retargets the same link name.
        manager.install("nodejs", "21.0.0").unwrap();
        let newer = manager.package("nodejs", "21.0.0").unwrap();
        assert_eq!(
            manager
                .create_shims_for_scope(&newer, Scope::Global)
                .unwrap(),
            1
        );
    }

    #[test]
    fn unuse_removes_shims_then_entries() {
        let root = tempdir().unwrap();
        let mut manager = manager_in(root.path());
        manager.install("nodejs", "20.5.0").unwrap();
        manager
            .use_version("nodejs", "20.5.0", Scope::Project, false)
            .unwrap();

        assert!(manager.unuse("nodejs", Scope::Project).unwrap());
        assert!(!manager
            .meta
            .shim_dir(Scope::Project)
            .join("nodejs")
            .exists());
        assert!(!manager
            .meta
            .shim_dir(Scope::Session)
            .join("nodejs")
            .exists());
        assert_eq!(manager.current_version("nodejs").unwrap(), None);

        // Nothing left to remove.
        assert!(!manager.unuse("nodejs", Scope::Project).unwrap());
    }

    #[test]
    fn current_version_follows_lookup_priority_and_installs() {
        let root = tempdir().unwrap();
        let mut manager = manager_in(root.path());
        manager.install("nodejs", "20.5.0").unwrap();
        manager.install("nodejs", "21.0.0").unwrap();

        manager
            .use_version("nodejs", "21.0.0", Scope::Global, false)
            .unwrap();
        manager
            .use_version("nodejs", "20.5.0", Scope::Project, false)
            .unwrap();

        let (version, scope) = manager.current_version("nodejs").unwrap().unwrap();
        assert_eq!(version, "20.5.0");
        assert_eq!(scope, Scope::Project);

        // A recorded-but-uninstalled project version falls through to the
        // next scope.
        manager.unuse("nodejs", Scope::Project).unwrap();
        let mut chain = manager.load_chain().unwrap();
        chain
            .get_mut_by_scope(Scope::Project)
            .unwrap()
            .tools
            .set("nodejs", "18.0.0");
        chain.save().unwrap();

        let (version, scope) = manager.current_version("nodejs").unwrap().unwrap();
        assert_eq!(version, "21.0.0");
        assert_eq!(scope, Scope::Global);
    }

    #[test]
    fn composed_env_prefers_the_project_scope() {
        let root = tempdir().unwrap();
        let mut manager = manager_in(root.path());
        manager.install("nodejs", "20.5.0").unwrap();
        manager.install("nodejs", "21.0.0").unwrap();
        manager
            .use_version("nodejs", "21.0.0", Scope::Global, false)
            .unwrap();
        manager
            .use_version("nodejs", "20.5.0", Scope::Project, false)
            .unwrap();

        let envs = manager.compose_envs().unwrap();
        assert_eq!(
            envs.vars.get("NODE_ENV_SOURCE"),
            Some(&VarValue::Set("perigee".to_string()))
        );

        let project_bin = manager
            .meta
            .shim_dir(Scope::Project)
            .join("nodejs/bin")
            .to_string_lossy()
            .to_string();
        let first = envs.paths.iter().next().cloned().unwrap();
        assert_eq!(first, project_bin);
    }

    #[test]
    fn legacy_version_file_backfills_project_scope() {
        let root = tempdir().unwrap();
        let meta = PathMeta::new(PathOptions {
            home: Some(root.path().join("home")),
            working_dir: root.path().join("work"),
            pid: Some(78),
            ..Default::default()
        })
        .unwrap();
        fs::create_dir_all(&meta.working.directory).unwrap();
        fs::write(meta.working.directory.join(".nvmrc"), "20.5.0\n").unwrap();

        let mut manager = Manager::new(meta).unwrap();
        manager.register_plugin(Rc::new(
            FakePlugin::new("nodejs", &["20.5.0"])
                .with_bin_dir("bin")
                .with_legacy_filename(".nvmrc"),
        ));
        manager.install("nodejs", "20.5.0").unwrap();

        let (version, scope) = manager.current_version("nodejs").unwrap().unwrap();
        assert_eq!(version, "20.5.0");
        assert_eq!(scope, Scope::Project);

        // Settings can switch the behaviour off.
        manager.settings.legacy_version_file.enable = false;
        assert_eq!(manager.current_version("nodejs").unwrap(), None);
    }

    #[test]
    fn legacy_pins_stay_in_memory_and_follow_file_edits() {
        let root = tempdir().unwrap();
        let meta = PathMeta::new(PathOptions {
            home: Some(root.path().join("home")),
            working_dir: root.path().join("work"),
            pid: Some(79),
            ..Default::default()
        })
        .unwrap();
        fs::create_dir_all(&meta.working.directory).unwrap();
        fs::write(meta.working.directory.join(".nvmrc"), "20.5.0\n").unwrap();

        let mut manager = Manager::new(meta).unwrap();
        manager.register_plugin(Rc::new(
            FakePlugin::new("nodejs", &["20.5.0", "21.0.0"])
                .with_bin_dir("bin")
                .with_legacy_filename(".nvmrc"),
        ));
        manager.install("nodejs", "20.5.0").unwrap();
        manager.install("nodejs", "21.0.0").unwrap();

        // A session activation saves the chain; the backfilled project pin
        // must not be materialized into a project config file.
        manager
            .use_version("nodejs", "21.0.0", Scope::Session, false)
            .unwrap();
        assert!(!manager
            .meta
            .working
            .directory
            .join(".perigee.toml")
            .exists());

        // Editing the legacy file moves the project pin with it.
        fs::write(manager.meta.working.directory.join(".nvmrc"), "21.0.0\n").unwrap();
        let (version, scope) = manager.current_version("nodejs").unwrap().unwrap();
        assert_eq!(version, "21.0.0");
        assert_eq!(scope, Scope::Project);
    }

    #[test]
    fn uninstall_clears_fuzzy_pins_that_resolve_to_it() {
        let root = tempdir().unwrap();
        let mut manager = manager_in(root.path());
        manager.install("nodejs", "20.5.0").unwrap();

        let mut chain = manager.load_chain().unwrap();
        chain
            .get_mut_by_scope(Scope::Project)
            .unwrap()
            .pin("nodejs", "20");
        chain.save().unwrap();
        assert_eq!(
            manager.current_version("nodejs").unwrap(),
            Some(("20.5.0".to_string(), Scope::Project))
        );

        manager.uninstall("nodejs", "20.5.0").unwrap();
        let chain = manager.load_chain().unwrap();
        assert_eq!(
            chain
                .get_by_scope(Scope::Project)
                .unwrap()
                .tools
                .get_version("nodejs"),
            None
        );
        assert_eq!(manager.current_version("nodejs").unwrap(), None);
    }

    #[test]
    fn uninstall_keeps_fuzzy_pins_resolving_elsewhere() {
        let root = tempdir().unwrap();
        let mut manager = manager_in(root.path());
        manager.install("nodejs", "20.5.0").unwrap();
        manager.install("nodejs", "20.11.1").unwrap();

        let mut chain = manager.load_chain().unwrap();
        chain
            .get_mut_by_scope(Scope::Project)
            .unwrap()
            .pin("nodejs", "20");
        chain.save().unwrap();

        // The pin resolves to 20.5.0, so removing 20.11.1 leaves it alone.
        manager.uninstall("nodejs", "20.11.1").unwrap();
        assert_eq!(
            manager.current_version("nodejs").unwrap(),
            Some(("20.5.0".to_string(), Scope::Project))
        );
    }

    #[test]
    fn uninstall_deactivates_everywhere_first() {
        let root = tempdir().unwrap();
        let mut manager = manager_in(root.path());
        manager.install("nodejs", "20.5.0").unwrap();
        manager
            .use_version("nodejs", "20.5.0", Scope::Global, false)
            .unwrap();

        manager.uninstall("nodejs", "20.5.0").unwrap();
        assert!(!manager.is_installed("nodejs", "20.5.0"));
        assert!(!manager
            .meta
            .shim_dir(Scope::Global)
            .join("nodejs")
            .exists());
        assert_eq!(manager.current_version("nodejs").unwrap(), None);
    }
}
