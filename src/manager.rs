//! The package manager: plugin lookup, install/uninstall of runtime
//! versions and version resolution against what is installed.

use anyhow::{bail, Context as _, Result};
use reqwest::blocking::Client;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    sync::{Mutex, Once},
};

use crate::archive;
use crate::error::Error;
use crate::fetch;
use crate::paths::PathMeta;
use crate::plugin::{
    manifest::ManifestPlugin, AvailableVersion, Hook, InstallSource, Plugin, PreUseContext, Source,
};
use crate::runtime::{compare_versions, scan_package, RuntimePackage};
use crate::scope::Scope;
use crate::settings::Settings;

/// Version directories are prefixed so unrelated entries under an install
/// root can never be mistaken for a version.
const VERSION_DIR_PREFIX: &str = "v-";

// A partially staged install to delete if the process is interrupted.
static PENDING_ROLLBACK: Mutex<Option<PathBuf>> = Mutex::new(None);
static SIGNAL_HANDLER: Once = Once::new();

pub struct Manager {
    pub meta: PathMeta,
    pub settings: Settings,
    plugins: BTreeMap<String, Rc<dyn Plugin>>,
    client: Option<Client>,
}

impl Manager {
    pub fn new(meta: PathMeta) -> Result<Manager> {
        let settings = Settings::load(&meta.user.settings_file)?;
        Ok(Manager {
            meta,
            settings,
            plugins: BTreeMap::new(),
            client: None,
        })
    }

    /// Registers an in-process plugin ahead of manifest lookup.
    pub fn register_plugin(&mut self, plugin: Rc<dyn Plugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    /// Finds the plugin for `tool`, loading its manifest on first use.
    pub fn plugin(&mut self, tool: &str) -> Result<Rc<dyn Plugin>> {
        if let Some(plugin) = self.plugins.get(tool) {
            return Ok(Rc::clone(plugin));
        }
        let plugin: Rc<dyn Plugin> =
            Rc::new(ManifestPlugin::load(&self.meta.shared.plugins, tool)?);
        self.plugins.insert(tool.to_string(), Rc::clone(&plugin));
        Ok(plugin)
    }

    fn http_client(&mut self) -> Result<&Client> {
        if self.client.is_none() {
            self.client = Some(fetch::build_client(&self.settings.proxy)?);
        }
        // Just populated above.
        self.client
            .as_ref()
            .context("http client unavailable")
    }

    // -------------------- install layout --------------------

    pub fn install_root(&self, tool: &str) -> PathBuf {
        self.meta.shared.installs.join(tool)
    }

    pub fn version_path(&self, tool: &str, version: &str) -> PathBuf {
        self.install_root(tool)
            .join(format!("{VERSION_DIR_PREFIX}{version}"))
    }

    pub fn is_installed(&self, tool: &str, version: &str) -> bool {
        self.version_path(tool, version).is_dir()
    }

    /// Installed versions of `tool`, ascending.
    pub fn installed_ascending(&self, tool: &str) -> Vec<String> {
        let mut versions = Vec::new();
        let Ok(entries) = fs::read_dir(self.install_root(tool)) else {
            return versions;
        };
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(version) = name.to_string_lossy().strip_prefix(VERSION_DIR_PREFIX) {
                versions.push(version.to_string());
            }
        }
        versions.sort_by(|a, b| compare_versions(a, b));
        versions
    }

    /// Installed versions, newest first, for display.
    pub fn list_installed(&self, tool: &str) -> Vec<String> {
        let mut versions = self.installed_ascending(tool);
        versions.reverse();
        versions
    }

    /// Tools with at least one installed version.
    pub fn installed_tools(&self) -> Vec<String> {
        let mut tools = Vec::new();
        let Ok(entries) = fs::read_dir(&self.meta.shared.installs) else {
            return tools;
        };
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                let name = entry.file_name().to_string_lossy().to_string();
                if !self.installed_ascending(&name).is_empty() {
                    tools.push(name);
                }
            }
        }
        tools.sort();
        tools
    }

    pub fn package(&self, tool: &str, version: &str) -> Result<RuntimePackage> {
        if !self.is_installed(tool, version) {
            return Err(Error::version_not_installed(tool, version).into());
        }
        scan_package(tool, version, &self.version_path(tool, version))
    }

    pub fn available(&mut self, tool: &str) -> Result<Vec<AvailableVersion>> {
        self.plugin(tool)?.available()
    }

    // -------------------- install / uninstall --------------------

    /// Installs one version of `tool`, returning the concrete version that
    /// landed on disk.
    ///
    /// The already-installed check runs twice: once against the raw request
    /// and again after the plugin resolved it (aliases like `latest` only
    /// become concrete in pre-install). A failed install removes the whole
    /// version directory, and an interrupt signal during staging does the
    /// same before the process dies.
    pub fn install(&mut self, tool: &str, version: &str) -> Result<String> {
        let plugin = self.plugin(tool)?;

        if !version.is_empty() && self.is_installed(tool, version) {
            bail!("{tool} {version} is already installed");
        }

        let plan = plugin
            .pre_install(version)
            .with_context(|| format!("pre-install failed for {tool} {version}"))?;
        let resolved = plan.main.version.clone();
        if resolved.is_empty() {
            bail!("plugin {tool} resolved an empty version");
        }
        if self.is_installed(tool, &resolved) {
            bail!("{tool} {resolved} is already installed");
        }

        let version_path = self.version_path(tool, &resolved);
        arm_rollback(&version_path);

        let outcome = self.stage_all(&plan.main, &plan.additions, &version_path);
        let outcome = outcome.and_then(|_| {
            let package = scan_package(tool, &resolved, &version_path)?;
            if plugin.has_hook(Hook::PostInstall) {
                plugin.post_install(&package)?;
            }
            Ok(())
        });

        disarm_rollback();
        if let Err(err) = outcome {
            let _ = fs::remove_dir_all(&version_path);
            return Err(err).with_context(|| format!("failed to install {tool} {resolved}"));
        }

        log::info!("installed {tool} {resolved}");
        Ok(resolved)
    }

    fn stage_all(
        &mut self,
        main: &InstallSource,
        additions: &[InstallSource],
        version_path: &Path,
    ) -> Result<()> {
        self.stage_one(main, version_path)?;
        for addition in additions {
            self.stage_one(addition, version_path)?;
        }
        Ok(())
    }

    /// Stages one payload into `{version_path}/{name}-{version}`.
    fn stage_one(&mut self, source: &InstallSource, version_path: &Path) -> Result<()> {
        let target = version_path.join(format!("{}-{}", source.name, source.version));
        fs::create_dir_all(&target)
            .with_context(|| format!("failed to create {}", target.display()))?;

        match &source.source {
            Source::None => Ok(()),
            Source::Local(path) => copy_recursively(path, &target),
            Source::Remote(url) => {
                let temp = self.meta.user.temp.clone();
                let client = self.http_client()?;
                let payload = fetch::download(client, url, &source.headers, &temp)?;
                if let Some(checksum) = &source.checksum {
                    checksum.verify(&payload)?;
                }
                let filename = payload
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                match archive::detect(&filename) {
                    Some(kind) => {
                        archive::unpack(&payload, kind, &target)?;
                        flatten_single_dir(&target)?;
                    }
                    None => {
                        fs::copy(&payload, target.join(&filename)).with_context(|| {
                            format!("failed to place {}", target.join(&filename).display())
                        })?;
                    }
                }
                let _ = fs::remove_file(&payload);
                Ok(())
            }
        }
    }

    /// Deletes an installed version. The caller is responsible for
    /// deactivating it first; the pre-uninstall hook still runs.
    pub fn remove_package(&mut self, tool: &str, version: &str) -> Result<()> {
        let plugin = self.plugin(tool)?;
        let package = self.package(tool, version)?;
        if plugin.has_hook(Hook::PreUninstall) {
            plugin.pre_uninstall(&package)?;
        }
        let version_path = self.version_path(tool, version);
        fs::remove_dir_all(&version_path)
            .with_context(|| format!("failed to remove {}", version_path.display()))?;

        // Drop the now-empty tool directory for tidiness.
        let root = self.install_root(tool);
        if fs::read_dir(&root).map(|mut d| d.next().is_none()).unwrap_or(false) {
            let _ = fs::remove_dir(&root);
        }
        log::info!("uninstalled {tool} {version}");
        Ok(())
    }

    // -------------------- version resolution --------------------

    /// Resolves a requested version against the installed set.
    ///
    /// The plugin's pre-use hook gets the first say; it may map aliases or
    /// read ambient files. [`Error::NoResultProvided`] from the hook falls
    /// back to the core rules: an exact installed match wins, otherwise the
    /// request is treated as a prefix and the *lowest* installed version
    /// under `request.` is picked, ascending order being what makes that
    /// choice stable as newer patches get installed.
    pub fn resolve_version(
        &mut self,
        tool: &str,
        request: &str,
        scope: Scope,
        previous: Option<&str>,
    ) -> Result<String> {
        let plugin = self.plugin(tool)?;
        let installed = self.installed_ascending(tool);

        if plugin.has_hook(Hook::PreUse) {
            let ctx = PreUseContext {
                cwd: &self.meta.working.directory,
                scope,
                version: request,
                previous_version: previous,
                installed: &installed,
            };
            match plugin.pre_use(&ctx) {
                Ok(version) => return Ok(version),
                Err(err) => match err.downcast_ref::<Error>() {
                    Some(Error::NoResultProvided) => {}
                    _ => return Err(err),
                },
            }
        }

        if request.is_empty() {
            return Err(Error::NotFound(format!("no version requested for {tool}")).into());
        }
        if installed.iter().any(|v| v == request) {
            return Ok(request.to_string());
        }

        let prefix = format!("{request}.");
        if let Some(found) = installed.iter().find(|v| v.starts_with(&prefix)) {
            return Ok(found.clone());
        }

        Err(Error::version_not_installed(tool, request).into())
    }
}

// -------------------- staging helpers --------------------

fn arm_rollback(version_path: &Path) {
    SIGNAL_HANDLER.call_once(|| {
        let result = ctrlc::set_handler(|| {
            if let Ok(mut pending) = PENDING_ROLLBACK.lock() {
                if let Some(dir) = pending.take() {
                    let _ = fs::remove_dir_all(&dir);
                }
            }
            std::process::exit(130);
        });
        if let Err(err) = result {
            log::warn!("could not install the interrupt handler: {err}");
        }
    });
    if let Ok(mut pending) = PENDING_ROLLBACK.lock() {
        *pending = Some(version_path.to_path_buf());
    }
}

fn disarm_rollback() {
    if let Ok(mut pending) = PENDING_ROLLBACK.lock() {
        *pending = None;
    }
}

/// If `dir` contains exactly one directory and nothing else, hoist that
/// directory's children up one level. Archives almost always wrap their
/// content in a single versioned root.
fn flatten_single_dir(dir: &Path) -> Result<()> {
    let entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    if entries.len() != 1 || !entries[0].path().is_dir() {
        return Ok(());
    }
    let inner = entries[0].path();
    for child in fs::read_dir(&inner)? {
        let child = child?;
        let dest = dir.join(child.file_name());
        fs::rename(child.path(), &dest)
            .with_context(|| format!("failed to move {}", child.path().display()))?;
    }
    fs::remove_dir(&inner)?;
    Ok(())
}

fn copy_recursively(from: &Path, to: &Path) -> Result<()> {
    if from.is_file() {
        let dest = match from.file_name() {
            Some(name) => to.join(name),
            None => to.to_path_buf(),
        };
        fs::copy(from, &dest)
            .with_context(|| format!("failed to copy {}", from.display()))?;
        return Ok(());
    }
    for entry in
        fs::read_dir(from).with_context(|| format!("failed to read {}", from.display()))?
    {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.path().is_dir() {
            fs::create_dir_all(&dest)?;
            copy_recursively(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)
                .with_context(|| format!("failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}
