//! Filesystem layout: where installs, plugins, shims, configs and session
//! state live. Everything downstream asks this module instead of joining
//! paths ad hoc.

use anyhow::{Context as _, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::scope::Scope;
use crate::session;

/// Overrides the user home directory (default `~/.perigee`).
pub const HOME_ENV: &str = "PERIGEE_HOME";
/// Overrides the shared root holding installs and plugins (default: home).
pub const ROOT_ENV: &str = "PERIGEE_ROOT";
/// Overrides the plugin directory on its own.
pub const PLUGINS_ENV: &str = "PERIGEE_PLUGINS";
/// Overrides the install cache directory on its own.
pub const CACHE_ENV: &str = "PERIGEE_CACHE";
/// Overrides the temp root holding session directories.
pub const TEMP_ENV: &str = "PERIGEE_TEMP";

const SETTINGS_FILENAME: &str = "settings.toml";

/// Per-user directories.
#[derive(Debug, Clone)]
pub struct UserPaths {
    /// `~/.perigee` unless overridden.
    pub home: PathBuf,
    /// Root for session directories.
    pub temp: PathBuf,
    /// The settings file, read by [`crate::settings::Settings::load`].
    pub settings_file: PathBuf,
}

/// Directories that may be shared between users on one machine.
#[derive(Debug, Clone)]
pub struct SharedPaths {
    pub root: PathBuf,
    /// `{root}/installs/{tool}/v-{version}/...`
    pub installs: PathBuf,
    /// `{root}/plugins/{tool}/plugin.toml`
    pub plugins: PathBuf,
}

/// Paths anchored at the invocation directory.
#[derive(Debug, Clone)]
pub struct WorkingPaths {
    pub directory: PathBuf,
    /// Project-scope shim directory; created only when something links into it.
    pub shim_dir: PathBuf,
}

/// Inputs for [`PathMeta::new`]. `None` fields take the documented defaults.
#[derive(Debug, Clone, Default)]
pub struct PathOptions {
    pub home: Option<PathBuf>,
    pub shared_root: Option<PathBuf>,
    pub plugins_dir: Option<PathBuf>,
    pub installs_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub working_dir: PathBuf,
    pub session_dir: Option<PathBuf>,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct PathMeta {
    pub user: UserPaths,
    pub shared: SharedPaths,
    pub working: WorkingPaths,
    /// Shim directory and config directory of the current shell session.
    pub session_dir: PathBuf,
    global_shim_dir: PathBuf,
    pub pid: u32,
}

impl PathMeta {
    /// Resolves the full layout and eagerly creates the directories every
    /// command needs (home, temp, installs, plugins, global shims, session).
    /// The project shim directory is deliberately not created here.
    pub fn new(opts: PathOptions) -> Result<PathMeta> {
        let home = match opts.home {
            Some(home) => home,
            None => default_home()?,
        };
        let shared_root = opts.shared_root.unwrap_or_else(|| home.clone());
        let installs = opts
            .installs_dir
            .unwrap_or_else(|| shared_root.join("installs"));
        let plugins = opts
            .plugins_dir
            .unwrap_or_else(|| shared_root.join("plugins"));
        let temp = opts.temp_dir.unwrap_or_else(|| home.join("tmp"));
        let global_shim_dir = home.join("shims");
        let pid = opts.pid.unwrap_or_else(session::correlation_pid);

        for dir in [&home, &temp, &installs, &plugins, &global_shim_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let session_dir = match opts.session_dir {
            Some(dir) => {
                fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                dir
            }
            None => session::allocate(&temp, pid)?,
        };

        Ok(PathMeta {
            user: UserPaths {
                settings_file: home.join(SETTINGS_FILENAME),
                home,
                temp,
            },
            shared: SharedPaths {
                root: shared_root,
                installs,
                plugins,
            },
            working: WorkingPaths {
                shim_dir: opts.working_dir.join(".perigee").join("shims"),
                directory: opts.working_dir,
            },
            session_dir,
            global_shim_dir,
            pid,
        })
    }

    /// Layout from the process environment, honouring the `PERIGEE_*`
    /// overrides.
    pub fn from_env(working_dir: PathBuf) -> Result<PathMeta> {
        PathMeta::new(PathOptions {
            home: env_path(HOME_ENV),
            shared_root: env_path(ROOT_ENV),
            plugins_dir: env_path(PLUGINS_ENV),
            installs_dir: env_path(CACHE_ENV),
            temp_dir: env_path(TEMP_ENV),
            working_dir,
            session_dir: None,
            pid: None,
        })
    }

    /// Where a scope's shim symlinks live.
    pub fn shim_dir(&self, scope: Scope) -> &Path {
        match scope {
            Scope::Global => &self.global_shim_dir,
            Scope::Project => &self.working.shim_dir,
            Scope::Session => &self.session_dir,
        }
    }

    /// The directory whose config file records a scope's tool versions.
    pub fn config_dir(&self, scope: Scope) -> &Path {
        match scope {
            Scope::Global => &self.user.home,
            Scope::Project => &self.working.directory,
            Scope::Session => &self.session_dir,
        }
    }

    /// The cached-environment state file for this session.
    pub fn state_file(&self) -> PathBuf {
        self.session_dir.join("state.json")
    }
}

fn default_home() -> Result<PathBuf> {
    let base = dirs::home_dir().context("could not determine the user home directory")?;
    Ok(base.join(".perigee"))
}

fn env_path(key: &str) -> Option<PathBuf> {
    match std::env::var_os(key) {
        Some(raw) if !raw.is_empty() => Some(PathBuf::from(raw)),
        _ => None,
    }
}
