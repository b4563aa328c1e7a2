//! Change tracking for the `env` fast path.
//!
//! The rendered environment is cached next to the session directory along
//! with the mtimes of the config files it was derived from. When nothing
//! changed since the last check, the hook can replay the cached output
//! instead of re-resolving every tool.

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::UNIX_EPOCH,
};

use crate::scope::Scope;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateData {
    #[serde(default)]
    last_check: i64,
    /// Scope name -> mtime (unix seconds) of its config file at render time.
    #[serde(default)]
    mtimes: BTreeMap<String, i64>,
    #[serde(default)]
    cached_output: String,
}

pub struct ConfigState {
    inner: RwLock<StateData>,
    path: PathBuf,
}

impl ConfigState {
    /// Loads the state file; missing or unreadable state means "everything
    /// changed", which is always safe.
    pub fn load(path: PathBuf) -> ConfigState {
        let data = fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        ConfigState {
            inner: RwLock::new(data),
            path,
        }
    }

    /// Whether any watched config file changed since the last
    /// [`ConfigState::update`]. A deleted file counts as a change, as does a
    /// file appearing that was not recorded before.
    pub fn has_changed(&self, watched: &[(Scope, PathBuf)]) -> bool {
        let Ok(data) = self.inner.read() else {
            return true;
        };
        for (scope, path) in watched {
            let recorded = data.mtimes.get(scope.as_str()).copied();
            match (mtime_of(path), recorded) {
                (Some(current), Some(stored)) if current > stored => return true,
                (Some(_), None) => return true,
                (None, Some(_)) => return true,
                _ => {}
            }
        }
        false
    }

    pub fn cached_output(&self) -> String {
        self.inner
            .read()
            .map(|data| data.cached_output.clone())
            .unwrap_or_default()
    }

    /// Records the current mtimes and the freshly rendered output, then
    /// persists the state file.
    pub fn update(&self, watched: &[(Scope, PathBuf)], output: &str) -> Result<()> {
        {
            let mut data = self
                .inner
                .write()
                .map_err(|_| anyhow::anyhow!("state lock poisoned"))?;
            data.last_check = chrono::Local::now().timestamp();
            data.mtimes.clear();
            for (scope, path) in watched {
                if let Some(mtime) = mtime_of(path) {
                    data.mtimes.insert(scope.as_str().to_string(), mtime);
                }
            }
            data.cached_output = output.to_string();

            let text = serde_json::to_string_pretty(&*data).context("failed to encode state")?;
            fs::write(&self.path, text)
                .with_context(|| format!("failed to write {}", self.path.display()))?;
        }
        Ok(())
    }
}

fn mtime_of(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_secs() as i64)
}
