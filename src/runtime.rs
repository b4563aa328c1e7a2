//! Installed runtime packages on disk.
//!
//! A version directory `installs/{tool}/v-{version}/` contains one
//! `{name}-{version}` directory per runtime: the main runtime named after
//! the tool, plus any additions the plugin installed alongside it.

use anyhow::{bail, Context as _, Result};
use std::{
    cmp::Ordering,
    fs,
    path::{Path, PathBuf},
};

/// One unpacked runtime rooted at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runtime {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

/// The main runtime of an installed version plus its additions.
#[derive(Debug, Clone)]
pub struct RuntimePackage {
    pub main: Runtime,
    pub additions: Vec<Runtime>,
    /// The `v-{version}` directory every runtime of this install lives under.
    pub package_path: PathBuf,
}

impl RuntimePackage {
    pub fn version(&self) -> &str {
        &self.main.version
    }
}

/// Reconstructs a [`RuntimePackage`] from a version directory.
///
/// Directory names split at the first `-` into runtime name and version.
/// Entries that do not match the pattern are ignored; a missing main runtime
/// is an error because nothing can be activated without it.
pub fn scan_package(tool: &str, version: &str, version_path: &Path) -> Result<RuntimePackage> {
    let entries = fs::read_dir(version_path)
        .with_context(|| format!("failed to read {}", version_path.display()))?;

    let mut main = None;
    let mut additions = Vec::new();

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read {}", version_path.display()))?;
        if !entry.path().is_dir() {
            continue;
        }
        let dir_name = entry.file_name();
        let dir_name = dir_name.to_string_lossy();
        let Some((name, runtime_version)) = dir_name.split_once('-') else {
            continue;
        };
        let runtime = Runtime {
            name: name.to_string(),
            version: runtime_version.to_string(),
            path: entry.path(),
        };
        if name == tool {
            main = Some(runtime);
        } else {
            additions.push(runtime);
        }
    }

    let Some(main) = main else {
        bail!(
            "corrupt install: no {tool} runtime under {}",
            version_path.display()
        );
    };
    if main.version != version {
        bail!(
            "corrupt install: {} holds {} {}, expected {version}",
            version_path.display(),
            main.name,
            main.version
        );
    }

    additions.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(RuntimePackage {
        main,
        additions,
        package_path: version_path.to_path_buf(),
    })
}

/// Orders version strings segment-wise, numerically where both segments are
/// numbers ("9" < "10"), lexically otherwise. Shorter prefixes sort first.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(xn), Ok(yn)) => xn.cmp(&yn),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn version_ordering_is_numeric_per_segment() {
        let mut versions = vec!["20.10.0", "20.9.1", "9.0.0", "20.9", "20.9.1-rc"];
        versions.sort_by(|a, b| compare_versions(a, b));
        assert_eq!(
            versions,
            vec!["9.0.0", "20.9", "20.9.1", "20.9.1-rc", "20.10.0"]
        );
    }

    #[test]
    fn scans_main_and_additions() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nodejs-20.5.0")).unwrap();
        fs::create_dir_all(dir.path().join("npm-9.8.0")).unwrap();
        fs::write(dir.path().join("stray-file"), b"").unwrap();

        let package = scan_package("nodejs", "20.5.0", dir.path()).unwrap();
        assert_eq!(package.main.name, "nodejs");
        assert_eq!(package.version(), "20.5.0");
        assert_eq!(package.package_path, dir.path());
        assert_eq!(package.additions.len(), 1);
        assert_eq!(package.additions[0].name, "npm");
        assert_eq!(package.additions[0].version, "9.8.0");
    }

    #[test]
    fn missing_main_runtime_is_an_error() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("npm-9.8.0")).unwrap();
        assert!(scan_package("nodejs", "20.5.0", dir.path()).is_err());
    }
}
