//! Symlink plumbing for shim directories.

use anyhow::{Context as _, Result};
use std::{
    fs,
    path::{Component, Path, PathBuf},
};

/// Outcome of [`ensure_link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created,
    Replaced,
    /// An equivalent link already existed; nothing was touched.
    Unchanged,
}

/// Creates `link -> target`, replacing a stale link but leaving an
/// up-to-date one alone so repeated activations do not churn mtimes.
pub fn ensure_link(target: &Path, link: &Path) -> Result<LinkOutcome> {
    if let Ok(existing) = fs::read_link(link) {
        if normalize(&existing) == normalize(target) {
            return Ok(LinkOutcome::Unchanged);
        }
        remove_link(link)?;
        create_link(target, link)?;
        return Ok(LinkOutcome::Replaced);
    }

    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    create_link(target, link)?;
    Ok(LinkOutcome::Created)
}

/// Removes a link if present. Missing is fine; a regular file in the way is
/// an error so we never delete user data.
pub fn remove_link(link: &Path) -> Result<()> {
    match fs::symlink_metadata(link) {
        Ok(meta) if is_link(&meta) => remove_platform_link(link)
            .with_context(|| format!("failed to remove link {}", link.display())),
        Ok(_) => anyhow::bail!("{} exists and is not a link", link.display()),
        Err(_) => Ok(()),
    }
}

#[cfg(unix)]
fn is_link(meta: &fs::Metadata) -> bool {
    meta.file_type().is_symlink()
}

// Junctions surface as directories, not symlinks.
#[cfg(windows)]
fn is_link(meta: &fs::Metadata) -> bool {
    meta.file_type().is_symlink() || meta.file_type().is_dir()
}

/// Lexical normalization: strips `.` components and resolves `..` against
/// the accumulated path without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).with_context(|| {
        format!(
            "failed to link {} -> {}",
            link.display(),
            target.display()
        )
    })
}

#[cfg(unix)]
fn remove_platform_link(link: &Path) -> Result<()> {
    fs::remove_file(link)?;
    Ok(())
}

// Windows symlinks need elevation; junctions do not.
#[cfg(windows)]
fn create_link(target: &Path, link: &Path) -> Result<()> {
    junction::create(target, link).with_context(|| {
        format!(
            "failed to link {} -> {}",
            link.display(),
            target.display()
        )
    })
}

#[cfg(windows)]
fn remove_platform_link(link: &Path) -> Result<()> {
    fs::remove_dir(link)?;
    Ok(())
}
