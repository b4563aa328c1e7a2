//! Shell-session directories and their daily cleanup.
//!
//! A session directory is named `{start-of-today}-{pid}` under the user temp
//! root and holds the session-scope shims plus the session config. Child
//! shells inherit [`SESSION_DIR_ENV`] so sub-shells spawned from an activated
//! shell share one session instead of allocating their own.

use anyhow::{Context as _, Result};
use chrono::Local;
use std::{
    fs,
    path::{Path, PathBuf},
};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Inherited by child shells to reuse the parent's session directory.
pub const SESSION_DIR_ENV: &str = "__PERIGEE_SESSION_DIR";
/// Process-correlation id exported by the shell hook.
pub const PID_ENV: &str = "__PERIGEE_PID";
/// Terminal-multiplexer marker; inside tmux the shell lineage is detached
/// from the invoking process tree, so parent-pid correlation is unreliable.
pub const MULTIPLEXER_ENV: &str = "TMUX";

const CLEANUP_SENTINEL: &str = ".cleanup";

/// Unix timestamp of local midnight today.
pub fn begin_of_today() -> i64 {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| now.timestamp())
}

pub fn is_before_today(timestamp: i64) -> bool {
    timestamp < begin_of_today()
}

/// The pid used to correlate shim directories with a shell session.
pub fn correlation_pid() -> u32 {
    if let Ok(raw) = std::env::var(PID_ENV) {
        if let Ok(pid) = raw.trim().parse::<u32>() {
            return pid;
        }
    }
    if std::env::var_os(MULTIPLEXER_ENV).is_some() {
        return std::process::id();
    }
    parent_pid().unwrap_or_else(std::process::id)
}

#[cfg(unix)]
fn parent_pid() -> Option<u32> {
    Some(std::os::unix::process::parent_id())
}

#[cfg(not(unix))]
fn parent_pid() -> Option<u32> {
    None
}

pub fn session_dir_name(pid: u32) -> String {
    format!("{}-{}", begin_of_today(), pid)
}

/// Returns the session directory for this process tree, creating it if
/// needed. An inherited [`SESSION_DIR_ENV`] wins over allocating a new one.
pub fn allocate(temp_root: &Path, pid: u32) -> Result<PathBuf> {
    let dir = match std::env::var(SESSION_DIR_ENV) {
        Ok(inherited) if !inherited.trim().is_empty() => PathBuf::from(inherited.trim()),
        _ => temp_root.join(session_dir_name(pid)),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create session directory {}", dir.display()))?;
    Ok(dir)
}

/// Removes expired session directories under `temp_root`.
///
/// The sweep is gated by a sentinel file so the directory scan plus
/// live-process check run at most once per calendar day. A directory is
/// removed only when its embedded date is before today *and* its embedded
/// pid is no longer running; same-day directories of dead processes are kept
/// until the next day's sweep.
pub fn cleanup_expired(temp_root: &Path, keep: &Path) -> Result<usize> {
    let sentinel = temp_root.join(CLEANUP_SENTINEL);
    if let Ok(raw) = fs::read_to_string(&sentinel) {
        if let Ok(stamp) = raw.trim().parse::<i64>() {
            if !is_before_today(stamp) {
                return Ok(0);
            }
        }
    }

    let mut removed = 0;
    let entries = match fs::read_dir(temp_root) {
        Ok(entries) => entries,
        Err(_) => return Ok(0),
    };

    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing(),
    );

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() || path == keep {
            continue;
        }
        let name = entry.file_name();
        let Some((stamp, pid)) = parse_session_dir_name(&name.to_string_lossy()) else {
            continue;
        };
        if !is_before_today(stamp) {
            continue;
        }
        if system.process(Pid::from_u32(pid)).is_some() {
            continue;
        }
        log::debug!("removing expired session directory {}", path.display());
        if fs::remove_dir_all(&path).is_ok() {
            removed += 1;
        }
    }

    fs::write(&sentinel, begin_of_today().to_string())
        .with_context(|| format!("failed to write {}", sentinel.display()))?;
    Ok(removed)
}

fn parse_session_dir_name(name: &str) -> Option<(i64, u32)> {
    let (stamp, pid) = name.split_once('-')?;
    Some((stamp.parse().ok()?, pid.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn session_dir_name_embeds_date_and_pid() {
        let name = session_dir_name(4242);
        let (stamp, pid) = parse_session_dir_name(&name).unwrap();
        assert_eq!(stamp, begin_of_today());
        assert_eq!(pid, 4242);
    }

    #[test]
    fn today_is_not_before_today() {
        assert!(!is_before_today(begin_of_today()));
        assert!(is_before_today(begin_of_today() - 86_400));
    }

    #[test]
    fn sweep_removes_only_dead_and_old_directories() {
        let temp = tempdir().unwrap();
        let keep = temp.path().join(session_dir_name(std::process::id()));
        fs::create_dir_all(&keep).unwrap();

        // Old date, pid that cannot be alive.
        let old_dead = temp.path().join(format!("{}-999999999", begin_of_today() - 86_400));
        fs::create_dir_all(&old_dead).unwrap();

        // Same-day directory of a dead pid: retained until tomorrow.
        let today_dead = temp.path().join(format!("{}-999999998", begin_of_today()));
        fs::create_dir_all(&today_dead).unwrap();

        // Old date but live pid (ours): retained.
        let old_alive = temp.path().join(format!(
            "{}-{}",
            begin_of_today() - 86_400,
            std::process::id()
        ));
        fs::create_dir_all(&old_alive).unwrap();

        let removed = cleanup_expired(temp.path(), &keep).unwrap();
        assert_eq!(removed, 1);
        assert!(!old_dead.exists());
        assert!(today_dead.exists());
        assert!(old_alive.exists());
        assert!(keep.exists());

        // Sentinel gates the second sweep the same day.
        fs::create_dir_all(&old_dead).unwrap();
        let removed = cleanup_expired(temp.path(), &keep).unwrap();
        assert_eq!(removed, 0);
        assert!(old_dead.exists());
    }
}
